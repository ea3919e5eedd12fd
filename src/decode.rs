//! Incremental decoder for objects holding one large JSON array of records
//! (the CloudTrail layout: `{"Records": [ {...}, {...}, ... ]}`).
//!
//! The producer runs on a blocking task and hands one decoded object at a
//! time to the async consumer through a bounded channel of depth 1, so the
//! full decoded array is never materialized. Errors travel in-band as a
//! distinct unit; the consumer stops and propagates on the first one.

use serde_json::{Map, Value as JsonValue};
use std::io::{BufReader, Read};
use tokio::sync::mpsc;

/// Channel depth between the decoding producer and the consumer: one unit of
/// look-ahead, backpressure beyond that.
const CHANNEL_DEPTH: usize = 1;

#[derive(Debug)]
pub enum DecodeError {
    Io(String),
    Json(String),
    UnexpectedEof,
    UnexpectedByte(char),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Io(msg) => write!(f, "read error: {}", msg),
            DecodeError::Json(msg) => write!(f, "malformed JSON record: {}", msg),
            DecodeError::UnexpectedEof => write!(f, "unexpected end of JSON input"),
            DecodeError::UnexpectedByte(c) => write!(f, "unexpected byte {:?} in JSON input", c),
        }
    }
}

impl std::error::Error for DecodeError {}

/// One unit handed to the consumer: a decoded record or the decode error
/// that ended the stream.
pub type RecordUnit = Result<Map<String, JsonValue>, DecodeError>;

/// Spawn a blocking producer that skips `skip_tokens` leading structural
/// tokens, then yields each object of the following array through the
/// returned channel. The channel closes after the last record or the first
/// error; dropping the receiver stops the producer.
pub fn stream_json_records<R>(reader: R, skip_tokens: usize) -> mpsc::Receiver<RecordUnit>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
    tokio::task::spawn_blocking(move || {
        let mut scanner = Scanner::new(BufReader::new(reader));
        if let Err(e) = scanner.skip_tokens(skip_tokens) {
            let _ = tx.blocking_send(Err(e));
            return;
        }
        loop {
            match scanner.next_array_element() {
                Ok(Some(bytes)) => {
                    let unit = serde_json::from_slice::<Map<String, JsonValue>>(&bytes)
                        .map_err(|e| DecodeError::Json(e.to_string()));
                    let failed = unit.is_err();
                    if tx.blocking_send(unit).is_err() || failed {
                        return;
                    }
                }
                Ok(None) => return,
                Err(e) => {
                    let _ = tx.blocking_send(Err(e));
                    return;
                }
            }
        }
    });
    rx
}

/// Minimal JSON scanner: enough token awareness to skip a wrapper prefix and
/// slice out balanced array elements without decoding them.
struct Scanner<R: Read> {
    inner: R,
    peeked: Option<u8>,
}

impl<R: Read> Scanner<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            peeked: None,
        }
    }

    fn next_byte(&mut self) -> Result<Option<u8>, DecodeError> {
        if let Some(b) = self.peeked.take() {
            return Ok(Some(b));
        }
        let mut buf = [0u8; 1];
        loop {
            return match self.inner.read(&mut buf) {
                Ok(0) => Ok(None),
                Ok(_) => Ok(Some(buf[0])),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => Err(DecodeError::Io(e.to_string())),
            };
        }
    }

    /// Next byte that is not whitespace or a separator (`,` / `:`).
    fn next_significant(&mut self) -> Result<Option<u8>, DecodeError> {
        loop {
            match self.next_byte()? {
                Some(b) if b.is_ascii_whitespace() || b == b',' || b == b':' => continue,
                other => return Ok(other),
            }
        }
    }

    /// Consume a complete string literal; the opening quote is already read.
    fn skip_string(&mut self) -> Result<(), DecodeError> {
        let mut escaped = false;
        loop {
            match self.next_byte()? {
                None => return Err(DecodeError::UnexpectedEof),
                Some(b'\\') if !escaped => escaped = true,
                Some(b'"') if !escaped => return Ok(()),
                Some(_) => escaped = false,
            }
        }
    }

    /// Skip `n` structural tokens, where a token is a delimiter, a string, or
    /// a bare scalar. For the CloudTrail wrapper this walks past
    /// `{`, `"Records"`, `[`.
    fn skip_tokens(&mut self, n: usize) -> Result<(), DecodeError> {
        for _ in 0..n {
            match self.next_significant()? {
                None => return Err(DecodeError::UnexpectedEof),
                Some(b'{') | Some(b'[') | Some(b'}') | Some(b']') => {}
                Some(b'"') => self.skip_string()?,
                Some(_) => {
                    // Bare scalar: consume until a delimiter or whitespace.
                    loop {
                        match self.next_byte()? {
                            None => break,
                            Some(b)
                                if b.is_ascii_whitespace()
                                    || matches!(b, b',' | b':' | b'}' | b']') =>
                            {
                                self.peeked = Some(b);
                                break;
                            }
                            Some(_) => {}
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Read the raw bytes of the next array element, or `None` at the closing
    /// bracket / end of input. Elements must be objects or arrays; CloudTrail
    /// records always are.
    fn next_array_element(&mut self) -> Result<Option<Vec<u8>>, DecodeError> {
        let open = match self.next_significant()? {
            None | Some(b']') => return Ok(None),
            Some(b @ b'{') | Some(b @ b'[') => b,
            Some(other) => return Err(DecodeError::UnexpectedByte(other as char)),
        };

        let mut bytes = vec![open];
        let mut depth = 1usize;
        let mut in_string = false;
        let mut escaped = false;
        while depth > 0 {
            let b = self.next_byte()?.ok_or(DecodeError::UnexpectedEof)?;
            bytes.push(b);
            if in_string {
                match b {
                    b'\\' if !escaped => escaped = true,
                    b'"' if !escaped => in_string = false,
                    _ => escaped = false,
                }
            } else {
                match b {
                    b'"' => in_string = true,
                    b'{' | b'[' => depth += 1,
                    b'}' | b']' => depth -= 1,
                    _ => {}
                }
            }
        }
        Ok(Some(bytes))
    }
}
