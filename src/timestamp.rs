//! Numeric timestamp decomposition and X-Ray trace-id decoding.

use chrono::{DateTime, NaiveDateTime, Utc};

const TRACE_ID_VERSION: char = '1';
const TRACE_ID_LENGTH: usize = 35;
const TRACE_ID_DELIMITER: u8 = b'-';
const TRACE_ID_DELIMITER_INDEX_1: usize = 1;
const TRACE_ID_DELIMITER_INDEX_2: usize = 10;

#[derive(Debug, PartialEq, Eq)]
pub enum TimestampError {
    /// Input was not a plain decimal digit string.
    NotDigits,
    /// Fewer than 10 digits (sub-second epoch) or more than 19 (overflows i64 nanos).
    OutOfRange(usize),
    MalformedTraceId(&'static str),
}

impl std::fmt::Display for TimestampError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimestampError::NotDigits => write!(f, "timestamp is not a decimal digit string"),
            TimestampError::OutOfRange(n) => {
                write!(f, "timestamp has {} digits, expected 10 to 19", n)
            }
            TimestampError::MalformedTraceId(reason) => {
                write!(f, "cannot decode trace ID from header: {}", reason)
            }
        }
    }
}

impl std::error::Error for TimestampError {}

/// Split a fractional Unix timestamp rendered as a digit string into whole
/// seconds and nanoseconds. The first 10 digits are the seconds component,
/// the remainder is a sub-second fraction scaled up to 9 digits. Holds until
/// 2286-11-20, when Unix time gains an 11th digit.
///
/// Inputs with fewer than 10 or more than 19 digits are rejected rather than
/// decomposed into nonsense.
pub fn split_unix_fraction(s: &str) -> Result<(i64, u32), TimestampError> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TimestampError::NotDigits);
    }
    if s.len() < 10 || s.len() > 19 {
        return Err(TimestampError::OutOfRange(s.len()));
    }

    let (sec_digits, frac_digits) = s.split_at(10);
    let sec: i64 = sec_digits.parse().map_err(|_| TimestampError::NotDigits)?;
    if frac_digits.is_empty() {
        return Ok((sec, 0));
    }

    let frac: u64 = frac_digits.parse().map_err(|_| TimestampError::NotDigits)?;
    let nsec = frac * 10u64.pow(9 - frac_digits.len() as u32);
    Ok((sec, nsec as u32))
}

/// Decode an X-Ray trace id (`1-5759e988-bd862e3fe1be46a994272793`) into the
/// 32-hex-char trace identifier formed by concatenating the epoch and unique
/// segments.
pub fn parse_xray_trace_id(id: &str) -> Result<String, TimestampError> {
    if id.len() != TRACE_ID_LENGTH {
        return Err(TimestampError::MalformedTraceId(
            "expected 35 character X-Ray trace ID",
        ));
    }
    if !id.starts_with(TRACE_ID_VERSION) {
        return Err(TimestampError::MalformedTraceId("unsupported version"));
    }
    let bytes = id.as_bytes();
    if bytes[TRACE_ID_DELIMITER_INDEX_1] != TRACE_ID_DELIMITER
        || bytes[TRACE_ID_DELIMITER_INDEX_2] != TRACE_ID_DELIMITER
    {
        return Err(TimestampError::MalformedTraceId("missing delimiter"));
    }

    let epoch = &id[TRACE_ID_DELIMITER_INDEX_1 + 1..TRACE_ID_DELIMITER_INDEX_2];
    let unique = &id[TRACE_ID_DELIMITER_INDEX_2 + 1..];
    if !epoch
        .bytes()
        .chain(unique.bytes())
        .all(|b| b.is_ascii_hexdigit())
    {
        return Err(TimestampError::MalformedTraceId("non-hex segment"));
    }

    Ok(format!("{}{}", epoch, unique))
}

/// Pull the `Root` segment out of a full X-Ray tracing header
/// (`Root=1-...;Parent=...;Sampled=1`) and decode it. Returns `None` when the
/// header is absent or malformed; forwarding never fails over trace context.
pub fn trace_id_from_xray_header(header: &str) -> Option<String> {
    header
        .split(';')
        .find_map(|part| part.trim().strip_prefix("Root="))
        .and_then(|root| parse_xray_trace_id(root).ok())
}

/// Parse a string timestamp with a chrono format. Formats carrying a zone
/// (e.g. `%+`) parse as absolute instants; zone-less formats are taken as UTC.
pub fn parse_string_timestamp(value: &str, format: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_str(value, format) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, format)
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("cannot parse timestamp {:?} with {:?}: {}", value, format, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn splits_millisecond_timestamp() {
        assert_eq!(
            split_unix_fraction("1234567890123"),
            Ok((1234567890, 123_000_000))
        );
    }

    #[test]
    fn zero_fraction_yields_zero_nanos() {
        assert_eq!(split_unix_fraction("1234567890"), Ok((1234567890, 0)));
        assert_eq!(
            split_unix_fraction("1234567890000"),
            Ok((1234567890, 0))
        );
    }

    #[test]
    fn nanosecond_precision_is_preserved() {
        assert_eq!(
            split_unix_fraction("1234567890123456789"),
            Ok((1234567890, 123_456_789))
        );
    }

    #[test]
    fn short_and_long_inputs_are_rejected() {
        assert_eq!(
            split_unix_fraction("123456789"),
            Err(TimestampError::OutOfRange(9))
        );
        assert_eq!(
            split_unix_fraction("12345678901234567890"),
            Err(TimestampError::OutOfRange(20))
        );
        assert_eq!(split_unix_fraction(""), Err(TimestampError::NotDigits));
        assert_eq!(
            split_unix_fraction("12345abcde"),
            Err(TimestampError::NotDigits)
        );
    }

    #[test]
    fn decodes_valid_xray_trace_id() {
        let id = parse_xray_trace_id("1-5759e988-bd862e3fe1be46a994272793").unwrap();
        assert_eq!(id, "5759e988bd862e3fe1be46a994272793");
    }

    #[test]
    fn rejects_malformed_trace_ids() {
        assert!(parse_xray_trace_id("1-5759e988").is_err());
        assert!(parse_xray_trace_id("2-5759e988-bd862e3fe1be46a994272793").is_err());
        assert!(parse_xray_trace_id("1x5759e988-bd862e3fe1be46a994272793").is_err());
        assert!(parse_xray_trace_id("1-5759e988xbd862e3fe1be46a994272793").is_err());
        assert!(parse_xray_trace_id("1-5759e98z-bd862e3fe1be46a994272793").is_err());
    }

    #[test]
    fn extracts_root_segment_from_header() {
        let header = "Root=1-5759e988-bd862e3fe1be46a994272793;Parent=53995c3f42cd8ad8;Sampled=1";
        assert_eq!(
            trace_id_from_xray_header(header).as_deref(),
            Some("5759e988bd862e3fe1be46a994272793")
        );
        assert_eq!(trace_id_from_xray_header("Sampled=0"), None);
    }

    #[test]
    fn parses_rfc3339_and_naive_formats() {
        let rfc = parse_string_timestamp("2022-01-24T00:00:05Z", "%+").unwrap();
        assert_eq!(rfc, Utc.with_ymd_and_hms(2022, 1, 24, 0, 0, 5).unwrap());

        let naive = parse_string_timestamp("2019-11-14 20:01:02", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(naive, Utc.with_ymd_and_hms(2019, 11, 14, 20, 1, 2).unwrap());

        assert!(parse_string_timestamp("not a timestamp", "%+").is_err());
    }
}
