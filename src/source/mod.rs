//! Per-source parsers: objects fetched from buckets, log-group subscription
//! payloads, and stream records.

use flate2::read::GzDecoder;
use std::io::Read;

pub mod cloudwatch;
pub mod kinesis;
pub mod registry;
pub mod s3;
pub mod store;

/// Gzip magic bytes `1F 8B`.
pub(crate) fn is_gzipped(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x1F && data[1] == 0x8B
}

pub(crate) fn gunzip(data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
pub(crate) fn gzip_bytes(data: &[u8]) -> Vec<u8> {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}
