//! Reversible gzip compression of byte buffers.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::{Result, SaveError};

pub fn compress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bytes)
        .map_err(|err| SaveError::Format(format!("gzip encode: {}", err)))?;
    encoder
        .finish()
        .map_err(|err| SaveError::Format(format!("gzip encode: {}", err)))
}

/// Decompression of non-gzip or truncated input fails with a format error.
pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|err| SaveError::Format(format!("gzip decode: {}", err)))?;
    Ok(out)
}
