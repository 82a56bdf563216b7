//! Composed encode/decode pipelines, one fixed transform order per format.
//!
//! Encode and decode must mirror each other exactly; the order lives in this
//! module and nowhere else. File I/O is the store's job, the codec only
//! produces and consumes bytes.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{Result, SaveError};
use crate::record::SaveRecord;

use super::compression;
use super::crypto::CryptoProvider;
use super::SaveFormat;

/// Encodes save records to on-disk bytes and back.
pub struct FormatCodec {
    crypto: CryptoProvider,
    compression_enabled: bool,
    encryption_enabled: bool,
}

impl FormatCodec {
    pub fn new(crypto: CryptoProvider, compression_enabled: bool, encryption_enabled: bool) -> Self {
        Self {
            crypto,
            compression_enabled,
            encryption_enabled,
        }
    }

    pub fn encode(&self, record: &SaveRecord, format: SaveFormat) -> Result<Vec<u8>> {
        match format {
            SaveFormat::Binary => self.encode_binary(record),
            SaveFormat::Json => self.encode_json(record),
            SaveFormat::Compressed => self.encode_compressed(record),
            SaveFormat::Encrypted => self.encode_encrypted(record),
        }
    }

    pub fn decode(&self, bytes: &[u8], format: SaveFormat) -> Result<SaveRecord> {
        match format {
            SaveFormat::Binary => self.decode_binary(bytes),
            SaveFormat::Json => self.decode_json(bytes),
            SaveFormat::Compressed => self.decode_compressed(bytes),
            SaveFormat::Encrypted => self.decode_encrypted(bytes),
        }
    }

    // Binary: MessagePack envelope only. Integrity lives in the envelope's
    // checksum field, no compression or encryption.
    fn encode_binary(&self, record: &SaveRecord) -> Result<Vec<u8>> {
        to_msgpack(record)
    }

    fn decode_binary(&self, bytes: &[u8]) -> Result<SaveRecord> {
        from_msgpack(bytes)
    }

    // Json: human-readable envelope. With encryption on, the JSON bytes are
    // encrypted and base64-wrapped so the file stays text.
    fn encode_json(&self, record: &SaveRecord) -> Result<Vec<u8>> {
        let json = serde_json::to_vec_pretty(record)
            .map_err(|err| SaveError::Format(format!("json encode: {}", err)))?;
        if !self.encryption_enabled {
            return Ok(json);
        }
        let ciphertext = self.crypto.encrypt(&json)?;
        Ok(STANDARD.encode(ciphertext).into_bytes())
    }

    fn decode_json(&self, bytes: &[u8]) -> Result<SaveRecord> {
        let json = if self.encryption_enabled {
            let text = std::str::from_utf8(bytes)
                .map_err(|err| SaveError::Format(format!("json payload not utf-8: {}", err)))?;
            let ciphertext = STANDARD
                .decode(text.trim())
                .map_err(|err| SaveError::Format(format!("base64 decode: {}", err)))?;
            self.crypto.decrypt(&ciphertext)?
        } else {
            bytes.to_vec()
        };
        serde_json::from_slice(&json)
            .map_err(|err| SaveError::Format(format!("json decode: {}", err)))
    }

    // Compressed: serialize, then gzip, then optionally encrypt.
    fn encode_compressed(&self, record: &SaveRecord) -> Result<Vec<u8>> {
        let packed = to_msgpack(record)?;
        let compressed = if self.compression_enabled {
            compression::compress(&packed)?
        } else {
            packed
        };
        if self.encryption_enabled {
            self.crypto.encrypt(&compressed)
        } else {
            Ok(compressed)
        }
    }

    fn decode_compressed(&self, bytes: &[u8]) -> Result<SaveRecord> {
        let compressed = if self.encryption_enabled {
            self.crypto.decrypt(bytes)?
        } else {
            bytes.to_vec()
        };
        let packed = if self.compression_enabled {
            compression::decompress(&compressed)?
        } else {
            compressed
        };
        from_msgpack(&packed)
    }

    // Encrypted: serialize then encrypt, regardless of the encryption
    // toggle. Never compressed.
    fn encode_encrypted(&self, record: &SaveRecord) -> Result<Vec<u8>> {
        let packed = to_msgpack(record)?;
        self.crypto.encrypt(&packed)
    }

    fn decode_encrypted(&self, bytes: &[u8]) -> Result<SaveRecord> {
        let packed = self.crypto.decrypt(bytes)?;
        from_msgpack(&packed)
    }
}

fn to_msgpack(record: &SaveRecord) -> Result<Vec<u8>> {
    rmp_serde::to_vec_named(record)
        .map_err(|err| SaveError::Format(format!("msgpack encode: {}", err)))
}

fn from_msgpack(bytes: &[u8]) -> Result<SaveRecord> {
    rmp_serde::from_slice(bytes)
        .map_err(|err| SaveError::Format(format!("msgpack decode: {}", err)))
}
