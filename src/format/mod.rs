//! On-disk formats and the layered encode/decode pipeline.

pub mod codec;
pub mod compression;
pub mod crypto;
pub mod integrity;

pub use codec::FormatCodec;
pub use crypto::CryptoProvider;
pub use integrity::IntegrityVerifier;

use serde::{Deserialize, Serialize};

/// The four supported on-disk encodings.
///
/// Each format binds a fixed transform order; the codec mirrors that order
/// exactly in reverse on decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SaveFormat {
    /// Compact MessagePack envelope, no compression.
    Binary,
    /// Human-readable JSON envelope; base64-wrapped when encryption is on.
    Json,
    /// MessagePack, gzip-compressed, optionally encrypted.
    Compressed,
    /// MessagePack, encrypted, never compressed.
    Encrypted,
}

impl SaveFormat {
    pub const ALL: [SaveFormat; 4] = [
        SaveFormat::Binary,
        SaveFormat::Json,
        SaveFormat::Compressed,
        SaveFormat::Encrypted,
    ];

    /// File extension for this format, dot included.
    pub fn extension(&self) -> &'static str {
        match self {
            SaveFormat::Binary => ".save",
            SaveFormat::Json => ".json",
            SaveFormat::Compressed => ".sav.gz",
            SaveFormat::Encrypted => ".enc",
        }
    }

    /// File name for a key saved in this format.
    pub fn file_name(&self, key: &str) -> String {
        format!("{}{}", key, self.extension())
    }
}

impl std::fmt::Display for SaveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SaveFormat::Binary => "binary",
            SaveFormat::Json => "json",
            SaveFormat::Compressed => "compressed",
            SaveFormat::Encrypted => "encrypted",
        };
        write!(f, "{}", name)
    }
}
