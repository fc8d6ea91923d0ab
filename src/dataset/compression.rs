#[cfg(feature = "gzip")]
use std::io::{Cursor, Read};

#[cfg(feature = "gzip")]
use flate2::bufread::{GzDecoder, GzEncoder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The compression applied to each chunk of a dataset.
///
/// Serialised as codec metadata, e.g. `{"name": "gzip", "configuration": {"level": 4}}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "configuration", rename_all = "lowercase")]
pub enum Compression {
    /// No compression.
    None,
    /// gzip compression.
    #[cfg(feature = "gzip")]
    Gzip {
        /// The compression level, 0-9.
        level: u32,
    },
    /// Zstandard compression.
    #[cfg(feature = "zstd")]
    Zstd {
        /// The compression level, -7-22.
        level: i32,
    },
}

impl Default for Compression {
    #[cfg(feature = "gzip")]
    fn default() -> Self {
        Self::Gzip { level: 4 }
    }

    #[cfg(not(feature = "gzip"))]
    fn default() -> Self {
        Self::None
    }
}

/// A compression error.
#[derive(Debug, Error)]
pub enum CodecError {
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// An invalid compression level.
    #[error("{name} compression level {level} is not in {min}..={max}")]
    InvalidLevel {
        /// The codec name.
        name: &'static str,
        /// The level.
        level: i64,
        /// The minimum level.
        min: i64,
        /// The maximum level.
        max: i64,
    },
    /// The data type or byte order of a chunk is not supported.
    #[error("unsupported {0}")]
    Unsupported(String),
}

impl Compression {
    /// Return the codec name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            #[cfg(feature = "gzip")]
            Self::Gzip { .. } => "gzip",
            #[cfg(feature = "zstd")]
            Self::Zstd { .. } => "zstd",
        }
    }

    /// Validate the compression level.
    ///
    /// # Errors
    /// Returns [`CodecError::InvalidLevel`] if the level is out of range for the codec.
    pub fn validate(&self) -> Result<(), CodecError> {
        match *self {
            Self::None => Ok(()),
            #[cfg(feature = "gzip")]
            Self::Gzip { level } => {
                if level <= 9 {
                    Ok(())
                } else {
                    Err(CodecError::InvalidLevel {
                        name: self.name(),
                        level: i64::from(level),
                        min: 0,
                        max: 9,
                    })
                }
            }
            #[cfg(feature = "zstd")]
            Self::Zstd { level } => {
                if (-7..=22).contains(&level) {
                    Ok(())
                } else {
                    Err(CodecError::InvalidLevel {
                        name: self.name(),
                        level: i64::from(level),
                        min: -7,
                        max: 22,
                    })
                }
            }
        }
    }

    /// Compress `decoded_value`.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if the level is invalid or compression fails.
    pub fn encode(&self, decoded_value: Vec<u8>) -> Result<Vec<u8>, CodecError> {
        self.validate()?;
        match *self {
            Self::None => Ok(decoded_value),
            #[cfg(feature = "gzip")]
            Self::Gzip { level } => {
                let mut encoder = GzEncoder::new(
                    Cursor::new(decoded_value),
                    flate2::Compression::new(level),
                );
                let mut out: Vec<u8> = Vec::new();
                encoder.read_to_end(&mut out)?;
                Ok(out)
            }
            #[cfg(feature = "zstd")]
            Self::Zstd { level } => {
                zstd::encode_all(decoded_value.as_slice(), level).map_err(CodecError::IOError)
            }
        }
    }

    /// Decompress `encoded_value`.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if decompression fails.
    pub fn decode(&self, encoded_value: Vec<u8>) -> Result<Vec<u8>, CodecError> {
        match *self {
            Self::None => Ok(encoded_value),
            #[cfg(feature = "gzip")]
            Self::Gzip { .. } => {
                let mut decoder = GzDecoder::new(Cursor::new(encoded_value));
                let mut out: Vec<u8> = Vec::new();
                decoder.read_to_end(&mut out)?;
                Ok(out)
            }
            #[cfg(feature = "zstd")]
            Self::Zstd { .. } => {
                zstd::decode_all(encoded_value.as_slice()).map_err(CodecError::IOError)
            }
        }
    }
}
