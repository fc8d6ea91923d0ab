//! Primitive element types.
//!
//! A [`DataType`] is the runtime description of an element type, as declared by a source and recorded in dataset metadata.
//! The [`Element`] trait binds a Rust scalar to its [`DataType`].

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A data type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[rustfmt::skip]
pub enum DataType {
    /// `int8` Integer in `[-2^7, 2^7-1]`.
    #[display("int8")]
    Int8,
    /// `int16` Integer in `[-2^15, 2^15-1]`.
    #[display("int16")]
    Int16,
    /// `int32` Integer in `[-2^31, 2^31-1]`.
    #[display("int32")]
    Int32,
    /// `int64` Integer in `[-2^63, 2^63-1]`.
    #[display("int64")]
    Int64,
    /// `uint8` Integer in `[0, 2^8-1]`.
    #[display("uint8")]
    UInt8,
    /// `uint16` Integer in `[0, 2^16-1]`.
    #[display("uint16")]
    UInt16,
    /// `uint32` Integer in `[0, 2^32-1]`.
    #[display("uint32")]
    UInt32,
    /// `uint64` Integer in `[0, 2^64-1]`.
    #[display("uint64")]
    UInt64,
    /// `float32` IEEE 754 single-precision floating point.
    #[display("float32")]
    Float32,
    /// `float64` IEEE 754 double-precision floating point.
    #[display("float64")]
    Float64,
}

/// An unsupported data type error.
#[derive(Debug, Error, From)]
#[error("unsupported data type {0}")]
pub struct UnsupportedDataTypeError(String);

impl DataType {
    /// Returns the identifier of the data type, e.g. `uint16`.
    #[must_use]
    pub const fn identifier(&self) -> &'static str {
        match self {
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        }
    }

    /// Returns the size in bytes of one element.
    #[must_use]
    pub const fn size(&self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 => 8,
        }
    }

    /// Returns true if the data type is a signed or unsigned integer.
    #[must_use]
    pub const fn is_integer(&self) -> bool {
        !matches!(self, Self::Float32 | Self::Float64)
    }

    /// Returns true if the data type is an unsigned integer.
    #[must_use]
    pub const fn is_unsigned(&self) -> bool {
        matches!(
            self,
            Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64
        )
    }
}

impl std::str::FromStr for DataType {
    type Err = UnsupportedDataTypeError;

    fn from_str(identifier: &str) -> Result<Self, Self::Err> {
        match identifier {
            "int8" => Ok(Self::Int8),
            "int16" => Ok(Self::Int16),
            "int32" => Ok(Self::Int32),
            "int64" => Ok(Self::Int64),
            "uint8" => Ok(Self::UInt8),
            "uint16" => Ok(Self::UInt16),
            "uint32" => Ok(Self::UInt32),
            "uint64" => Ok(Self::UInt64),
            "float32" => Ok(Self::Float32),
            "float64" => Ok(Self::Float64),
            _ => Err(UnsupportedDataTypeError(identifier.to_string())),
        }
    }
}

/// A scalar element type that can be streamed through a [`DataChunkIterator`](crate::data_chunk_iterator::DataChunkIterator).
///
/// Elements are plain old data, so they can be viewed as bytes when stored.
pub trait Element:
    bytemuck::Pod + num::NumCast + Default + PartialEq + Send + Sync + std::fmt::Debug
{
    /// The data type of the element.
    const DATA_TYPE: DataType;
}

macro_rules! impl_element {
    ($t:ty, $data_type:expr) => {
        impl Element for $t {
            const DATA_TYPE: DataType = $data_type;
        }
    };
}

impl_element!(i8, DataType::Int8);
impl_element!(i16, DataType::Int16);
impl_element!(i32, DataType::Int32);
impl_element!(i64, DataType::Int64);
impl_element!(u8, DataType::UInt8);
impl_element!(u16, DataType::UInt16);
impl_element!(u32, DataType::UInt32);
impl_element!(u64, DataType::UInt64);
impl_element!(f32, DataType::Float32);
impl_element!(f64, DataType::Float64);

/// Convert `bytes` holding elements of `data_type` between little-endian and native byte order, in place.
pub(crate) fn little_endian_to_native(bytes: &mut [u8], data_type: DataType) {
    if cfg!(target_endian = "big") {
        reverse_endianness(bytes, data_type);
    }
}

/// Reverse the byte order of each element of `data_type` in `bytes`.
pub(crate) fn reverse_endianness(bytes: &mut [u8], data_type: DataType) {
    let size = data_type.size();
    if size > 1 {
        bytes.chunks_exact_mut(size).for_each(<[u8]>::reverse);
    }
}
