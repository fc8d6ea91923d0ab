use thiserror::Error;

use crate::{
    data_chunk_iterator::DataChunkError,
    data_type::DataType,
    selection::{IncompatibleArrayShapeError, IncompatibleDimensionalityError, Selection},
    storage::{StorageError, StoreKey},
    ArrayShape,
};

use super::CodecError;

/// A dataset creation error.
#[derive(Debug, Error)]
pub enum DatasetCreateError {
    /// An invalid node path.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Invalid compression.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// An invalid shape or chunk shape.
    #[error("invalid shape {shape:?} with chunk shape {chunk_shape:?}")]
    InvalidChunkShape {
        /// The dataset shape.
        shape: ArrayShape,
        /// The chunk shape.
        chunk_shape: ArrayShape,
    },
    /// Missing metadata.
    #[error("no dataset metadata at {0}")]
    MissingMetadata(StoreKey),
    /// Metadata that cannot be parsed.
    #[error("invalid dataset metadata: {0}")]
    InvalidMetadata(#[from] serde_json::Error),
    /// Metadata describing an unsupported dataset.
    #[error("unsupported dataset metadata: {0}")]
    UnsupportedMetadata(String),
}

/// A dataset read or write error.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// A storage error.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// A compression error.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// A data chunk iterator error.
    #[error(transparent)]
    DataChunk(#[from] DataChunkError),
    /// Metadata could not be serialised.
    #[error(transparent)]
    InvalidMetadata(#[from] serde_json::Error),
    /// The element type does not match the dataset.
    #[error("incompatible element type {got}, expected {expected}")]
    IncompatibleElementType {
        /// The dataset data type.
        expected: DataType,
        /// The requested data type.
        got: DataType,
    },
    /// The data shape does not match the selection.
    #[error("data with shape {shape:?} does not match selection {selection}")]
    IncompatibleDataShape {
        /// The data shape.
        shape: ArrayShape,
        /// The selection.
        selection: Selection,
    },
    /// The selection is outside the dataset.
    #[error("selection {selection} is out of bounds of the dataset with shape {shape:?}")]
    OutOfBounds {
        /// The selection.
        selection: Selection,
        /// The dataset shape.
        shape: ArrayShape,
    },
    /// An iterator whose array differs from the dataset.
    #[error("iterator over {maxshape:?} {data_type} does not match the dataset {shape:?} {expected_data_type}")]
    IncompatibleIterator {
        /// The iterator maxshape.
        maxshape: ArrayShape,
        /// The iterator data type.
        data_type: DataType,
        /// The dataset shape.
        shape: ArrayShape,
        /// The dataset data type.
        expected_data_type: DataType,
    },
    /// A stored chunk with an unexpected size.
    #[error("chunk {key} has {got} bytes, expected {expected}")]
    InvalidChunkSize {
        /// The chunk key.
        key: StoreKey,
        /// The decoded size.
        got: usize,
        /// The expected size.
        expected: usize,
    },
    /// Incompatible dimensionality.
    #[error(transparent)]
    IncompatibleDimensionality(#[from] IncompatibleDimensionalityError),
    /// An incompatible array shape.
    #[error(transparent)]
    IncompatibleArrayShape(#[from] IncompatibleArrayShapeError),
}
