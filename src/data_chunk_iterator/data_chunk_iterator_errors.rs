use thiserror::Error;

use crate::{
    data_type::DataType,
    selection::{IncompatibleArrayShapeError, Selection},
    shape_estimation::ShapeEstimationError,
    ArrayShape,
};

/// A [`DataChunkIterator`](super::DataChunkIterator) create error.
///
/// These are configuration errors, raised before any data is read.
#[derive(Debug, Error)]
pub enum DataChunkIteratorCreateError {
    /// A chunk or buffer shape could not be estimated.
    #[error(transparent)]
    ShapeEstimation(#[from] ShapeEstimationError),
    /// The source reported an empty shape or a shape with a zero dimension.
    #[error("maxshape {0:?} must have at least one dimension and no dimensions equal to zero")]
    InvalidMaxshape(ArrayShape),
    /// The data type declared by the source differs from the type of its elements.
    #[error("source declares data type {declared} but produces elements of data type {element}")]
    DataTypeMismatch {
        /// The declared data type.
        declared: DataType,
        /// The data type of the source elements.
        element: DataType,
    },
    /// An explicit shape has the wrong dimensionality.
    #[error("{name} {shape:?} does not have the dimensionality of the data dimensions {maxshape:?}")]
    IncompatibleDimensionality {
        /// The name of the shape.
        name: &'static str,
        /// The shape.
        shape: ArrayShape,
        /// The shape of the source.
        maxshape: ArrayShape,
    },
    /// An explicit shape has a zero dimension.
    #[error("some dimensions of {name} {shape:?} are less than or equal to zero")]
    NonPositiveShape {
        /// The name of the shape.
        name: &'static str,
        /// The shape.
        shape: ArrayShape,
    },
    /// An explicit shape exceeds the shape of the source.
    #[error("some dimensions of {name} {shape:?} exceed the data dimensions {maxshape:?}")]
    ExceedsMaxshape {
        /// The name of the shape.
        name: &'static str,
        /// The shape.
        shape: ArrayShape,
        /// The shape of the source.
        maxshape: ArrayShape,
    },
    /// The chunk shape exceeds the buffer shape.
    #[error("some dimensions of chunk_shape {chunk_shape:?} exceed the buffer shape {buffer_shape:?}")]
    ChunkExceedsBuffer {
        /// The chunk shape.
        chunk_shape: ArrayShape,
        /// The buffer shape.
        buffer_shape: ArrayShape,
    },
    /// The chunk shape does not evenly divide the buffer shape on an axis that is not fully spanned by the buffer.
    #[error("some dimensions of chunk_shape {chunk_shape:?} do not evenly divide the buffer shape {buffer_shape:?}")]
    ChunkDoesNotDivideBuffer {
        /// The chunk shape.
        chunk_shape: ArrayShape,
        /// The buffer shape.
        buffer_shape: ArrayShape,
    },
    /// The source is misconfigured.
    #[error("invalid source configuration: {0}")]
    InvalidSource(String),
    /// The source failed while preparing for iteration.
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// A source read error.
#[derive(Debug, Error)]
pub enum SourceError {
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// A stream ended before the requested frame.
    #[error("end of stream reached before frame {0}")]
    EndOfStream(u64),
    /// A frame could not be decoded.
    #[error("unable to read frame {frame}: {reason}")]
    UnreadableFrame {
        /// The frame index.
        frame: u64,
        /// The reason reported by the reader.
        reason: String,
    },
    /// The requested region is outside of the source.
    #[error("selection {selection} is out of bounds of the source with shape {shape:?}")]
    OutOfBounds {
        /// The requested region.
        selection: Selection,
        /// The shape of the source.
        shape: ArrayShape,
    },
    /// A value cannot be represented in the output data type.
    #[error("value {value} is not representable as {data_type}")]
    NotRepresentable {
        /// The value.
        value: f64,
        /// The output data type.
        data_type: DataType,
    },
    /// The reader has been released.
    #[error("the source reader has been released")]
    Released,
    /// A reader returned an array incompatible with a selection.
    #[error(transparent)]
    IncompatibleArrayShape(#[from] IncompatibleArrayShapeError),
    /// Any other error.
    #[error("{0}")]
    Other(String),
}

/// An error producing a [`DataChunk`](super::DataChunk).
#[derive(Debug, Error)]
pub enum DataChunkError {
    /// The source failed to read a selection.
    #[error("failed to read selection {selection} from the source: {source}")]
    SourceRead {
        /// The selection being read.
        selection: Selection,
        /// The source error.
        #[source]
        source: SourceError,
    },
    /// The source returned data with a shape different to the selection.
    #[error("source returned data with shape {got:?} for selection {selection}, expected {expected:?}")]
    ShapeMismatch {
        /// The selection being read.
        selection: Selection,
        /// The shape of the selection.
        expected: ArrayShape,
        /// The shape of the returned data.
        got: ArrayShape,
    },
}

impl DataChunkError {
    /// Return the selection that failed.
    #[must_use]
    pub fn selection(&self) -> &Selection {
        match self {
            Self::SourceRead { selection, .. } | Self::ShapeMismatch { selection, .. } => {
                selection
            }
        }
    }
}
