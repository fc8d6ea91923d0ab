//! Default chunk and buffer shapes.
//!
//! A chunk is the unit of compressed storage and a buffer is the unit of one iteration step.
//! When a caller does not supply them explicitly, they are estimated from the array shape, the element size and a memory budget:
//!  - [`estimate_chunk_shape`] keeps the chunk under `chunk_mb` megabytes (1e6 bytes) while following the aspect ratio of the array, and
//!  - [`estimate_buffer_shape`] grows the chunk shape into a buffer under `buffer_gb` gigabytes (1e9 bytes), filling whole axes where possible.
//!
//! Both estimators are deterministic.

mod buffer_shape;
mod chunk_shape;

pub use buffer_shape::estimate_buffer_shape;
pub use chunk_shape::estimate_chunk_shape;

use thiserror::Error;

use crate::{selection::IncompatibleDimensionalityError, ArrayShape};

/// A shape estimation error.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ShapeEstimationError {
    /// A memory budget is zero, negative or not finite.
    #[error("{name} ({value}) must be greater than zero")]
    InvalidBudget {
        /// The name of the budget, e.g. `chunk_mb`.
        name: &'static str,
        /// The value of the budget.
        value: f64,
    },
    /// A shape has no dimensions or a zero dimension.
    #[error("{name} {shape:?} must have at least one dimension and no dimensions equal to zero")]
    InvalidShape {
        /// The name of the shape, e.g. `maxshape`.
        name: &'static str,
        /// The shape.
        shape: ArrayShape,
    },
    /// The chunk shape is not compatible with the array shape.
    #[error(transparent)]
    IncompatibleDimensionality(#[from] IncompatibleDimensionalityError),
    /// The chunk shape exceeds the array shape.
    #[error("some dimensions of chunk_shape {chunk_shape:?} exceed the data dimensions {maxshape:?}")]
    ChunkExceedsMaxshape {
        /// The chunk shape.
        chunk_shape: ArrayShape,
        /// The array shape.
        maxshape: ArrayShape,
    },
    /// The buffer budget cannot hold a single chunk.
    #[error("buffer_gb ({buffer_gb}) is less than the chunk size ({chunk_bytes} bytes)")]
    BufferSmallerThanChunk {
        /// The buffer budget in gigabytes.
        buffer_gb: f64,
        /// The size of one chunk in bytes.
        chunk_bytes: u64,
    },
}

fn validate_budget(name: &'static str, value: f64) -> Result<(), ShapeEstimationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ShapeEstimationError::InvalidBudget { name, value })
    }
}

fn validate_shape(name: &'static str, shape: &[u64]) -> Result<(), ShapeEstimationError> {
    if shape.is_empty() || shape.contains(&0) {
        Err(ShapeEstimationError::InvalidShape {
            name,
            shape: shape.to_vec(),
        })
    } else {
        Ok(())
    }
}

/// Return the size in bytes of an array with `shape` and `element_size`, as a float.
#[allow(clippy::cast_precision_loss)]
fn shape_bytes(shape: &[u64], element_size: usize) -> f64 {
    shape.iter().map(|&size| size as f64).product::<f64>() * element_size as f64
}
