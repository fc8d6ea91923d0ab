use crate::{data_type::DataType, selection::IncompatibleDimensionalityError, ArrayShape};

use super::{shape_bytes, validate_budget, validate_shape, ShapeEstimationError};

/// Estimate a buffer shape for an array with `maxshape`, `data_type` and `chunk_shape` that fits within `buffer_gb` gigabytes.
///
/// Every axis of the returned buffer shape is either the full extent of `maxshape` or a whole multiple of `chunk_shape`.
///
/// The estimate is chosen as follows:
///  1. If the whole array fits within the budget, the buffer is `maxshape`.
///  2. If even the smallest axis of the array does not fit within the budget at its full extent, the two axes with the smallest chunk extents are scaled jointly by `floor(sqrt(budget / chunk size))`.
///  3. Otherwise two candidates are formed:
///     - *padded*: the axis spanned by the fewest chunks is filled completely, then the remaining axes are filled completely in order while the buffer fits,
///       and the first axis that does not fit is extended by as many whole chunks as fit.
///     - *unpadded*: every axis of the chunk shape is scaled by the same integer factor `floor((budget / chunk size)^(1 / ndim))`, clamped to `maxshape`.
///
///     The larger candidate is returned. The padded candidate is preferred if both are the same size.
///
/// # Errors
/// Returns a [`ShapeEstimationError`] if
///  - `buffer_gb` is not positive,
///  - `maxshape` or `chunk_shape` are empty or have a zero dimension,
///  - the dimensionality of `chunk_shape` and `maxshape` differ,
///  - `chunk_shape` exceeds `maxshape` on some axis, or
///  - a single chunk does not fit within `buffer_gb`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn estimate_buffer_shape(
    maxshape: &[u64],
    data_type: DataType,
    chunk_shape: &[u64],
    buffer_gb: f64,
) -> Result<ArrayShape, ShapeEstimationError> {
    validate_budget("buffer_gb", buffer_gb)?;
    validate_shape("maxshape", maxshape)?;
    validate_shape("chunk_shape", chunk_shape)?;
    if chunk_shape.len() != maxshape.len() {
        return Err(IncompatibleDimensionalityError::new(chunk_shape.len(), maxshape.len()).into());
    }
    if std::iter::zip(chunk_shape, maxshape).any(|(chunk, extent)| chunk > extent) {
        return Err(ShapeEstimationError::ChunkExceedsMaxshape {
            chunk_shape: chunk_shape.to_vec(),
            maxshape: maxshape.to_vec(),
        });
    }

    let element_size = data_type.size();
    let target_bytes = buffer_gb * 1e9;
    let chunk_bytes = shape_bytes(chunk_shape, element_size);
    if chunk_bytes > target_bytes {
        return Err(ShapeEstimationError::BufferSmallerThanChunk {
            buffer_gb,
            chunk_bytes: chunk_bytes as u64,
        });
    }

    if shape_bytes(maxshape, element_size) <= target_bytes {
        return Ok(maxshape.to_vec());
    }

    let smallest_extent = maxshape.iter().copied().min().unwrap_or(1);
    if (smallest_extent * element_size as u64) as f64 > target_bytes {
        return Ok(sub_square_buffer_shape(
            maxshape,
            chunk_shape,
            target_bytes / chunk_bytes,
        ));
    }

    let padded = padded_buffer_shape(maxshape, chunk_shape, chunk_bytes, target_bytes);
    let unpadded = unpadded_buffer_shape(maxshape, chunk_shape, chunk_bytes, target_bytes);
    log::trace!("buffer shape candidates: padded {padded:?}, unpadded {unpadded:?}");
    if shape_bytes(&padded, element_size) >= shape_bytes(&unpadded, element_size) {
        Ok(padded)
    } else {
        Ok(unpadded)
    }
}

/// Scale the two axes with the smallest chunk extents by the square root of `chunks_per_buffer`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn sub_square_buffer_shape(
    maxshape: &[u64],
    chunk_shape: &[u64],
    chunks_per_buffer: f64,
) -> ArrayShape {
    let mut buffer_shape = chunk_shape.to_vec();
    let mut axes: Vec<usize> = (0..chunk_shape.len()).collect();
    axes.sort_by_key(|&axis| chunk_shape[axis]);
    let k = if axes.len() == 1 {
        chunks_per_buffer.floor() as u64
    } else {
        let mut k = chunks_per_buffer.sqrt().floor() as u64;
        while k > 1 && (k * k) as f64 > chunks_per_buffer {
            k -= 1;
        }
        k
    };
    for &axis in axes.iter().take(2) {
        buffer_shape[axis] = std::cmp::min(
            buffer_shape[axis].saturating_mul(k.max(1)),
            maxshape[axis],
        );
    }
    buffer_shape
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn padded_buffer_shape(
    maxshape: &[u64],
    chunk_shape: &[u64],
    chunk_bytes: f64,
    target_bytes: f64,
) -> ArrayShape {
    let mut buffer_shape = chunk_shape.to_vec();
    let chunks_per_axis: Vec<u64> = std::iter::zip(maxshape, chunk_shape)
        .map(|(extent, chunk)| extent.div_ceil(*chunk))
        .collect();

    // fill the axis with the fewest chunks first
    let mut filled = vec![false; maxshape.len()];
    let mut buffer_bytes = chunk_bytes;
    let (fewest_axis, fewest_chunks) = chunks_per_axis
        .iter()
        .copied()
        .enumerate()
        .min_by_key(|&(axis, chunks)| (chunks, axis))
        .unwrap_or((0, 1));
    if chunk_bytes * fewest_chunks as f64 <= target_bytes {
        buffer_bytes = chunk_bytes * fewest_chunks as f64;
        buffer_shape[fewest_axis] = maxshape[fewest_axis];
        filled[fewest_axis] = true;
    }

    for (axis, &chunks_on_axis) in chunks_per_axis.iter().enumerate() {
        if filled[axis] {
            continue;
        }
        if chunks_on_axis as f64 * buffer_bytes <= target_bytes {
            buffer_bytes *= chunks_on_axis as f64;
            buffer_shape[axis] = maxshape[axis];
        } else {
            let k = (target_bytes / buffer_bytes).floor().max(1.0) as u64;
            buffer_shape[axis] =
                std::cmp::min(buffer_shape[axis].saturating_mul(k), maxshape[axis]);
            break;
        }
    }
    buffer_shape
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]
fn unpadded_buffer_shape(
    maxshape: &[u64],
    chunk_shape: &[u64],
    chunk_bytes: f64,
    target_bytes: f64,
) -> ArrayShape {
    let num_axes = maxshape.len() as i32;
    let chunks_per_buffer = target_bytes / chunk_bytes;
    let mut k = chunks_per_buffer
        .powf(1.0 / f64::from(num_axes))
        .floor()
        .max(1.0);
    while k > 1.0 && k.powi(num_axes) > chunks_per_buffer {
        k -= 1.0;
    }
    let k = k as u64;
    std::iter::zip(maxshape, chunk_shape)
        .map(|(&extent, &chunk)| chunk.saturating_mul(k).clamp(chunk, extent))
        .collect()
}
