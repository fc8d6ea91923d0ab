use crate::{data_type::DataType, ArrayShape};

use super::{shape_bytes, validate_budget, validate_shape, ShapeEstimationError};

/// Estimate a chunk shape for an array with `maxshape` and `data_type` that fits within `chunk_mb` megabytes.
///
/// If the whole array fits within the budget, the chunk shape is `maxshape`.
/// Otherwise the chunk follows the aspect ratio of the array: each axis is proportional to its extent relative to the smallest axis,
/// with the ratios collapsed towards one until a single unit of the ratio fits the budget, then scaled by the largest integer factor that keeps the chunk within budget.
/// Every axis is at least one and at most its extent in `maxshape`.
///
/// The chunk only exceeds the budget if a single element does.
///
/// # Errors
/// Returns a [`ShapeEstimationError`] if `chunk_mb` is not positive or `maxshape` is empty or has a zero dimension.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap
)]
pub fn estimate_chunk_shape(
    maxshape: &[u64],
    data_type: DataType,
    chunk_mb: f64,
) -> Result<ArrayShape, ShapeEstimationError> {
    validate_budget("chunk_mb", chunk_mb)?;
    validate_shape("maxshape", maxshape)?;

    let element_size = data_type.size();
    let chunk_bytes = chunk_mb * 1e6;
    if shape_bytes(maxshape, element_size) <= chunk_bytes {
        return Ok(maxshape.to_vec());
    }

    let min_extent = maxshape.iter().copied().min().unwrap_or(1);
    let mut ratio: ArrayShape = maxshape.iter().map(|extent| extent / min_extent).collect();
    let mut ratio_bytes = shape_bytes(&ratio, element_size);
    while ratio_bytes > chunk_bytes && ratio.iter().any(|&r| r != 1) {
        let smallest = ratio
            .iter()
            .filter(|&&r| r != 1)
            .min()
            .copied()
            .unwrap_or(1);
        for r in ratio.iter_mut().filter(|r| **r != 1) {
            *r /= smallest;
        }
        ratio_bytes = shape_bytes(&ratio, element_size);
    }

    let num_axes = maxshape.len() as i32;
    let fits = |k: f64| k.powi(num_axes) * ratio_bytes <= chunk_bytes;
    let mut k = (chunk_bytes / ratio_bytes)
        .powf(1.0 / f64::from(num_axes))
        .floor()
        .max(1.0);
    // correct for rounding in the root
    while k > 1.0 && !fits(k) {
        k -= 1.0;
    }
    while fits(k + 1.0) {
        k += 1.0;
    }
    let k = k as u64;

    Ok(std::iter::zip(&ratio, maxshape)
        .map(|(&r, &extent)| std::cmp::min(k.saturating_mul(r), extent))
        .collect())
}
