//! Selections.
//!
//! A [`Selection`] identifies a hyperrectangular region of an array: one half-open range per axis with unit step.
//! Selections are what a [`DataChunkIterator`](crate::data_chunk_iterator::DataChunkIterator) yields alongside each buffer of data,
//! and what a [`ChunkedDataset`](crate::dataset::ChunkedDataset) writes to.
//!
//! This module also provides the iterators used to tile an array:
//!  - [`IndicesIterator`]: the indices of every element in a selection, last axis fastest,
//!  - [`ChunksIterator`]: the regular chunks overlapping a selection, and
//!  - [`BufferTilesIterator`]: the selections that partition an array into buffers.

mod selection_iterators;

pub use selection_iterators::{BufferTilesIterator, ChunksIterator, IndicesIterator};

use std::ops::Range;

use derive_more::From;
use itertools::izip;
use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, SliceInfoElem};
use thiserror::Error;

use crate::{ArrayIndices, ArrayShape};

/// A selection of an array.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct Selection {
    /// The start of the selection.
    start: ArrayIndices,
    /// The shape of the selection.
    shape: ArrayShape,
}

impl std::fmt::Display for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for (i, (start, size)) in std::iter::zip(&self.start, &self.shape).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}..{}", start, start + size)?;
        }
        write!(f, ")")
    }
}

impl Selection {
    /// Create a new selection with `shape` starting at the origin.
    #[must_use]
    pub fn new_with_shape(shape: ArrayShape) -> Self {
        Self {
            start: vec![0; shape.len()],
            shape,
        }
    }

    /// Create a new selection.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if the length of `start` and `shape` do not match.
    pub fn new_with_start_shape(
        start: ArrayIndices,
        shape: ArrayShape,
    ) -> Result<Self, IncompatibleDimensionalityError> {
        if start.len() == shape.len() {
            Ok(Self { start, shape })
        } else {
            Err(IncompatibleDimensionalityError::new(
                start.len(),
                shape.len(),
            ))
        }
    }

    /// Create a new selection from a start and end (exclusive).
    ///
    /// An axis where `end` precedes `start` is empty.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if the length of `start` and `end` do not match.
    pub fn new_with_start_end_exc(
        start: ArrayIndices,
        end: &[u64],
    ) -> Result<Self, IncompatibleDimensionalityError> {
        if start.len() == end.len() {
            let shape = std::iter::zip(&start, end)
                .map(|(&start, &end)| end.saturating_sub(start))
                .collect();
            Ok(Self { start, shape })
        } else {
            Err(IncompatibleDimensionalityError::new(end.len(), start.len()))
        }
    }

    /// Create a new selection from per-axis ranges.
    #[must_use]
    pub fn new_with_ranges(ranges: &[Range<u64>]) -> Self {
        let start = ranges.iter().map(|range| range.start).collect();
        let shape = ranges
            .iter()
            .map(|range| range.end.saturating_sub(range.start))
            .collect();
        Self { start, shape }
    }

    /// Return the start of the selection.
    #[must_use]
    pub fn start(&self) -> &[u64] {
        &self.start
    }

    /// Return the shape of the selection.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// Return the shape of the selection as `usize`s, as used by [`ndarray`].
    #[must_use]
    pub fn shape_usize(&self) -> Vec<usize> {
        self.shape
            .iter()
            .map(|&size| usize::try_from(size).unwrap_or(usize::MAX))
            .collect()
    }

    /// Return the dimensionality of the selection.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.start.len()
    }

    /// Return the end (exclusive) of the selection.
    #[must_use]
    pub fn end_exc(&self) -> ArrayIndices {
        std::iter::zip(&self.start, &self.shape)
            .map(|(start, size)| start + size)
            .collect()
    }

    /// Return the per-axis ranges of the selection.
    #[must_use]
    pub fn to_ranges(&self) -> Vec<Range<u64>> {
        std::iter::zip(&self.start, &self.shape)
            .map(|(&start, &size)| start..start + size)
            .collect()
    }

    /// Return the number of elements of the selection.
    ///
    /// Equal to the product of the components of its shape.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    /// Returns true if the selection contains no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shape.iter().any(|&size| size == 0)
    }

    /// Bound the selection to the domain within `end` (exclusive).
    ///
    /// # Errors
    /// Returns an error if `end` does not match the selection dimensionality.
    pub fn bound(&self, end: &[u64]) -> Result<Self, IncompatibleDimensionalityError> {
        if end.len() != self.dimensionality() {
            return Err(IncompatibleDimensionalityError::new(
                end.len(),
                self.dimensionality(),
            ));
        }
        let start: ArrayIndices = std::iter::zip(self.start(), end)
            .map(|(&a, &b)| std::cmp::min(a, b))
            .collect();
        let end: ArrayIndices = std::iter::zip(self.end_exc(), end)
            .map(|(a, &b)| std::cmp::min(a, b))
            .collect();
        Self::new_with_start_end_exc(start, &end)
    }

    /// Return the intersection of this selection and `other`, which may be empty.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if the dimensionality of `other` does not match.
    pub fn intersect(&self, other: &Self) -> Result<Self, IncompatibleDimensionalityError> {
        if other.dimensionality() != self.dimensionality() {
            return Err(IncompatibleDimensionalityError::new(
                other.dimensionality(),
                self.dimensionality(),
            ));
        }
        let start: ArrayIndices = std::iter::zip(&self.start, &other.start)
            .map(|(&a, &b)| std::cmp::max(a, b))
            .collect();
        let end: ArrayIndices = std::iter::zip(self.end_exc(), other.end_exc())
            .map(|(a, b)| std::cmp::min(a, b))
            .collect();
        Self::new_with_start_end_exc(start, &end)
    }

    /// Return the part of this selection inside `other`, relative to the start of `other`.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if the dimensionality of `other` does not match.
    pub fn relative_to(&self, other: &Self) -> Result<Self, IncompatibleDimensionalityError> {
        if other.dimensionality() != self.dimensionality() {
            return Err(IncompatibleDimensionalityError::new(
                other.dimensionality(),
                self.dimensionality(),
            ));
        }
        let mut starts = Vec::with_capacity(self.start.len());
        let mut shapes = Vec::with_capacity(self.start.len());
        for (start, size, other_start, other_size) in
            izip!(&self.start, &self.shape, &other.start, &other.shape)
        {
            let output_start = std::cmp::min(start.saturating_sub(*other_start), *other_size);
            let output_end =
                std::cmp::min((start + size).saturating_sub(*other_start), *other_size);
            starts.push(output_start);
            shapes.push(output_end.saturating_sub(output_start));
        }
        Ok(Self {
            start: starts,
            shape: shapes,
        })
    }

    /// Returns true if the selection is within the bounds of `array_shape`.
    #[must_use]
    pub fn inbounds(&self, array_shape: &[u64]) -> bool {
        self.dimensionality() == array_shape.len()
            && izip!(self.start(), self.shape(), array_shape)
                .all(|(start, size, shape)| start + size <= *shape)
    }

    /// Returns true if this selection lies entirely within `other`.
    #[must_use]
    pub fn is_within(&self, other: &Self) -> bool {
        self.dimensionality() == other.dimensionality()
            && izip!(self.start(), self.end_exc(), other.start(), other.end_exc())
                .all(|(start, end, lower, upper)| start >= lower && end <= upper)
    }

    /// Returns an iterator over the indices of elements within the selection.
    #[must_use]
    pub fn iter_indices(&self) -> IndicesIterator {
        IndicesIterator::new(self.clone())
    }

    /// Returns an iterator over chunks with shape `chunk_shape` overlapping the selection.
    ///
    /// All chunks overlapping the selection are returned, and they all have the same shape `chunk_shape`.
    /// Thus, the chunks may extend out over the selection.
    ///
    /// # Errors
    /// Returns an error if `chunk_shape` does not match the selection dimensionality or has a zero dimension.
    pub fn iter_chunks(
        &self,
        chunk_shape: &[u64],
    ) -> Result<ChunksIterator, IncompatibleDimensionalityError> {
        ChunksIterator::new(self, chunk_shape)
    }

    /// Return the [`ndarray`] slice arguments selecting this region.
    #[must_use]
    pub fn to_slice_info(&self) -> Vec<SliceInfoElem> {
        std::iter::zip(&self.start, &self.shape)
            .map(|(&start, &size)| {
                let start = isize::try_from(start).unwrap_or(isize::MAX);
                let end = isize::try_from(size)
                    .ok()
                    .and_then(|size| start.checked_add(size));
                SliceInfoElem::Slice {
                    start,
                    end,
                    step: 1,
                }
            })
            .collect()
    }

    /// Return a view of the region of `array` identified by this selection.
    ///
    /// # Errors
    /// Returns [`IncompatibleArrayShapeError`] if the selection is not within the bounds of `array`.
    pub fn view<'a, T>(
        &self,
        array: &ArrayViewD<'a, T>,
    ) -> Result<ArrayViewD<'a, T>, IncompatibleArrayShapeError> {
        let array_shape = shape_to_u64(array.shape());
        if self.inbounds(&array_shape) {
            Ok(array.clone().slice_move(self.to_slice_info().as_slice()))
        } else {
            Err(IncompatibleArrayShapeError(array_shape, self.clone()))
        }
    }

    /// Return a mutable view of the region of `array` identified by this selection.
    ///
    /// # Errors
    /// Returns [`IncompatibleArrayShapeError`] if the selection is not within the bounds of `array`.
    pub fn view_mut<'a, T>(
        &self,
        array: ArrayViewMutD<'a, T>,
    ) -> Result<ArrayViewMutD<'a, T>, IncompatibleArrayShapeError> {
        let array_shape = shape_to_u64(array.shape());
        if self.inbounds(&array_shape) {
            Ok(array.slice_move(self.to_slice_info().as_slice()))
        } else {
            Err(IncompatibleArrayShapeError(array_shape, self.clone()))
        }
    }

    /// Return an owned copy of the region of `array` identified by this selection, in standard layout.
    ///
    /// # Errors
    /// Returns [`IncompatibleArrayShapeError`] if the selection is not within the bounds of `array`.
    pub fn extract_ndarray<T: Clone>(
        &self,
        array: &ArrayViewD<T>,
    ) -> Result<ArrayD<T>, IncompatibleArrayShapeError> {
        Ok(self.view(array)?.as_standard_layout().into_owned())
    }
}

/// Convert an [`ndarray`] shape to an [`ArrayShape`].
#[must_use]
pub fn shape_to_u64(shape: &[usize]) -> ArrayShape {
    shape.iter().map(|&size| size as u64).collect()
}

/// Unravel a linearised index to ND indices, last axis fastest.
#[must_use]
pub fn unravel_index(mut index: u64, shape: &[u64]) -> ArrayIndices {
    let mut indices = vec![0; shape.len()];
    for (indices_i, &dim) in std::iter::zip(indices.iter_mut().rev(), shape.iter().rev()) {
        *indices_i = index % dim;
        index /= dim;
    }
    indices
}

/// Ravel ND indices to a linearised index, last axis fastest.
#[must_use]
pub fn ravel_indices(indices: &[u64], shape: &[u64]) -> u64 {
    let mut index: u64 = 0;
    let mut count = 1;
    for (i, s) in std::iter::zip(indices, shape).rev() {
        index += i * count;
        count *= s;
    }
    index
}

/// An incompatible dimensionality error.
#[derive(Copy, Clone, Debug, Error, PartialEq, Eq)]
#[error("incompatible dimensionality {0}, expected {1}")]
pub struct IncompatibleDimensionalityError(usize, usize);

impl IncompatibleDimensionalityError {
    /// Create a new incompatible dimensionality error.
    #[must_use]
    pub const fn new(got: usize, expected: usize) -> Self {
        Self(got, expected)
    }
}

/// An incompatible array shape error.
#[derive(Clone, Debug, Error, From)]
#[error("incompatible array shape {0:?} with selection {1}")]
pub struct IncompatibleArrayShapeError(ArrayShape, Selection);

#[cfg(test)]
mod tests {
    use ndarray::Array;

    use super::*;

    #[test]
    fn selection_display() {
        let selection = Selection::new_with_ranges(&[0..5, 10..20]);
        assert_eq!(selection.to_string(), "(0..5, 10..20)");
        assert_eq!(selection.shape(), &[5, 10]);
        assert_eq!(selection.end_exc(), vec![5, 20]);
        assert_eq!(selection.to_ranges(), vec![0..5, 10..20]);
        assert_eq!(selection.num_elements(), 50);
    }

    #[test]
    fn selection_new() {
        assert!(Selection::new_with_start_shape(vec![0, 0], vec![5]).is_err());
        assert!(Selection::new_with_start_end_exc(vec![0, 0], &[5]).is_err());
        let selection = Selection::new_with_start_end_exc(vec![2, 3], &[4, 3]).unwrap();
        assert_eq!(selection.shape(), &[2, 0]);
        assert!(selection.is_empty());
    }

    #[test]
    fn selection_bound() {
        let selection = Selection::new_with_ranges(&[5..15, 0..10]);
        let bounded = selection.bound(&[12, 20]).unwrap();
        assert_eq!(bounded, Selection::new_with_ranges(&[5..12, 0..10]));
        assert!(selection.bound(&[12]).is_err());
    }

    #[test]
    fn selection_intersect_relative() {
        let a = Selection::new_with_ranges(&[0..10, 0..10]);
        let b = Selection::new_with_ranges(&[5..15, 2..4]);
        let overlap = a.intersect(&b).unwrap();
        assert_eq!(overlap, Selection::new_with_ranges(&[5..10, 2..4]));
        assert_eq!(
            overlap.relative_to(&b).unwrap(),
            Selection::new_with_ranges(&[0..5, 0..2])
        );
        assert_eq!(
            overlap.relative_to(&a).unwrap(),
            Selection::new_with_ranges(&[5..10, 2..4])
        );
        assert!(overlap.is_within(&a));
        assert!(!b.is_within(&a));
        let disjoint = Selection::new_with_ranges(&[20..30, 0..10]);
        assert!(a.intersect(&disjoint).unwrap().is_empty());
    }

    #[test]
    fn selection_inbounds() {
        let selection = Selection::new_with_ranges(&[0..5, 5..10]);
        assert!(selection.inbounds(&[5, 10]));
        assert!(!selection.inbounds(&[5, 9]));
        assert!(!selection.inbounds(&[5, 10, 1]));
    }

    #[test]
    fn selection_extract_ndarray() {
        let array = Array::from_iter(0..100u16)
            .into_shape_with_order((10, 10))
            .unwrap()
            .into_dyn();
        let selection = Selection::new_with_ranges(&[0..5, 0..5]);
        let block = selection.extract_ndarray(&array.view()).unwrap();
        assert_eq!(block.shape(), &[5, 5]);
        assert_eq!(
            block.iter().take(10).copied().collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4, 10, 11, 12, 13, 14]
        );
        let out_of_bounds = Selection::new_with_ranges(&[8..12, 0..5]);
        assert!(out_of_bounds.extract_ndarray(&array.view()).is_err());
    }

    #[test]
    fn selection_view_mut() {
        let mut array = ndarray::ArrayD::<u8>::zeros(vec![4, 4]);
        let selection = Selection::new_with_ranges(&[1..3, 2..4]);
        selection.view_mut(array.view_mut()).unwrap().fill(7);
        assert_eq!(array.iter().filter(|&&v| v == 7).count(), 4);
        assert_eq!(array[[1, 2]], 7);
        assert_eq!(array[[0, 2]], 0);
    }

    #[test]
    fn ravel_unravel() {
        let shape = [3, 4, 5];
        assert_eq!(unravel_index(0, &shape), vec![0, 0, 0]);
        assert_eq!(unravel_index(7, &shape), vec![0, 1, 2]);
        assert_eq!(ravel_indices(&[2, 3, 4], &shape), 59);
        for index in 0..60 {
            assert_eq!(ravel_indices(&unravel_index(index, &shape), &shape), index);
        }
    }
}
