use std::iter::FusedIterator;

use crate::{
    selection::{IncompatibleDimensionalityError, Selection},
    ArrayShape,
};

use super::ChunksIterator;

/// Iterates over the buffer-sized selections that partition an array.
///
/// Tiles are visited in row-major order over the buffer grid (the last axis varies fastest).
/// Tiles on the trailing edge of an axis are truncated to the array shape, so every element of the array is in exactly one tile.
///
/// For example, an array of shape `[10, 7]` tiled by buffers of shape `[5, 5]` yields
/// `(0..5, 0..5)`, `(0..5, 5..7)`, `(5..10, 0..5)`, `(5..10, 5..7)`.
pub struct BufferTilesIterator {
    inner: ChunksIterator,
    array_shape: ArrayShape,
}

impl BufferTilesIterator {
    /// Create a new buffer tiles iterator.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if `buffer_shape` does not match the dimensionality of `array_shape` or has a zero dimension.
    pub fn new(
        array_shape: &[u64],
        buffer_shape: &[u64],
    ) -> Result<Self, IncompatibleDimensionalityError> {
        let array = Selection::new_with_shape(array_shape.to_vec());
        Ok(Self {
            inner: ChunksIterator::new(&array, buffer_shape)?,
            array_shape: array_shape.to_vec(),
        })
    }
}

impl Iterator for BufferTilesIterator {
    type Item = Selection;

    fn next(&mut self) -> Option<Self::Item> {
        let (_, tile) = self.inner.next()?;
        // dimensionality is checked on construction
        tile.bound(&self.array_shape).ok()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for BufferTilesIterator {}

impl FusedIterator for BufferTilesIterator {}
