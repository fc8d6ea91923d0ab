use std::iter::FusedIterator;

use crate::{
    selection::{IncompatibleDimensionalityError, Selection},
    ArrayIndices, ArrayShape,
};

use super::IndicesIterator;

/// Iterates over the regular sized chunks overlapping a selection.
/// All chunks have the same size, and may extend over the bounds of the selection.
///
/// The iterator item is a ([`ArrayIndices`], [`Selection`]) tuple corresponding to the chunk indices and chunk region.
///
/// For example, the chunks of shape `[2, 2]` overlapping selection `(1..5, 1..5)` are visited in this order:
///
/// | chunk indices | chunk region   |
/// |---------------|----------------|
/// | `[0, 0]`      | `(0..2, 0..2)` |
/// | `[0, 1]`      | `(0..2, 2..4)` |
/// | `[0, 2]`      | `(0..2, 4..6)` |
/// | `[1, 0]`      | `(2..4, 0..2)` |
/// | ...           | ...            |
pub struct ChunksIterator {
    inner: IndicesIterator,
    chunk_shape: ArrayShape,
}

impl ChunksIterator {
    /// Create a new chunks iterator.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if `chunk_shape` does not match the dimensionality of `selection` or has a zero dimension.
    pub fn new(
        selection: &Selection,
        chunk_shape: &[u64],
    ) -> Result<Self, IncompatibleDimensionalityError> {
        if selection.dimensionality() != chunk_shape.len() || chunk_shape.contains(&0) {
            return Err(IncompatibleDimensionalityError::new(
                chunk_shape.len(),
                selection.dimensionality(),
            ));
        }
        let chunks = if selection.is_empty() {
            Selection::new_with_shape(vec![0; chunk_shape.len()])
        } else {
            let chunk_start: ArrayIndices = std::iter::zip(selection.start(), chunk_shape)
                .map(|(s, c)| s / c)
                .collect();
            let chunk_end_exc: ArrayIndices = std::iter::zip(selection.end_exc(), chunk_shape)
                .map(|(e, c)| e.div_ceil(*c))
                .collect();
            Selection::new_with_start_end_exc(chunk_start, &chunk_end_exc)?
        };
        Ok(Self {
            inner: IndicesIterator::new(chunks),
            chunk_shape: chunk_shape.to_vec(),
        })
    }
}

impl Iterator for ChunksIterator {
    type Item = (ArrayIndices, Selection);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|chunk_indices| {
            let start = std::iter::zip(&chunk_indices, &self.chunk_shape)
                .map(|(i, c)| i * c)
                .collect();
            let chunk = Selection {
                start,
                shape: self.chunk_shape.clone(),
            };
            (chunk_indices, chunk)
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for ChunksIterator {}

impl FusedIterator for ChunksIterator {}
