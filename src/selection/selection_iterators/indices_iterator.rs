use std::iter::FusedIterator;

use crate::{
    selection::{unravel_index, Selection},
    ArrayIndices,
};

/// Iterates over element indices in a selection.
///
/// Indices are produced in row-major order: the last axis varies fastest.
pub struct IndicesIterator {
    selection: Selection,
    index: u64,
    num_elements: u64,
}

impl IndicesIterator {
    /// Create a new indices iterator.
    #[must_use]
    pub fn new(selection: Selection) -> Self {
        let num_elements = selection.num_elements();
        Self {
            selection,
            index: 0,
            num_elements,
        }
    }
}

impl Iterator for IndicesIterator {
    type Item = ArrayIndices;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.num_elements {
            return None;
        }
        let mut indices = unravel_index(self.index, self.selection.shape());
        for (index, start) in std::iter::zip(indices.iter_mut(), self.selection.start()) {
            *index += start;
        }
        self.index += 1;
        Some(indices)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.num_elements - self.index).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for IndicesIterator {}

impl FusedIterator for IndicesIterator {}
