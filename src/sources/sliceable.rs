use ndarray::{ArrayBase, ArrayD, ArrayViewD, Data, Dimension};

use crate::{
    data_chunk_iterator::{DataChunkSource, SourceError},
    data_type::Element,
    selection::{shape_to_u64, Selection},
    ArrayShape,
};

/// A [`DataChunkSource`] over an array that is already addressable, such as an in-memory or memory-mapped [`ndarray`] array.
#[derive(Debug, Clone)]
pub struct SliceableDataChunkSource<'a, T> {
    data: ArrayViewD<'a, T>,
}

impl<'a, T: Element> SliceableDataChunkSource<'a, T> {
    /// Create a new sliceable source over `data`.
    #[must_use]
    pub fn new<S: Data<Elem = T>, D: Dimension>(data: &'a ArrayBase<S, D>) -> Self {
        Self {
            data: data.view().into_dyn(),
        }
    }

    /// Create a new sliceable source over an array view.
    #[must_use]
    pub fn from_view<D: Dimension>(data: ndarray::ArrayView<'a, T, D>) -> Self {
        Self {
            data: data.into_dyn(),
        }
    }
}

impl<T: Element> DataChunkSource for SliceableDataChunkSource<'_, T> {
    type Element = T;

    fn maxshape(&self) -> ArrayShape {
        shape_to_u64(self.data.shape())
    }

    fn get_data(&mut self, selection: &Selection) -> Result<ArrayD<T>, SourceError> {
        Ok(selection.extract_ndarray(&self.data)?)
    }
}
