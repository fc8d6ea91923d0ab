//! Chunked, compressed datasets.
//!
//! A [`ChunkedDataset`] is the writer that consumes a [`DataChunkIterator`].
//! It stores a fixed shape array as a regular grid of compressed chunks in a [storage](crate::storage) backend.
//! Chunks on the edge of the array are padded with the fill value (zero) to the full chunk shape.
//!
//! Buffers yielded by an iterator need not align with the chunk grid.
//! A chunk only partially covered by a buffer is read, updated and written back.

mod compression;
mod dataset_builder;
mod dataset_errors;
mod dataset_metadata;

pub use compression::{CodecError, Compression};
pub use dataset_builder::DatasetBuilder;
pub use dataset_errors::{DatasetCreateError, DatasetError};
pub use dataset_metadata::{
    Attributes, ChunkGridConfiguration, ChunkGridMetadata, ChunkKeyEncodingConfiguration,
    ChunkKeyEncodingMetadata, DatasetMetadata,
};

use std::sync::Arc;

use ndarray::{ArrayD, ArrayViewD, IxDyn};

use crate::{
    data_chunk_iterator::{DataChunkIterator, DataChunkSource},
    data_type::{DataType, Element},
    selection::{shape_to_u64, Selection},
    storage::{data_key, meta_key, ReadableStorageTraits, StoreKey, WritableStorageTraits},
    ArrayShape,
};

/// A summary of the data written by [`ChunkedDataset::write_data_chunks`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DataChunksWritten {
    /// The number of buffers consumed.
    pub num_buffers: u64,
    /// The number of elements written.
    pub num_elements: u64,
}

/// A chunked dataset in a storage backend.
#[derive(Debug)]
pub struct ChunkedDataset<TStorage: ?Sized> {
    storage: Arc<TStorage>,
    path: String,
    metadata: DatasetMetadata,
    compression: Compression,
}

impl<TStorage: ?Sized> ChunkedDataset<TStorage> {
    fn new_with_metadata(
        storage: Arc<TStorage>,
        path: &str,
        metadata: DatasetMetadata,
        compression: Compression,
    ) -> Self {
        Self {
            storage,
            path: path.to_string(),
            metadata,
            compression,
        }
    }

    /// Return the node path of the dataset.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Return the dataset metadata.
    #[must_use]
    pub fn metadata(&self) -> &DatasetMetadata {
        &self.metadata
    }

    /// Return the shape of the dataset.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.metadata.shape
    }

    /// Return the data type of the dataset.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.metadata.data_type
    }

    /// Return the chunk shape of the dataset.
    #[must_use]
    pub fn chunk_shape(&self) -> &[u64] {
        self.metadata.chunk_shape()
    }

    /// Return the compression of the dataset.
    #[must_use]
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Return the user attributes.
    #[must_use]
    pub fn attributes(&self) -> &Attributes {
        &self.metadata.attributes
    }

    /// Return the shape of the chunk grid.
    #[must_use]
    pub fn chunk_grid_shape(&self) -> ArrayShape {
        std::iter::zip(self.shape(), self.chunk_shape())
            .map(|(size, chunk)| size.div_ceil(*chunk))
            .collect()
    }

    /// Return the key of the chunk at `chunk_indices`.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if the dataset path is invalid.
    pub fn chunk_key(&self, chunk_indices: &[u64]) -> Result<StoreKey, DatasetError> {
        Ok(data_key(&self.path, chunk_indices)?)
    }

    fn check_element_type<T: Element>(&self) -> Result<(), DatasetError> {
        if T::DATA_TYPE == self.data_type() {
            Ok(())
        } else {
            Err(DatasetError::IncompatibleElementType {
                expected: self.data_type(),
                got: T::DATA_TYPE,
            })
        }
    }

    fn check_selection(&self, selection: &Selection) -> Result<(), DatasetError> {
        if selection.inbounds(self.shape()) {
            Ok(())
        } else {
            Err(DatasetError::OutOfBounds {
                selection: selection.clone(),
                shape: self.shape().to_vec(),
            })
        }
    }

    fn chunk_shape_usize(&self) -> Vec<usize> {
        self.chunk_shape()
            .iter()
            .map(|&size| usize::try_from(size).unwrap_or(usize::MAX))
            .collect()
    }
}

impl<TStorage: ?Sized + ReadableStorageTraits> ChunkedDataset<TStorage> {
    /// Open an existing dataset at `path` in `storage`.
    ///
    /// # Errors
    /// Returns a [`DatasetCreateError`] if there is no dataset metadata at `path` or it is invalid or unsupported.
    pub fn open(storage: Arc<TStorage>, path: &str) -> Result<Self, DatasetCreateError> {
        let key = meta_key(path)?;
        let metadata = storage
            .get(&key)?
            .ok_or(DatasetCreateError::MissingMetadata(key))?;
        let metadata: DatasetMetadata = serde_json::from_slice(&metadata)?;
        let compression = metadata.validate()?;
        Ok(Self::new_with_metadata(storage, path, metadata, compression))
    }

    /// Retrieve the elements of the chunk at `chunk_indices`.
    ///
    /// A chunk that has not been written is filled with zeros.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if `T` does not match the data type or the chunk cannot be read or decoded.
    pub fn retrieve_chunk_ndarray<T: Element>(
        &self,
        chunk_indices: &[u64],
    ) -> Result<ArrayD<T>, DatasetError> {
        self.check_element_type::<T>()?;
        let shape = self.chunk_shape_usize();
        let key = self.chunk_key(chunk_indices)?;
        let Some(encoded) = self.storage.get(&key)? else {
            return Ok(ArrayD::<T>::default(IxDyn(&shape)));
        };
        let bytes = self.compression.decode(encoded)?;
        let expected = shape.iter().product::<usize>() * T::DATA_TYPE.size();
        if bytes.len() != expected {
            return Err(DatasetError::InvalidChunkSize {
                key,
                got: bytes.len(),
                expected,
            });
        }
        let elements: Vec<T> = bytemuck::pod_collect_to_vec(&bytes);
        match ArrayD::from_shape_vec(IxDyn(&shape), elements) {
            Ok(chunk) => Ok(chunk),
            Err(_) => Err(DatasetError::InvalidChunkSize {
                key,
                got: bytes.len(),
                expected,
            }),
        }
    }

    /// Retrieve the elements within `selection`.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if `T` does not match the data type, the selection is out of bounds, or a chunk cannot be read.
    pub fn retrieve_selection_ndarray<T: Element>(
        &self,
        selection: &Selection,
    ) -> Result<ArrayD<T>, DatasetError> {
        self.check_element_type::<T>()?;
        self.check_selection(selection)?;
        let mut output = ArrayD::<T>::default(IxDyn(&selection.shape_usize()));
        for (chunk_indices, chunk_selection) in selection.iter_chunks(self.chunk_shape())? {
            let overlap = chunk_selection.intersect(selection)?;
            let chunk = self.retrieve_chunk_ndarray::<T>(&chunk_indices)?;
            let source = overlap.relative_to(&chunk_selection)?.view(&chunk.view())?;
            overlap
                .relative_to(selection)?
                .view_mut(output.view_mut())?
                .assign(&source);
        }
        Ok(output)
    }

    /// Retrieve the entire dataset.
    ///
    /// # Errors
    /// See [`retrieve_selection_ndarray`](ChunkedDataset::retrieve_selection_ndarray).
    pub fn retrieve_array_ndarray<T: Element>(&self) -> Result<ArrayD<T>, DatasetError> {
        self.retrieve_selection_ndarray(&Selection::new_with_shape(self.shape().to_vec()))
    }
}

impl<TStorage: ?Sized + WritableStorageTraits> ChunkedDataset<TStorage> {
    /// Store the dataset metadata.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if the metadata cannot be serialised or stored.
    pub fn store_metadata(&self) -> Result<(), DatasetError> {
        let metadata = serde_json::to_vec_pretty(&self.metadata)?;
        self.storage.set(&meta_key(&self.path)?, &metadata)?;
        Ok(())
    }

    /// Encode and store a complete chunk.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if `T` does not match the data type, `chunk` does not have the chunk shape, or the chunk cannot be stored.
    pub fn store_chunk_ndarray<T: Element>(
        &self,
        chunk_indices: &[u64],
        chunk: ArrayViewD<T>,
    ) -> Result<(), DatasetError> {
        self.check_element_type::<T>()?;
        if chunk.shape() != self.chunk_shape_usize().as_slice() {
            return Err(DatasetError::IncompatibleDataShape {
                shape: shape_to_u64(chunk.shape()),
                selection: Selection::new_with_shape(self.chunk_shape().to_vec()),
            });
        }
        let chunk = chunk.as_standard_layout();
        let elements = chunk.as_slice().unwrap_or_default();
        let bytes: Vec<u8> = bytemuck::cast_slice(elements).to_vec();
        let key = self.chunk_key(chunk_indices)?;
        log::trace!("storing chunk {key}");
        self.storage.set(&key, &self.compression.encode(bytes)?)?;
        Ok(())
    }
}

impl<TStorage: ?Sized + ReadableStorageTraits + WritableStorageTraits> ChunkedDataset<TStorage> {
    /// Store `data` at `selection`.
    ///
    /// Chunks fully covered by `selection` are overwritten, others are read, updated and written back.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if `T` does not match the data type, `data` does not match the shape of `selection`,
    /// the selection is out of bounds, or a chunk cannot be read or stored.
    pub fn store_selection_ndarray<T: Element>(
        &self,
        selection: &Selection,
        data: ArrayViewD<T>,
    ) -> Result<(), DatasetError> {
        self.check_element_type::<T>()?;
        self.check_selection(selection)?;
        if shape_to_u64(data.shape()) != selection.shape() {
            return Err(DatasetError::IncompatibleDataShape {
                shape: shape_to_u64(data.shape()),
                selection: selection.clone(),
            });
        }
        for (chunk_indices, chunk_selection) in selection.iter_chunks(self.chunk_shape())? {
            let overlap = chunk_selection.intersect(selection)?;
            let chunk_in_bounds = chunk_selection.bound(self.shape())?;
            let mut chunk = if overlap == chunk_in_bounds {
                ArrayD::<T>::default(IxDyn(&self.chunk_shape_usize()))
            } else {
                self.retrieve_chunk_ndarray::<T>(&chunk_indices)?
            };
            let source = overlap.relative_to(selection)?.view(&data)?;
            overlap
                .relative_to(&chunk_selection)?
                .view_mut(chunk.view_mut())?
                .assign(&source);
            self.store_chunk_ndarray(&chunk_indices, chunk.view())?;
        }
        Ok(())
    }

    /// Consume `iterator`, storing every buffer it yields in order.
    ///
    /// Stops at the first error. Buffers stored before the error remain in the dataset.
    ///
    /// # Errors
    /// Returns [`DatasetError::IncompatibleIterator`] if the iterator array does not match the dataset,
    /// [`DatasetError::DataChunk`] if the iterator fails, or any error of [`store_selection_ndarray`](ChunkedDataset::store_selection_ndarray).
    pub fn write_data_chunks<S: DataChunkSource>(
        &self,
        iterator: DataChunkIterator<S>,
    ) -> Result<DataChunksWritten, DatasetError> {
        if iterator.maxshape() != self.shape() || iterator.data_type() != self.data_type() {
            return Err(DatasetError::IncompatibleIterator {
                maxshape: iterator.maxshape().to_vec(),
                data_type: iterator.data_type(),
                shape: self.shape().to_vec(),
                expected_data_type: self.data_type(),
            });
        }
        let mut written = DataChunksWritten::default();
        for data_chunk in iterator {
            let (selection, data) = data_chunk?.into_parts();
            self.store_selection_ndarray(&selection, data.view())?;
            written.num_buffers += 1;
            written.num_elements += selection.num_elements();
        }
        log::debug!(
            "wrote {} buffers ({} elements) to {}",
            written.num_buffers,
            written.num_elements,
            self.path
        );
        Ok(written)
    }
}
