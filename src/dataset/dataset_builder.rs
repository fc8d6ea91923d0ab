use std::sync::Arc;

use crate::{
    config::global_config,
    data_chunk_iterator::{DataChunkIterator, DataChunkSource},
    data_type::DataType,
    storage::validate_node_path,
    ArrayShape,
};

use super::{Attributes, ChunkedDataset, Compression, DatasetCreateError, DatasetMetadata};

/// A [`ChunkedDataset`] builder.
///
/// The builder is initialised from a shape, data type and chunk shape, or from a [`DataChunkIterator`].
/// The compression defaults to the [global compression](crate::config::Config#default-compression) and can be changed with [`compression`](DatasetBuilder::compression).
#[derive(Debug, Clone)]
pub struct DatasetBuilder {
    shape: ArrayShape,
    data_type: DataType,
    chunk_shape: ArrayShape,
    compression: Compression,
    attributes: Attributes,
}

impl DatasetBuilder {
    /// Create a new dataset builder.
    #[must_use]
    pub fn new(shape: ArrayShape, data_type: DataType, chunk_shape: ArrayShape) -> Self {
        Self {
            shape,
            data_type,
            chunk_shape,
            compression: global_config().compression(),
            attributes: Attributes::new(),
        }
    }

    /// Create a new dataset builder with the shape, data type and chunk shape of `iterator`.
    #[must_use]
    pub fn from_iterator<S: DataChunkSource>(iterator: &DataChunkIterator<S>) -> Self {
        Self::new(
            iterator.maxshape().to_vec(),
            iterator.data_type(),
            iterator.chunk_shape().to_vec(),
        )
    }

    /// Set the compression.
    pub fn compression(&mut self, compression: Compression) -> &mut Self {
        self.compression = compression;
        self
    }

    /// Set the user attributes.
    pub fn attributes(&mut self, attributes: Attributes) -> &mut Self {
        self.attributes = attributes;
        self
    }

    /// Build into a [`ChunkedDataset`] at `path` in `storage`.
    ///
    /// Nothing is written until [`ChunkedDataset::store_metadata`] or a chunk is stored.
    ///
    /// # Errors
    /// Returns [`DatasetCreateError`] if the path, chunk shape or compression is invalid.
    pub fn build<TStorage: ?Sized>(
        &self,
        storage: Arc<TStorage>,
        path: &str,
    ) -> Result<ChunkedDataset<TStorage>, DatasetCreateError> {
        validate_node_path(path)?;
        if self.chunk_shape.len() != self.shape.len() || self.chunk_shape.contains(&0) {
            return Err(DatasetCreateError::InvalidChunkShape {
                shape: self.shape.clone(),
                chunk_shape: self.chunk_shape.clone(),
            });
        }
        self.compression.validate()?;
        let metadata = DatasetMetadata::new(
            self.shape.clone(),
            self.data_type,
            self.chunk_shape.clone(),
            self.compression,
            self.attributes.clone(),
        );
        Ok(ChunkedDataset::new_with_metadata(
            storage,
            path,
            metadata,
            self.compression,
        ))
    }
}
