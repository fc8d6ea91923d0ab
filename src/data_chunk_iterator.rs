//! Data chunk iteration.
//!
//! A [`DataChunkIterator`] streams an array from a [`DataChunkSource`] in buffer-sized [`DataChunk`]s, so that only one buffer is ever held in memory.
//!
//! On creation, the iterator:
//!  - queries the source for its shape (`maxshape`) and [`DataType`],
//!  - resolves the chunk shape from the [`ChunkSpec`], either explicit, preferred by the source or [estimated](crate::shape_estimation::estimate_chunk_shape),
//!  - resolves the buffer shape from the [`BufferSpec`], either explicit, preferred by the source or [estimated](crate::shape_estimation::estimate_buffer_shape), and
//!  - validates the shapes. Invalid shapes are an error, never silently corrected.
//!
//! Each call to [`next`](Iterator::next) then fetches the next buffer-sized [`Selection`] from the source.
//! Selections partition `maxshape` and are visited in row-major order over the buffer grid (the last axis varies fastest).
//!
//! The iterator is single pass. Once it is exhausted, or a fetch fails, it yields no more items.
//! Iterating again requires a new iterator over a new (or recovered, see [`DataChunkIterator::into_source`]) source.
//!
//! ```rust
//! # use nwbconv::data_chunk_iterator::*;
//! # use nwbconv::sources::SliceableDataChunkSource;
//! # use nwbconv::selection::Selection;
//! let data = ndarray::Array::from_iter(0..100u16).into_shape_with_order((10, 10))?;
//! let options = DataChunkIteratorOptions::default()
//!     .with_buffer(BufferSpec::BufferShape(vec![5, 5]))
//!     .with_chunk(ChunkSpec::ChunkShape(vec![5, 5]));
//! let mut iterator = DataChunkIterator::new_with_options(SliceableDataChunkSource::new(&data), &options)?;
//! assert_eq!(iterator.num_buffers(), 4);
//!
//! let chunk = iterator.next().unwrap()?;
//! assert_eq!(chunk.selection(), &Selection::new_with_ranges(&[0..5, 0..5]));
//! assert_eq!(chunk.data()[[1, 0]], 10);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod data_chunk_iterator_errors;
mod data_chunk_iterator_options;

pub use data_chunk_iterator_errors::{DataChunkError, DataChunkIteratorCreateError, SourceError};
pub use data_chunk_iterator_options::{
    BufferSpec, ChunkSpec, DataChunkIteratorOptions, DataChunkIteratorOptionsError,
};

use std::iter::FusedIterator;

use itertools::izip;
use ndarray::ArrayD;

use crate::{
    config::global_config,
    data_type::{DataType, Element},
    progress::ProgressReporter,
    selection::{shape_to_u64, BufferTilesIterator, Selection},
    shape_estimation::{estimate_buffer_shape, estimate_chunk_shape},
    ArrayShape,
};

/// A source of array data that can be read by selection.
///
/// This is the contract between a [`DataChunkIterator`] and a backend reader.
pub trait DataChunkSource {
    /// The element type of the source.
    type Element: Element;

    /// Return the data type of the source.
    ///
    /// This must be the data type of [`Self::Element`].
    fn data_type(&self) -> DataType {
        Self::Element::DATA_TYPE
    }

    /// Return the full shape of the source.
    ///
    /// The shape must not change while the source is being iterated.
    fn maxshape(&self) -> ArrayShape;

    /// Read the data within `selection`.
    ///
    /// The returned array must have the shape of `selection`.
    ///
    /// # Errors
    /// Returns a [`SourceError`] if the underlying reader fails.
    fn get_data(&mut self, selection: &Selection) -> Result<ArrayD<Self::Element>, SourceError>;

    /// Return the chunk shape preferred by the source, if any.
    ///
    /// Used when a [`DataChunkIterator`] is created with [`ChunkSpec::Auto`].
    fn default_chunk_shape(&self) -> Option<ArrayShape> {
        None
    }

    /// Return the buffer shape preferred by the source for the resolved `chunk_shape`, if any.
    ///
    /// Used when a [`DataChunkIterator`] is created with [`BufferSpec::Auto`].
    /// The returned shape is validated like an explicit buffer shape.
    fn default_buffer_shape(&self, _chunk_shape: &[u64]) -> Option<ArrayShape> {
        None
    }

    /// Called once with the resolved chunk and buffer shapes, before any data is read.
    ///
    /// # Errors
    /// Returns a [`SourceError`] if the source cannot serve these shapes.
    fn prepare(&mut self, _chunk_shape: &[u64], _buffer_shape: &[u64]) -> Result<(), SourceError> {
        Ok(())
    }
}

impl<S: DataChunkSource + ?Sized> DataChunkSource for Box<S> {
    type Element = S::Element;

    fn data_type(&self) -> DataType {
        (**self).data_type()
    }

    fn maxshape(&self) -> ArrayShape {
        (**self).maxshape()
    }

    fn get_data(&mut self, selection: &Selection) -> Result<ArrayD<Self::Element>, SourceError> {
        (**self).get_data(selection)
    }

    fn default_chunk_shape(&self) -> Option<ArrayShape> {
        (**self).default_chunk_shape()
    }

    fn default_buffer_shape(&self, chunk_shape: &[u64]) -> Option<ArrayShape> {
        (**self).default_buffer_shape(chunk_shape)
    }

    fn prepare(&mut self, chunk_shape: &[u64], buffer_shape: &[u64]) -> Result<(), SourceError> {
        (**self).prepare(chunk_shape, buffer_shape)
    }
}

/// A selection of an array and the data within it.
#[derive(Clone, Debug, PartialEq)]
pub struct DataChunk<T> {
    selection: Selection,
    data: ArrayD<T>,
}

impl<T> DataChunk<T> {
    /// Return the selection.
    #[must_use]
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Return the data.
    #[must_use]
    pub fn data(&self) -> &ArrayD<T> {
        &self.data
    }

    /// Consume the chunk and return the selection and data.
    #[must_use]
    pub fn into_parts(self) -> (Selection, ArrayD<T>) {
        (self.selection, self.data)
    }
}

/// The state of a [`DataChunkIterator`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataChunkIteratorState {
    /// More buffers may be fetched.
    Ready,
    /// Every buffer has been yielded.
    Exhausted,
    /// A fetch failed. The iterator yields no more items.
    Failed,
}

/// A single pass iterator over the buffers of a [`DataChunkSource`].
///
/// See the [module documentation](self).
pub struct DataChunkIterator<S: DataChunkSource> {
    source: S,
    maxshape: ArrayShape,
    data_type: DataType,
    chunk_shape: ArrayShape,
    buffer_shape: ArrayShape,
    tiles: BufferTilesIterator,
    num_buffers: u64,
    state: DataChunkIteratorState,
    progress: Box<dyn ProgressReporter>,
}

impl<S: DataChunkSource> std::fmt::Debug for DataChunkIterator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataChunkIterator")
            .field("maxshape", &self.maxshape)
            .field("data_type", &self.data_type)
            .field("chunk_shape", &self.chunk_shape)
            .field("buffer_shape", &self.buffer_shape)
            .field("num_buffers", &self.num_buffers)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<S: DataChunkSource> DataChunkIterator<S> {
    /// Create a new data chunk iterator with default options.
    ///
    /// # Errors
    /// Returns a [`DataChunkIteratorCreateError`] if the chunk or buffer shape cannot be resolved or is invalid.
    pub fn new(source: S) -> Result<Self, DataChunkIteratorCreateError> {
        Self::new_with_options(source, &DataChunkIteratorOptions::default())
    }

    /// Create a new data chunk iterator with `options`.
    ///
    /// # Errors
    /// Returns a [`DataChunkIteratorCreateError`] if the chunk or buffer shape cannot be resolved or is invalid.
    pub fn new_with_options(
        source: S,
        options: &DataChunkIteratorOptions,
    ) -> Result<Self, DataChunkIteratorCreateError> {
        Self::new_with_progress(source, options, options.progress_reporter())
    }

    /// Create a new data chunk iterator with `options` that reports progress to `progress`.
    ///
    /// # Errors
    /// Returns a [`DataChunkIteratorCreateError`] if the chunk or buffer shape cannot be resolved or is invalid.
    pub fn new_with_progress(
        mut source: S,
        options: &DataChunkIteratorOptions,
        mut progress: Box<dyn ProgressReporter>,
    ) -> Result<Self, DataChunkIteratorCreateError> {
        let data_type = source.data_type();
        if data_type != S::Element::DATA_TYPE {
            return Err(DataChunkIteratorCreateError::DataTypeMismatch {
                declared: data_type,
                element: S::Element::DATA_TYPE,
            });
        }

        let maxshape = source.maxshape();
        if maxshape.is_empty() || maxshape.contains(&0) {
            return Err(DataChunkIteratorCreateError::InvalidMaxshape(maxshape));
        }

        let chunk_shape = match options.chunk() {
            ChunkSpec::Auto => match source.default_chunk_shape() {
                Some(chunk_shape) => chunk_shape,
                None => {
                    let chunk_mb = global_config().chunk_mb();
                    estimate_chunk_shape(&maxshape, data_type, chunk_mb)?
                }
            },
            ChunkSpec::ChunkMb(chunk_mb) => estimate_chunk_shape(&maxshape, data_type, *chunk_mb)?,
            ChunkSpec::ChunkShape(chunk_shape) => chunk_shape.clone(),
        };
        validate_shape("chunk_shape", &chunk_shape, &maxshape)?;

        let buffer_shape = match options.buffer() {
            BufferSpec::Auto => match source.default_buffer_shape(&chunk_shape) {
                Some(buffer_shape) => buffer_shape,
                None => {
                    let buffer_gb = global_config().buffer_gb();
                    estimate_buffer_shape(&maxshape, data_type, &chunk_shape, buffer_gb)?
                }
            },
            BufferSpec::BufferGb(buffer_gb) => {
                estimate_buffer_shape(&maxshape, data_type, &chunk_shape, *buffer_gb)?
            }
            BufferSpec::BufferShape(buffer_shape) => buffer_shape.clone(),
        };
        validate_shape("buffer_shape", &buffer_shape, &maxshape)?;
        validate_chunk_in_buffer(&chunk_shape, &buffer_shape, &maxshape)?;

        source.prepare(&chunk_shape, &buffer_shape)?;

        let tiles = BufferTilesIterator::new(&maxshape, &buffer_shape).map_err(|_| {
            DataChunkIteratorCreateError::IncompatibleDimensionality {
                name: "buffer_shape",
                shape: buffer_shape.clone(),
                maxshape: maxshape.clone(),
            }
        })?;
        let num_buffers = tiles.len() as u64;
        log::debug!(
            "data chunk iterator over {maxshape:?} {data_type}: chunk shape {chunk_shape:?}, buffer shape {buffer_shape:?}, {num_buffers} buffers"
        );
        progress.start(num_buffers);

        Ok(Self {
            source,
            maxshape,
            data_type,
            chunk_shape,
            buffer_shape,
            tiles,
            num_buffers,
            state: DataChunkIteratorState::Ready,
            progress,
        })
    }

    /// Return the full shape of the array.
    #[must_use]
    pub fn maxshape(&self) -> &[u64] {
        &self.maxshape
    }

    /// Return the data type of the array.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Return the resolved chunk shape.
    ///
    /// This is the chunk shape a writer should use for the dataset.
    #[must_use]
    pub fn chunk_shape(&self) -> &[u64] {
        &self.chunk_shape
    }

    /// Return the resolved buffer shape.
    #[must_use]
    pub fn buffer_shape(&self) -> &[u64] {
        &self.buffer_shape
    }

    /// Return the total number of buffers.
    #[must_use]
    pub fn num_buffers(&self) -> u64 {
        self.num_buffers
    }

    /// Return the state of the iterator.
    #[must_use]
    pub fn state(&self) -> DataChunkIteratorState {
        self.state
    }

    /// Return a reference to the source.
    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Consume the iterator and return the source.
    #[must_use]
    pub fn into_source(self) -> S {
        self.source
    }

    fn fetch(&mut self, selection: &Selection) -> Result<ArrayD<S::Element>, DataChunkError> {
        let data = self
            .source
            .get_data(selection)
            .map_err(|source| DataChunkError::SourceRead {
                selection: selection.clone(),
                source,
            })?;
        let got = shape_to_u64(data.shape());
        if got == selection.shape() {
            Ok(data)
        } else {
            Err(DataChunkError::ShapeMismatch {
                selection: selection.clone(),
                expected: selection.shape().to_vec(),
                got,
            })
        }
    }

    fn finish(&mut self, state: DataChunkIteratorState) {
        self.state = state;
        self.progress.finish();
    }
}

impl<S: DataChunkSource> Iterator for DataChunkIterator<S> {
    type Item = Result<DataChunk<S::Element>, DataChunkError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state != DataChunkIteratorState::Ready {
            return None;
        }
        let Some(selection) = self.tiles.next() else {
            self.finish(DataChunkIteratorState::Exhausted);
            return None;
        };
        log::trace!("fetching selection {selection}");
        match self.fetch(&selection) {
            Ok(data) => {
                self.progress.advance(1);
                Some(Ok(DataChunk { selection, data }))
            }
            Err(err) => {
                log::error!("{err}");
                self.finish(DataChunkIteratorState::Failed);
                Some(Err(err))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.state {
            DataChunkIteratorState::Ready => (0, self.tiles.size_hint().1),
            DataChunkIteratorState::Exhausted | DataChunkIteratorState::Failed => (0, Some(0)),
        }
    }
}

impl<S: DataChunkSource> FusedIterator for DataChunkIterator<S> {}

fn validate_shape(
    name: &'static str,
    shape: &[u64],
    maxshape: &[u64],
) -> Result<(), DataChunkIteratorCreateError> {
    if shape.len() != maxshape.len() {
        Err(DataChunkIteratorCreateError::IncompatibleDimensionality {
            name,
            shape: shape.to_vec(),
            maxshape: maxshape.to_vec(),
        })
    } else if shape.contains(&0) {
        Err(DataChunkIteratorCreateError::NonPositiveShape {
            name,
            shape: shape.to_vec(),
        })
    } else if std::iter::zip(shape, maxshape).any(|(size, extent)| size > extent) {
        Err(DataChunkIteratorCreateError::ExceedsMaxshape {
            name,
            shape: shape.to_vec(),
            maxshape: maxshape.to_vec(),
        })
    } else {
        Ok(())
    }
}

fn validate_chunk_in_buffer(
    chunk_shape: &[u64],
    buffer_shape: &[u64],
    maxshape: &[u64],
) -> Result<(), DataChunkIteratorCreateError> {
    if std::iter::zip(chunk_shape, buffer_shape).any(|(chunk, buffer)| chunk > buffer) {
        return Err(DataChunkIteratorCreateError::ChunkExceedsBuffer {
            chunk_shape: chunk_shape.to_vec(),
            buffer_shape: buffer_shape.to_vec(),
        });
    }
    if izip!(chunk_shape, buffer_shape, maxshape)
        .any(|(chunk, buffer, extent)| buffer != extent && buffer % chunk != 0)
    {
        return Err(DataChunkIteratorCreateError::ChunkDoesNotDivideBuffer {
            chunk_shape: chunk_shape.to_vec(),
            buffer_shape: buffer_shape.to_vec(),
        });
    }
    Ok(())
}
