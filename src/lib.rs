//! A rust library for streaming large neurophysiology arrays into chunked, compressed datasets without holding them in memory.
//!
//! Continuous electrophysiology traces, behavioural movies and calcium imaging stacks are routinely larger than the memory of the machine converting them.
//! `nwbconv` walks such arrays in buffer-sized tiles, fetching each tile from a source reader on demand, and hands every tile to a writer that stores it as compressed chunks.
//!
//! ## Getting Started
//! - [`data_chunk_iterator::DataChunkSource`] is the contract a reader implements: a shape, a data type and a "fetch this selection" operation.
//! - [`data_chunk_iterator::DataChunkIterator`] resolves chunk and buffer shapes under memory budgets and yields [`data_chunk_iterator::DataChunk`]s.
//! - [`sources`] has adapters for in-memory arrays, recordings (including memory-mapped binary files), imaging stacks and movies.
//! - [`dataset::ChunkedDataset`] consumes an iterator and writes a chunked, compressed dataset to a [`storage`] backend.
//! - [`nwb`] writes NWB-style time series groups around those datasets.
//!
//! ## Example
//! ```rust
//! # use std::sync::Arc;
//! use nwbconv::data_chunk_iterator::{BufferSpec, ChunkSpec, DataChunkIterator, DataChunkIteratorOptions};
//! use nwbconv::dataset::{Compression, DatasetBuilder};
//! use nwbconv::sources::SliceableDataChunkSource;
//! use nwbconv::storage::store::MemoryStore;
//!
//! let data = ndarray::Array::from_iter(0..100u16).into_shape_with_order((10, 10))?;
//! let options = DataChunkIteratorOptions::default()
//!     .with_buffer(BufferSpec::BufferShape(vec![5, 5]))
//!     .with_chunk(ChunkSpec::ChunkShape(vec![5, 5]));
//! let iterator = DataChunkIterator::new_with_options(SliceableDataChunkSource::new(&data), &options)?;
//!
//! let store = Arc::new(MemoryStore::new());
//! let dataset = DatasetBuilder::from_iterator(&iterator)
//!     .compression(Compression::None)
//!     .build(store, "/data")?;
//! dataset.store_metadata()?;
//! dataset.write_data_chunks(iterator)?;
//!
//! let block: ndarray::ArrayD<u16> = dataset.retrieve_selection_ndarray(&nwbconv::selection::Selection::new_with_ranges(&[0..2, 0..2]))?;
//! assert_eq!(block.iter().copied().collect::<Vec<_>>(), vec![0, 1, 10, 11]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Crate Features
//! #### Default
//!  - `gzip`: the gzip compression codec.
//!  - `zstd`: the zstd compression codec.
//!  - `progress`: a terminal progress bar reporter ([`progress::BarProgress`]).
//!
//! ## Logging
//! `nwbconv` logs through the [`log`] facade and never installs a logger itself.
//! Shape resolution is logged at `debug`, each yielded selection and stored chunk at `trace`, substituted movie frames at `warn`.
//!
//! ## Licence
//! `nwbconv` is licensed under either of
//!  - the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> or
//!  - the MIT license <http://opensource.org/licenses/MIT>, at your option.

#![warn(unused_variables)]
#![warn(dead_code)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![deny(clippy::missing_panics_doc)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod config;
pub mod data_chunk_iterator;
pub mod data_type;
pub mod dataset;
pub mod nwb;
pub mod progress;
pub mod selection;
pub mod shape_estimation;
pub mod sources;
pub mod storage;

/// The shape of an array.
pub type ArrayShape = Vec<u64>;

/// The indices of an element or chunk in an array.
pub type ArrayIndices = Vec<u64>;

/// Return the number of elements of `shape`.
#[must_use]
pub(crate) fn num_elements(shape: &[u64]) -> u64 {
    shape.iter().product()
}
