use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    config::global_config,
    progress::{NoProgress, ProgressReporter},
    ArrayShape,
};

/// How the buffer shape of a [`DataChunkIterator`](super::DataChunkIterator) is chosen.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferSpec {
    /// Use the buffer shape preferred by the source, otherwise estimate one within the [global](crate::config::Config) `buffer_gb` budget.
    #[default]
    Auto,
    /// Estimate a buffer shape within a memory budget in gigabytes (1e9 bytes).
    BufferGb(f64),
    /// An explicit buffer shape.
    BufferShape(ArrayShape),
}

/// How the chunk shape of a [`DataChunkIterator`](super::DataChunkIterator) is chosen.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkSpec {
    /// Use the chunk shape preferred by the source, otherwise estimate one within the [global](crate::config::Config) `chunk_mb` budget.
    #[default]
    Auto,
    /// Estimate a chunk shape within a memory budget in megabytes (1e6 bytes).
    ChunkMb(f64),
    /// An explicit chunk shape.
    ChunkShape(ArrayShape),
}

/// Options for creating a [`DataChunkIterator`](super::DataChunkIterator).
///
/// The default options let the source choose its buffer and chunk shapes, falling back to the budgets and progress display of the [global configuration](crate::config::Config).
///
/// Options can be deserialised from a flat JSON object, for example
/// ```json
/// {"buffer_gb": 0.5, "chunk_shape": [1, 480, 640, 3], "display_progress": true}
/// ```
/// where at most one of `buffer_gb` and `buffer_shape`, and at most one of `chunk_mb` and `chunk_shape`, may be present.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "DataChunkIteratorOptionsJson",
    into = "DataChunkIteratorOptionsJson"
)]
pub struct DataChunkIteratorOptions {
    buffer: BufferSpec,
    chunk: ChunkSpec,
    display_progress: bool,
    progress_description: String,
}

const DEFAULT_PROGRESS_DESCRIPTION: &str = "Writing data";

impl Default for DataChunkIteratorOptions {
    fn default() -> Self {
        let config = global_config();
        Self {
            buffer: BufferSpec::Auto,
            chunk: ChunkSpec::Auto,
            display_progress: config.display_progress(),
            progress_description: DEFAULT_PROGRESS_DESCRIPTION.to_string(),
        }
    }
}

impl DataChunkIteratorOptions {
    /// Set the buffer specification.
    #[must_use]
    pub fn with_buffer(mut self, buffer: BufferSpec) -> Self {
        self.buffer = buffer;
        self
    }

    /// Set the chunk specification.
    #[must_use]
    pub fn with_chunk(mut self, chunk: ChunkSpec) -> Self {
        self.chunk = chunk;
        self
    }

    /// Enable or disable the terminal progress bar.
    ///
    /// This has no effect unless the `progress` feature is enabled.
    #[must_use]
    pub fn with_display_progress(mut self, display_progress: bool) -> Self {
        self.display_progress = display_progress;
        self
    }

    /// Set the label of the terminal progress bar.
    #[must_use]
    pub fn with_progress_description(mut self, description: impl Into<String>) -> Self {
        self.progress_description = description.into();
        self
    }

    /// Return the buffer specification.
    #[must_use]
    pub fn buffer(&self) -> &BufferSpec {
        &self.buffer
    }

    /// Return the chunk specification.
    #[must_use]
    pub fn chunk(&self) -> &ChunkSpec {
        &self.chunk
    }

    /// Returns true if a terminal progress bar is requested.
    #[must_use]
    pub fn display_progress(&self) -> bool {
        self.display_progress
    }

    /// Return the label of the terminal progress bar.
    #[must_use]
    pub fn progress_description(&self) -> &str {
        &self.progress_description
    }

    /// Create the progress reporter requested by these options.
    #[must_use]
    pub fn progress_reporter(&self) -> Box<dyn ProgressReporter> {
        #[cfg(feature = "progress")]
        if self.display_progress {
            return Box::new(crate::progress::BarProgress::new(
                self.progress_description.clone(),
            ));
        }
        Box::new(NoProgress)
    }
}

/// An invalid [`DataChunkIteratorOptions`] error.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DataChunkIteratorOptionsError {
    /// Both a buffer budget and a buffer shape were given.
    #[error("only one of buffer_gb or buffer_shape can be specified")]
    BufferBudgetAndShape,
    /// Both a chunk budget and a chunk shape were given.
    #[error("only one of chunk_mb or chunk_shape can be specified")]
    ChunkBudgetAndShape,
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct DataChunkIteratorOptionsJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    buffer_gb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    buffer_shape: Option<ArrayShape>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    chunk_mb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    chunk_shape: Option<ArrayShape>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    display_progress: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    progress_description: Option<String>,
}

impl TryFrom<DataChunkIteratorOptionsJson> for DataChunkIteratorOptions {
    type Error = DataChunkIteratorOptionsError;

    fn try_from(json: DataChunkIteratorOptionsJson) -> Result<Self, Self::Error> {
        let defaults = Self::default();
        let buffer = match (json.buffer_gb, json.buffer_shape) {
            (Some(_), Some(_)) => return Err(DataChunkIteratorOptionsError::BufferBudgetAndShape),
            (Some(buffer_gb), None) => BufferSpec::BufferGb(buffer_gb),
            (None, Some(buffer_shape)) => BufferSpec::BufferShape(buffer_shape),
            (None, None) => BufferSpec::Auto,
        };
        let chunk = match (json.chunk_mb, json.chunk_shape) {
            (Some(_), Some(_)) => return Err(DataChunkIteratorOptionsError::ChunkBudgetAndShape),
            (Some(chunk_mb), None) => ChunkSpec::ChunkMb(chunk_mb),
            (None, Some(chunk_shape)) => ChunkSpec::ChunkShape(chunk_shape),
            (None, None) => ChunkSpec::Auto,
        };
        Ok(Self {
            buffer,
            chunk,
            display_progress: json.display_progress.unwrap_or(defaults.display_progress),
            progress_description: json
                .progress_description
                .unwrap_or(defaults.progress_description),
        })
    }
}

impl From<DataChunkIteratorOptions> for DataChunkIteratorOptionsJson {
    fn from(options: DataChunkIteratorOptions) -> Self {
        let mut json = Self {
            display_progress: Some(options.display_progress),
            progress_description: Some(options.progress_description),
            ..Default::default()
        };
        match options.buffer {
            BufferSpec::Auto => {}
            BufferSpec::BufferGb(buffer_gb) => json.buffer_gb = Some(buffer_gb),
            BufferSpec::BufferShape(buffer_shape) => json.buffer_shape = Some(buffer_shape),
        }
        match options.chunk {
            ChunkSpec::Auto => {}
            ChunkSpec::ChunkMb(chunk_mb) => json.chunk_mb = Some(chunk_mb),
            ChunkSpec::ChunkShape(chunk_shape) => json.chunk_shape = Some(chunk_shape),
        }
        json
    }
}
