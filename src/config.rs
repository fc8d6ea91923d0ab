//! `nwbconv` global configuration options.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::dataset::Compression;

/// Global configuration options for the nwbconv crate.
///
/// Retrieve the global [`Config`] with [`global_config`] and modify it with [`global_config_mut`].
///
/// A [`Config`] can also be deserialised from JSON, with missing fields taking their defaults, and installed with [`Config::install`].
///
/// # Iteration Configuration Options
///
/// ## Default Buffer GB
/// > default: `1.0`
///
/// The memory budget (in gigabytes, 1e9 bytes) of one iteration step when a
/// [`DataChunkIterator`](crate::data_chunk_iterator::DataChunkIterator) is created without an explicit buffer shape.
///
/// ## Default Chunk MB
/// > default: `1.0`
///
/// The memory budget (in megabytes, 1e6 bytes) of one stored chunk when neither the caller nor the source supplies a chunk shape.
///
/// ## Display Progress
/// > default: [`false`]
///
/// If enabled, iterators created from [`DataChunkIteratorOptions::default`](crate::data_chunk_iterator::DataChunkIteratorOptions::default) report progress to a terminal progress bar.
///
/// ## Stub Frame Count
/// > default: `10`
///
/// The number of frames exposed by movie sources opened in stub mode.
///
/// # Writer Configuration Options
///
/// ## Default Compression
/// > default: gzip, level 4 (if the `gzip` feature is enabled)
///
/// The compression applied by the NWB series writers when none is requested.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    buffer_gb: f64,
    chunk_mb: f64,
    display_progress: bool,
    stub_frame_count: u64,
    compression: Compression,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            buffer_gb: 1.0,
            chunk_mb: 1.0,
            display_progress: false,
            stub_frame_count: 10,
            compression: Compression::default(),
        }
    }
}

impl Config {
    /// Get the [default buffer GB](#default-buffer-gb) configuration.
    #[must_use]
    pub fn buffer_gb(&self) -> f64 {
        self.buffer_gb
    }

    /// Set the [default buffer GB](#default-buffer-gb) configuration.
    pub fn set_buffer_gb(&mut self, buffer_gb: f64) {
        self.buffer_gb = buffer_gb;
    }

    /// Get the [default chunk MB](#default-chunk-mb) configuration.
    #[must_use]
    pub fn chunk_mb(&self) -> f64 {
        self.chunk_mb
    }

    /// Set the [default chunk MB](#default-chunk-mb) configuration.
    pub fn set_chunk_mb(&mut self, chunk_mb: f64) {
        self.chunk_mb = chunk_mb;
    }

    /// Get the [display progress](#display-progress) configuration.
    #[must_use]
    pub fn display_progress(&self) -> bool {
        self.display_progress
    }

    /// Set the [display progress](#display-progress) configuration.
    pub fn set_display_progress(&mut self, display_progress: bool) {
        self.display_progress = display_progress;
    }

    /// Get the [stub frame count](#stub-frame-count) configuration.
    #[must_use]
    pub fn stub_frame_count(&self) -> u64 {
        self.stub_frame_count
    }

    /// Set the [stub frame count](#stub-frame-count) configuration.
    pub fn set_stub_frame_count(&mut self, stub_frame_count: u64) {
        self.stub_frame_count = stub_frame_count;
    }

    /// Get the [default compression](#default-compression) configuration.
    #[must_use]
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Set the [default compression](#default-compression) configuration.
    pub fn set_compression(&mut self, compression: Compression) {
        self.compression = compression;
    }

    /// Parse a configuration from a JSON string.
    ///
    /// # Errors
    /// Returns a [`serde_json::Error`] if `json` is not a valid configuration.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Replace the global configuration with this configuration.
    pub fn install(self) {
        *global_config_mut() = self;
    }
}

static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// Returns a reference to the global nwbconv configuration.
///
/// This might deadlock if the global config is already mutably held by the current thread.
pub fn global_config() -> RwLockReadGuard<'static, Config> {
    CONFIG.get_or_init(|| RwLock::new(Config::default())).read()
}

/// Returns a mutable reference to the global nwbconv configuration.
///
/// This might deadlock if the global config is already held by the current thread.
pub fn global_config_mut() -> RwLockWriteGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .write()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_display_progress() {
        assert!(!global_config().display_progress());
        global_config_mut().set_display_progress(true);
        assert!(global_config().display_progress());
        global_config_mut().set_display_progress(false);
    }

    #[test]
    fn config_from_json_partial() {
        let config = Config::from_json(r#"{"buffer_gb": 0.25, "display_progress": true}"#).unwrap();
        assert_eq!(config.buffer_gb(), 0.25);
        assert!(config.display_progress());
        assert_eq!(config.chunk_mb(), 1.0);
        assert_eq!(config.stub_frame_count(), 10);
    }

    #[test]
    fn config_from_json_invalid() {
        assert!(Config::from_json(r#"{"buffer_gb": "large"}"#).is_err());
    }
}
