//! Key-value storage for chunked datasets.
//!
//! A [store] maps [`StoreKey`]s to byte values.
//! Datasets and groups live at node paths such as `/acquisition/ElectricalSeries/data`.
//! The node at path `/a/b` stores its metadata at key `a/b/zarr.json` and its chunks at keys `a/b/c/{i}/{j}/...`.

mod storage_sync;
pub mod store;
mod store_key;
mod store_prefix;

use itertools::Itertools;
use thiserror::Error;

pub use store_key::{StoreKey, StoreKeyError, StoreKeys};
pub use store_prefix::{StorePrefix, StorePrefixError};

pub use self::storage_sync::{
    ListableStorageTraits, ReadableStorageTraits, ReadableWritableStorageTraits,
    WritableStorageTraits,
};

/// The bytes of a store value.
pub type Bytes = Vec<u8>;

/// Store value bytes, or [`None`] if the key does not exist.
pub type MaybeBytes = Option<Bytes>;

/// The name of the metadata document of a node.
pub const METADATA_NAME: &str = "zarr.json";

/// A storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A write operation was attempted on a read only store.
    #[error("a write operation was attempted on a read only store")]
    ReadOnly,
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// An invalid store key.
    #[error(transparent)]
    InvalidStoreKey(#[from] StoreKeyError),
    /// An invalid store prefix.
    #[error(transparent)]
    InvalidStorePrefix(#[from] StorePrefixError),
    /// An invalid node path.
    #[error("invalid node path {0}")]
    InvalidNodePath(String),
    /// Any other error.
    #[error("{0}")]
    Other(String),
}

/// Validate a node path.
///
/// A node path is `/` or a `/` prefixed sequence of non-empty `/` separated names.
///
/// # Errors
/// Returns [`StorageError::InvalidNodePath`] if `path` is not a valid node path.
pub fn validate_node_path(path: &str) -> Result<(), StorageError> {
    if path == "/"
        || (path.starts_with('/') && path[1..].split('/').all(|name| !name.is_empty()))
    {
        Ok(())
    } else {
        Err(StorageError::InvalidNodePath(path.to_string()))
    }
}

/// Return the store prefix of the node at `path`.
///
/// # Errors
/// Returns [`StorageError::InvalidNodePath`] if `path` is not a valid node path.
pub fn node_prefix(path: &str) -> Result<StorePrefix, StorageError> {
    validate_node_path(path)?;
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        Ok(StorePrefix::root())
    } else {
        Ok(StorePrefix::new(path.to_string() + "/")?)
    }
}

/// Return the metadata key of the node at `path`.
///
/// # Errors
/// Returns [`StorageError::InvalidNodePath`] if `path` is not a valid node path.
pub fn meta_key(path: &str) -> Result<StoreKey, StorageError> {
    Ok(StoreKey::new(node_prefix(path)?.as_str().to_string() + METADATA_NAME)?)
}

/// Return the key of the chunk at `chunk_indices` of the dataset at `path`.
///
/// # Errors
/// Returns [`StorageError::InvalidNodePath`] if `path` is not a valid node path.
pub fn data_key(path: &str, chunk_indices: &[u64]) -> Result<StoreKey, StorageError> {
    let prefix = node_prefix(path)?;
    let key = if chunk_indices.is_empty() {
        format!("{}c", prefix.as_str())
    } else {
        format!("{}c/{}", prefix.as_str(), chunk_indices.iter().join("/"))
    };
    Ok(StoreKey::new(key)?)
}

/// Returns true if a node exists at `path`.
///
/// # Errors
/// Returns a [`StorageError`] if there is an underlying error with the store.
pub fn node_exists<TStorage: ?Sized + ReadableStorageTraits>(
    storage: &TStorage,
    path: &str,
) -> Result<bool, StorageError> {
    Ok(storage.get(&meta_key(path)?)?.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_keys() {
        assert_eq!(meta_key("/").unwrap().as_str(), "zarr.json");
        assert_eq!(meta_key("/a/b").unwrap().as_str(), "a/b/zarr.json");
        assert_eq!(data_key("/a", &[1, 20]).unwrap().as_str(), "a/c/1/20");
        assert_eq!(data_key("/", &[0]).unwrap().as_str(), "c/0");
        assert!(meta_key("a").is_err());
        assert!(meta_key("/a/").is_err());
        assert!(meta_key("/a//b").is_err());
    }
}
