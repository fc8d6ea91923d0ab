//! A filesystem store.

use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
};

use thiserror::Error;
use walkdir::WalkDir;

use crate::storage::{
    ListableStorageTraits, MaybeBytes, ReadableStorageTraits, StorageError, StoreKey,
    StoreKeyError, StoreKeys, StorePrefix, WritableStorageTraits,
};

/// A file system store.
///
/// Each key is a file under the base directory, with `/` separated key components mapped to directories.
#[derive(Debug)]
pub struct FilesystemStore {
    base_directory: PathBuf,
    readonly: bool,
}

impl FilesystemStore {
    /// Create a new file system store at a given `base_directory`.
    /// The base directory will be created if it does not exist.
    ///
    /// # Errors
    /// Returns a [`FilesystemStoreCreateError`] if `base_directory`:
    ///   - is not valid, or
    ///   - it points to an existing file rather than a directory.
    pub fn new<P: AsRef<Path>>(
        base_directory: P,
    ) -> Result<FilesystemStore, FilesystemStoreCreateError> {
        let base_directory = base_directory.as_ref().to_path_buf();
        if base_directory.to_str().is_none() {
            return Err(FilesystemStoreCreateError::InvalidBaseDirectory(
                base_directory,
            ));
        }
        if base_directory.is_file() {
            return Err(FilesystemStoreCreateError::ExistingFile(base_directory));
        }
        let readonly = if base_directory.is_dir() {
            // the directory already exists, check if it is read only
            let md = std::fs::metadata(&base_directory)?;
            md.permissions().readonly()
        } else {
            // base directory does not exist, so create it. If this succeeds, the filesystem is not read only
            std::fs::create_dir_all(&base_directory)?;
            false
        };
        Ok(FilesystemStore {
            base_directory,
            readonly,
        })
    }

    /// Maps a [`StoreKey`] to a filesystem [`PathBuf`].
    #[must_use]
    pub fn key_to_fspath(&self, key: &StoreKey) -> PathBuf {
        let mut path = self.base_directory.clone();
        path.extend(key.as_str().split('/'));
        path
    }

    fn prefix_to_fspath(&self, prefix: &StorePrefix) -> PathBuf {
        let mut path = self.base_directory.clone();
        path.extend(prefix.as_str().split('/').filter(|name| !name.is_empty()));
        path
    }

    fn fspath_to_key(&self, path: &Path) -> Result<StoreKey, StoreKeyError> {
        let relative = path
            .strip_prefix(&self.base_directory)
            .ok()
            .and_then(|relative| {
                relative
                    .components()
                    .map(|component| component.as_os_str().to_str())
                    .collect::<Option<Vec<_>>>()
            })
            .ok_or_else(|| StoreKeyError::from(path.to_string_lossy().to_string()))?;
        StoreKey::new(relative.join("/"))
    }

    fn list_directory(&self, directory: &Path) -> StoreKeys {
        WalkDir::new(directory)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| self.fspath_to_key(entry.path()).ok())
            .collect()
    }
}

impl ReadableStorageTraits for FilesystemStore {
    fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StorageError> {
        match std::fs::read(self.key_to_fspath(key)) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

impl WritableStorageTraits for FilesystemStore {
    fn set(&self, key: &StoreKey, value: &[u8]) -> Result<(), StorageError> {
        if self.readonly {
            return Err(StorageError::ReadOnly);
        }
        let key_path = self.key_to_fspath(key);

        // Create directories
        if let Some(parent) = key_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = File::create(key_path)?;
        file.write_all(value)?;
        Ok(())
    }
}

impl ListableStorageTraits for FilesystemStore {
    fn list(&self) -> Result<StoreKeys, StorageError> {
        Ok(self.list_directory(&self.base_directory))
    }

    fn list_prefix(&self, prefix: &StorePrefix) -> Result<StoreKeys, StorageError> {
        Ok(self.list_directory(&self.prefix_to_fspath(prefix)))
    }
}

/// A filesystem store creation error.
#[derive(Debug, Error)]
pub enum FilesystemStoreCreateError {
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// Base directory is an existing file.
    #[error("{0} is an existing file")]
    ExistingFile(PathBuf),
    /// The path is not valid on this system.
    #[error("base directory {0} is not valid")]
    InvalidBaseDirectory(PathBuf),
}
