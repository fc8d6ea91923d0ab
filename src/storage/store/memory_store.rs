//! An in-memory store.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::storage::{
    ListableStorageTraits, MaybeBytes, ReadableStorageTraits, StorageError, StoreKey, StoreKeys,
    StorePrefix, WritableStorageTraits,
};

/// An in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data_map: RwLock<BTreeMap<StoreKey, Vec<u8>>>,
}

impl MemoryStore {
    /// Create a new memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReadableStorageTraits for MemoryStore {
    fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StorageError> {
        Ok(self.data_map.read().get(key).cloned())
    }
}

impl WritableStorageTraits for MemoryStore {
    fn set(&self, key: &StoreKey, value: &[u8]) -> Result<(), StorageError> {
        self.data_map.write().insert(key.clone(), value.to_vec());
        Ok(())
    }
}

impl ListableStorageTraits for MemoryStore {
    fn list(&self) -> Result<StoreKeys, StorageError> {
        Ok(self.data_map.read().keys().cloned().collect())
    }

    fn list_prefix(&self, prefix: &StorePrefix) -> Result<StoreKeys, StorageError> {
        Ok(self
            .data_map
            .read()
            .keys()
            .filter(|key| key.has_prefix(prefix))
            .cloned()
            .collect())
    }
}
