use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;
use visor_types::ContentKey;

use crate::context::StoreContext;
use crate::error::{StoreError, StoreResult};
use crate::traits::ContentStore;

/// In-memory, HashMap-based content store.
///
/// Intended for tests and embedding. Values are held behind a `RwLock` for
/// safe concurrent access and cloned on read/write. Every operation checks
/// the caller's context before touching the map.
pub struct InMemoryContentStore {
    values: RwLock<HashMap<ContentKey, Vec<u8>>>,
    base: StoreContext,
}

impl InMemoryContentStore {
    /// Create a new empty store whose own context is the background context.
    pub fn new() -> Self {
        Self::with_context(StoreContext::background())
    }

    /// Create a new empty store that reports `base` from [`ContentStore::context`].
    pub fn with_context(base: StoreContext) -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            base,
        }
    }

    /// Number of values currently stored.
    pub fn len(&self) -> usize {
        self.values.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.values.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored values.
    pub fn total_bytes(&self) -> u64 {
        self.values
            .read()
            .expect("lock poisoned")
            .values()
            .map(|v| v.len() as u64)
            .sum()
    }

    /// Returns `true` if a value is stored under `key`.
    pub fn contains(&self, key: &ContentKey) -> bool {
        self.values.read().expect("lock poisoned").contains_key(key)
    }

    /// Return a sorted list of all keys in the store.
    pub fn keys(&self) -> Vec<ContentKey> {
        let map = self.values.read().expect("lock poisoned");
        let mut keys: Vec<ContentKey> = map.keys().copied().collect();
        keys.sort();
        keys
    }
}

impl Default for InMemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn get(&self, ctx: &StoreContext, key: &ContentKey) -> StoreResult<Vec<u8>> {
        ctx.check()?;
        let map = self.values.read().expect("lock poisoned");
        map.get(key).cloned().ok_or(StoreError::NotFound(*key))
    }

    async fn put(&self, ctx: &StoreContext, value: Vec<u8>) -> StoreResult<ContentKey> {
        ctx.check()?;
        let key = ContentKey::for_content(&value);
        let mut map = self.values.write().expect("lock poisoned");
        // Idempotent: the same key always maps to the same content.
        if !map.contains_key(&key) {
            debug!(key = %key.short_hex(), len = value.len(), "stored value");
            map.insert(key, value);
        }
        Ok(key)
    }

    fn context(&self) -> StoreContext {
        self.base.clone()
    }
}

impl std::fmt::Debug for InMemoryContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len();
        f.debug_struct("InMemoryContentStore")
            .field("value_count", &count)
            .finish()
    }
}
