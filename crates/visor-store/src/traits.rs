use std::sync::Arc;

use async_trait::async_trait;
use visor_types::ContentKey;

use crate::context::StoreContext;
use crate::error::StoreResult;

/// Content-addressed key/value store.
///
/// All implementations must satisfy these invariants:
/// - Values are immutable once written: the same bytes always produce the
///   same key, and `put` of existing content is a no-op returning that key.
/// - The caller's [`StoreContext`] governs cancellation and deadlines.
///   Implementations must not substitute a context of their own.
/// - Errors are returned to the caller, never silently ignored.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Fetch the serialized value stored under `key`.
    ///
    /// Returns [`StoreError::NotFound`](crate::StoreError::NotFound) if no
    /// value exists.
    async fn get(&self, ctx: &StoreContext, key: &ContentKey) -> StoreResult<Vec<u8>>;

    /// Store a serialized value and return its content key.
    async fn put(&self, ctx: &StoreContext, value: Vec<u8>) -> StoreResult<ContentKey>;

    /// The context this store was opened with, for callers that have no
    /// request context of their own.
    fn context(&self) -> StoreContext;
}

#[async_trait]
impl<T: ContentStore + ?Sized> ContentStore for Arc<T> {
    async fn get(&self, ctx: &StoreContext, key: &ContentKey) -> StoreResult<Vec<u8>> {
        (**self).get(ctx, key).await
    }

    async fn put(&self, ctx: &StoreContext, value: Vec<u8>) -> StoreResult<ContentKey> {
        (**self).put(ctx, value).await
    }

    fn context(&self) -> StoreContext {
        (**self).context()
    }
}
