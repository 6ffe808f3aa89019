use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use visor_types::ContentKey;

use crate::context::StoreContext;
use crate::error::{StoreError, StoreResult};
use crate::traits::ContentStore;

/// Typed access on top of any [`ContentStore`].
///
/// Values are encoded with `bincode`. The decode happens after the raw `get`
/// returns, so decorators see exactly one `get` per typed read.
#[async_trait]
pub trait ContentStoreExt: ContentStore {
    /// Fetch and decode the value stored under `key`.
    async fn get_decoded<T>(&self, ctx: &StoreContext, key: &ContentKey) -> StoreResult<T>
    where
        T: DeserializeOwned + Send,
    {
        let bytes = self.get(ctx, key).await?;
        bincode::deserialize(&bytes).map_err(|e| StoreError::Decode {
            key: *key,
            reason: e.to_string(),
        })
    }

    /// Encode and store `value`, returning its content key.
    async fn put_encoded<T>(&self, ctx: &StoreContext, value: &T) -> StoreResult<ContentKey>
    where
        T: Serialize + Sync,
    {
        let bytes = bincode::serialize(value).map_err(|e| StoreError::Encode(e.to_string()))?;
        self.put(ctx, bytes).await
    }
}

impl<S: ContentStore + ?Sized> ContentStoreExt for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryContentStore;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct ActorHead {
        code: String,
        nonce: u64,
        balance: u64,
    }

    #[tokio::test]
    async fn typed_values_survive_the_store() {
        let store = InMemoryContentStore::new();
        let ctx = StoreContext::background();
        let head = ActorHead {
            code: "storageminer".into(),
            nonce: 3,
            balance: 1_000,
        };
        let key = store.put_encoded(&ctx, &head).await.unwrap();
        let back: ActorHead = store.get_decoded(&ctx, &key).await.unwrap();
        assert_eq!(back, head);
    }

    #[tokio::test]
    async fn decode_failure_names_the_key() {
        let store = InMemoryContentStore::new();
        let ctx = StoreContext::background();
        let key = store.put(&ctx, vec![1]).await.unwrap();
        let err = store.get_decoded::<ActorHead>(&ctx, &key).await.unwrap_err();
        match err {
            StoreError::Decode { key: failed, .. } => assert_eq!(failed, key),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let store = InMemoryContentStore::new();
        let ctx = StoreContext::background();
        let key = ContentKey::for_content(b"absent");
        let err = store.get_decoded::<u64>(&ctx, &key).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(k) if k == key));
    }
}
