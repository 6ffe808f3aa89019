use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use visor_store::{ContentStore, StoreContext, StoreResult};
use visor_types::ContentKey;

use crate::registry::StoreRegistry;

/// Identifying context attached to an instrumented store handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallContext {
    /// Free-form call arguments, rendered as `[a b c]`.
    Args(Vec<String>),
    /// A single pre-formatted identifier, rendered as-is.
    Id(String),
}

impl fmt::Display for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Args(args) => write!(f, "[{}]", args.join(" ")),
            Self::Id(id) => f.write_str(id),
        }
    }
}

/// Who is reading: the processor, the method within it, and what it was
/// called with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreLabel {
    pub processor: String,
    pub method: String,
    pub context: CallContext,
}

impl StoreLabel {
    pub fn with_args<I>(processor: impl Into<String>, method: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: fmt::Display,
    {
        Self {
            processor: processor.into(),
            method: method.into(),
            context: CallContext::Args(args.into_iter().map(|a| a.to_string()).collect()),
        }
    }

    pub fn with_id(
        processor: impl Into<String>,
        method: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            processor: processor.into(),
            method: method.into(),
            context: CallContext::Id(id.into()),
        }
    }
}

impl fmt::Display for StoreLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {}", self.processor, self.method, self.context)
    }
}

#[derive(Clone, Copy, Debug)]
struct KeyTally {
    count: u64,
    /// Position of this key's first get among all distinct keys.
    first_seen: usize,
}

#[derive(Debug, Default)]
struct GetTally {
    keys: HashMap<ContentKey, KeyTally>,
}

/// Per-key get counts for one instrumented store handle.
///
/// Counts only grow. The owning operation is the only writer; the lock is
/// uncontended except while a report takes a snapshot.
#[derive(Debug)]
pub struct AccessLog {
    label: StoreLabel,
    gets: Mutex<GetTally>,
}

impl AccessLog {
    pub fn new(label: StoreLabel) -> Self {
        Self {
            label,
            gets: Mutex::new(GetTally::default()),
        }
    }

    pub fn label(&self) -> &StoreLabel {
        &self.label
    }

    /// Count one get of `key`.
    pub fn record_get(&self, key: ContentKey) {
        let mut gets = self.gets.lock().expect("access log poisoned");
        let first_seen = gets.keys.len();
        gets.keys
            .entry(key)
            .or_insert(KeyTally {
                count: 0,
                first_seen,
            })
            .count += 1;
    }

    /// Sum of the per-key counts.
    pub fn total_gets(&self) -> u64 {
        self.gets
            .lock()
            .expect("access log poisoned")
            .keys
            .values()
            .map(|t| t.count)
            .sum()
    }

    pub fn unique_gets(&self) -> usize {
        self.gets.lock().expect("access log poisoned").keys.len()
    }

    pub fn count_for(&self, key: &ContentKey) -> u64 {
        self.gets
            .lock()
            .expect("access log poisoned")
            .keys
            .get(key)
            .map_or(0, |t| t.count)
    }

    /// Copy out `(key, count)` pairs in order of each key's first get.
    pub fn snapshot(&self) -> Vec<(ContentKey, u64)> {
        let mut tallies: Vec<(ContentKey, KeyTally)> = {
            let gets = self.gets.lock().expect("access log poisoned");
            gets.keys.iter().map(|(k, t)| (*k, *t)).collect()
        };
        tallies.sort_by_key(|(_, t)| t.first_seen);
        tallies.into_iter().map(|(k, t)| (k, t.count)).collect()
    }
}

/// A [`ContentStore`] decorator that counts every get by key.
///
/// Each get is counted before it is forwarded, so the count reflects
/// attempts: a get that fails, is cancelled, or times out is still counted.
/// Puts are forwarded untouched. The caller's [`StoreContext`] is passed
/// through unchanged.
///
/// One handle belongs to one unit of work. Create a new handle per
/// operation rather than sharing one across concurrent callers.
pub struct InstrumentedStore<S = Arc<dyn ContentStore>> {
    inner: S,
    log: Arc<AccessLog>,
}

impl<S: ContentStore> InstrumentedStore<S> {
    /// Wrap `inner` and register the new access log with `registry`.
    pub fn new(inner: S, label: StoreLabel, registry: &StoreRegistry) -> Self {
        let log = Arc::new(AccessLog::new(label));
        registry.register(Arc::clone(&log));
        Self { inner, log }
    }

    pub fn label(&self) -> &StoreLabel {
        self.log.label()
    }

    pub fn access_log(&self) -> &Arc<AccessLog> {
        &self.log
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: ContentStore> ContentStore for InstrumentedStore<S> {
    async fn get(&self, ctx: &StoreContext, key: &ContentKey) -> StoreResult<Vec<u8>> {
        self.log.record_get(*key);
        self.inner.get(ctx, key).await
    }

    async fn put(&self, ctx: &StoreContext, value: Vec<u8>) -> StoreResult<ContentKey> {
        self.inner.put(ctx, value).await
    }

    fn context(&self) -> StoreContext {
        self.inner.context()
    }
}

impl<S> fmt::Debug for InstrumentedStore<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentedStore")
            .field("label", &self.log.label)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use visor_store::{ContentStoreExt, InMemoryContentStore, StoreError};

    fn key(n: u8) -> ContentKey {
        ContentKey::from_digest([n; 32])
    }

    /// Fails every get and counts how often it was asked.
    #[derive(Default)]
    struct FailingStore {
        gets: AtomicUsize,
    }

    #[async_trait]
    impl ContentStore for FailingStore {
        async fn get(&self, _ctx: &StoreContext, key: &ContentKey) -> StoreResult<Vec<u8>> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::NotFound(*key))
        }

        async fn put(&self, _ctx: &StoreContext, value: Vec<u8>) -> StoreResult<ContentKey> {
            Ok(ContentKey::for_content(&value))
        }

        fn context(&self) -> StoreContext {
            StoreContext::background()
        }
    }

    /// Blocks every get for a long time, honouring the caller's context.
    struct SlowStore;

    #[async_trait]
    impl ContentStore for SlowStore {
        async fn get(&self, ctx: &StoreContext, _key: &ContentKey) -> StoreResult<Vec<u8>> {
            ctx.run(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(Vec::new())
            })
            .await
        }

        async fn put(&self, ctx: &StoreContext, value: Vec<u8>) -> StoreResult<ContentKey> {
            ctx.check()?;
            Ok(ContentKey::for_content(&value))
        }

        fn context(&self) -> StoreContext {
            StoreContext::background()
        }
    }

    fn wrap<S: ContentStore>(inner: S) -> (InstrumentedStore<S>, StoreRegistry) {
        let registry = StoreRegistry::new();
        let store = InstrumentedStore::new(
            inner,
            StoreLabel::with_args("miner", "extract_info", ["f01000"]),
            &registry,
        );
        (store, registry)
    }

    #[test]
    fn call_context_rendering() {
        let args = CallContext::Args(vec!["f01000".into(), "42".into()]);
        assert_eq!(args.to_string(), "[f01000 42]");
        assert_eq!(CallContext::Args(vec![]).to_string(), "[]");
        assert_eq!(CallContext::Id("f01000@42".into()).to_string(), "f01000@42");
    }

    #[test]
    fn label_constructors() {
        let by_args = StoreLabel::with_args("market", "deals", [1, 2]);
        assert_eq!(by_args.context, CallContext::Args(vec!["1".into(), "2".into()]));
        let by_id = StoreLabel::with_id("power", "claims", "f01234");
        assert_eq!(by_id.to_string(), "power/claims f01234");
    }

    #[test]
    fn access_log_counts_and_orders() {
        let log = AccessLog::new(StoreLabel::with_id("p", "m", "id"));
        for k in [3, 1, 3, 2, 1, 3] {
            log.record_get(key(k));
        }
        assert_eq!(log.total_gets(), 6);
        assert_eq!(log.unique_gets(), 3);
        assert_eq!(log.count_for(&key(3)), 3);
        assert_eq!(log.count_for(&key(9)), 0);
        assert_eq!(
            log.snapshot(),
            vec![(key(3), 3), (key(1), 2), (key(2), 1)]
        );
    }

    proptest! {
        #[test]
        fn total_matches_per_key_counts(gets in proptest::collection::vec(0u8..8, 0..64)) {
            let log = AccessLog::new(StoreLabel::with_id("p", "m", "id"));
            for k in &gets {
                log.record_get(key(*k));
            }
            let summed: u64 = log.snapshot().iter().map(|(_, n)| n).sum();
            prop_assert_eq!(log.total_gets(), gets.len() as u64);
            prop_assert_eq!(log.total_gets(), summed);
        }
    }

    #[tokio::test]
    async fn get_counts_and_forwards() {
        let backing = InMemoryContentStore::new();
        let ctx = StoreContext::background();
        let k = backing.put(&ctx, b"state".to_vec()).await.unwrap();
        let (store, registry) = wrap(backing);

        assert_eq!(store.get(&ctx, &k).await.unwrap(), b"state");
        assert_eq!(store.get(&ctx, &k).await.unwrap(), b"state");
        assert_eq!(store.access_log().count_for(&k), 2);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn failed_get_still_counts_once() {
        let (store, _registry) = wrap(FailingStore::default());
        let ctx = StoreContext::background();
        let err = store.get(&ctx, &key(7)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(k) if k == key(7)));
        assert_eq!(store.access_log().count_for(&key(7)), 1);
        assert_eq!(store.access_log().total_gets(), 1);
        assert_eq!(store.inner().gets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn puts_are_not_counted() {
        let (store, _registry) = wrap(InMemoryContentStore::new());
        let ctx = StoreContext::background();
        let k = store.put(&ctx, b"a".to_vec()).await.unwrap();
        store.put_encoded(&ctx, &42u64).await.unwrap();
        assert_eq!(store.access_log().total_gets(), 0);
        assert!(store.inner().contains(&k));
    }

    #[tokio::test]
    async fn typed_get_counts_one_access() {
        let (store, _registry) = wrap(InMemoryContentStore::new());
        let ctx = StoreContext::background();
        let k = store.put_encoded(&ctx, &String::from("worker")).await.unwrap();
        let v: String = store.get_decoded(&ctx, &k).await.unwrap();
        assert_eq!(v, "worker");
        assert_eq!(store.access_log().total_gets(), 1);
    }

    #[tokio::test]
    async fn caller_cancellation_reaches_inner_store() {
        let (store, _registry) = wrap(SlowStore);
        let store = Arc::new(store);
        let (ctx, handle) = StoreContext::cancellable();

        let task = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.get(&ctx, &key(1)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();

        let result = task.await.expect("task should not panic");
        assert!(matches!(result, Err(StoreError::Cancelled)));
        assert_eq!(store.access_log().count_for(&key(1)), 1);
    }

    #[tokio::test]
    async fn caller_deadline_reaches_inner_store() {
        let (store, _registry) = wrap(SlowStore);
        let ctx = StoreContext::background().with_timeout(Duration::from_millis(10));
        let result = store.get(&ctx, &key(2)).await;
        assert!(matches!(result, Err(StoreError::DeadlineExceeded)));
        assert_eq!(store.access_log().total_gets(), 1);
    }

    #[tokio::test]
    async fn cancelled_put_is_relayed() {
        let (store, _registry) = wrap(SlowStore);
        let (ctx, handle) = StoreContext::cancellable();
        handle.cancel();
        assert!(matches!(
            store.put(&ctx, b"x".to_vec()).await,
            Err(StoreError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn context_comes_from_inner_store() {
        let (base, handle) = StoreContext::cancellable();
        let (store, _registry) = wrap(InMemoryContentStore::with_context(base));
        let ctx = store.context();
        assert!(ctx.is_cancellable());
        handle.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn debug_shows_label() {
        let (store, _registry) = wrap(InMemoryContentStore::new());
        let debug = format!("{store:?}");
        assert!(debug.contains("InstrumentedStore"));
        assert!(debug.contains("extract_info"));
    }
}
