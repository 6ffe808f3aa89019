use std::fmt;
use std::sync::{Arc, Mutex};

use visor_store::ContentStore;

use crate::instrumented::{AccessLog, InstrumentedStore, StoreLabel};

/// Collects the access log of every instrumented store created since the
/// last report.
///
/// One registry is shared by everything the orchestrator runs; it is passed
/// explicitly to each wrap call. The lock covers only the list itself:
/// registering and draining are a push and a swap, and all summarizing
/// happens on the drained snapshot after the lock is released.
#[derive(Default)]
pub struct StoreRegistry {
    logs: Mutex<Vec<Arc<AccessLog>>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an access log to the current window.
    pub fn register(&self, log: Arc<AccessLog>) {
        self.logs.lock().expect("registry lock poisoned").push(log);
    }

    /// Take every log registered so far and leave the registry empty.
    ///
    /// Logs registered after the swap belong to the next window.
    pub fn drain_and_clear(&self) -> Vec<Arc<AccessLog>> {
        std::mem::take(&mut *self.logs.lock().expect("registry lock poisoned"))
    }

    /// Number of logs in the current window.
    pub fn len(&self) -> usize {
        self.logs.lock().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wrap `store` for one unit of work, labelled with free-form arguments.
    pub fn instrument<S, I>(
        &self,
        store: S,
        processor: impl Into<String>,
        method: impl Into<String>,
        args: I,
    ) -> InstrumentedStore<S>
    where
        S: ContentStore,
        I: IntoIterator,
        I::Item: fmt::Display,
    {
        InstrumentedStore::new(store, StoreLabel::with_args(processor, method, args), self)
    }

    /// Wrap `store` for one unit of work, labelled with a single identifier.
    pub fn instrument_with_id<S>(
        &self,
        store: S,
        processor: impl Into<String>,
        method: impl Into<String>,
        id: impl Into<String>,
    ) -> InstrumentedStore<S>
    where
        S: ContentStore,
    {
        InstrumentedStore::new(store, StoreLabel::with_id(processor, method, id), self)
    }
}

impl fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("registered", &self.len())
            .finish()
    }
}
