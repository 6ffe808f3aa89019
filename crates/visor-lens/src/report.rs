use std::sync::Arc;

use serde::{Serialize, Serializer};
use tracing::info;
use visor_types::{ChainEpoch, ContentKey, TipSet, TipSetKey};

use crate::instrumented::AccessLog;
use crate::registry::StoreRegistry;

/// Log target for report records.
pub const REPORT_TARGET: &str = "instrumentation";

/// Chain context attached to a report flush.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportWindow {
    pub height: ChainEpoch,
    pub state_root: ContentKey,
    pub tipset: TipSetKey,
}

impl From<&TipSet> for ReportWindow {
    fn from(ts: &TipSet) -> Self {
        Self {
            height: ts.height,
            state_root: ts.parent_state,
            tipset: ts.key.clone(),
        }
    }
}

fn serialize_key<S: Serializer>(key: &ContentKey, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&key.to_hex())
}

/// A key and how many times it was fetched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct KeyCount {
    #[serde(serialize_with = "serialize_key")]
    pub key: ContentKey,
    pub count: u64,
}

/// Access statistics for one instrumented store handle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    pub processor: String,
    pub method: String,
    pub args: String,
    pub total_gets: u64,
    pub unique_gets: u64,
    /// Gets of a key already fetched through the same handle.
    pub redundant_gets: u64,
    /// The most fetched key. Ties go to the key fetched first.
    pub most_requested: Option<KeyCount>,
    /// Up to N most fetched keys, most fetched first, ties in first-fetch order.
    pub hot_keys: Vec<KeyCount>,
}

impl StoreSummary {
    /// Summarize a log. `hot_keys` bounds the length of the hot-key list.
    pub fn from_log(log: &AccessLog, hot_keys: usize) -> Self {
        let counts = log.snapshot();
        let total_gets: u64 = counts.iter().map(|(_, n)| n).sum();
        let unique_gets = counts.len() as u64;

        let mut most_requested: Option<KeyCount> = None;
        for &(key, count) in &counts {
            if most_requested.map_or(true, |best| count > best.count) {
                most_requested = Some(KeyCount { key, count });
            }
        }

        let mut ranked = counts;
        // Stable sort keeps first-fetch order among equal counts.
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(hot_keys);

        let label = log.label();
        Self {
            processor: label.processor.clone(),
            method: label.method.clone(),
            args: label.context.to_string(),
            total_gets,
            unique_gets,
            redundant_gets: total_gets - unique_gets,
            most_requested,
            hot_keys: ranked
                .into_iter()
                .map(|(key, count)| KeyCount { key, count })
                .collect(),
        }
    }

    pub fn most_requested_count(&self) -> u64 {
        self.most_requested.map_or(0, |k| k.count)
    }
}

/// Drains a [`StoreRegistry`] and logs one record per drained store.
///
/// Reporting is driven by the caller, typically once per processed tipset.
#[derive(Clone, Debug)]
pub struct Reporter {
    registry: Arc<StoreRegistry>,
    hot_keys: usize,
}

impl Reporter {
    pub fn new(registry: Arc<StoreRegistry>) -> Self {
        Self {
            registry,
            hot_keys: 0,
        }
    }

    /// List up to `n` hot keys in each summary.
    pub fn with_hot_keys(mut self, n: usize) -> Self {
        self.hot_keys = n;
        self
    }

    /// Close the current window: drain the registry, log a header record
    /// (when `window` is given) and one record per store, and return the
    /// summaries. Never fails.
    pub fn report(&self, window: Option<&ReportWindow>) -> Vec<StoreSummary> {
        let logs = self.registry.drain_and_clear();

        if let Some(w) = window {
            info!(
                target: REPORT_TARGET,
                height = w.height,
                state_root = %w.state_root,
                tipset = %w.tipset,
                stores = logs.len(),
                "instrumented store report"
            );
        }

        logs.iter()
            .map(|log| {
                let summary = StoreSummary::from_log(log, self.hot_keys);
                emit(&summary);
                summary
            })
            .collect()
    }
}

fn emit(summary: &StoreSummary) {
    let most_requested_key = summary
        .most_requested
        .map_or_else(|| ContentKey::undef().to_string(), |k| k.key.to_string());
    let hot_keys: Vec<String> = summary
        .hot_keys
        .iter()
        .map(|k| format!("{}={}", k.key.short_hex(), k.count))
        .collect();
    info!(
        target: REPORT_TARGET,
        processor = %summary.processor,
        method = %summary.method,
        args = %summary.args,
        total_gets = summary.total_gets,
        unique_gets = summary.unique_gets,
        redundant_gets = summary.redundant_gets,
        most_requested_count = summary.most_requested_count(),
        most_requested_key = %most_requested_key,
        hot_keys = ?hot_keys,
        "InstrumentedStore"
    );
}
