use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, Instrument};
use visor_store::StoreContext;
use visor_types::ChainEpoch;

use crate::batch::{Persistable, StorageBatch, TableSpec};
use crate::error::ModelResult;

/// Snapshot of a storage miner's info at one height and state root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerInfo {
    pub height: ChainEpoch,
    pub miner_id: String,
    pub state_root: String,

    pub owner_id: String,
    pub worker_id: String,

    /// Pending worker key, empty when no change is scheduled.
    pub new_worker: String,
    pub worker_change_epoch: ChainEpoch,

    pub consensus_faulted_elapsed: ChainEpoch,

    pub peer_id: String,
    pub control_addresses: Vec<String>,
    pub multi_addresses: Vec<String>,
}

impl MinerInfo {
    pub const TABLE: TableSpec = TableSpec {
        name: "miner_infos",
        primary_key: &["height", "miner_id", "state_root"],
    };
}

#[async_trait]
impl Persistable for MinerInfo {
    async fn persist(&self, ctx: &StoreContext, batch: &dyn StorageBatch) -> ModelResult<()> {
        let span = info_span!("MinerInfoModel.persist", table = Self::TABLE.name);
        async {
            let started = Instant::now();
            let row = serde_json::to_value(self)?;
            let result = batch.persist_model(ctx, &Self::TABLE, vec![row]).await;
            debug!(elapsed_us = started.elapsed().as_micros() as u64, "persisted");
            result
        }
        .instrument(span)
        .await
    }
}

/// All miner infos extracted for one tipset.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerInfoList(pub Vec<MinerInfo>);

impl MinerInfoList {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<MinerInfo>> for MinerInfoList {
    fn from(infos: Vec<MinerInfo>) -> Self {
        Self(infos)
    }
}

#[async_trait]
impl Persistable for MinerInfoList {
    async fn persist(&self, ctx: &StoreContext, batch: &dyn StorageBatch) -> ModelResult<()> {
        let span = info_span!(
            "MinerInfoList.persist",
            table = MinerInfo::TABLE.name,
            rows = self.0.len()
        );
        async {
            if self.0.is_empty() {
                return Ok(());
            }
            let started = Instant::now();
            let rows = self
                .0
                .iter()
                .map(serde_json::to_value)
                .collect::<Result<Vec<_>, _>>()?;
            let result = batch.persist_model(ctx, &MinerInfo::TABLE, rows).await;
            debug!(elapsed_us = started.elapsed().as_micros() as u64, "persisted");
            result
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::MemoryBatch;
    use crate::error::ModelError;

    fn info(miner: &str, height: ChainEpoch) -> MinerInfo {
        MinerInfo {
            height,
            miner_id: miner.into(),
            state_root: "root".into(),
            owner_id: "f0100".into(),
            worker_id: "f0101".into(),
            new_worker: String::new(),
            worker_change_epoch: -1,
            consensus_faulted_elapsed: -1,
            peer_id: "12D3KooW".into(),
            control_addresses: vec!["f0102".into()],
            multi_addresses: vec![],
        }
    }

    #[tokio::test]
    async fn single_info_persists_one_row() {
        let batch = MemoryBatch::new();
        info("f01000", 10)
            .persist(&StoreContext::background(), &batch)
            .await
            .unwrap();
        let rows = batch.rows("miner_infos");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["miner_id"], "f01000");
        assert_eq!(rows[0]["control_addresses"][0], "f0102");
    }

    #[tokio::test]
    async fn empty_list_is_a_no_op() {
        let batch = MemoryBatch::new();
        let (ctx, handle) = StoreContext::cancellable();
        handle.cancel();
        // Nothing to write, so not even the cancelled context is consulted.
        MinerInfoList::default().persist(&ctx, &batch).await.unwrap();
        assert_eq!(batch.row_count("miner_infos"), 0);
    }

    #[tokio::test]
    async fn list_persists_every_row() {
        let batch = MemoryBatch::new();
        let list = MinerInfoList::from(vec![info("f01000", 10), info("f01001", 10)]);
        assert_eq!(list.len(), 2);
        list.persist(&StoreContext::background(), &batch).await.unwrap();
        assert_eq!(batch.row_count("miner_infos"), 2);
    }

    #[tokio::test]
    async fn same_miner_twice_at_one_height_is_rejected() {
        let batch = MemoryBatch::new();
        let ctx = StoreContext::background();
        info("f01000", 10).persist(&ctx, &batch).await.unwrap();
        let err = info("f01000", 10).persist(&ctx, &batch).await.unwrap_err();
        assert!(matches!(err, ModelError::DuplicateKey { key, .. } if key == "10/f01000/root"));
        info("f01000", 11).persist(&ctx, &batch).await.unwrap();
    }
}
