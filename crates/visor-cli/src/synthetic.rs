//! Deterministic chain state for local replays.
//!
//! Each height gets a state root listing every miner actor. Miner infos
//! change only every few heights and sector chunks are shared across
//! miners, so content addressing deduplicates a good part of the state,
//! the same way it does on a real chain.

use serde::{Deserialize, Serialize};
use visor_store::{ContentStore, ContentStoreExt, StoreContext, StoreResult};
use visor_types::{Address, ChainEpoch, ContentKey, Message};

/// Sector chunks per miner.
pub const SECTOR_CHUNKS: u64 = 4;

const SECTORS_PER_CHUNK: u64 = 16;
const WORKER_ROTATION: ChainEpoch = 3;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRoot {
    pub actors: Vec<(Address, ContentKey)>,
}

impl StateRoot {
    pub fn lookup(&self, actor: &Address) -> Option<ContentKey> {
        self.actors
            .iter()
            .find(|(a, _)| a == actor)
            .map(|(_, head)| *head)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerState {
    pub info: ContentKey,
    pub sectors: Vec<ContentKey>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerChange {
    pub new_worker: Address,
    pub effective_at: ChainEpoch,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerInfoState {
    pub owner: Address,
    pub worker: Address,
    pub pending_worker: Option<WorkerChange>,
    pub peer_id: String,
    pub control_addresses: Vec<Address>,
    pub multi_addresses: Vec<String>,
    pub consensus_fault_elapsed: ChainEpoch,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorChunk {
    pub sectors: Vec<u64>,
}

/// Miner actor addresses used by a replay.
pub fn miner_addresses(count: usize) -> Vec<Address> {
    (0..count as u64).map(|i| Address::id(1000 + i)).collect()
}

fn miner_info(index: u64, height: ChainEpoch) -> MinerInfoState {
    let rotation = height / WORKER_ROTATION;
    let next_rotation_at = (rotation + 1) * WORKER_ROTATION;
    MinerInfoState {
        owner: Address::id(2000 + index),
        worker: Address::id(3000 + index * 100 + rotation as u64),
        pending_worker: (height % WORKER_ROTATION == WORKER_ROTATION - 1).then(|| WorkerChange {
            new_worker: Address::id(3000 + index * 100 + rotation as u64 + 1),
            effective_at: next_rotation_at,
        }),
        peer_id: format!("12D3KooWMiner{index}"),
        control_addresses: vec![Address::id(4000 + index)],
        multi_addresses: vec![format!("/ip4/10.0.0.{}/tcp/24001", index % 250 + 1)],
        consensus_fault_elapsed: -1,
    }
}

/// Write the state for `height` and return its root.
pub async fn seed_state(
    store: &dyn ContentStore,
    ctx: &StoreContext,
    height: ChainEpoch,
    miners: &[Address],
) -> StoreResult<ContentKey> {
    let mut actors = Vec::with_capacity(miners.len());
    for (index, miner) in miners.iter().enumerate() {
        let index = index as u64;
        let info = store.put_encoded(ctx, &miner_info(index, height)).await?;
        let mut sectors = Vec::with_capacity(SECTOR_CHUNKS as usize);
        for chunk in 0..SECTOR_CHUNKS {
            // Chunks overlap between neighbouring miners.
            let first = (index + chunk) * SECTORS_PER_CHUNK;
            let sector_chunk = SectorChunk {
                sectors: (first..first + SECTORS_PER_CHUNK).collect(),
            };
            sectors.push(store.put_encoded(ctx, &sector_chunk).await?);
        }
        let head = store.put_encoded(ctx, &MinerState { info, sectors }).await?;
        actors.push((miner.clone(), head));
    }
    store.put_encoded(ctx, &StateRoot { actors }).await
}

/// One transfer from each miner's owner to the next miner's owner.
pub fn transfers(height: ChainEpoch, miners: usize) -> Vec<Message> {
    (0..miners as u64)
        .map(|i| Message {
            from: Address::id(2000 + i),
            to: Address::id(2000 + (i + 1) % miners as u64),
            nonce: height.max(0) as u64,
            value: 1_000 + u128::from(i),
            method: 0,
            params: Vec::new(),
            gas_limit: 10_000,
        })
        .collect()
}
