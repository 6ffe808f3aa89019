use std::sync::Arc;

use anyhow::{anyhow, ensure, Context};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use visor_lens::{
    ApiOpener, LensApi, MemoryLens, ReportWindow, Reporter, StoreRegistry, StoreSummary,
};
use visor_model::{MemoryBatch, MinerInfo, MinerInfoList, Persistable};
use visor_store::{
    ContentStore, ContentStoreExt, InMemoryContentStore, StoreContext, StoreError,
};
use visor_types::{Address, ChainEpoch, Message, TipSet};

use crate::config::VisorConfig;
use crate::synthetic::{self, MinerInfoState, MinerState, SectorChunk, StateRoot};

/// What one report window saw.
#[derive(Clone, Debug, Serialize)]
pub struct WindowReport {
    pub height: ChainEpoch,
    pub state_root: String,
    pub summaries: Vec<StoreSummary>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ReplayOutcome {
    pub tipsets: usize,
    pub miner_infos: usize,
    pub messages: usize,
    pub gas_used: i64,
    pub windows: Vec<WindowReport>,
}

impl ReplayOutcome {
    pub fn total_gets(&self) -> u64 {
        self.windows
            .iter()
            .flat_map(|w| &w.summaries)
            .map(|s| s.total_gets)
            .sum()
    }

    pub fn redundant_gets(&self) -> u64 {
        self.windows
            .iter()
            .flat_map(|w| &w.summaries)
            .map(|s| s.redundant_gets)
            .sum()
    }
}

/// Build a synthetic chain of `config.replay.tipsets` tipsets.
pub async fn build_chain(config: &VisorConfig, ctx: &StoreContext) -> anyhow::Result<MemoryLens> {
    let replay = &config.replay;
    ensure!(replay.start_height >= 0, "start height must not be negative");

    let lens = MemoryLens::new(Arc::new(InMemoryContentStore::new()));
    let miners = synthetic::miner_addresses(replay.miners);
    for offset in 0..replay.tipsets {
        let height = replay.start_height + offset as ChainEpoch;
        let root = synthetic::seed_state(lens.backing_store().as_ref(), ctx, height, &miners)
            .await
            .with_context(|| format!("seeding state at height {height}"))?;
        lens.append_tipset(ctx, height, root, synthetic::transfers(height, replay.miners))
            .await?;
    }
    debug!(
        tipsets = lens.len(),
        objects = lens.backing_store().len(),
        "synthetic chain built"
    );
    Ok(lens)
}

/// Walk the chain from `start_height`, extracting miner infos and executed
/// messages per tipset and reporting store access after each one.
pub async fn replay(
    opener: &dyn ApiOpener,
    config: &VisorConfig,
    batch: &MemoryBatch,
    ctx: &StoreContext,
) -> anyhow::Result<ReplayOutcome> {
    let (api, close) = opener.open(ctx).await.context("opening lens")?;
    let result = replay_with(api, config, batch, ctx).await;
    close();
    if let Err(err) = &result {
        if interrupted(err) {
            warn!(error = %err, "replay interrupted");
        }
    }
    result
}

/// Whether `err` came from the caller's cancellation or deadline rather
/// than from the chain or the store.
pub fn interrupted(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<StoreError>()
            .is_some_and(StoreError::is_context_error)
    })
}

async fn replay_with(
    api: Arc<dyn LensApi>,
    config: &VisorConfig,
    batch: &MemoryBatch,
    ctx: &StoreContext,
) -> anyhow::Result<ReplayOutcome> {
    let registry = Arc::new(StoreRegistry::new());
    let reporter =
        Reporter::new(Arc::clone(&registry)).with_hot_keys(config.instrumentation.hot_keys);
    let instrument = config.instrumentation.enabled;
    let miners = synthetic::miner_addresses(config.replay.miners);

    let mut outcome = ReplayOutcome::default();
    let mut parent: Option<TipSet> = None;

    for offset in 0..config.replay.tipsets {
        let height = config.replay.start_height + offset as ChainEpoch;
        let ts = api.tipset_by_height(ctx, height).await?;

        let infos = extract_miner_infos(&api, &registry, config, &miners, &ts, ctx).await?;
        outcome.miner_infos += infos.len();
        infos.persist(ctx, batch).await?;

        if let Some(parent) = &parent {
            let executed = api.executed_messages_for_tipset(ctx, &ts, parent).await?;
            let store = wrap(
                api.store(),
                instrument.then(|| (&*registry, "messages", "executed", parent.height)),
            );
            for em in &executed {
                let message: Message = store.get_decoded(ctx, &em.cid).await?;
                ensure!(message == em.message, "message {} does not match its key", em.cid);
                outcome.gas_used += em.receipt.gas_used;
            }
            outcome.messages += executed.len();
        }

        if instrument {
            let summaries = reporter.report(Some(&ReportWindow::from(&ts)));
            outcome.windows.push(WindowReport {
                height: ts.height,
                state_root: ts.parent_state.to_string(),
                summaries,
            });
        }
        info!(height = ts.height, miners = miners.len(), "tipset processed");
        outcome.tipsets += 1;
        parent = Some(ts);
    }
    Ok(outcome)
}

fn wrap(
    store: Arc<dyn ContentStore>,
    label: Option<(&StoreRegistry, &str, &str, ChainEpoch)>,
) -> Arc<dyn ContentStore> {
    match label {
        Some((registry, processor, method, height)) => Arc::new(registry.instrument_with_id(
            store,
            processor,
            method,
            height.to_string(),
        )),
        None => store,
    }
}

async fn extract_miner_infos(
    api: &Arc<dyn LensApi>,
    registry: &Arc<StoreRegistry>,
    config: &VisorConfig,
    miners: &[Address],
    ts: &TipSet,
    ctx: &StoreContext,
) -> anyhow::Result<MinerInfoList> {
    let mut tasks = JoinSet::new();
    for (index, miner) in miners.iter().enumerate() {
        let raw = api.store();
        let store: Arc<dyn ContentStore> = if config.instrumentation.enabled {
            Arc::new(registry.instrument(raw, "miner", "extract_info", [miner.to_string()]))
        } else {
            raw
        };
        let call_ctx = ctx.with_timeout(config.replay.get_timeout());
        let seed = config.replay.seed ^ ((ts.height as u64) << 32) ^ index as u64;
        let sector_reads = config.replay.reads_per_miner;
        let (ts, miner) = (ts.clone(), miner.clone());
        tasks.spawn(async move {
            let mut rng = StdRng::seed_from_u64(seed);
            extract_miner_info(store.as_ref(), &call_ctx, &ts, &miner, sector_reads, &mut rng).await
        });
    }

    let mut infos = Vec::with_capacity(miners.len());
    while let Some(joined) = tasks.join_next().await {
        infos.push(joined.context("miner extraction task panicked")??);
    }
    infos.sort_by(|a, b| a.miner_id.cmp(&b.miner_id));
    Ok(MinerInfoList::from(infos))
}

async fn load_miner_state(
    store: &dyn ContentStore,
    ctx: &StoreContext,
    ts: &TipSet,
    miner: &Address,
) -> anyhow::Result<MinerState> {
    let root: StateRoot = store.get_decoded(ctx, &ts.parent_state).await?;
    let head = root
        .lookup(miner)
        .ok_or_else(|| anyhow!("miner {miner} not found in state {}", ts.parent_state))?;
    Ok(store.get_decoded(ctx, &head).await?)
}

/// Read one miner's info, then sample its sectors.
///
/// Each sector lookup resolves the actor from the state root again, the way
/// per-field state accessors do; the report surfaces those repeats as
/// redundant gets on the root and the miner head.
async fn extract_miner_info(
    store: &dyn ContentStore,
    ctx: &StoreContext,
    ts: &TipSet,
    miner: &Address,
    sector_reads: usize,
    rng: &mut StdRng,
) -> anyhow::Result<MinerInfo> {
    let state = load_miner_state(store, ctx, ts, miner).await?;
    let info: MinerInfoState = store.get_decoded(ctx, &state.info).await?;

    for _ in 0..sector_reads {
        let state = load_miner_state(store, ctx, ts, miner).await?;
        if state.sectors.is_empty() {
            break;
        }
        let chunk = state.sectors[rng.gen_range(0..state.sectors.len())];
        let _: SectorChunk = store.get_decoded(ctx, &chunk).await?;
    }

    let (new_worker, worker_change_epoch) = match &info.pending_worker {
        Some(change) => (change.new_worker.to_string(), change.effective_at),
        None => (String::new(), -1),
    };
    Ok(MinerInfo {
        height: ts.height,
        miner_id: miner.to_string(),
        state_root: ts.parent_state.to_string(),
        owner_id: info.owner.to_string(),
        worker_id: info.worker.to_string(),
        new_worker,
        worker_change_epoch,
        consensus_faulted_elapsed: info.consensus_fault_elapsed,
        peer_id: info.peer_id,
        control_addresses: info
            .control_addresses
            .iter()
            .map(ToString::to_string)
            .collect(),
        multi_addresses: info.multi_addresses,
    })
}
