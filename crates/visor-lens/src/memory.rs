use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use visor_store::{ContentStore, ContentStoreExt, InMemoryContentStore, StoreContext};
use visor_types::{
    Address, ChainEpoch, ContentKey, Message, MessageReceipt, TipSet, TipSetKey,
};

use crate::api::{ApiCloser, ApiOpener, ExecutedMessage, LensApi};
use crate::error::{LensError, LensResult};

/// Header written to the store for every block appended to a [`MemoryLens`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub miner: Address,
    pub height: ChainEpoch,
    pub parents: TipSetKey,
    pub parent_state: ContentKey,
    pub messages: Vec<ContentKey>,
}

#[derive(Clone, Debug)]
struct ChainEntry {
    tipset: TipSet,
    block: ContentKey,
    messages: Vec<(ContentKey, Message)>,
    /// Receipts for the parent entry's messages, in the same order.
    parent_receipts: Vec<MessageReceipt>,
}

/// A single-block-per-tipset chain held in memory.
///
/// Execution is synthetic and deterministic: every message succeeds and
/// uses half its gas limit. Useful for driving extraction code in tests and
/// local replays without a node.
pub struct MemoryLens {
    store: Arc<InMemoryContentStore>,
    block_miner: Address,
    chain: RwLock<Vec<ChainEntry>>,
    actor_codes: RwLock<HashMap<Address, ContentKey>>,
}

impl MemoryLens {
    pub fn new(store: Arc<InMemoryContentStore>) -> Self {
        Self {
            store,
            block_miner: Address::id(1000),
            chain: RwLock::new(Vec::new()),
            actor_codes: RwLock::new(HashMap::new()),
        }
    }

    /// The concrete backing store.
    pub fn backing_store(&self) -> &Arc<InMemoryContentStore> {
        &self.store
    }

    /// Record the code of an actor so executed messages can report it.
    pub fn set_actor_code(&self, actor: Address, code: ContentKey) {
        self.actor_codes
            .write()
            .expect("lens lock poisoned")
            .insert(actor, code);
    }

    /// Number of tipsets in the chain.
    pub fn len(&self) -> usize {
        self.chain.read().expect("lens lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a tipset at `height` whose parent state is `state_root` and
    /// whose single block includes `messages`.
    ///
    /// Heights must strictly increase; gaps are null rounds.
    pub async fn append_tipset(
        &self,
        ctx: &StoreContext,
        height: ChainEpoch,
        state_root: ContentKey,
        messages: Vec<Message>,
    ) -> LensResult<TipSet> {
        let parent = self.head_entry();
        if let Some(p) = &parent {
            if height <= p.tipset.height {
                return Err(LensError::OutOfOrder {
                    height,
                    head: p.tipset.height,
                });
            }
        }

        let mut included = Vec::with_capacity(messages.len());
        for message in messages {
            let key = self.store.put_encoded(ctx, &message).await?;
            included.push((key, message));
        }

        let parents = parent
            .as_ref()
            .map_or_else(TipSetKey::empty, |p| p.tipset.key.clone());
        let header = BlockHeader {
            miner: self.block_miner.clone(),
            height,
            parents: parents.clone(),
            parent_state: state_root,
            messages: included.iter().map(|(k, _)| *k).collect(),
        };
        let block = self.store.put_encoded(ctx, &header).await?;

        let parent_receipts = parent
            .map(|p| p.messages.iter().map(|(_, m)| execute(m)).collect())
            .unwrap_or_default();

        let tipset = TipSet::new(TipSetKey::new(vec![block]), height, state_root, parents);
        let mut chain = self.chain.write().expect("lens lock poisoned");
        if let Some(head) = chain.last() {
            if head.tipset.key != tipset.parents {
                return Err(LensError::OutOfOrder {
                    height,
                    head: head.tipset.height,
                });
            }
        }
        chain.push(ChainEntry {
            tipset: tipset.clone(),
            block,
            messages: included,
            parent_receipts,
        });
        debug!(height, block = %block.short_hex(), "appended tipset");
        Ok(tipset)
    }

    fn head_entry(&self) -> Option<ChainEntry> {
        self.chain.read().expect("lens lock poisoned").last().cloned()
    }

    fn entry_for(&self, key: &TipSetKey) -> Option<ChainEntry> {
        self.chain
            .read()
            .expect("lens lock poisoned")
            .iter()
            .find(|e| &e.tipset.key == key)
            .cloned()
    }

    fn actor_code(&self, actor: &Address) -> ContentKey {
        self.actor_codes
            .read()
            .expect("lens lock poisoned")
            .get(actor)
            .copied()
            .unwrap_or_else(ContentKey::undef)
    }
}

fn execute(message: &Message) -> MessageReceipt {
    MessageReceipt {
        exit_code: 0,
        return_data: Vec::new(),
        gas_used: message.gas_limit / 2,
    }
}

#[async_trait]
impl LensApi for MemoryLens {
    fn store(&self) -> Arc<dyn ContentStore> {
        Arc::clone(&self.store) as Arc<dyn ContentStore>
    }

    async fn chain_head(&self, ctx: &StoreContext) -> LensResult<TipSet> {
        ctx.check()?;
        self.head_entry()
            .map(|e| e.tipset)
            .ok_or(LensError::EmptyChain)
    }

    async fn tipset_by_height(
        &self,
        ctx: &StoreContext,
        height: ChainEpoch,
    ) -> LensResult<TipSet> {
        ctx.check()?;
        self.chain
            .read()
            .expect("lens lock poisoned")
            .iter()
            .find(|e| e.tipset.height == height)
            .map(|e| e.tipset.clone())
            .ok_or(LensError::TipSetNotFound(height))
    }

    async fn executed_messages_for_tipset(
        &self,
        ctx: &StoreContext,
        ts: &TipSet,
        parent: &TipSet,
    ) -> LensResult<Vec<ExecutedMessage>> {
        ctx.check()?;
        if ts.parents != parent.key {
            return Err(LensError::NotParent {
                parent: parent.key.clone(),
                child: ts.key.clone(),
            });
        }
        let child = self
            .entry_for(&ts.key)
            .ok_or(LensError::TipSetNotFound(ts.height))?;
        let parent_entry = self
            .entry_for(&parent.key)
            .ok_or(LensError::TipSetNotFound(parent.height))?;

        let executed = parent_entry
            .messages
            .into_iter()
            .zip(child.parent_receipts)
            .enumerate()
            .map(|(index, ((cid, message), receipt))| ExecutedMessage {
                cid,
                height: parent.height,
                from_actor_code: self.actor_code(&message.from),
                to_actor_code: self.actor_code(&message.to),
                message,
                receipt,
                block_header: parent_entry.block,
                blocks: vec![parent_entry.block],
                index: index as u64,
            })
            .collect();
        Ok(executed)
    }
}

impl std::fmt::Debug for MemoryLens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLens")
            .field("tipsets", &self.len())
            .field("store", &self.store)
            .finish()
    }
}

/// Hands out a shared [`MemoryLens`] and tracks open connections.
#[derive(Clone)]
pub struct MemoryLensOpener {
    lens: Arc<MemoryLens>,
    open: Arc<AtomicUsize>,
}

impl MemoryLensOpener {
    pub fn new(lens: Arc<MemoryLens>) -> Self {
        Self {
            lens,
            open: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Connections opened and not yet closed.
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApiOpener for MemoryLensOpener {
    async fn open(&self, ctx: &StoreContext) -> LensResult<(Arc<dyn LensApi>, ApiCloser)> {
        ctx.check()?;
        self.open.fetch_add(1, Ordering::SeqCst);
        let open = Arc::clone(&self.open);
        let closer: ApiCloser = Box::new(move || {
            open.fetch_sub(1, Ordering::SeqCst);
            debug!("memory lens closed");
        });
        Ok((Arc::clone(&self.lens) as Arc<dyn LensApi>, closer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use visor_store::StoreError;

    fn ctx() -> StoreContext {
        StoreContext::background()
    }

    fn transfer(nonce: u64) -> Message {
        Message {
            from: Address::id(100),
            to: Address::id(200),
            nonce,
            value: 5,
            method: 0,
            params: Vec::new(),
            gas_limit: 1_000,
        }
    }

    fn lens() -> MemoryLens {
        MemoryLens::new(Arc::new(InMemoryContentStore::new()))
    }

    #[tokio::test]
    async fn empty_chain_has_no_head() {
        let lens = lens();
        assert!(matches!(
            lens.chain_head(&ctx()).await,
            Err(LensError::EmptyChain)
        ));
    }

    #[tokio::test]
    async fn append_links_parents() {
        let lens = lens();
        let root = ContentKey::for_content(b"root");
        let t0 = lens.append_tipset(&ctx(), 0, root, vec![]).await.unwrap();
        let t1 = lens.append_tipset(&ctx(), 2, root, vec![]).await.unwrap();

        assert!(t0.parents.is_empty());
        assert_eq!(t1.parents, t0.key);
        assert_eq!(lens.chain_head(&ctx()).await.unwrap(), t1);
        assert_eq!(lens.tipset_by_height(&ctx(), 0).await.unwrap(), t0);
        assert!(matches!(
            lens.tipset_by_height(&ctx(), 1).await,
            Err(LensError::TipSetNotFound(1))
        ));
    }

    #[tokio::test]
    async fn heights_must_increase() {
        let lens = lens();
        let root = ContentKey::for_content(b"root");
        lens.append_tipset(&ctx(), 5, root, vec![]).await.unwrap();
        let err = lens.append_tipset(&ctx(), 5, root, vec![]).await.unwrap_err();
        assert!(matches!(err, LensError::OutOfOrder { height: 5, head: 5 }));
    }

    #[tokio::test]
    async fn block_header_is_in_the_store() {
        let lens = lens();
        let root = ContentKey::for_content(b"root");
        let ts = lens.append_tipset(&ctx(), 1, root, vec![transfer(0)]).await.unwrap();
        let header: BlockHeader = lens
            .store()
            .get_decoded(&ctx(), &ts.key.blocks()[0])
            .await
            .unwrap();
        assert_eq!(header.height, 1);
        assert_eq!(header.parent_state, root);
        assert_eq!(header.messages.len(), 1);
    }

    #[tokio::test]
    async fn executed_messages_pair_parent_messages_with_child_receipts() {
        let lens = lens();
        let code = ContentKey::for_content(b"account");
        lens.set_actor_code(Address::id(100), code);
        let root = ContentKey::for_content(b"root");
        let parent = lens
            .append_tipset(&ctx(), 1, root, vec![transfer(0), transfer(1)])
            .await
            .unwrap();
        let child = lens.append_tipset(&ctx(), 2, root, vec![]).await.unwrap();

        let executed = lens
            .executed_messages_for_tipset(&ctx(), &child, &parent)
            .await
            .unwrap();
        assert_eq!(executed.len(), 2);
        assert_eq!(executed[1].index, 1);
        assert_eq!(executed[1].message.nonce, 1);
        assert_eq!(executed[0].height, 1);
        assert_eq!(executed[0].receipt.gas_used, 500);
        assert_eq!(executed[0].from_actor_code, code);
        assert!(executed[0].to_actor_code.is_undef());
        assert_eq!(executed[0].blocks, parent.key.blocks().to_vec());
    }

    #[tokio::test]
    async fn executed_messages_require_parentage() {
        let lens = lens();
        let root = ContentKey::for_content(b"root");
        let a = lens.append_tipset(&ctx(), 1, root, vec![]).await.unwrap();
        let _b = lens.append_tipset(&ctx(), 2, root, vec![]).await.unwrap();
        let c = lens.append_tipset(&ctx(), 3, root, vec![]).await.unwrap();
        assert!(matches!(
            lens.executed_messages_for_tipset(&ctx(), &c, &a).await,
            Err(LensError::NotParent { .. })
        ));
    }

    #[tokio::test]
    async fn cancelled_context_is_relayed() {
        let lens = lens();
        let (cancelled, handle) = StoreContext::cancellable();
        handle.cancel();
        assert!(matches!(
            lens.chain_head(&cancelled).await,
            Err(LensError::Store(StoreError::Cancelled))
        ));
    }

    #[tokio::test]
    async fn opener_tracks_connections() {
        let opener = MemoryLensOpener::new(Arc::new(lens()));
        let (api, close) = opener.open(&ctx()).await.unwrap();
        let (_api2, close2) = opener.open(&ctx()).await.unwrap();
        assert_eq!(opener.open_connections(), 2);
        assert!(matches!(
            api.chain_head(&ctx()).await,
            Err(LensError::EmptyChain)
        ));
        close();
        close2();
        assert_eq!(opener.open_connections(), 0);
    }
}
