use std::sync::Arc;

use async_trait::async_trait;
use visor_store::{ContentStore, StoreContext};
use visor_types::{ChainEpoch, ContentKey, Message, MessageReceipt, TipSet};

use crate::error::LensResult;

/// A message together with the receipt of its execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutedMessage {
    pub cid: ContentKey,
    pub height: ChainEpoch,
    pub message: Message,
    pub receipt: MessageReceipt,
    /// Header of the first block the message appeared in.
    pub block_header: ContentKey,
    /// Every block the message appeared in.
    pub blocks: Vec<ContentKey>,
    /// Position of the message and receipt within the tipset.
    pub index: u64,
    /// Code of the actor the message is from.
    pub from_actor_code: ContentKey,
    /// Code of the actor the message is to.
    pub to_actor_code: ContentKey,
}

/// Read access to a chain node.
///
/// The state store returned by [`store`](Self::store) is what extraction
/// code reads through, usually after wrapping it with
/// [`StoreRegistry::instrument`](crate::StoreRegistry::instrument).
#[async_trait]
pub trait LensApi: Send + Sync {
    /// Handle to the node's state store.
    fn store(&self) -> Arc<dyn ContentStore>;

    /// The heaviest known tipset.
    async fn chain_head(&self, ctx: &StoreContext) -> LensResult<TipSet>;

    /// The tipset at exactly `height`.
    async fn tipset_by_height(&self, ctx: &StoreContext, height: ChainEpoch)
        -> LensResult<TipSet>;

    /// Messages included in `parent`, paired with the receipts produced when
    /// `ts` executed them.
    async fn executed_messages_for_tipset(
        &self,
        ctx: &StoreContext,
        ts: &TipSet,
        parent: &TipSet,
    ) -> LensResult<Vec<ExecutedMessage>>;
}

/// Releases whatever an [`ApiOpener`] acquired.
pub type ApiCloser = Box<dyn FnOnce() + Send>;

/// Opens a [`LensApi`] connection.
#[async_trait]
pub trait ApiOpener: Send + Sync {
    async fn open(&self, ctx: &StoreContext) -> LensResult<(Arc<dyn LensApi>, ApiCloser)>;
}
