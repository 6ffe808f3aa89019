use visor_store::StoreError;
use visor_types::{ChainEpoch, TipSetKey};

/// Errors produced by lens API operations.
///
/// Instrumentation itself never fails; these come from the node API
/// boundary and the store beneath it.
#[derive(Debug, thiserror::Error)]
pub enum LensError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("no tipset at height {0}")]
    TipSetNotFound(ChainEpoch),

    #[error("chain is empty")]
    EmptyChain,

    #[error("tipset {parent} is not the parent of {child}")]
    NotParent { parent: TipSetKey, child: TipSetKey },

    #[error("tipset at height {height} does not extend head at height {head}")]
    OutOfOrder { height: ChainEpoch, head: ChainEpoch },
}

pub type LensResult<T> = Result<T, LensError>;
