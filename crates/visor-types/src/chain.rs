use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::key::ContentKey;

/// Chain height.
pub type ChainEpoch = i64;

/// Identity of a tipset: the keys of the blocks it contains, in canonical order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TipSetKey(Vec<ContentKey>);

impl TipSetKey {
    /// Build a key from block keys. Blocks are sorted so that the same set
    /// always yields the same key.
    pub fn new(mut blocks: Vec<ContentKey>) -> Self {
        blocks.sort();
        blocks.dedup();
        Self(blocks)
    }

    /// The empty key (no blocks).
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn blocks(&self) -> &[ContentKey] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TipSetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, block) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{block}")?;
        }
        write!(f, "}}")
    }
}

/// A tipset as seen by the extraction pipeline.
///
/// Only the fields needed to label report windows and walk the chain are
/// carried here; block headers stay behind the node API boundary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipSet {
    pub key: TipSetKey,
    pub height: ChainEpoch,
    /// State root produced by executing the parent tipset.
    pub parent_state: ContentKey,
    pub parents: TipSetKey,
}

impl TipSet {
    pub fn new(
        key: TipSetKey,
        height: ChainEpoch,
        parent_state: ContentKey,
        parents: TipSetKey,
    ) -> Self {
        Self {
            key,
            height,
            parent_state,
            parents,
        }
    }
}

/// An actor address in its textual form, e.g. `f01234` or `t3abc...`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// ID address for the given actor id on mainnet (`f0<id>`).
    pub fn id(actor_id: u64) -> Self {
        Self(format!("f0{actor_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Address {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let network = chars.next();
        let protocol = chars.next();
        let rest = chars.as_str();
        match (network, protocol) {
            (Some('f' | 't'), Some('0'..='4')) if !rest.is_empty() => Ok(Self(s.to_string())),
            _ => Err(TypeError::InvalidAddress(s.to_string())),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
