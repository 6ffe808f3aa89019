//! Derived chain models for Visor.
//!
//! Extraction turns raw actor state into flat rows. Each model knows its
//! table and primary key and persists itself through a [`StorageBatch`],
//! the boundary to whatever database sits behind the pipeline.
//! [`MemoryBatch`] is an in-process implementation for tests and local runs.

pub mod batch;
pub mod error;
pub mod miner;

pub use batch::{MemoryBatch, Persistable, StorageBatch, TableSpec};
pub use error::{ModelError, ModelResult};
pub use miner::{MinerInfo, MinerInfoList};
