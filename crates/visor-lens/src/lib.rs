//! Chain-state lens for Visor.
//!
//! Extraction code reads chain state through a [`LensApi`]. To see how it
//! reads, each unit of work wraps the API's store with
//! [`StoreRegistry::instrument`], which returns an [`InstrumentedStore`]
//! that counts every get by key. Once per tipset the orchestrator calls
//! [`Reporter::report`], which drains the registry and logs one
//! [`StoreSummary`] per wrapped store under the `instrumentation` target:
//! total gets, unique keys, the most requested key, and optionally the
//! hottest keys.
//!
//! ```text
//!  task ──instrument()──► InstrumentedStore ──get/put──► ContentStore
//!                              │ register
//!                              ▼
//!                        StoreRegistry ◄──drain_and_clear── Reporter ──► tracing
//! ```

pub mod api;
pub mod error;
pub mod instrumented;
pub mod memory;
pub mod registry;
pub mod report;

pub use api::{ApiCloser, ApiOpener, ExecutedMessage, LensApi};
pub use error::{LensError, LensResult};
pub use instrumented::{AccessLog, CallContext, InstrumentedStore, StoreLabel};
pub use memory::{BlockHeader, MemoryLens, MemoryLensOpener};
pub use registry::StoreRegistry;
pub use report::{KeyCount, ReportWindow, Reporter, StoreSummary, REPORT_TARGET};
