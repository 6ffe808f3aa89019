//! Content-addressed store boundary for Visor.
//!
//! Chain state is a graph of immutable objects, each stored under the
//! [`ContentKey`](visor_types::ContentKey) derived from its serialized bytes.
//! Everything that reads state does so through the [`ContentStore`] trait, so
//! real backends, test fakes, and instrumenting decorators are
//! interchangeable.
//!
//! # Request contexts
//!
//! Every `get`/`put` takes a [`StoreContext`] carrying the caller's
//! cancellation signal and deadline. Backends honour it through
//! [`StoreContext::run`]; decorators must forward it unchanged.
//!
//! # Backends
//!
//! - [`InMemoryContentStore`] -- `HashMap`-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. Values are immutable once written (content-addressing guarantees this).
//! 2. The store never interprets values -- it is a pure key-value store.
//! 3. Errors are propagated to the caller unchanged, never swallowed.

pub mod codec;
pub mod context;
pub mod error;
pub mod memory;
pub mod traits;

pub use codec::ContentStoreExt;
pub use context::{CancelHandle, StoreContext};
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryContentStore;
pub use traits::ContentStore;
