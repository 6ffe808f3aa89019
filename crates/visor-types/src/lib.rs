//! Foundation types for Visor.
//!
//! This crate provides the identifiers and chain value types shared by every
//! other Visor crate. Nothing here performs I/O.
//!
//! # Key Types
//!
//! - [`ContentKey`] — Content-addressed identifier (BLAKE3 hash)
//! - [`ChainEpoch`] — Chain height
//! - [`TipSetKey`] / [`TipSet`] — Chain-context identity used to label report windows
//! - [`Address`] — Actor address in its textual form
//! - [`Message`] / [`MessageReceipt`] — Executed chain messages

pub mod chain;
pub mod error;
pub mod key;
pub mod message;

pub use chain::{Address, ChainEpoch, TipSet, TipSetKey};
pub use error::TypeError;
pub use key::ContentKey;
pub use message::{Message, MessageReceipt, TokenAmount};
