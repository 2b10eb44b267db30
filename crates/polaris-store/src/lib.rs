//! Transactional metadata storage for Polaris.
//!
//! The object tree, the transform log, and the location ledger all live
//! behind one narrow interface so that every mutation and the records it
//! produces commit together.
//!
//! # Storage Backends
//!
//! All backends implement the [`MetaStore`] trait:
//!
//! - [`InMemoryMetaStore`] -- serialized, journaled store for tests and embedding
//!
//! # Design Rules
//!
//! 1. Every read and write goes through a [`Transaction`].
//! 2. A transaction that is dropped without [`Transaction::commit`] leaves no trace.
//! 3. Content records and transforms are never rewritten.
//! 4. Epochs are assigned on append, strictly increasing, without gaps.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryMetaStore;
pub use traits::{transact, MetaStore, Transaction};
