//! The Polaris transform engine.
//!
//! Applies client operations to the logical object tree and records every
//! accepted mutation in the transform log, inside one storage transaction
//! per operation.
//!
//! # Components
//!
//! - [`TransformEngine`] -- validates and applies single operations
//! - [`BatchProcessor`] -- atomic remove/insert pairs and sequential batches
//! - [`TransformLog`] -- per-store, epoch-ordered reads of the log
//! - [`LocationLedger`] -- which devices hold which content versions
//! - [`Polaris`] -- all of the above wired to one store
//!
//! # Validation Order
//!
//! 1. Structural checks (names, hashes) before any transaction opens
//! 2. Target existence
//! 3. Write access on every store touched
//! 4. Object types
//! 5. Name and parent conflicts, then content versions

pub mod access;
pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod location;
pub mod log;
pub mod service;
mod tree;

pub use access::{Access, AccessManager, AllowAll, StoreAcl};
pub use batch::BatchProcessor;
pub use config::EngineConfig;
pub use engine::TransformEngine;
pub use error::{EngineError, EngineResult};
pub use location::LocationLedger;
pub use log::{TransformLog, TransformPage};
pub use service::Polaris;
