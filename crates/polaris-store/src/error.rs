use polaris_types::Oid;

/// Errors from metadata store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A content record for this (object, version) already exists. Content
    /// is immutable once written.
    #[error("content already recorded for {oid} version {version}")]
    ContentExists { oid: Oid, version: u64 },

    /// An edge write would bind a name or child that is already bound.
    #[error("edge constraint violated under {parent}: {reason}")]
    EdgeConstraint { parent: Oid, reason: String },

    /// The backend's lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    LockPoisoned,

    /// The transaction was already committed.
    #[error("transaction already finished")]
    TransactionFinished,

    /// Storage backend is unavailable.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
