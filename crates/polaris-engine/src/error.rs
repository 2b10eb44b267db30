use polaris_store::StoreError;
use polaris_types::{Did, ErrorCode, Oid, Sid, TypeError};

/// Errors produced by engine operations.
///
/// Every variant maps onto exactly one wire [`ErrorCode`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no such object: {0}")]
    NoSuchObject(Oid),

    #[error("name {name:?} is already bound under {parent}")]
    NameConflict { parent: Oid, name: String },

    #[error("store {store} is named {actual:?}, not {expected:?}")]
    StoreNameConflict {
        store: Sid,
        expected: String,
        actual: String,
    },

    #[error("parent conflict on {child}: {reason}")]
    ParentConflict { child: Oid, reason: String },

    #[error("invalid operation on {oid}: {reason}")]
    InvalidOperationOnType { oid: Oid, reason: String },

    #[error("version conflict on {oid}: expected {expected}, current {actual}")]
    VersionConflict { oid: Oid, expected: u64, actual: u64 },

    #[error("device {device} may not access store {store}")]
    InsufficientPermissions { device: Did, store: Sid },

    #[error("bad arguments: {0}")]
    BadArgs(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NoSuchObject(_) => ErrorCode::NoSuchObject,
            Self::NameConflict { .. } | Self::StoreNameConflict { .. } => ErrorCode::NameConflict,
            Self::ParentConflict { .. } => ErrorCode::ParentConflict,
            Self::InvalidOperationOnType { .. } => ErrorCode::InvalidOperationOnType,
            Self::VersionConflict { .. } => ErrorCode::VersionConflict,
            Self::InsufficientPermissions { .. } => ErrorCode::InsufficientPermissions,
            Self::BadArgs(_) => ErrorCode::BadArgs,
            Self::Store(_) => ErrorCode::Unknown,
        }
    }

    /// Message safe to return to clients. Storage failures stay opaque.
    pub fn client_message(&self) -> String {
        match self {
            Self::Store(_) => "internal storage error".to_string(),
            other => other.to_string(),
        }
    }

    pub(crate) fn invalid(oid: Oid, reason: impl Into<String>) -> Self {
        Self::InvalidOperationOnType {
            oid,
            reason: reason.into(),
        }
    }

    pub(crate) fn parent_conflict(child: Oid, reason: impl Into<String>) -> Self {
        Self::ParentConflict {
            child,
            reason: reason.into(),
        }
    }
}

impl From<TypeError> for EngineError {
    fn from(err: TypeError) -> Self {
        Self::BadArgs(err.to_string())
    }
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
