use thiserror::Error;

/// Errors produced while constructing or decoding Polaris types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("identifier tag {tag:#x} is not a legal {kind}")]
    InvalidTag { tag: u8, kind: &'static str },

    #[error("{0} has no anchor form")]
    NotConvertible(String),

    #[error("unknown operation type: {0}")]
    UnknownOperation(String),

    #[error("malformed operation: {0}")]
    MalformedOperation(String),

    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("invalid content hash: {0}")]
    InvalidContentHash(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
