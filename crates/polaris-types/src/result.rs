use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::{Did, Oid};
use crate::object::ObjectVersion;
use crate::operation::Operation;

/// Error codes returned in response bodies. The body code, not the HTTP
/// status, is what clients act on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NoSuchObject,
    NameConflict,
    ParentConflict,
    InvalidOperationOnType,
    VersionConflict,
    InsufficientPermissions,
    BadArgs,
    Unknown,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoSuchObject => "NO_SUCH_OBJECT",
            Self::NameConflict => "NAME_CONFLICT",
            Self::ParentConflict => "PARENT_CONFLICT",
            Self::InvalidOperationOnType => "INVALID_OPERATION_ON_TYPE",
            Self::VersionConflict => "VERSION_CONFLICT",
            Self::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            Self::BadArgs => "BAD_ARGS",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// One object updated by an operation, with the epoch of the transform
/// that recorded the update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatedObject {
    pub transform_timestamp: u64,
    pub object: ObjectVersion,
}

/// Successful outcome of a single operation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub updated: Vec<UpdatedObject>,
}

impl OperationResult {
    /// Latest version reported for `oid`, if the operation updated it.
    pub fn version_of(&self, oid: &Oid) -> Option<u64> {
        self.updated
            .iter()
            .rev()
            .find(|u| &u.object.oid == oid)
            .map(|u| u.object.version)
    }
}

/// Error body shared by single-operation failures and batch entries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error_code: ErrorCode,
    pub message: String,
}

/// Per-entry outcome inside a batch response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOperationResult {
    pub successful: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<Vec<UpdatedObject>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BatchOperationResult {
    pub fn success(updated: Vec<UpdatedObject>) -> Self {
        Self {
            successful: true,
            updated: Some(updated),
            error_code: None,
            message: None,
        }
    }

    /// Success for entries that carry no update list (location batches).
    pub fn ok() -> Self {
        Self {
            successful: true,
            updated: None,
            error_code: None,
            message: None,
        }
    }

    pub fn failure(error_code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            successful: false,
            updated: None,
            error_code: Some(error_code),
            message: Some(message.into()),
        }
    }
}

/// One (target, operation) entry of a transform batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOperation {
    pub oid: Oid,
    pub operation: Operation,
}

/// A list of operations applied either as an atomic pair or sequentially.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformBatch {
    #[serde(default)]
    pub atomic: bool,
    pub operations: Vec<BatchOperation>,
}

/// Results for every attempted operation of a transform batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformBatchResult {
    pub results: Vec<BatchOperationResult>,
}

/// Whether a location entry is being added or removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocationAction {
    Add,
    Remove,
}

/// One entry of a location batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationUpdate {
    pub oid: Oid,
    pub version: u64,
    pub did: Did,
    pub action: LocationAction,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationBatch {
    pub available: Vec<LocationUpdate>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationBatchResult {
    pub results: Vec<BatchOperationResult>,
}
