use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TypeError;
use crate::ids::Oid;
use crate::object::{validate_content_hash, validate_name, ObjectType};

/// Discriminator field carried by every operation on the wire.
pub const OPERATION_TAG: &str = "type";

/// A mutation request addressed to one target object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    /// Attach a new or detached object under the target.
    InsertChild {
        child: Oid,
        child_type: ObjectType,
        child_name: String,
    },
    /// Reparent and/or rename a child of the target.
    MoveChild {
        child: Oid,
        new_parent: Oid,
        new_child_name: String,
    },
    /// Detach a child of the target.
    RemoveChild { child: Oid },
    /// Replace the content of the target file.
    UpdateContent {
        local_version: u64,
        hash: String,
        size: u64,
        mtime: u64,
    },
    /// Convert the target folder into a store.
    Share,
    /// Reattach the removed target to its recovery parent.
    Restore,
    /// Rename the target store.
    RenameStore { old_name: String, new_name: String },
}

impl Operation {
    /// Every discriminator value the decoder accepts.
    pub const TYPE_NAMES: [&'static str; 7] = [
        "INSERT_CHILD",
        "MOVE_CHILD",
        "REMOVE_CHILD",
        "UPDATE_CONTENT",
        "SHARE",
        "RESTORE",
        "RENAME_STORE",
    ];

    /// Decode an operation from JSON.
    ///
    /// The discriminator is read first: an unknown or missing tag fails with
    /// [`TypeError::UnknownOperation`] before the shape is examined. A known
    /// tag with the wrong shape fails with [`TypeError::MalformedOperation`].
    pub fn from_json(value: Value) -> Result<Self, TypeError> {
        let tag = match value.get(OPERATION_TAG) {
            Some(Value::String(tag)) => tag.clone(),
            Some(other) => return Err(TypeError::UnknownOperation(other.to_string())),
            None => return Err(TypeError::UnknownOperation("<missing>".into())),
        };
        if !Self::TYPE_NAMES.contains(&tag.as_str()) {
            return Err(TypeError::UnknownOperation(tag));
        }
        serde_json::from_value(value).map_err(|e| TypeError::MalformedOperation(e.to_string()))
    }

    /// Wire name of this operation.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::InsertChild { .. } => "INSERT_CHILD",
            Self::MoveChild { .. } => "MOVE_CHILD",
            Self::RemoveChild { .. } => "REMOVE_CHILD",
            Self::UpdateContent { .. } => "UPDATE_CONTENT",
            Self::Share => "SHARE",
            Self::Restore => "RESTORE",
            Self::RenameStore { .. } => "RENAME_STORE",
        }
    }

    /// The child an edge operation names, if any.
    pub fn child(&self) -> Option<Oid> {
        match self {
            Self::InsertChild { child, .. }
            | Self::MoveChild { child, .. }
            | Self::RemoveChild { child } => Some(*child),
            _ => None,
        }
    }

    /// Structural checks that need no tree state: names and hashes.
    pub fn validate(&self) -> Result<(), TypeError> {
        match self {
            Self::InsertChild { child_name, .. } => validate_name(child_name),
            Self::MoveChild { new_child_name, .. } => validate_name(new_child_name),
            Self::UpdateContent { hash, .. } => validate_content_hash(hash),
            Self::RenameStore { old_name, new_name } => {
                validate_name(old_name)?;
                validate_name(new_name)
            }
            Self::RemoveChild { .. } | Self::Share | Self::Restore => Ok(()),
        }
    }
}
