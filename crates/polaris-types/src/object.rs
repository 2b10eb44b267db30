use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{CONTENT_HASH_LEN, MAX_NAME_LEN};
use crate::error::TypeError;
use crate::ids::{Oid, Sid};

/// Type of a logical object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectType {
    File,
    Folder,
    Store,
    MountPoint,
}

impl ObjectType {
    /// Returns `true` if objects of this type hold named children.
    pub fn is_container(&self) -> bool {
        matches!(self, Self::Folder | Self::Store | Self::MountPoint)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::File => "FILE",
            Self::Folder => "FOLDER",
            Self::Store => "STORE",
            Self::MountPoint => "MOUNT_POINT",
        };
        f.write_str(s)
    }
}

/// Current state of one object in the tree.
///
/// Versions start at 1 and are bumped by every accepted mutation that
/// touches the object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalObject {
    pub oid: Oid,
    pub store: Sid,
    pub object_type: ObjectType,
    pub version: u64,
}

impl LogicalObject {
    pub fn new(oid: Oid, store: Sid, object_type: ObjectType) -> Self {
        Self {
            oid,
            store,
            object_type,
            version: 1,
        }
    }

    /// Root object of a store. Its id has the same bytes as the store id.
    pub fn store_root(store: Sid) -> Self {
        Self::new(store.root_oid(), store, ObjectType::Store)
    }

    /// Bump the version and return the new value.
    pub fn bump(&mut self) -> u64 {
        self.version += 1;
        self.version
    }
}

/// Named edge from a parent to one of its children.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildEdge {
    pub parent: Oid,
    pub child: Oid,
    pub child_type: ObjectType,
    pub name: String,
}

/// Immutable content record for one version of a file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub oid: Oid,
    pub version: u64,
    /// Hex-encoded 32-byte hash of the file bytes.
    pub hash: String,
    pub size: u64,
    pub mtime: u64,
}

/// Display name and identity of a store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRecord {
    pub sid: Sid,
    pub name: String,
}

/// An (object, version) pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectVersion {
    pub oid: Oid,
    pub version: u64,
}

/// Read-only view of an object, its position in the tree, and its content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectView {
    pub oid: Oid,
    pub store: Sid,
    pub object_type: ObjectType,
    pub version: u64,
    pub parent: Option<Oid>,
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
}

/// Check that `name` is usable as a child name.
pub fn validate_name(name: &str) -> Result<(), TypeError> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name == "." || name == ".." {
        Some("name is a relative path component")
    } else if name.contains('/') {
        Some("name contains '/'")
    } else if name.contains('\0') {
        Some("name contains NUL")
    } else if name.len() > MAX_NAME_LEN {
        Some("name is too long")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(TypeError::InvalidName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Check that `hash` is a hex-encoded 32-byte digest.
pub fn validate_content_hash(hash: &str) -> Result<(), TypeError> {
    let bytes = hex::decode(hash).map_err(|e| TypeError::InvalidContentHash(e.to_string()))?;
    if bytes.len() != CONTENT_HASH_LEN {
        return Err(TypeError::InvalidContentHash(format!(
            "expected {CONTENT_HASH_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(())
}
