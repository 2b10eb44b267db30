use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::ids::{Did, Oid, Sid};
use crate::object::{Content, ObjectType};

/// Kind of change a transform records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransformType {
    InsertChild,
    RemoveChild,
    RenameChild,
    UpdateContent,
    Share,
    RenameStore,
}

impl fmt::Display for TransformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InsertChild => "INSERT_CHILD",
            Self::RemoveChild => "REMOVE_CHILD",
            Self::RenameChild => "RENAME_CHILD",
            Self::UpdateContent => "UPDATE_CONTENT",
            Self::Share => "SHARE",
            Self::RenameStore => "RENAME_STORE",
        };
        f.write_str(s)
    }
}

/// Membership of a transform in an atomic group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicOperation {
    pub id: String,
    pub index: u32,
    pub total: u32,
}

/// Edge described by a child transform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildParams {
    pub child: Oid,
    pub child_type: ObjectType,
    pub child_name: String,
}

/// Content described by an UPDATE_CONTENT transform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentParams {
    pub hash: String,
    pub size: u64,
    pub mtime: u64,
}

impl From<&Content> for ContentParams {
    fn from(content: &Content) -> Self {
        Self {
            hash: content.hash.clone(),
            size: content.size,
            mtime: content.mtime,
        }
    }
}

/// Everything about a transform except the fields the log assigns on
/// append (`epoch` and `timestamp`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransformDraft {
    pub originator: Did,
    pub store: Sid,
    pub oid: Oid,
    pub transform_type: TransformType,
    pub new_version: u64,
    pub atomic: Option<AtomicOperation>,
    pub child: Option<ChildParams>,
    pub content: Option<ContentParams>,
    pub store_name: Option<String>,
}

impl TransformDraft {
    pub fn new(
        originator: Did,
        store: Sid,
        oid: Oid,
        transform_type: TransformType,
        new_version: u64,
    ) -> Self {
        Self {
            originator,
            store,
            oid,
            transform_type,
            new_version,
            atomic: None,
            child: None,
            content: None,
            store_name: None,
        }
    }

    pub fn with_child(mut self, child: ChildParams) -> Self {
        self.child = Some(child);
        self
    }

    pub fn with_content(mut self, content: ContentParams) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_store_name(mut self, name: impl Into<String>) -> Self {
        self.store_name = Some(name.into());
        self
    }

    pub fn with_atomic(mut self, atomic: Option<AtomicOperation>) -> Self {
        self.atomic = atomic;
        self
    }

    /// Seal the draft at `epoch`.
    pub fn into_transform(self, epoch: u64, timestamp: u64) -> Transform {
        Transform {
            epoch,
            originator: self.originator,
            store: self.store,
            oid: self.oid,
            transform_type: self.transform_type,
            new_version: self.new_version,
            timestamp,
            atomic: self.atomic,
            child: self.child,
            content: self.content,
            store_name: self.store_name,
        }
    }
}

/// One immutable, epoch-ordered record of an accepted mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transform {
    /// Position in the global log. Strictly increasing, never reused.
    pub epoch: u64,
    pub originator: Did,
    pub store: Sid,
    pub oid: Oid,
    pub transform_type: TransformType,
    pub new_version: u64,
    /// Wall-clock milliseconds since UNIX epoch at acceptance.
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atomic: Option<AtomicOperation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child: Option<ChildParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ContentParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_name: Option<String>,
}

/// Current wall-clock time in milliseconds since UNIX epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_seals_with_epoch_and_timestamp() {
        let did = Did::generate();
        let sid = Sid::root_store_for("u");
        let child = Oid::generate();
        let transform = TransformDraft::new(did, sid, sid.root_oid(), TransformType::InsertChild, 2)
            .with_child(ChildParams {
                child,
                child_type: ObjectType::File,
                child_name: "a.txt".into(),
            })
            .into_transform(7, 1_000);

        assert_eq!(transform.epoch, 7);
        assert_eq!(transform.timestamp, 1_000);
        assert_eq!(transform.new_version, 2);
        assert_eq!(transform.child.as_ref().unwrap().child, child);
        assert!(transform.atomic.is_none());
    }

    #[test]
    fn optional_params_are_omitted_on_the_wire() {
        let sid = Sid::root_store_for("u");
        let transform =
            TransformDraft::new(Did::generate(), sid, sid.root_oid(), TransformType::Share, 3)
                .into_transform(1, 0);
        let value = serde_json::to_value(&transform).unwrap();
        assert_eq!(value["transform_type"], "SHARE");
        assert!(value.get("child").is_none());
        assert!(value.get("content").is_none());
        let parsed: Transform = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, transform);
    }

    #[test]
    fn now_millis_is_monotone_enough() {
        let a = now_millis();
        let b = now_millis();
        assert!(b >= a);
        assert!(a > 0);
    }
}
