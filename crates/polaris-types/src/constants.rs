//! Well-known identifiers and limits shared by every Polaris crate.

use crate::ids::{Oid, Tag, UniqueId, ID_LEN};

/// Salt mixed into the hash that derives a user's root store id.
pub const ROOT_STORE_SALT: &[u8] = b"polaris-root-store-v1:";

/// Sentinel reported as the parent of every store root object.
pub const ROOT: Oid = Oid::from_unique_unchecked(
    UniqueId::from_raw([0u8; ID_LEN]).with_tag(Tag::Sentinel),
);

/// Sentinel for the trash. Never a legal destination for a child.
pub const TRASH: Oid = Oid::from_unique_unchecked(
    UniqueId::from_raw([0xffu8; ID_LEN]).with_tag(Tag::Sentinel),
);

/// Display name given to lazily created root stores.
pub const ROOT_STORE_NAME: &str = "root";

/// Maximum length of a child name, in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// Length of a content hash, in bytes.
pub const CONTENT_HASH_LEN: usize = 32;
