use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::ROOT_STORE_SALT;
use crate::error::TypeError;

/// Length in bytes of every Polaris identifier.
pub const ID_LEN: usize = 16;

/// Byte holding the tag in its high nibble (the UUID version position).
const TAG_BYTE: usize = 6;

/// Kind tag carried in the high nibble of byte 6 of every identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tag {
    /// Store converted from a shared folder.
    ConvertedStore = 0x0,
    /// Well-known sentinel objects.
    Sentinel = 0x1,
    Device = 0x2,
    /// Per-user root store, derived from a salted hash of the user id.
    RootStore = 0x3,
    /// Plain file or folder, randomly generated.
    Object = 0x4,
    /// Mount point of a converted store.
    Anchor = 0xA,
}

impl Tag {
    pub fn from_nibble(nibble: u8) -> Option<Self> {
        match nibble {
            0x0 => Some(Self::ConvertedStore),
            0x1 => Some(Self::Sentinel),
            0x2 => Some(Self::Device),
            0x3 => Some(Self::RootStore),
            0x4 => Some(Self::Object),
            0xA => Some(Self::Anchor),
            _ => None,
        }
    }

    pub const fn nibble(self) -> u8 {
        self as u8
    }
}

/// Raw 128-bit identifier shared by objects, stores, and devices.
///
/// A `UniqueId` carries no kind guarantee on its own; the typed wrappers
/// [`Oid`], [`Sid`], and [`Did`] validate the tag when they are built.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniqueId([u8; ID_LEN]);

impl UniqueId {
    pub const fn from_raw(bytes: [u8; ID_LEN]) -> Self {
        Self(bytes)
    }

    /// A fresh random identifier. Random ids carry the plain-object tag.
    pub fn generate() -> Self {
        Self(*uuid::Uuid::new_v4().as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    pub const fn nibble(&self) -> u8 {
        self.0[TAG_BYTE] >> 4
    }

    pub fn tag(&self) -> Option<Tag> {
        Tag::from_nibble(self.nibble())
    }

    /// Rewrite the tag nibble, leaving every other bit untouched.
    pub const fn with_tag(self, tag: Tag) -> Self {
        let mut bytes = self.0;
        bytes[TAG_BYTE] = (bytes[TAG_BYTE] & 0x0f) | (tag.nibble() << 4);
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 8 hex characters, for logs.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != ID_LEN {
            return Err(TypeError::InvalidLength {
                expected: ID_LEN,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; ID_LEN];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UniqueId({})", self.short_hex())
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Shared plumbing for the typed identifier wrappers: validated
/// construction, hex parsing, display, and hex-string serde.
macro_rules! typed_id {
    ($name:ident, $kind:literal, $legal:pat) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(UniqueId);

        impl $name {
            /// Wrap a raw identifier, rejecting tags illegal for this kind.
            pub fn new(id: UniqueId) -> Result<Self, TypeError> {
                match id.tag() {
                    Some($legal) => Ok(Self(id)),
                    _ => Err(TypeError::InvalidTag {
                        tag: id.nibble(),
                        kind: $kind,
                    }),
                }
            }

            pub fn from_bytes(bytes: [u8; ID_LEN]) -> Result<Self, TypeError> {
                Self::new(UniqueId::from_raw(bytes))
            }

            pub fn from_hex(s: &str) -> Result<Self, TypeError> {
                Self::new(UniqueId::from_hex(s)?)
            }

            pub fn unique_id(&self) -> UniqueId {
                self.0
            }

            pub fn as_bytes(&self) -> &[u8; ID_LEN] {
                self.0.as_bytes()
            }

            pub fn tag(&self) -> Tag {
                // The constructor only admits known tags.
                self.0.tag().unwrap_or(Tag::Object)
            }

            pub fn to_hex(&self) -> String {
                self.0.to_hex()
            }

            pub fn short_hex(&self) -> String {
                self.0.short_hex()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.short_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl TryFrom<UniqueId> for $name {
            type Error = TypeError;

            fn try_from(id: UniqueId) -> Result<Self, Self::Error> {
                Self::new(id)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

typed_id!(
    Oid,
    "object id",
    Tag::Object | Tag::Anchor | Tag::Sentinel | Tag::ConvertedStore | Tag::RootStore
);
typed_id!(Sid, "store id", Tag::ConvertedStore | Tag::RootStore);
typed_id!(Did, "device id", Tag::Device);

impl Oid {
    /// A fresh random plain-object id.
    pub fn generate() -> Self {
        Self(UniqueId::generate().with_tag(Tag::Object))
    }

    /// Build an id without tag validation. Only for compile-time constants
    /// whose tag is known to be legal.
    pub(crate) const fn from_unique_unchecked(id: UniqueId) -> Self {
        Self(id)
    }

    pub fn is_plain(&self) -> bool {
        self.tag() == Tag::Object
    }

    pub fn is_anchor(&self) -> bool {
        self.tag() == Tag::Anchor
    }

    pub fn is_sentinel(&self) -> bool {
        self.tag() == Tag::Sentinel
    }

    /// Returns `true` if this id names the root object of a store.
    pub fn is_store_root(&self) -> bool {
        matches!(self.tag(), Tag::ConvertedStore | Tag::RootStore)
    }

    /// The store whose root object this id names, if any.
    pub fn as_store(&self) -> Option<Sid> {
        Sid::new(self.0).ok()
    }

    /// The store a plain folder becomes when it is shared.
    pub fn to_converted_sid(&self) -> Result<Sid, TypeError> {
        if !self.is_plain() {
            return Err(TypeError::NotConvertible(format!("{self:?}")));
        }
        Ok(Sid(self.0.with_tag(Tag::ConvertedStore)))
    }

    /// The store an anchor mounts.
    pub fn anchored_sid(&self) -> Result<Sid, TypeError> {
        if !self.is_anchor() {
            return Err(TypeError::NotConvertible(format!("{self:?}")));
        }
        Ok(Sid(self.0.with_tag(Tag::ConvertedStore)))
    }
}

impl Sid {
    /// Deterministic root store for a user: a salted BLAKE3 hash of the user
    /// id, truncated to 128 bits and tagged as a root store.
    pub fn root_store_for(user_id: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(ROOT_STORE_SALT);
        hasher.update(user_id.as_bytes());
        let mut bytes = [0u8; ID_LEN];
        bytes.copy_from_slice(&hasher.finalize().as_bytes()[..ID_LEN]);
        // RFC 4122 variant bits, matching random ids.
        bytes[8] = (bytes[8] & 0x3f) | 0x80;
        Self(UniqueId::from_raw(bytes).with_tag(Tag::RootStore))
    }

    pub fn is_root_store(&self) -> bool {
        self.tag() == Tag::RootStore
    }

    pub fn is_converted(&self) -> bool {
        self.tag() == Tag::ConvertedStore
    }

    /// Id of this store's root object (same bytes).
    pub fn root_oid(&self) -> Oid {
        Oid(self.0)
    }

    /// The anchor that mounts this store. Root stores cannot be mounted.
    pub fn anchor(&self) -> Result<Oid, TypeError> {
        if !self.is_converted() {
            return Err(TypeError::NotConvertible(format!("{self:?}")));
        }
        Ok(Oid(self.0.with_tag(Tag::Anchor)))
    }

    /// The folder this store was converted from.
    pub fn folder(&self) -> Result<Oid, TypeError> {
        if !self.is_converted() {
            return Err(TypeError::NotConvertible(format!("{self:?}")));
        }
        Ok(Oid(self.0.with_tag(Tag::Object)))
    }
}

impl Did {
    pub fn generate() -> Self {
        Self(UniqueId::generate().with_tag(Tag::Device))
    }
}

/// An identifier classified by kind.
///
/// Store-tagged ids classify as [`IdKind::Store`] even though the same bytes
/// also name the store's root object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdKind {
    Object(Oid),
    Store(Sid),
    Device(Did),
}

impl IdKind {
    pub fn classify(id: UniqueId) -> Result<Self, TypeError> {
        match id.tag() {
            Some(Tag::ConvertedStore | Tag::RootStore) => Ok(Self::Store(Sid(id))),
            Some(Tag::Device) => Ok(Self::Device(Did(id))),
            Some(Tag::Object | Tag::Anchor | Tag::Sentinel) => Ok(Self::Object(Oid(id))),
            None => Err(TypeError::InvalidTag {
                tag: id.nibble(),
                kind: "identifier",
            }),
        }
    }
}
