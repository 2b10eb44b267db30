//! Foundation types for Polaris, the logical object tree store.
//!
//! Every other Polaris crate depends on `polaris-types`.
//!
//! # Key Types
//!
//! - [`Oid`], [`Sid`], [`Did`] — tagged 128-bit identifiers for objects,
//!   stores, and devices
//! - [`LogicalObject`] — current state of one object in the tree
//! - [`Operation`] — a mutation request, decoded by discriminator
//! - [`Transform`] — immutable, epoch-ordered record of an accepted mutation
//! - [`ErrorCode`] — the error codes clients act on

pub mod constants;
pub mod error;
pub mod ids;
pub mod object;
pub mod operation;
pub mod result;
pub mod transform;

pub use error::TypeError;
pub use ids::{Did, IdKind, Oid, Sid, Tag, UniqueId, ID_LEN};
pub use object::{
    validate_content_hash, validate_name, ChildEdge, Content, LogicalObject, ObjectType,
    ObjectVersion, ObjectView, StoreRecord,
};
pub use operation::Operation;
pub use result::{
    BatchOperation, BatchOperationResult, ErrorBody, ErrorCode, LocationAction, LocationBatch,
    LocationBatchResult, LocationUpdate, OperationResult, TransformBatch, TransformBatchResult,
    UpdatedObject,
};
pub use transform::{
    now_millis, AtomicOperation, ChildParams, ContentParams, Transform, TransformDraft,
    TransformType,
};
