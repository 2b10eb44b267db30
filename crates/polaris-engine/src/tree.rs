//! Tree navigation and transform emission shared by the engine operations.
//!
//! Every function here works inside an already open [`Transaction`]; none
//! of them commit.

use std::collections::HashSet;

use polaris_store::Transaction;
use polaris_types::constants::ROOT_STORE_NAME;
use polaris_types::{
    AtomicOperation, ChildEdge, ChildParams, ContentParams, Did, LogicalObject, ObjectType,
    ObjectVersion, Oid, OperationResult, Sid, StoreRecord, Transform, TransformDraft,
    TransformType, UpdatedObject,
};

use crate::error::{EngineError, EngineResult};

/// Load an object or fail with `NoSuchObject`.
pub(crate) fn load(txn: &dyn Transaction, oid: &Oid) -> EngineResult<LogicalObject> {
    txn.object(oid)?.ok_or(EngineError::NoSuchObject(*oid))
}

/// Load the target of an operation. Root-store ids that have never been
/// used are created on first touch.
pub(crate) fn load_target(txn: &mut dyn Transaction, oid: &Oid) -> EngineResult<LogicalObject> {
    if let Some(object) = txn.object(oid)? {
        return Ok(object);
    }
    match oid.as_store() {
        Some(sid) if sid.is_root_store() => ensure_root_store(txn, sid),
        _ => Err(EngineError::NoSuchObject(*oid)),
    }
}

/// Root object of a root store, creating the store if needed.
pub(crate) fn ensure_root_store(txn: &mut dyn Transaction, sid: Sid) -> EngineResult<LogicalObject> {
    if let Some(root) = txn.object(&sid.root_oid())? {
        return Ok(root);
    }
    let root = LogicalObject::store_root(sid);
    txn.put_object(&root)?;
    txn.put_store(&StoreRecord {
        sid,
        name: ROOT_STORE_NAME.to_string(),
    })?;
    tracing::info!(store = %sid, "created root store");
    Ok(root)
}

/// The object that actually holds children for `object`.
///
/// Folders and stores hold their own children; a mount point's children
/// live under the root of the store it anchors. Files hold none.
pub(crate) fn resolve_container(
    txn: &dyn Transaction,
    object: LogicalObject,
) -> EngineResult<LogicalObject> {
    match object.object_type {
        ObjectType::Folder | ObjectType::Store => Ok(object),
        ObjectType::MountPoint => {
            let sid = object
                .oid
                .anchored_sid()
                .map_err(|e| EngineError::invalid(object.oid, e.to_string()))?;
            load(txn, &sid.root_oid())
        }
        ObjectType::File => Err(EngineError::invalid(object.oid, "files have no children")),
    }
}

/// Returns `true` if `oid` is reachable from a store root.
pub(crate) fn is_live(txn: &dyn Transaction, oid: &Oid) -> EngineResult<bool> {
    let mut current = *oid;
    let mut seen = HashSet::new();
    loop {
        if current.is_store_root() {
            return Ok(txn.object(&current)?.is_some());
        }
        if !seen.insert(current) {
            return Ok(false);
        }
        match txn.parent_edge(&current)? {
            Some(edge) => current = edge.parent,
            None => return Ok(false),
        }
    }
}

/// Returns `true` if `ancestor` is `node` or lies on its path to the root.
pub(crate) fn is_ancestor(txn: &dyn Transaction, ancestor: &Oid, node: &Oid) -> EngineResult<bool> {
    let mut current = *node;
    let mut seen = HashSet::new();
    loop {
        if current == *ancestor {
            return Ok(true);
        }
        if !seen.insert(current) {
            return Ok(false);
        }
        match txn.parent_edge(&current)? {
            Some(edge) => current = edge.parent,
            None => return Ok(false),
        }
    }
}

/// Returns `true` if `top` is a mount point or has one anywhere below it.
pub(crate) fn subtree_has_mount_point(txn: &dyn Transaction, top: &Oid) -> EngineResult<bool> {
    if top.is_anchor() {
        return Ok(true);
    }
    let mut pending = vec![*top];
    while let Some(oid) = pending.pop() {
        for edge in txn.children(&oid)? {
            match edge.child_type {
                ObjectType::MountPoint => return Ok(true),
                ObjectType::Folder => pending.push(edge.child),
                _ => {}
            }
        }
    }
    Ok(false)
}

pub(crate) fn child_params(edge: &ChildEdge) -> ChildParams {
    ChildParams {
        child: edge.child,
        child_type: edge.child_type,
        child_name: edge.name.clone(),
    }
}

/// Move `top` and everything below it into `top`'s store.
///
/// `top` must already carry its new store. Each edge is replayed as an
/// INSERT_CHILD on its parent and each file's latest content as an
/// UPDATE_CONTENT, all in the new store, so that a device following only
/// that store can rebuild the subtree. A file at `top` gets its content
/// replayed too.
pub(crate) fn rehome_subtree(
    txn: &mut dyn Transaction,
    emitter: &mut Emitter,
    top: &Oid,
) -> EngineResult<()> {
    let top = load(txn, top)?;
    if top.object_type == ObjectType::File {
        return replay_content(txn, emitter, &top);
    }
    let mut pending = vec![top.oid];
    while let Some(oid) = pending.pop() {
        let mut container = load(txn, &oid)?;
        for edge in txn.children(&oid)? {
            let mut child = load(txn, &edge.child)?;
            child.store = container.store;
            txn.put_object(&child)?;

            let params = child_params(&edge);
            emitter.record_bump(txn, &mut container, TransformType::InsertChild, |d| {
                d.with_child(params)
            })?;

            match child.object_type {
                ObjectType::File => replay_content(txn, emitter, &child)?,
                ObjectType::Folder => pending.push(child.oid),
                _ => {}
            }
        }
    }
    Ok(())
}

/// Record `file`'s latest content as an UPDATE_CONTENT in the file's store.
///
/// The transform names the version the content was written at, which may be
/// older than the file's current version.
fn replay_content(
    txn: &mut dyn Transaction,
    emitter: &mut Emitter,
    file: &LogicalObject,
) -> EngineResult<()> {
    if let Some(content) = txn.latest_content(&file.oid)? {
        let params = ContentParams::from(&content);
        emitter.replay(txn, file, content.version, TransformType::UpdateContent, |d| {
            d.with_content(params)
        })?;
    }
    Ok(())
}

/// Appends transforms for one operation and collects the versions it
/// produced.
pub(crate) struct Emitter {
    device: Did,
    atomic: Option<AtomicOperation>,
    updated: Vec<UpdatedObject>,
}

impl Emitter {
    pub(crate) fn new(device: Did, atomic: Option<AtomicOperation>) -> Self {
        Self {
            device,
            atomic,
            updated: Vec::new(),
        }
    }

    /// Bump `object`, persist it, and record a transform for the new version.
    pub(crate) fn record_bump(
        &mut self,
        txn: &mut dyn Transaction,
        object: &mut LogicalObject,
        transform_type: TransformType,
        decorate: impl FnOnce(TransformDraft) -> TransformDraft,
    ) -> EngineResult<Transform> {
        object.bump();
        txn.put_object(object)?;
        self.record(txn, object, transform_type, decorate)
    }

    /// Record a transform for `object` at its current version.
    fn record(
        &mut self,
        txn: &mut dyn Transaction,
        object: &LogicalObject,
        transform_type: TransformType,
        decorate: impl FnOnce(TransformDraft) -> TransformDraft,
    ) -> EngineResult<Transform> {
        let draft = decorate(TransformDraft::new(
            self.device,
            object.store,
            object.oid,
            transform_type,
            object.version,
        ))
        .with_atomic(self.atomic.clone());
        let transform = txn.append_transform(draft)?;
        self.updated.push(UpdatedObject {
            transform_timestamp: transform.epoch,
            object: ObjectVersion {
                oid: object.oid,
                version: object.version,
            },
        });
        Ok(transform)
    }

    /// Record a transform for `object` at an earlier `version` without
    /// bumping it. Replays create no new version, so they are left out of
    /// the result's updated list.
    pub(crate) fn replay(
        &mut self,
        txn: &mut dyn Transaction,
        object: &LogicalObject,
        version: u64,
        transform_type: TransformType,
        decorate: impl FnOnce(TransformDraft) -> TransformDraft,
    ) -> EngineResult<Transform> {
        let draft = decorate(TransformDraft::new(
            self.device,
            object.store,
            object.oid,
            transform_type,
            version,
        ))
        .with_atomic(self.atomic.clone());
        Ok(txn.append_transform(draft)?)
    }

    pub(crate) fn into_result(self) -> OperationResult {
        OperationResult {
            updated: self.updated,
        }
    }
}
