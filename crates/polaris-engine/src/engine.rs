use std::sync::Arc;

use polaris_store::{transact, MetaStore, Transaction};
use polaris_types::constants::ROOT;
use polaris_types::{
    AtomicOperation, ChildEdge, Content, ContentParams, Did, LogicalObject, ObjectType,
    ObjectView, Oid, Operation, OperationResult, Sid, StoreRecord, TransformType,
};

use crate::access::{require, Access, AccessManager};
use crate::error::{EngineError, EngineResult};
use crate::tree::{self, child_params, Emitter};

/// Applies operations to the object tree.
///
/// Each call validates, mutates, and appends the resulting transforms inside
/// one storage transaction. Nothing is visible unless every step succeeds.
#[derive(Clone)]
pub struct TransformEngine {
    store: Arc<dyn MetaStore>,
    access: Arc<dyn AccessManager>,
}

impl TransformEngine {
    pub fn new(store: Arc<dyn MetaStore>, access: Arc<dyn AccessManager>) -> Self {
        Self { store, access }
    }

    /// Apply `operation` to `target` on behalf of `device`.
    pub fn apply(
        &self,
        device: &Did,
        target: &Oid,
        operation: &Operation,
    ) -> EngineResult<OperationResult> {
        operation.validate()?;
        let result = transact(&*self.store, |txn| {
            self.apply_in(txn, device, target, operation, None)
        });
        report(device, target, operation, &result);
        result
    }

    /// Run `work` in one transaction of the engine's store.
    pub(crate) fn in_transaction<T>(
        &self,
        work: impl FnOnce(&mut dyn Transaction) -> EngineResult<T>,
    ) -> EngineResult<T> {
        transact(&*self.store, work)
    }

    /// Apply a structurally valid operation inside an open transaction.
    pub(crate) fn apply_in(
        &self,
        txn: &mut dyn Transaction,
        device: &Did,
        target: &Oid,
        operation: &Operation,
        atomic: Option<AtomicOperation>,
    ) -> EngineResult<OperationResult> {
        Apply {
            txn,
            access: &*self.access,
            device: *device,
            emitter: Emitter::new(*device, atomic),
        }
        .run(target, operation)
    }

    /// Current state of `oid`: type, version, position, and latest content.
    ///
    /// Store roots report the [`ROOT`] sentinel as their parent and the store
    /// name as their name.
    pub fn object(&self, device: &Did, oid: &Oid) -> EngineResult<ObjectView> {
        transact(&*self.store, |txn| {
            let object = tree::load(txn, oid)?;
            require(&*self.access, device, &object.store, Access::Read)?;

            let (parent, name) = if object.object_type == ObjectType::Store {
                (Some(ROOT), txn.store(&object.store)?.map(|s| s.name))
            } else {
                match txn.parent_edge(oid)? {
                    Some(edge) => (Some(edge.parent), Some(edge.name)),
                    None => (None, None),
                }
            };
            let content = if object.object_type == ObjectType::File {
                txn.latest_content(oid)?
            } else {
                None
            };

            Ok(ObjectView {
                oid: object.oid,
                store: object.store,
                object_type: object.object_type,
                version: object.version,
                parent,
                name,
                content,
            })
        })
    }
}

impl std::fmt::Debug for TransformEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformEngine").finish_non_exhaustive()
    }
}

/// Log the outcome of an operation at the level its kind deserves.
pub(crate) fn report(
    device: &Did,
    target: &Oid,
    operation: &Operation,
    result: &EngineResult<OperationResult>,
) {
    let op = operation.type_name();
    match result {
        Ok(r) => tracing::debug!(%device, %target, op, updated = r.updated.len(), "operation applied"),
        Err(EngineError::Store(e)) => {
            tracing::error!(%device, %target, op, error = %e, "storage failure")
        }
        Err(e) => tracing::warn!(%device, %target, op, code = %e.code(), error = %e, "operation rejected"),
    }
}

/// State of one operation being applied.
struct Apply<'t> {
    txn: &'t mut dyn Transaction,
    access: &'t dyn AccessManager,
    device: Did,
    emitter: Emitter,
}

impl Apply<'_> {
    fn run(mut self, target: &Oid, operation: &Operation) -> EngineResult<OperationResult> {
        let target = tree::load_target(self.txn, target)?;
        self.require_write(&target.store)?;

        match operation {
            Operation::InsertChild {
                child,
                child_type,
                child_name,
            } => self.insert_child(target, *child, *child_type, child_name)?,
            Operation::MoveChild {
                child,
                new_parent,
                new_child_name,
            } => self.move_child(target, *child, new_parent, new_child_name)?,
            Operation::RemoveChild { child } => self.remove_child(target, *child)?,
            Operation::UpdateContent {
                local_version,
                hash,
                size,
                mtime,
            } => self.update_content(target, *local_version, hash, *size, *mtime)?,
            Operation::Share => self.share(target)?,
            Operation::Restore => self.restore(target)?,
            Operation::RenameStore { old_name, new_name } => {
                self.rename_store(target, old_name, new_name)?
            }
        }
        Ok(self.emitter.into_result())
    }

    fn require_write(&self, store: &Sid) -> EngineResult<()> {
        require(self.access, &self.device, store, Access::Write)
    }

    /// Resolve `object` to the object holding its children, checking write
    /// access again when that lands in another store.
    fn container(&self, object: LogicalObject) -> EngineResult<LogicalObject> {
        let origin = object.store;
        let container = tree::resolve_container(&*self.txn, object)?;
        if container.store != origin {
            self.require_write(&container.store)?;
        }
        Ok(container)
    }

    fn check_child_type(
        &self,
        parent: &LogicalObject,
        child: &Oid,
        child_type: ObjectType,
    ) -> EngineResult<()> {
        if child.is_sentinel() {
            return Err(EngineError::invalid(*child, "sentinels cannot be children"));
        }
        match child_type {
            ObjectType::Store => Err(EngineError::invalid(*child, "stores cannot be children")),
            ObjectType::File | ObjectType::Folder if !child.is_plain() => Err(
                EngineError::invalid(*child, format!("a {child_type} needs a plain object id")),
            ),
            ObjectType::MountPoint => {
                if !child.is_anchor() {
                    return Err(EngineError::invalid(*child, "a MOUNT_POINT needs an anchor id"));
                }
                if !parent.store.is_root_store() {
                    return Err(EngineError::invalid(
                        *child,
                        "mount points may only live in root stores",
                    ));
                }
                let anchored = child
                    .anchored_sid()
                    .map_err(|e| EngineError::invalid(*child, e.to_string()))?;
                tree::load(&*self.txn, &anchored.root_oid())?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Reject moving `object` into `store` when the result would break the
    /// rules about where mount points and shared folders may live.
    fn check_rehome(&self, object: &LogicalObject, store: &Sid) -> EngineResult<()> {
        if store.is_converted() && tree::subtree_has_mount_point(&*self.txn, &object.oid)? {
            return Err(EngineError::invalid(
                object.oid,
                "mount points may only live in root stores",
            ));
        }
        Ok(())
    }

    fn insert_child(
        &mut self,
        target: LogicalObject,
        child: Oid,
        child_type: ObjectType,
        name: &str,
    ) -> EngineResult<()> {
        let mut parent = self.container(target)?;
        self.check_child_type(&parent, &child, child_type)?;

        let existing = self.txn.object(&child)?;
        if let Some(object) = &existing {
            if object.object_type != child_type {
                return Err(EngineError::invalid(
                    child,
                    format!("object is a {}, not a {child_type}", object.object_type),
                ));
            }
        }

        if let Some(bound) = self.txn.child_named(&parent.oid, name)? {
            if bound.child == child {
                return Ok(());
            }
            return Err(EngineError::NameConflict {
                parent: parent.oid,
                name: name.to_string(),
            });
        }
        if let Some(edge) = self.txn.parent_edge(&child)? {
            return Err(EngineError::parent_conflict(
                child,
                format!("already live under {}", edge.parent),
            ));
        }

        let edge = ChildEdge {
            parent: parent.oid,
            child,
            child_type,
            name: name.to_string(),
        };
        match existing {
            Some(object) => self.reattach(parent, object, edge),
            None => {
                self.txn
                    .put_object(&LogicalObject::new(child, parent.store, child_type))?;
                self.txn.insert_edge(&edge)?;
                let params = child_params(&edge);
                self.emitter
                    .record_bump(self.txn, &mut parent, TransformType::InsertChild, |d| {
                        d.with_child(params)
                    })?;
                Ok(())
            }
        }
    }

    /// Bind a detached object under `parent`, moving its subtree into the
    /// parent's store if needed.
    fn reattach(
        &mut self,
        mut parent: LogicalObject,
        mut object: LogicalObject,
        edge: ChildEdge,
    ) -> EngineResult<()> {
        if object.object_type == ObjectType::Folder {
            let converted = object.oid.to_converted_sid()?;
            if self.txn.store(&converted)?.is_some() {
                return Err(EngineError::invalid(
                    object.oid,
                    "folder has been converted into a store",
                ));
            }
        }
        if tree::is_ancestor(&*self.txn, &object.oid, &parent.oid)? {
            return Err(EngineError::parent_conflict(
                object.oid,
                format!("attaching under {} would create a cycle", parent.oid),
            ));
        }
        let crosses = object.store != parent.store;
        if crosses {
            self.check_rehome(&object, &parent.store)?;
        }

        self.txn.clear_tombstone(&object.oid)?;
        self.txn.insert_edge(&edge)?;

        let params = child_params(&edge);
        self.emitter
            .record_bump(self.txn, &mut parent, TransformType::InsertChild, |d| {
                d.with_child(params.clone())
            })?;
        object.store = parent.store;
        self.emitter
            .record_bump(self.txn, &mut object, TransformType::InsertChild, |d| {
                d.with_child(params)
            })?;

        if crosses {
            tree::rehome_subtree(self.txn, &mut self.emitter, &object.oid)?;
        }
        Ok(())
    }

    fn move_child(
        &mut self,
        target: LogicalObject,
        child: Oid,
        new_parent: &Oid,
        name: &str,
    ) -> EngineResult<()> {
        let source = self.container(target)?;
        let mut object = tree::load(&*self.txn, &child)?;
        let edge = match self.txn.parent_edge(&child)? {
            Some(edge) if edge.parent == source.oid => edge,
            Some(edge) => {
                return Err(EngineError::parent_conflict(
                    child,
                    format!("parent is {}, not {}", edge.parent, source.oid),
                ))
            }
            None => return Err(EngineError::parent_conflict(child, "object is not attached")),
        };

        let destination = tree::load_target(self.txn, new_parent)?;
        self.require_write(&destination.store)?;
        let mut destination = self.container(destination)?;

        if object.object_type == ObjectType::MountPoint && !destination.store.is_root_store() {
            return Err(EngineError::invalid(
                child,
                "mount points may only live in root stores",
            ));
        }
        if tree::is_ancestor(&*self.txn, &child, &destination.oid)? {
            return Err(EngineError::parent_conflict(
                child,
                format!("moving under {} would create a cycle", destination.oid),
            ));
        }
        if let Some(bound) = self.txn.child_named(&destination.oid, name)? {
            if bound.child == child {
                return Ok(());
            }
            return Err(EngineError::NameConflict {
                parent: destination.oid,
                name: name.to_string(),
            });
        }
        let crosses = object.store != destination.store;
        if crosses {
            self.check_rehome(&object, &destination.store)?;
        }

        self.txn.remove_edge(&child)?;
        let moved = ChildEdge {
            parent: destination.oid,
            child,
            child_type: edge.child_type,
            name: name.to_string(),
        };
        self.txn.insert_edge(&moved)?;
        let params = child_params(&moved);

        if source.oid == destination.oid {
            self.emitter
                .record_bump(self.txn, &mut destination, TransformType::RenameChild, |d| {
                    d.with_child(params.clone())
                })?;
            self.emitter
                .record_bump(self.txn, &mut object, TransformType::RenameChild, |d| {
                    d.with_child(params)
                })?;
            return Ok(());
        }

        let mut source = source;
        let removed = child_params(&edge);
        self.emitter
            .record_bump(self.txn, &mut source, TransformType::RemoveChild, |d| {
                d.with_child(removed)
            })?;
        self.emitter
            .record_bump(self.txn, &mut destination, TransformType::InsertChild, |d| {
                d.with_child(params.clone())
            })?;
        object.store = destination.store;
        self.emitter
            .record_bump(self.txn, &mut object, TransformType::InsertChild, |d| {
                d.with_child(params)
            })?;
        if crosses {
            tree::rehome_subtree(self.txn, &mut self.emitter, &child)?;
        }
        Ok(())
    }

    fn remove_child(&mut self, target: LogicalObject, child: Oid) -> EngineResult<()> {
        let mut parent = self.container(target)?;
        let mut object = tree::load(&*self.txn, &child)?;
        let edge = match self.txn.parent_edge(&child)? {
            Some(edge) if edge.parent == parent.oid => edge,
            _ => {
                return Err(EngineError::parent_conflict(
                    child,
                    format!("not a child of {}", parent.oid),
                ))
            }
        };

        self.txn.remove_edge(&child)?;
        self.txn.put_tombstone(&edge)?;

        let params = child_params(&edge);
        self.emitter
            .record_bump(self.txn, &mut parent, TransformType::RemoveChild, |d| {
                d.with_child(params.clone())
            })?;
        self.emitter
            .record_bump(self.txn, &mut object, TransformType::RemoveChild, |d| {
                d.with_child(params)
            })?;
        Ok(())
    }

    fn update_content(
        &mut self,
        mut file: LogicalObject,
        local_version: u64,
        hash: &str,
        size: u64,
        mtime: u64,
    ) -> EngineResult<()> {
        if file.object_type != ObjectType::File {
            return Err(EngineError::invalid(file.oid, "only files have content"));
        }
        if local_version != file.version {
            return Err(EngineError::VersionConflict {
                oid: file.oid,
                expected: local_version,
                actual: file.version,
            });
        }

        let content = Content {
            oid: file.oid,
            version: file.version + 1,
            hash: hash.to_string(),
            size,
            mtime,
        };
        self.txn.put_content(&content)?;
        let params = ContentParams::from(&content);
        self.emitter
            .record_bump(self.txn, &mut file, TransformType::UpdateContent, |d| {
                d.with_content(params)
            })?;
        Ok(())
    }

    /// Convert a folder into a store of its own, leaving a mount point where
    /// the folder was.
    fn share(&mut self, mut folder: LogicalObject) -> EngineResult<()> {
        if folder.object_type != ObjectType::Folder {
            return Err(EngineError::invalid(folder.oid, "only folders can be shared"));
        }
        if !folder.store.is_root_store() {
            return Err(EngineError::invalid(
                folder.oid,
                "folders inside shared stores cannot be shared",
            ));
        }
        let edge = self.txn.parent_edge(&folder.oid)?.ok_or_else(|| {
            EngineError::parent_conflict(folder.oid, "detached folders cannot be shared")
        })?;
        if tree::subtree_has_mount_point(&*self.txn, &folder.oid)? {
            return Err(EngineError::invalid(
                folder.oid,
                "folders containing mount points cannot be shared",
            ));
        }
        let sid = folder.oid.to_converted_sid()?;
        if self.txn.store(&sid)?.is_some() {
            return Err(EngineError::invalid(folder.oid, "folder is already shared"));
        }
        let mut parent = tree::load(&*self.txn, &edge.parent)?;

        self.txn.put_store(&StoreRecord {
            sid,
            name: edge.name.clone(),
        })?;
        let root = LogicalObject::store_root(sid);
        self.txn.put_object(&root)?;

        self.txn.remove_edge(&folder.oid)?;
        let store_name = edge.name.clone();
        self.emitter
            .record_bump(self.txn, &mut folder, TransformType::Share, |d| {
                d.with_store_name(store_name)
            })?;

        let anchor = LogicalObject::new(sid.anchor()?, parent.store, ObjectType::MountPoint);
        self.txn.put_object(&anchor)?;
        let mount = ChildEdge {
            parent: parent.oid,
            child: anchor.oid,
            child_type: ObjectType::MountPoint,
            name: edge.name,
        };
        self.txn.insert_edge(&mount)?;
        let params = child_params(&mount);
        self.emitter
            .record_bump(self.txn, &mut parent, TransformType::InsertChild, |d| {
                d.with_child(params)
            })?;

        for child in self.txn.children(&folder.oid)? {
            self.txn.remove_edge(&child.child)?;
            self.txn.insert_edge(&ChildEdge {
                parent: root.oid,
                ..child
            })?;
        }
        tree::rehome_subtree(self.txn, &mut self.emitter, &root.oid)?;

        tracing::info!(folder = %folder.oid, store = %sid, "folder shared");
        Ok(())
    }

    /// Reattach a removed object to its recovery parent under its last name.
    fn restore(&mut self, object: LogicalObject) -> EngineResult<()> {
        if object.object_type == ObjectType::Store {
            return Err(EngineError::invalid(object.oid, "stores cannot be restored"));
        }
        if let Some(edge) = self.txn.parent_edge(&object.oid)? {
            return Err(EngineError::parent_conflict(
                object.oid,
                format!("already live under {}", edge.parent),
            ));
        }
        let tombstone = self
            .txn
            .tombstone(&object.oid)?
            .ok_or_else(|| EngineError::parent_conflict(object.oid, "object was never removed"))?;

        let parent = match self.txn.object(&tombstone.parent)? {
            Some(p) if p.object_type.is_container() && tree::is_live(&*self.txn, &p.oid)? => p,
            _ => tree::load(&*self.txn, &object.store.root_oid())?,
        };
        if parent.store != object.store {
            self.require_write(&parent.store)?;
        }
        if self.txn.child_named(&parent.oid, &tombstone.name)?.is_some() {
            return Err(EngineError::NameConflict {
                parent: parent.oid,
                name: tombstone.name,
            });
        }

        let edge = ChildEdge {
            parent: parent.oid,
            child: object.oid,
            child_type: tombstone.child_type,
            name: tombstone.name,
        };
        self.reattach(parent, object, edge)
    }

    fn rename_store(
        &mut self,
        mut root: LogicalObject,
        old_name: &str,
        new_name: &str,
    ) -> EngineResult<()> {
        let sid = match (root.object_type, root.oid.as_store()) {
            (ObjectType::Store, Some(sid)) => sid,
            _ => return Err(EngineError::invalid(root.oid, "only stores can be renamed")),
        };
        let mut record = self
            .txn
            .store(&sid)?
            .ok_or(EngineError::NoSuchObject(root.oid))?;
        if record.name != old_name {
            return Err(EngineError::StoreNameConflict {
                store: sid,
                expected: old_name.to_string(),
                actual: record.name,
            });
        }
        if old_name == new_name {
            return Ok(());
        }

        record.name = new_name.to_string();
        self.txn.put_store(&record)?;
        let name = record.name;
        self.emitter
            .record_bump(self.txn, &mut root, TransformType::RenameStore, |d| {
                d.with_store_name(name)
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{AllowAll, StoreAcl};
    use polaris_store::InMemoryMetaStore;
    use polaris_types::{ErrorCode, Transform};

    struct Fixture {
        store: Arc<InMemoryMetaStore>,
        engine: TransformEngine,
        device: Did,
        root: Oid,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(InMemoryMetaStore::new());
            let engine = TransformEngine::new(store.clone(), Arc::new(AllowAll));
            Self {
                store,
                engine,
                device: Did::generate(),
                root: Sid::root_store_for("alice").root_oid(),
            }
        }

        fn apply(&self, target: Oid, op: Operation) -> EngineResult<OperationResult> {
            self.engine.apply(&self.device, &target, &op)
        }

        fn insert(&self, parent: Oid, child_type: ObjectType, name: &str) -> Oid {
            let child = Oid::generate();
            self.apply(
                parent,
                Operation::InsertChild {
                    child,
                    child_type,
                    child_name: name.into(),
                },
            )
            .unwrap();
            child
        }

        fn insert_existing(&self, parent: Oid, child: Oid, name: &str) -> OperationResult {
            let child_type = self.view(child).object_type;
            self.apply(
                parent,
                Operation::InsertChild {
                    child,
                    child_type,
                    child_name: name.into(),
                },
            )
            .unwrap()
        }

        fn view(&self, oid: Oid) -> ObjectView {
            self.engine.object(&self.device, &oid).unwrap()
        }

        fn version(&self, oid: Oid) -> u64 {
            self.view(oid).version
        }

        fn log(&self, store: Sid) -> Vec<Transform> {
            let txn = self.store.begin().unwrap();
            txn.transforms_since(&store, 0, usize::MAX).unwrap()
        }

        fn write(&self, file: Oid, hash_byte: &str) -> OperationResult {
            let version = self.version(file);
            self.apply(
                file,
                Operation::UpdateContent {
                    local_version: version,
                    hash: hash_byte.repeat(32),
                    size: 10,
                    mtime: 1,
                },
            )
            .unwrap()
        }
    }

    fn code(result: EngineResult<OperationResult>) -> ErrorCode {
        result.unwrap_err().code()
    }

    #[test]
    fn insert_new_child_bumps_only_the_parent() {
        let fx = Fixture::new();
        let child = Oid::generate();
        let result = fx
            .apply(
                fx.root,
                Operation::InsertChild {
                    child,
                    child_type: ObjectType::File,
                    child_name: "a.txt".into(),
                },
            )
            .unwrap();

        assert_eq!(result.updated.len(), 1);
        assert_eq!(result.version_of(&fx.root), Some(2));
        assert_eq!(fx.version(child), 1);

        let view = fx.view(child);
        assert_eq!(view.parent, Some(fx.root));
        assert_eq!(view.name.as_deref(), Some("a.txt"));

        let log = fx.log(Sid::root_store_for("alice"));
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].transform_type, TransformType::InsertChild);
        assert_eq!(log[0].child.as_ref().unwrap().child, child);
    }

    #[test]
    fn root_store_view_reports_sentinel_parent() {
        let fx = Fixture::new();
        fx.insert(fx.root, ObjectType::Folder, "docs");
        let view = fx.view(fx.root);
        assert_eq!(view.object_type, ObjectType::Store);
        assert_eq!(view.parent, Some(ROOT));
        assert_eq!(view.name.as_deref(), Some("root"));
    }

    #[test]
    fn reinserting_the_same_binding_is_a_noop() {
        let fx = Fixture::new();
        let child = fx.insert(fx.root, ObjectType::File, "a");
        let result = fx
            .apply(
                fx.root,
                Operation::InsertChild {
                    child,
                    child_type: ObjectType::File,
                    child_name: "a".into(),
                },
            )
            .unwrap();
        assert!(result.updated.is_empty());
        assert_eq!(fx.version(fx.root), 2);
    }

    #[test]
    fn insert_conflicts() {
        let fx = Fixture::new();
        let a = fx.insert(fx.root, ObjectType::Folder, "a");
        let b = fx.insert(fx.root, ObjectType::Folder, "b");

        let taken = fx.apply(
            fx.root,
            Operation::InsertChild {
                child: Oid::generate(),
                child_type: ObjectType::File,
                child_name: "a".into(),
            },
        );
        assert_eq!(code(taken), ErrorCode::NameConflict);

        let live = fx.apply(
            b,
            Operation::InsertChild {
                child: a,
                child_type: ObjectType::Folder,
                child_name: "a".into(),
            },
        );
        assert_eq!(code(live), ErrorCode::ParentConflict);

        let missing = fx.apply(
            Oid::generate(),
            Operation::InsertChild {
                child: Oid::generate(),
                child_type: ObjectType::File,
                child_name: "x".into(),
            },
        );
        assert_eq!(code(missing), ErrorCode::NoSuchObject);
    }

    #[test]
    fn insert_type_rules() {
        let fx = Fixture::new();
        let file = fx.insert(fx.root, ObjectType::File, "f");

        let into_file = fx.apply(
            file,
            Operation::InsertChild {
                child: Oid::generate(),
                child_type: ObjectType::File,
                child_name: "x".into(),
            },
        );
        assert_eq!(code(into_file), ErrorCode::InvalidOperationOnType);

        let store_child = fx.apply(
            fx.root,
            Operation::InsertChild {
                child: Oid::generate(),
                child_type: ObjectType::Store,
                child_name: "s".into(),
            },
        );
        assert_eq!(code(store_child), ErrorCode::InvalidOperationOnType);

        let sentinel = fx.apply(
            fx.root,
            Operation::InsertChild {
                child: polaris_types::constants::TRASH,
                child_type: ObjectType::Folder,
                child_name: "t".into(),
            },
        );
        assert_eq!(code(sentinel), ErrorCode::InvalidOperationOnType);

        let wrong_type = fx.apply(
            fx.root,
            Operation::InsertChild {
                child: file,
                child_type: ObjectType::Folder,
                child_name: "g".into(),
            },
        );
        assert_eq!(code(wrong_type), ErrorCode::InvalidOperationOnType);

        let unmounted = Oid::generate().to_converted_sid().unwrap().anchor().unwrap();
        let dangling = fx.apply(
            fx.root,
            Operation::InsertChild {
                child: unmounted,
                child_type: ObjectType::MountPoint,
                child_name: "m".into(),
            },
        );
        assert_eq!(code(dangling), ErrorCode::NoSuchObject);
    }

    #[test]
    fn bad_names_are_rejected_before_any_transaction() {
        let fx = Fixture::new();
        let err = fx.apply(
            fx.root,
            Operation::InsertChild {
                child: Oid::generate(),
                child_type: ObjectType::File,
                child_name: "a/b".into(),
            },
        );
        assert_eq!(code(err), ErrorCode::BadArgs);
        assert_eq!(fx.store.object_count(), 0);
    }

    #[test]
    fn failed_operation_rolls_back_root_store_creation() {
        let fx = Fixture::new();
        let err = fx.apply(fx.root, Operation::Share);
        assert_eq!(code(err), ErrorCode::InvalidOperationOnType);
        assert_eq!(fx.store.object_count(), 0);
        assert_eq!(fx.store.transform_count(), 0);
    }

    #[test]
    fn rename_within_parent_emits_rename_on_both() {
        let fx = Fixture::new();
        let file = fx.insert(fx.root, ObjectType::File, "a");
        let result = fx
            .apply(
                fx.root,
                Operation::MoveChild {
                    child: file,
                    new_parent: fx.root,
                    new_child_name: "b".into(),
                },
            )
            .unwrap();

        assert_eq!(result.updated.len(), 2);
        assert_eq!(result.version_of(&fx.root), Some(3));
        assert_eq!(result.version_of(&file), Some(2));
        assert_eq!(fx.view(file).name.as_deref(), Some("b"));

        let log = fx.log(Sid::root_store_for("alice"));
        assert!(log[1..]
            .iter()
            .all(|t| t.transform_type == TransformType::RenameChild));
    }

    #[test]
    fn repeated_rename_is_idempotent() {
        let fx = Fixture::new();
        let file = fx.insert(fx.root, ObjectType::File, "a");
        let rename = Operation::MoveChild {
            child: file,
            new_parent: fx.root,
            new_child_name: "b".into(),
        };
        fx.apply(fx.root, rename.clone()).unwrap();
        let before = fx.store.transform_count();

        let again = fx.apply(fx.root, rename).unwrap();
        assert!(again.updated.is_empty());
        assert_eq!(fx.store.transform_count(), before);
    }

    #[test]
    fn move_to_another_parent_emits_three_transforms() {
        let fx = Fixture::new();
        let a = fx.insert(fx.root, ObjectType::Folder, "a");
        let b = fx.insert(fx.root, ObjectType::Folder, "b");
        let file = fx.insert(a, ObjectType::File, "f");

        let result = fx
            .apply(
                a,
                Operation::MoveChild {
                    child: file,
                    new_parent: b,
                    new_child_name: "g".into(),
                },
            )
            .unwrap();

        let oids: Vec<Oid> = result.updated.iter().map(|u| u.object.oid).collect();
        assert_eq!(oids, vec![a, b, file]);
        assert_eq!(fx.view(file).parent, Some(b));

        let log = fx.log(Sid::root_store_for("alice"));
        let kinds: Vec<TransformType> = log[log.len() - 3..]
            .iter()
            .map(|t| t.transform_type)
            .collect();
        assert_eq!(
            kinds,
            vec![
                TransformType::RemoveChild,
                TransformType::InsertChild,
                TransformType::InsertChild
            ]
        );
    }

    #[test]
    fn moves_that_would_create_cycles_are_parent_conflicts() {
        let fx = Fixture::new();
        let a = fx.insert(fx.root, ObjectType::Folder, "a");
        let b = fx.insert(a, ObjectType::Folder, "b");
        let c = fx.insert(b, ObjectType::Folder, "c");

        let into_grandchild = fx.apply(
            fx.root,
            Operation::MoveChild {
                child: a,
                new_parent: c,
                new_child_name: "a".into(),
            },
        );
        assert_eq!(code(into_grandchild), ErrorCode::ParentConflict);

        let into_self = fx.apply(
            fx.root,
            Operation::MoveChild {
                child: a,
                new_parent: a,
                new_child_name: "a".into(),
            },
        );
        assert_eq!(code(into_self), ErrorCode::ParentConflict);
    }

    #[test]
    fn detached_folder_cannot_be_attached_below_itself() {
        let fx = Fixture::new();
        let a = fx.insert(fx.root, ObjectType::Folder, "a");
        let b = fx.insert(a, ObjectType::Folder, "b");
        fx.apply(fx.root, Operation::RemoveChild { child: a }).unwrap();

        let err = fx.apply(
            b,
            Operation::InsertChild {
                child: a,
                child_type: ObjectType::Folder,
                child_name: "a".into(),
            },
        );
        assert_eq!(code(err), ErrorCode::ParentConflict);
    }

    #[test]
    fn move_from_wrong_parent_is_a_parent_conflict() {
        let fx = Fixture::new();
        let a = fx.insert(fx.root, ObjectType::Folder, "a");
        let file = fx.insert(fx.root, ObjectType::File, "f");
        let err = fx.apply(
            a,
            Operation::MoveChild {
                child: file,
                new_parent: a,
                new_child_name: "f".into(),
            },
        );
        assert_eq!(code(err), ErrorCode::ParentConflict);

        let err = fx.apply(a, Operation::RemoveChild { child: file });
        assert_eq!(code(err), ErrorCode::ParentConflict);
    }

    #[test]
    fn remove_then_restore_returns_to_original_parent() {
        let fx = Fixture::new();
        let a = fx.insert(fx.root, ObjectType::Folder, "a");
        let file = fx.insert(a, ObjectType::File, "f");

        let removed = fx.apply(a, Operation::RemoveChild { child: file }).unwrap();
        assert_eq!(removed.version_of(&a), Some(3));
        assert_eq!(removed.version_of(&file), Some(2));
        assert_eq!(fx.view(file).parent, None);

        let restored = fx.apply(file, Operation::Restore).unwrap();
        assert_eq!(restored.updated.len(), 2);
        let view = fx.view(file);
        assert_eq!(view.parent, Some(a));
        assert_eq!(view.name.as_deref(), Some("f"));
        assert_eq!(view.version, 3);
    }

    #[test]
    fn restore_falls_back_to_store_root_when_parent_is_gone() {
        let fx = Fixture::new();
        let a = fx.insert(fx.root, ObjectType::Folder, "a");
        let file = fx.insert(a, ObjectType::File, "f");
        fx.apply(a, Operation::RemoveChild { child: file }).unwrap();
        fx.apply(fx.root, Operation::RemoveChild { child: a }).unwrap();

        fx.apply(file, Operation::Restore).unwrap();
        assert_eq!(fx.view(file).parent, Some(fx.root));
    }

    #[test]
    fn restore_requires_a_removed_object() {
        let fx = Fixture::new();
        let file = fx.insert(fx.root, ObjectType::File, "f");
        assert_eq!(code(fx.apply(file, Operation::Restore)), ErrorCode::ParentConflict);
        assert_eq!(
            code(fx.apply(fx.root, Operation::Restore)),
            ErrorCode::InvalidOperationOnType
        );
    }

    #[test]
    fn restore_into_taken_name_is_a_name_conflict() {
        let fx = Fixture::new();
        let file = fx.insert(fx.root, ObjectType::File, "f");
        fx.apply(fx.root, Operation::RemoveChild { child: file })
            .unwrap();
        fx.insert(fx.root, ObjectType::File, "f");
        assert_eq!(code(fx.apply(file, Operation::Restore)), ErrorCode::NameConflict);
    }

    #[test]
    fn inserting_a_removed_object_reattaches_it() {
        let fx = Fixture::new();
        let a = fx.insert(fx.root, ObjectType::Folder, "a");
        let file = fx.insert(fx.root, ObjectType::File, "f");
        fx.apply(fx.root, Operation::RemoveChild { child: file })
            .unwrap();

        let result = fx
            .apply(
                a,
                Operation::InsertChild {
                    child: file,
                    child_type: ObjectType::File,
                    child_name: "back".into(),
                },
            )
            .unwrap();
        assert_eq!(result.updated.len(), 2);
        assert_eq!(result.version_of(&file), Some(3));
        assert_eq!(fx.view(file).parent, Some(a));
    }

    #[test]
    fn content_updates_are_optimistically_versioned() {
        let fx = Fixture::new();
        let file = fx.insert(fx.root, ObjectType::File, "f");

        let result = fx.write(file, "ab");
        assert_eq!(result.version_of(&file), Some(2));
        let content = fx.view(file).content.unwrap();
        assert_eq!(content.version, 2);
        assert_eq!(content.hash, "ab".repeat(32));

        let stale = fx.apply(
            file,
            Operation::UpdateContent {
                local_version: 1,
                hash: "cd".repeat(32),
                size: 1,
                mtime: 1,
            },
        );
        assert_eq!(code(stale), ErrorCode::VersionConflict);
        assert_eq!(fx.view(file).content.unwrap().hash, "ab".repeat(32));

        let folder = fx.insert(fx.root, ObjectType::Folder, "d");
        let on_folder = fx.apply(
            folder,
            Operation::UpdateContent {
                local_version: 1,
                hash: "cd".repeat(32),
                size: 1,
                mtime: 1,
            },
        );
        assert_eq!(code(on_folder), ErrorCode::InvalidOperationOnType);
    }

    #[test]
    fn share_converts_folder_into_store() {
        let fx = Fixture::new();
        let root_sid = Sid::root_store_for("alice");
        let docs = fx.insert(fx.root, ObjectType::Folder, "docs");
        let sub = fx.insert(docs, ObjectType::Folder, "sub");
        let file = fx.insert(sub, ObjectType::File, "f");
        fx.write(file, "ab");

        fx.apply(docs, Operation::Share).unwrap();

        let sid = docs.to_converted_sid().unwrap();
        let anchor = sid.anchor().unwrap();
        let mount = fx.view(anchor);
        assert_eq!(mount.object_type, ObjectType::MountPoint);
        assert_eq!(mount.parent, Some(fx.root));
        assert_eq!(mount.name.as_deref(), Some("docs"));

        let store_root = fx.view(sid.root_oid());
        assert_eq!(store_root.name.as_deref(), Some("docs"));
        assert_eq!(fx.view(sub).parent, Some(sid.root_oid()));
        assert_eq!(fx.view(sub).store, sid);
        assert_eq!(fx.view(file).store, sid);
        assert_eq!(fx.view(docs).parent, None);

        let root_log = fx.log(root_sid);
        assert!(root_log
            .iter()
            .any(|t| t.transform_type == TransformType::Share && t.oid == docs));

        let shared_log = fx.log(sid);
        let kinds: Vec<TransformType> = shared_log.iter().map(|t| t.transform_type).collect();
        assert_eq!(
            kinds,
            vec![
                TransformType::InsertChild,
                TransformType::InsertChild,
                TransformType::UpdateContent
            ]
        );
        assert!(shared_log.iter().all(|t| t.store == sid));
    }

    #[test]
    fn share_restrictions() {
        let fx = Fixture::new();
        let docs = fx.insert(fx.root, ObjectType::Folder, "docs");
        let inner = fx.insert(docs, ObjectType::Folder, "inner");
        fx.apply(docs, Operation::Share).unwrap();

        assert_eq!(
            code(fx.apply(inner, Operation::Share)),
            ErrorCode::InvalidOperationOnType
        );

        let outer = fx.insert(fx.root, ObjectType::Folder, "outer");
        let anchor = docs.to_converted_sid().unwrap().anchor().unwrap();
        fx.apply(
            fx.root,
            Operation::MoveChild {
                child: anchor,
                new_parent: outer,
                new_child_name: "docs".into(),
            },
        )
        .unwrap();
        assert_eq!(
            code(fx.apply(outer, Operation::Share)),
            ErrorCode::InvalidOperationOnType
        );

        let file = fx.insert(fx.root, ObjectType::File, "f");
        assert_eq!(
            code(fx.apply(file, Operation::Share)),
            ErrorCode::InvalidOperationOnType
        );
    }

    #[test]
    fn operations_through_a_mount_point_land_in_the_shared_store() {
        let fx = Fixture::new();
        let docs = fx.insert(fx.root, ObjectType::Folder, "docs");
        fx.apply(docs, Operation::Share).unwrap();
        let sid = docs.to_converted_sid().unwrap();
        let anchor = sid.anchor().unwrap();

        let file = fx.insert(anchor, ObjectType::File, "new.txt");
        let view = fx.view(file);
        assert_eq!(view.parent, Some(sid.root_oid()));
        assert_eq!(view.store, sid);

        let nested = fx.apply(
            anchor,
            Operation::InsertChild {
                child: Oid::generate().to_converted_sid().unwrap().anchor().unwrap(),
                child_type: ObjectType::MountPoint,
                child_name: "m".into(),
            },
        );
        assert_eq!(code(nested), ErrorCode::InvalidOperationOnType);
    }

    #[test]
    fn cross_store_move_rehomes_the_subtree() {
        let fx = Fixture::new();
        let docs = fx.insert(fx.root, ObjectType::Folder, "docs");
        fx.apply(docs, Operation::Share).unwrap();
        let sid = docs.to_converted_sid().unwrap();
        let anchor = sid.anchor().unwrap();

        let folder = fx.insert(fx.root, ObjectType::Folder, "projects");
        let file = fx.insert(folder, ObjectType::File, "plan");
        fx.write(file, "ef");

        let result = fx
            .apply(
                fx.root,
                Operation::MoveChild {
                    child: folder,
                    new_parent: anchor,
                    new_child_name: "projects".into(),
                },
            )
            .unwrap();
        assert_eq!(result.updated.len(), 4);
        assert_eq!(fx.view(folder).store, sid);
        assert_eq!(fx.view(file).store, sid);

        let shared_log = fx.log(sid);
        let replay = shared_log
            .iter()
            .find(|t| t.transform_type == TransformType::UpdateContent)
            .unwrap();
        assert_eq!(replay.oid, file);
        assert_eq!(replay.content.as_ref().unwrap().hash, "ef".repeat(32));
    }

    #[test]
    fn moving_a_lone_file_replays_its_content() {
        let fx = Fixture::new();
        let docs = fx.insert(fx.root, ObjectType::Folder, "docs");
        fx.apply(docs, Operation::Share).unwrap();
        let sid = docs.to_converted_sid().unwrap();

        let file = fx.insert(fx.root, ObjectType::File, "f");
        fx.write(file, "ab");
        let result = fx
            .apply(
                fx.root,
                Operation::MoveChild {
                    child: file,
                    new_parent: sid.anchor().unwrap(),
                    new_child_name: "f".into(),
                },
            )
            .unwrap();
        assert_eq!(result.version_of(&file), Some(3));
        assert_eq!(fx.view(file).store, sid);

        let kinds: Vec<_> = fx
            .log(sid)
            .into_iter()
            .filter(|t| t.oid == file)
            .map(|t| (t.transform_type, t.new_version))
            .collect();
        assert_eq!(
            kinds,
            vec![(TransformType::InsertChild, 3), (TransformType::UpdateContent, 2)]
        );
    }

    #[test]
    fn reattaching_a_file_in_another_store_replays_its_content() {
        let fx = Fixture::new();
        let docs = fx.insert(fx.root, ObjectType::Folder, "docs");
        fx.apply(docs, Operation::Share).unwrap();
        let sid = docs.to_converted_sid().unwrap();

        let file = fx.insert(fx.root, ObjectType::File, "f");
        fx.write(file, "cd");
        fx.apply(fx.root, Operation::RemoveChild { child: file })
            .unwrap();
        fx.insert_existing(sid.anchor().unwrap(), file, "f");

        let replay = fx
            .log(sid)
            .into_iter()
            .find(|t| t.oid == file && t.transform_type == TransformType::UpdateContent)
            .unwrap();
        assert_eq!(replay.new_version, 2);
        assert_eq!(replay.content.unwrap().hash, "cd".repeat(32));
    }

    #[test]
    fn content_replay_names_the_content_version() {
        let fx = Fixture::new();
        let docs = fx.insert(fx.root, ObjectType::Folder, "docs");
        let file = fx.insert(docs, ObjectType::File, "a");
        fx.write(file, "ef");
        fx.apply(
            docs,
            Operation::MoveChild {
                child: file,
                new_parent: docs,
                new_child_name: "b".into(),
            },
        )
        .unwrap();
        assert_eq!(fx.version(file), 3);

        fx.apply(docs, Operation::Share).unwrap();
        let sid = docs.to_converted_sid().unwrap();
        let replay = fx
            .log(sid)
            .into_iter()
            .find(|t| t.oid == file && t.transform_type == TransformType::UpdateContent)
            .unwrap();
        assert_eq!(replay.new_version, 2);

        let txn = fx.store.begin().unwrap();
        let content = txn.content(&file, replay.new_version).unwrap().unwrap();
        assert_eq!(content.hash, "ef".repeat(32));
        drop(txn);
        assert_eq!(fx.version(file), 3);
    }

    #[test]
    fn mount_points_cannot_move_into_shared_stores() {
        let fx = Fixture::new();
        let a = fx.insert(fx.root, ObjectType::Folder, "a");
        let b = fx.insert(fx.root, ObjectType::Folder, "b");
        fx.apply(a, Operation::Share).unwrap();
        fx.apply(b, Operation::Share).unwrap();
        let anchor_a = a.to_converted_sid().unwrap().anchor().unwrap();
        let anchor_b = b.to_converted_sid().unwrap().anchor().unwrap();

        let err = fx.apply(
            fx.root,
            Operation::MoveChild {
                child: anchor_a,
                new_parent: anchor_b,
                new_child_name: "a".into(),
            },
        );
        assert_eq!(code(err), ErrorCode::InvalidOperationOnType);
    }

    #[test]
    fn rename_store_checks_the_current_name() {
        let fx = Fixture::new();
        fx.insert(fx.root, ObjectType::Folder, "a");

        let wrong = fx.apply(
            fx.root,
            Operation::RenameStore {
                old_name: "home".into(),
                new_name: "mine".into(),
            },
        );
        assert_eq!(code(wrong), ErrorCode::NameConflict);

        let result = fx
            .apply(
                fx.root,
                Operation::RenameStore {
                    old_name: "root".into(),
                    new_name: "home".into(),
                },
            )
            .unwrap();
        assert_eq!(result.updated.len(), 1);
        assert_eq!(fx.view(fx.root).name.as_deref(), Some("home"));

        let log = fx.log(Sid::root_store_for("alice"));
        let last = log.last().unwrap();
        assert_eq!(last.transform_type, TransformType::RenameStore);
        assert_eq!(last.store_name.as_deref(), Some("home"));

        let folder = fx.insert(fx.root, ObjectType::Folder, "b");
        let on_folder = fx.apply(
            folder,
            Operation::RenameStore {
                old_name: "b".into(),
                new_name: "c".into(),
            },
        );
        assert_eq!(code(on_folder), ErrorCode::InvalidOperationOnType);
    }

    #[test]
    fn permissions_are_checked_per_store() {
        let store = Arc::new(InMemoryMetaStore::new());
        let acl = Arc::new(StoreAcl::new());
        let engine = TransformEngine::new(store.clone(), acl.clone());
        let device = Did::generate();
        let sid = Sid::root_store_for("alice");
        let insert = Operation::InsertChild {
            child: Oid::generate(),
            child_type: ObjectType::File,
            child_name: "a".into(),
        };

        let err = engine.apply(&device, &sid.root_oid(), &insert).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InsufficientPermissions);
        assert_eq!(store.object_count(), 0);

        acl.grant(sid, device, Access::Read);
        let err = engine.apply(&device, &sid.root_oid(), &insert).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InsufficientPermissions);

        acl.grant(sid, device, Access::Write);
        engine.apply(&device, &sid.root_oid(), &insert).unwrap();
        assert_eq!(store.transform_count(), 1);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;
        use std::collections::HashSet;

        const POOL: usize = 6;
        const NAMES: [&str; 3] = ["a", "b", "c"];

        #[derive(Clone, Debug)]
        enum Step {
            Insert { parent: usize, child: usize, name: usize },
            Move { child: usize, dest: usize, name: usize },
            Remove { child: usize },
        }

        fn step() -> impl Strategy<Value = Step> {
            prop_oneof![
                (0..=POOL, 0..POOL, 0..NAMES.len())
                    .prop_map(|(parent, child, name)| Step::Insert { parent, child, name }),
                (0..POOL, 0..=POOL, 0..NAMES.len())
                    .prop_map(|(child, dest, name)| Step::Move { child, dest, name }),
                (0..POOL).prop_map(|child| Step::Remove { child }),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn tree_stays_acyclic_with_unique_names(steps in prop::collection::vec(step(), 1..40)) {
                let fx = Fixture::new();
                let folders: Vec<Oid> = (0..POOL).map(|_| Oid::generate()).collect();
                // index POOL stands for the store root
                let node = |i: usize| if i == POOL { fx.root } else { folders[i] };

                for step in steps {
                    let _ = match step {
                        Step::Insert { parent, child, name } => fx.apply(
                            node(parent),
                            Operation::InsertChild {
                                child: folders[child],
                                child_type: ObjectType::Folder,
                                child_name: NAMES[name].into(),
                            },
                        ),
                        Step::Move { child, dest, name } => {
                            let parent = fx
                                .engine
                                .object(&fx.device, &folders[child])
                                .ok()
                                .and_then(|v| v.parent)
                                .unwrap_or(fx.root);
                            fx.apply(
                                parent,
                                Operation::MoveChild {
                                    child: folders[child],
                                    new_parent: node(dest),
                                    new_child_name: NAMES[name].into(),
                                },
                            )
                        }
                        Step::Remove { child } => {
                            let parent = fx
                                .engine
                                .object(&fx.device, &folders[child])
                                .ok()
                                .and_then(|v| v.parent)
                                .unwrap_or(fx.root);
                            fx.apply(parent, Operation::RemoveChild { child: folders[child] })
                        }
                    };
                }

                let mut bindings = HashSet::new();
                for folder in &folders {
                    let Ok(view) = fx.engine.object(&fx.device, folder) else { continue };
                    if let (Some(parent), Some(name)) = (view.parent, view.name) {
                        prop_assert!(bindings.insert((parent, name)));
                    }

                    let mut seen = HashSet::new();
                    let mut current = *folder;
                    while let Ok(Some(parent)) = fx
                        .engine
                        .object(&fx.device, &current)
                        .map(|v| v.parent)
                    {
                        prop_assert!(seen.insert(current), "cycle through {}", current);
                        if parent == ROOT {
                            break;
                        }
                        current = parent;
                    }
                }
            }
        }
    }
}
