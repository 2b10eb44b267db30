use std::sync::Arc;

use polaris_store::{transact, MetaStore};
use polaris_types::{Did, Oid, Sid, Transform};
use serde::{Deserialize, Serialize};

use crate::access::{require, Access, AccessManager};
use crate::error::{EngineError, EngineResult};

/// One page of a store's transform log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformPage {
    pub transforms: Vec<Transform>,
    /// Largest page size the server will hand out.
    pub max_transform_count: usize,
}

/// Read side of the transform log.
#[derive(Clone)]
pub struct TransformLog {
    store: Arc<dyn MetaStore>,
    access: Arc<dyn AccessManager>,
    max_batch: usize,
}

impl TransformLog {
    pub fn new(store: Arc<dyn MetaStore>, access: Arc<dyn AccessManager>, max_batch: usize) -> Self {
        Self {
            store,
            access,
            max_batch,
        }
    }

    pub fn max_batch(&self) -> usize {
        self.max_batch
    }

    /// Transforms of `oid`'s store with epoch greater than `since`, oldest
    /// first, at most `batch_size` of them.
    ///
    /// A root store that has never been written to has an empty log.
    pub fn transforms_since(
        &self,
        device: &Did,
        oid: &Oid,
        since: u64,
        batch_size: usize,
    ) -> EngineResult<Vec<Transform>> {
        if batch_size == 0 || batch_size > self.max_batch {
            return Err(EngineError::BadArgs(format!(
                "batch_size must be between 1 and {}, got {batch_size}",
                self.max_batch
            )));
        }
        transact(&*self.store, |txn| {
            let store: Sid = match txn.object(oid)? {
                Some(object) => object.store,
                None => match oid.as_store() {
                    Some(sid) if sid.is_root_store() => {
                        require(&*self.access, device, &sid, Access::Read)?;
                        return Ok(Vec::new());
                    }
                    _ => return Err(EngineError::NoSuchObject(*oid)),
                },
            };
            require(&*self.access, device, &store, Access::Read)?;
            let transforms = txn.transforms_since(&store, since, batch_size)?;
            tracing::trace!(%device, %store, since, count = transforms.len(), "served transforms");
            Ok(transforms)
        })
    }

    /// Same as [`transforms_since`](Self::transforms_since), packaged with the
    /// page size limit.
    pub fn page(
        &self,
        device: &Did,
        oid: &Oid,
        since: u64,
        batch_size: usize,
    ) -> EngineResult<TransformPage> {
        Ok(TransformPage {
            transforms: self.transforms_since(device, oid, since, batch_size)?,
            max_transform_count: self.max_batch,
        })
    }

    /// Epoch of the newest transform across all stores.
    pub fn latest_epoch(&self) -> EngineResult<u64> {
        transact(&*self.store, |txn| Ok(txn.latest_epoch()?))
    }
}

impl std::fmt::Debug for TransformLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformLog")
            .field("max_batch", &self.max_batch)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polaris_store::InMemoryMetaStore;
    use polaris_types::{ErrorCode, ObjectType, Operation};

    use crate::access::{AllowAll, StoreAcl};
    use crate::engine::TransformEngine;

    fn setup() -> (TransformEngine, TransformLog, Did, Oid) {
        let store: Arc<dyn MetaStore> = Arc::new(InMemoryMetaStore::new());
        let access: Arc<dyn AccessManager> = Arc::new(AllowAll);
        (
            TransformEngine::new(store.clone(), access.clone()),
            TransformLog::new(store, access, 3),
            Did::generate(),
            Sid::root_store_for("alice").root_oid(),
        )
    }

    fn insert(engine: &TransformEngine, device: &Did, parent: Oid, name: &str) -> Oid {
        let child = Oid::generate();
        engine
            .apply(
                device,
                &parent,
                &Operation::InsertChild {
                    child,
                    child_type: ObjectType::Folder,
                    child_name: name.into(),
                },
            )
            .unwrap();
        child
    }

    #[test]
    fn unwritten_root_store_has_empty_log() {
        let (_, log, device, root) = setup();
        assert!(log.transforms_since(&device, &root, 0, 3).unwrap().is_empty());
        assert_eq!(log.latest_epoch().unwrap(), 0);

        let err = log
            .transforms_since(&device, &Oid::generate(), 0, 3)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NoSuchObject);
    }

    #[test]
    fn pages_are_ascending_and_prefix_consistent() {
        let (engine, log, device, root) = setup();
        for name in ["a", "b", "c", "d", "e"] {
            insert(&engine, &device, root, name);
        }

        let first = log.transforms_since(&device, &root, 0, 3).unwrap();
        assert_eq!(first.len(), 3);
        assert!(first.windows(2).all(|w| w[0].epoch < w[1].epoch));

        let rest = log
            .transforms_since(&device, &root, first[2].epoch, 3)
            .unwrap();
        assert_eq!(rest.len(), 2);
        assert!(rest[0].epoch > first[2].epoch);
        assert_eq!(log.latest_epoch().unwrap(), rest[1].epoch);

        let again = log.transforms_since(&device, &root, 0, 3).unwrap();
        assert_eq!(again, first);
    }

    #[test]
    fn any_object_resolves_to_its_store() {
        let (engine, log, device, root) = setup();
        let folder = insert(&engine, &device, root, "a");
        let via_folder = log.transforms_since(&device, &folder, 0, 3).unwrap();
        let via_root = log.transforms_since(&device, &root, 0, 3).unwrap();
        assert_eq!(via_folder, via_root);
    }

    #[test]
    fn batch_size_is_bounded() {
        let (_, log, device, root) = setup();
        for size in [0, 4] {
            let err = log.transforms_since(&device, &root, 0, size).unwrap_err();
            assert_eq!(err.code(), ErrorCode::BadArgs);
        }
        let page = log.page(&device, &root, 0, 1).unwrap();
        assert_eq!(page.max_transform_count, 3);
    }

    #[test]
    fn reading_requires_read_access() {
        let store: Arc<dyn MetaStore> = Arc::new(InMemoryMetaStore::new());
        let acl = Arc::new(StoreAcl::new());
        let log = TransformLog::new(store, acl.clone(), 10);
        let device = Did::generate();
        let sid = Sid::root_store_for("alice");

        let err = log
            .transforms_since(&device, &sid.root_oid(), 0, 10)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InsufficientPermissions);

        acl.grant(sid, device, Access::Read);
        assert!(log.transforms_since(&device, &sid.root_oid(), 0, 10).is_ok());
    }
}
