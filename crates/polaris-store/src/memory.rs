use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use polaris_types::{
    now_millis, ChildEdge, Content, Did, LogicalObject, Oid, Sid, StoreRecord, Transform,
    TransformDraft,
};

use crate::error::{StoreError, StoreResult};
use crate::traits::{MetaStore, Transaction};

/// In-memory metadata store.
///
/// Intended for tests and embedding. Transactions are serialized behind a
/// single mutex, so every transaction sees a consistent tree and commits
/// atomically. Writes are applied in place and journaled; a transaction
/// dropped without committing replays the journal backwards.
pub struct InMemoryMetaStore {
    state: Mutex<TreeState>,
}

#[derive(Default)]
struct TreeState {
    objects: HashMap<Oid, LogicalObject>,
    stores: HashMap<Sid, StoreRecord>,
    /// (parent, name) -> child
    children: BTreeMap<(Oid, String), Oid>,
    /// child -> live edge
    parents: HashMap<Oid, ChildEdge>,
    tombstones: HashMap<Oid, ChildEdge>,
    contents: BTreeMap<(Oid, u64), Content>,
    /// The log. Epoch `n` lives at index `n - 1`.
    transforms: Vec<Transform>,
    /// Per-store indices into `transforms`, ascending.
    store_log: HashMap<Sid, Vec<usize>>,
    /// (oid, version) -> devices holding that content
    locations: BTreeMap<(Oid, u64), BTreeSet<Did>>,
}

/// Inverse of one journaled write.
enum Undo {
    Object(Oid, Option<LogicalObject>),
    Store(Sid, Option<StoreRecord>),
    Edge(Oid, Option<ChildEdge>),
    Tombstone(Oid, Option<ChildEdge>),
    Content(Oid, u64),
    Transform,
    Location(Oid, u64, Did, bool),
}

impl TreeState {
    fn link(&mut self, edge: ChildEdge) {
        self.children
            .insert((edge.parent, edge.name.clone()), edge.child);
        self.parents.insert(edge.child, edge);
    }

    fn unlink(&mut self, child: &Oid) -> Option<ChildEdge> {
        let edge = self.parents.remove(child)?;
        self.children.remove(&(edge.parent, edge.name.clone()));
        Some(edge)
    }

    fn add_location(&mut self, oid: Oid, version: u64, did: Did) -> bool {
        self.locations.entry((oid, version)).or_default().insert(did)
    }

    fn remove_location(&mut self, oid: Oid, version: u64, did: &Did) -> bool {
        let Some(holders) = self.locations.get_mut(&(oid, version)) else {
            return false;
        };
        let removed = holders.remove(did);
        if holders.is_empty() {
            self.locations.remove(&(oid, version));
        }
        removed
    }

    fn revert(&mut self, undo: Undo) {
        match undo {
            Undo::Object(oid, prior) => match prior {
                Some(object) => {
                    self.objects.insert(oid, object);
                }
                None => {
                    self.objects.remove(&oid);
                }
            },
            Undo::Store(sid, prior) => match prior {
                Some(record) => {
                    self.stores.insert(sid, record);
                }
                None => {
                    self.stores.remove(&sid);
                }
            },
            Undo::Edge(child, prior) => {
                self.unlink(&child);
                if let Some(edge) = prior {
                    self.link(edge);
                }
            }
            Undo::Tombstone(child, prior) => match prior {
                Some(edge) => {
                    self.tombstones.insert(child, edge);
                }
                None => {
                    self.tombstones.remove(&child);
                }
            },
            Undo::Content(oid, version) => {
                self.contents.remove(&(oid, version));
            }
            Undo::Transform => {
                if let Some(transform) = self.transforms.pop() {
                    if let Some(indices) = self.store_log.get_mut(&transform.store) {
                        indices.pop();
                    }
                }
            }
            Undo::Location(oid, version, did, was_present) => {
                if was_present {
                    self.add_location(oid, version, did);
                } else {
                    self.remove_location(oid, version, &did);
                }
            }
        }
    }
}

impl InMemoryMetaStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TreeState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TreeState> {
        // Rollback runs on unwind, so a poisoned lock still guards a
        // consistent tree.
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("recovering poisoned metadata store lock");
            poisoned.into_inner()
        })
    }

    /// Number of objects ever created.
    pub fn object_count(&self) -> usize {
        self.lock().objects.len()
    }

    /// Number of transforms in the log.
    pub fn transform_count(&self) -> usize {
        self.lock().transforms.len()
    }
}

impl Default for InMemoryMetaStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryMetaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("InMemoryMetaStore")
            .field("object_count", &state.objects.len())
            .field("transform_count", &state.transforms.len())
            .finish()
    }
}

impl MetaStore for InMemoryMetaStore {
    fn begin(&self) -> StoreResult<Box<dyn Transaction + '_>> {
        Ok(Box::new(MemoryTransaction {
            state: self.lock(),
            journal: Vec::new(),
            finished: false,
        }))
    }
}

/// Transaction over [`InMemoryMetaStore`]. Holds the store lock for its
/// whole lifetime.
struct MemoryTransaction<'a> {
    state: MutexGuard<'a, TreeState>,
    journal: Vec<Undo>,
    finished: bool,
}

impl MemoryTransaction<'_> {
    fn ensure_open(&self) -> StoreResult<()> {
        if self.finished {
            return Err(StoreError::TransactionFinished);
        }
        Ok(())
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        if self.finished || self.journal.is_empty() {
            return;
        }
        tracing::debug!(writes = self.journal.len(), "rolling back transaction");
        while let Some(undo) = self.journal.pop() {
            self.state.revert(undo);
        }
    }
}

impl Transaction for MemoryTransaction<'_> {
    fn object(&self, oid: &Oid) -> StoreResult<Option<LogicalObject>> {
        Ok(self.state.objects.get(oid).cloned())
    }

    fn put_object(&mut self, object: &LogicalObject) -> StoreResult<()> {
        self.ensure_open()?;
        let prior = self.state.objects.insert(object.oid, object.clone());
        self.journal.push(Undo::Object(object.oid, prior));
        Ok(())
    }

    fn store(&self, sid: &Sid) -> StoreResult<Option<StoreRecord>> {
        Ok(self.state.stores.get(sid).cloned())
    }

    fn put_store(&mut self, record: &StoreRecord) -> StoreResult<()> {
        self.ensure_open()?;
        let prior = self.state.stores.insert(record.sid, record.clone());
        self.journal.push(Undo::Store(record.sid, prior));
        Ok(())
    }

    fn child_named(&self, parent: &Oid, name: &str) -> StoreResult<Option<ChildEdge>> {
        let child = self.state.children.get(&(*parent, name.to_string()));
        Ok(child.and_then(|c| self.state.parents.get(c).cloned()))
    }

    fn parent_edge(&self, child: &Oid) -> StoreResult<Option<ChildEdge>> {
        Ok(self.state.parents.get(child).cloned())
    }

    fn children(&self, parent: &Oid) -> StoreResult<Vec<ChildEdge>> {
        let edges = self
            .state
            .children
            .range((*parent, String::new())..)
            .take_while(|((p, _), _)| p == parent)
            .filter_map(|(_, child)| self.state.parents.get(child).cloned())
            .collect();
        Ok(edges)
    }

    fn insert_edge(&mut self, edge: &ChildEdge) -> StoreResult<()> {
        self.ensure_open()?;
        if self
            .state
            .children
            .contains_key(&(edge.parent, edge.name.clone()))
        {
            return Err(StoreError::EdgeConstraint {
                parent: edge.parent,
                reason: format!("name {:?} already bound", edge.name),
            });
        }
        if self.state.parents.contains_key(&edge.child) {
            return Err(StoreError::EdgeConstraint {
                parent: edge.parent,
                reason: format!("{} already has a parent", edge.child),
            });
        }
        self.state.link(edge.clone());
        self.journal.push(Undo::Edge(edge.child, None));
        Ok(())
    }

    fn remove_edge(&mut self, child: &Oid) -> StoreResult<Option<ChildEdge>> {
        self.ensure_open()?;
        let removed = self.state.unlink(child);
        if let Some(edge) = &removed {
            self.journal.push(Undo::Edge(*child, Some(edge.clone())));
        }
        Ok(removed)
    }

    fn tombstone(&self, child: &Oid) -> StoreResult<Option<ChildEdge>> {
        Ok(self.state.tombstones.get(child).cloned())
    }

    fn put_tombstone(&mut self, edge: &ChildEdge) -> StoreResult<()> {
        self.ensure_open()?;
        let prior = self.state.tombstones.insert(edge.child, edge.clone());
        self.journal.push(Undo::Tombstone(edge.child, prior));
        Ok(())
    }

    fn clear_tombstone(&mut self, child: &Oid) -> StoreResult<Option<ChildEdge>> {
        self.ensure_open()?;
        let prior = self.state.tombstones.remove(child);
        if prior.is_some() {
            self.journal.push(Undo::Tombstone(*child, prior.clone()));
        }
        Ok(prior)
    }

    fn content(&self, oid: &Oid, version: u64) -> StoreResult<Option<Content>> {
        Ok(self.state.contents.get(&(*oid, version)).cloned())
    }

    fn latest_content(&self, oid: &Oid) -> StoreResult<Option<Content>> {
        Ok(self
            .state
            .contents
            .range((*oid, 0)..=(*oid, u64::MAX))
            .next_back()
            .map(|(_, c)| c.clone()))
    }

    fn put_content(&mut self, content: &Content) -> StoreResult<()> {
        self.ensure_open()?;
        let key = (content.oid, content.version);
        if self.state.contents.contains_key(&key) {
            return Err(StoreError::ContentExists {
                oid: content.oid,
                version: content.version,
            });
        }
        self.state.contents.insert(key, content.clone());
        self.journal.push(Undo::Content(content.oid, content.version));
        Ok(())
    }

    fn append_transform(&mut self, draft: TransformDraft) -> StoreResult<Transform> {
        self.ensure_open()?;
        let index = self.state.transforms.len();
        let transform = draft.into_transform(index as u64 + 1, now_millis());
        self.state
            .store_log
            .entry(transform.store)
            .or_default()
            .push(index);
        self.state.transforms.push(transform.clone());
        self.journal.push(Undo::Transform);
        Ok(transform)
    }

    fn transforms_since(
        &self,
        store: &Sid,
        since: u64,
        limit: usize,
    ) -> StoreResult<Vec<Transform>> {
        let Some(indices) = self.state.store_log.get(store) else {
            return Ok(Vec::new());
        };
        let start = indices.partition_point(|&i| (i as u64 + 1) <= since);
        Ok(indices[start..]
            .iter()
            .take(limit)
            .map(|&i| self.state.transforms[i].clone())
            .collect())
    }

    fn latest_epoch(&self) -> StoreResult<u64> {
        Ok(self.state.transforms.len() as u64)
    }

    fn add_location(&mut self, oid: &Oid, version: u64, did: &Did) -> StoreResult<bool> {
        self.ensure_open()?;
        let added = self.state.add_location(*oid, version, *did);
        if added {
            self.journal.push(Undo::Location(*oid, version, *did, false));
        }
        Ok(added)
    }

    fn remove_location(&mut self, oid: &Oid, version: u64, did: &Did) -> StoreResult<bool> {
        self.ensure_open()?;
        let removed = self.state.remove_location(*oid, version, did);
        if removed {
            self.journal.push(Undo::Location(*oid, version, *did, true));
        }
        Ok(removed)
    }

    fn locations(&self, oid: &Oid, version: u64) -> StoreResult<Vec<Did>> {
        Ok(self
            .state
            .locations
            .get(&(*oid, version))
            .map(|holders| holders.iter().copied().collect())
            .unwrap_or_default())
    }

    fn commit(mut self: Box<Self>) -> StoreResult<()> {
        self.ensure_open()?;
        self.journal.clear();
        self.finished = true;
        Ok(())
    }
}
