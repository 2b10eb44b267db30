use polaris_types::{
    ChildEdge, Content, Did, LogicalObject, Oid, Sid, StoreRecord, Transform, TransformDraft,
};

use crate::error::{StoreError, StoreResult};

/// One unit of isolated work against the metadata store.
///
/// Writes become visible to other transactions only after [`commit`].
/// Dropping a transaction without committing rolls back every write it made.
///
/// [`commit`]: Transaction::commit
pub trait Transaction {
    // ---- objects ----

    fn object(&self, oid: &Oid) -> StoreResult<Option<LogicalObject>>;

    /// Insert or replace an object.
    fn put_object(&mut self, object: &LogicalObject) -> StoreResult<()>;

    // ---- stores ----

    fn store(&self, sid: &Sid) -> StoreResult<Option<StoreRecord>>;

    fn put_store(&mut self, record: &StoreRecord) -> StoreResult<()>;

    // ---- child edges ----

    /// The edge binding `name` under `parent`, if any.
    fn child_named(&self, parent: &Oid, name: &str) -> StoreResult<Option<ChildEdge>>;

    /// The live edge from `child` to its parent, if any.
    fn parent_edge(&self, child: &Oid) -> StoreResult<Option<ChildEdge>>;

    /// All live edges under `parent`, ordered by name.
    fn children(&self, parent: &Oid) -> StoreResult<Vec<ChildEdge>>;

    /// Add an edge. Fails if the name is taken under the parent or the child
    /// already has a parent.
    fn insert_edge(&mut self, edge: &ChildEdge) -> StoreResult<()>;

    /// Remove the live edge of `child`, returning it.
    fn remove_edge(&mut self, child: &Oid) -> StoreResult<Option<ChildEdge>>;

    // ---- tombstones ----

    /// Last edge of a removed child.
    fn tombstone(&self, child: &Oid) -> StoreResult<Option<ChildEdge>>;

    fn put_tombstone(&mut self, edge: &ChildEdge) -> StoreResult<()>;

    fn clear_tombstone(&mut self, child: &Oid) -> StoreResult<Option<ChildEdge>>;

    // ---- content ----

    fn content(&self, oid: &Oid, version: u64) -> StoreResult<Option<Content>>;

    /// Content with the highest version for `oid`.
    fn latest_content(&self, oid: &Oid) -> StoreResult<Option<Content>>;

    /// Record new content. Fails if (oid, version) is already recorded.
    fn put_content(&mut self, content: &Content) -> StoreResult<()>;

    // ---- transform log ----

    /// Seal `draft` at the next epoch and append it to the log.
    fn append_transform(&mut self, draft: TransformDraft) -> StoreResult<Transform>;

    /// Transforms of `store` with epoch greater than `since`, ascending,
    /// at most `limit` of them.
    fn transforms_since(&self, store: &Sid, since: u64, limit: usize)
        -> StoreResult<Vec<Transform>>;

    /// Epoch of the newest transform, or 0 for an empty log.
    fn latest_epoch(&self) -> StoreResult<u64>;

    // ---- locations ----

    /// Returns `true` if the entry was newly added.
    fn add_location(&mut self, oid: &Oid, version: u64, did: &Did) -> StoreResult<bool>;

    /// Returns `true` if the entry was present.
    fn remove_location(&mut self, oid: &Oid, version: u64, did: &Did) -> StoreResult<bool>;

    fn locations(&self, oid: &Oid, version: u64) -> StoreResult<Vec<Did>>;

    // ---- lifecycle ----

    /// Make every write of this transaction durable and visible.
    fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Transactional metadata store backing the object tree.
///
/// Implementations must provide isolation between concurrent transactions:
/// two transactions racing on the same rows must not both observe the state
/// from before the other's commit.
pub trait MetaStore: Send + Sync {
    /// Open a new transaction.
    fn begin(&self) -> StoreResult<Box<dyn Transaction + '_>>;
}

/// Run `work` inside one transaction.
///
/// Commits when `work` returns `Ok`; rolls back when it returns `Err` or
/// unwinds.
pub fn transact<S, T, E, F>(store: &S, work: F) -> Result<T, E>
where
    S: MetaStore + ?Sized,
    E: From<StoreError>,
    F: FnOnce(&mut dyn Transaction) -> Result<T, E>,
{
    let mut txn = store.begin()?;
    match work(txn.as_mut()) {
        Ok(value) => {
            txn.commit()?;
            Ok(value)
        }
        Err(err) => {
            drop(txn);
            Err(err)
        }
    }
}
