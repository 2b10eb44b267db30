//! Which devices hold which versions of file content.
//!
//! Location entries are keyed by (object, content version, device) and are
//! independent of the transform log: adding or removing one never emits a
//! transform.

use std::sync::Arc;

use polaris_store::{transact, MetaStore, Transaction};
use polaris_types::{
    BatchOperationResult, Did, LocationAction, LocationBatch, LocationBatchResult,
    LocationUpdate, Oid,
};

use crate::access::{require, Access, AccessManager};
use crate::error::{EngineError, EngineResult};

#[derive(Clone)]
pub struct LocationLedger {
    store: Arc<dyn MetaStore>,
    access: Arc<dyn AccessManager>,
    max_batch: usize,
}

impl LocationLedger {
    pub fn new(store: Arc<dyn MetaStore>, access: Arc<dyn AccessManager>, max_batch: usize) -> Self {
        Self {
            store,
            access,
            max_batch,
        }
    }

    /// Record that `did` holds `version` of `oid`. Returns `true` if the
    /// entry is new.
    pub fn add(&self, device: &Did, oid: &Oid, version: u64, did: &Did) -> EngineResult<bool> {
        transact(&*self.store, |txn| {
            self.check(txn, device, oid, version, Access::Write)?;
            let added = txn.add_location(oid, version, did)?;
            tracing::debug!(%oid, version, %did, added, "location added");
            Ok(added)
        })
    }

    /// Forget that `did` holds `version` of `oid`. Returns `true` if the
    /// entry existed.
    pub fn remove(&self, device: &Did, oid: &Oid, version: u64, did: &Did) -> EngineResult<bool> {
        transact(&*self.store, |txn| {
            self.check(txn, device, oid, version, Access::Write)?;
            let removed = txn.remove_location(oid, version, did)?;
            tracing::debug!(%oid, version, %did, removed, "location removed");
            Ok(removed)
        })
    }

    /// Devices holding `version` of `oid`.
    pub fn list(&self, device: &Did, oid: &Oid, version: u64) -> EngineResult<Vec<Did>> {
        transact(&*self.store, |txn| {
            self.check(txn, device, oid, version, Access::Read)?;
            Ok(txn.locations(oid, version)?)
        })
    }

    pub fn contains(&self, device: &Did, oid: &Oid, version: u64, did: &Did) -> EngineResult<bool> {
        Ok(self.list(device, oid, version)?.contains(did))
    }

    /// Apply every entry of `batch` in its own transaction. A failing entry
    /// does not stop the ones after it.
    pub fn apply_batch(
        &self,
        device: &Did,
        batch: &LocationBatch,
    ) -> EngineResult<LocationBatchResult> {
        if batch.available.len() > self.max_batch {
            return Err(EngineError::BadArgs(format!(
                "batch holds {} entries, limit is {}",
                batch.available.len(),
                self.max_batch
            )));
        }
        let results = batch
            .available
            .iter()
            .map(|update| match self.apply_one(device, update) {
                Ok(()) => BatchOperationResult::ok(),
                Err(err) => {
                    tracing::warn!(%device, oid = %update.oid, code = %err.code(), error = %err, "location update rejected");
                    BatchOperationResult::failure(err.code(), err.client_message())
                }
            })
            .collect();
        Ok(LocationBatchResult { results })
    }

    fn apply_one(&self, device: &Did, update: &LocationUpdate) -> EngineResult<()> {
        match update.action {
            LocationAction::Add => self.add(device, &update.oid, update.version, &update.did),
            LocationAction::Remove => self.remove(device, &update.oid, update.version, &update.did),
        }
        .map(|_| ())
    }

    /// The (oid, version) pair must name recorded content, and the caller
    /// needs `access` on the store that owns it.
    fn check(
        &self,
        txn: &dyn Transaction,
        device: &Did,
        oid: &Oid,
        version: u64,
        access: Access,
    ) -> EngineResult<()> {
        if txn.content(oid, version)?.is_none() {
            return Err(EngineError::NoSuchObject(*oid));
        }
        let object = txn.object(oid)?.ok_or(EngineError::NoSuchObject(*oid))?;
        require(&*self.access, device, &object.store, access)
    }
}

impl std::fmt::Debug for LocationLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationLedger")
            .field("max_batch", &self.max_batch)
            .finish_non_exhaustive()
    }
}
