//! Permission pre-check consulted before any operation is validated.

use std::collections::HashMap;
use std::sync::RwLock;

use polaris_types::{Did, Sid};

use crate::error::{EngineError, EngineResult};

/// Level of access an operation needs on a store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Access {
    Read,
    Write,
}

/// Allow/deny decision for a device acting on a store.
///
/// Real access control lives outside Polaris; implementations adapt it to
/// this yes/no question.
pub trait AccessManager: Send + Sync {
    fn is_allowed(&self, device: &Did, store: &Sid, access: Access) -> bool;
}

/// Grants every request.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl AccessManager for AllowAll {
    fn is_allowed(&self, _device: &Did, _store: &Sid, _access: Access) -> bool {
        true
    }
}

/// Explicit per-store grants. Write implies read; anything not granted is
/// denied.
#[derive(Debug, Default)]
pub struct StoreAcl {
    grants: RwLock<HashMap<Sid, HashMap<Did, Access>>>,
}

impl StoreAcl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, store: Sid, device: Did, access: Access) {
        let mut grants = self.grants.write().unwrap_or_else(|e| e.into_inner());
        let level = grants.entry(store).or_default().entry(device).or_insert(access);
        *level = (*level).max(access);
    }

    pub fn revoke(&self, store: &Sid, device: &Did) {
        let mut grants = self.grants.write().unwrap_or_else(|e| e.into_inner());
        if let Some(devices) = grants.get_mut(store) {
            devices.remove(device);
        }
    }
}

impl AccessManager for StoreAcl {
    fn is_allowed(&self, device: &Did, store: &Sid, access: Access) -> bool {
        let grants = self.grants.read().unwrap_or_else(|e| e.into_inner());
        grants
            .get(store)
            .and_then(|devices| devices.get(device))
            .is_some_and(|granted| *granted >= access)
    }
}

/// Fail with `InsufficientPermissions` unless `device` holds `access` on `store`.
pub(crate) fn require(
    manager: &dyn AccessManager,
    device: &Did,
    store: &Sid,
    access: Access,
) -> EngineResult<()> {
    if manager.is_allowed(device, store, access) {
        Ok(())
    } else {
        tracing::warn!(%device, %store, ?access, "access denied");
        Err(EngineError::InsufficientPermissions {
            device: *device,
            store: *store,
        })
    }
}
