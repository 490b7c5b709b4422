//! Authorization boundary.
//!
//! Admin and authorization state is owned by an external store; the engine
//! only consumes this interface and never depends on how (or whether) the
//! sets are persisted. [`MemoryAdminStore`] is the in-process implementation
//! used for embedding and tests.

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

use crate::session::TenantId;

/// External key-value store of admin and authorized-tenant sets.
pub trait AdminStore: Send + Sync {
    fn is_admin(&self, tenant: &TenantId) -> bool;
    fn is_authorized(&self, tenant: &TenantId) -> bool;
    /// Authorize a tenant for basic use.
    fn grant(&self, tenant: &TenantId);
    /// Revoke a tenant's authorization.
    fn revoke(&self, tenant: &TenantId);
}

/// In-memory store with a fixed main admin that can never be revoked.
pub struct MemoryAdminStore {
    main_admin: Option<TenantId>,
    admins: RwLock<HashSet<TenantId>>,
    authorized: RwLock<HashSet<TenantId>>,
}

impl MemoryAdminStore {
    pub fn new(main_admin: Option<TenantId>) -> Self {
        let mut admins = HashSet::new();
        if let Some(admin) = &main_admin {
            admins.insert(admin.clone());
        }
        Self {
            main_admin,
            admins: RwLock::new(admins),
            authorized: RwLock::new(HashSet::new()),
        }
    }

    pub fn add_admin(&self, tenant: TenantId) {
        self.admins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tenant);
    }

    pub fn remove_admin(&self, tenant: &TenantId) {
        if self.main_admin.as_ref() == Some(tenant) {
            return;
        }
        self.admins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(tenant);
    }
}

impl AdminStore for MemoryAdminStore {
    fn is_admin(&self, tenant: &TenantId) -> bool {
        self.admins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(tenant)
    }

    fn is_authorized(&self, tenant: &TenantId) -> bool {
        self.is_admin(tenant)
            || self
                .authorized
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(tenant)
    }

    fn grant(&self, tenant: &TenantId) {
        self.authorized
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tenant.clone());
    }

    fn revoke(&self, tenant: &TenantId) {
        self.authorized
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(tenant);
    }
}
