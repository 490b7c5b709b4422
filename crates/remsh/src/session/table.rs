//! Per-tenant session registry.
//!
//! All mutations for one tenant serialize on that tenant's map entry;
//! different tenants never contend with each other. Reads are
//! snapshot-consistent. `remove` is the single place a session leaves the
//! registry and is a safe no-op the second time, whichever teardown path
//! (natural exit, explicit stop, reaper sweep) got there first.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use dashmap::DashMap;

use super::models::{Session, SessionId, TenantId, TenantSessionsSummary};

#[derive(Default)]
struct TenantSessions {
    sessions: HashMap<SessionId, Arc<Session>>,
    /// Sessions believed blocked on a prompt, oldest first.
    awaiting_input: VecDeque<SessionId>,
}

/// Registry of every in-flight session, keyed by tenant.
#[derive(Default)]
pub struct SessionTable {
    tenants: DashMap<TenantId, TenantSessions>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly spawned session under its owning tenant.
    pub fn register(&self, session: Arc<Session>) {
        let mut entry = self.tenants.entry(session.tenant.clone()).or_default();
        entry.sessions.insert(session.id.clone(), session);
    }

    /// Register unless the tenant already has `limit` active sessions. The
    /// check and the insert happen under the same entry lock, so concurrent
    /// registrations cannot overshoot the cap.
    pub fn try_register(&self, session: Arc<Session>, limit: usize) -> bool {
        let mut entry = self.tenants.entry(session.tenant.clone()).or_default();
        if entry.sessions.len() >= limit {
            return false;
        }
        entry.sessions.insert(session.id.clone(), session);
        true
    }

    pub fn get(&self, tenant: &TenantId, id: &SessionId) -> Option<Arc<Session>> {
        self.tenants
            .get(tenant)
            .and_then(|entry| entry.sessions.get(id).cloned())
    }

    /// Deregister a session, releasing its registry slot. Returns the
    /// session if it was still registered; `None` means another teardown
    /// path already removed it and there is nothing left to do.
    pub fn remove(&self, tenant: &TenantId, id: &SessionId) -> Option<Arc<Session>> {
        let removed = {
            let mut entry = self.tenants.get_mut(tenant)?;
            let removed = entry.sessions.remove(id);
            if removed.is_some() {
                entry.awaiting_input.retain(|sid| sid != id);
            }
            removed
        };
        // Drop empty tenant entries so the table doesn't grow with every
        // tenant ever seen.
        self.tenants
            .remove_if(tenant, |_, sessions| sessions.sessions.is_empty());
        removed
    }

    pub fn session_count(&self, tenant: &TenantId) -> usize {
        self.tenants
            .get(tenant)
            .map(|entry| entry.sessions.len())
            .unwrap_or(0)
    }

    /// Snapshot of one tenant's active sessions.
    pub fn list_active(&self, tenant: &TenantId) -> Vec<Arc<Session>> {
        self.tenants
            .get(tenant)
            .map(|entry| entry.sessions.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of every tenant's active sessions.
    pub fn list_all(&self) -> Vec<(TenantId, Vec<Arc<Session>>)> {
        self.tenants
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    entry.value().sessions.values().cloned().collect(),
                )
            })
            .collect()
    }

    /// Serializable per-tenant summaries for the admin surface.
    pub fn summaries(&self) -> Vec<TenantSessionsSummary> {
        self.tenants
            .iter()
            .map(|entry| TenantSessionsSummary {
                tenant: entry.key().clone(),
                sessions: entry
                    .value()
                    .sessions
                    .values()
                    .map(|session| session.summary())
                    .collect(),
            })
            .collect()
    }

    /// Flag a session as awaiting interactive input. No-op if the session
    /// is unknown or already flagged.
    pub fn mark_awaiting_input(&self, tenant: &TenantId, id: &SessionId) -> bool {
        let Some(mut entry) = self.tenants.get_mut(tenant) else {
            return false;
        };
        if !entry.sessions.contains_key(id) {
            return false;
        }
        if !entry.awaiting_input.contains(id) {
            entry.awaiting_input.push_back(id.clone());
        }
        true
    }

    pub fn clear_awaiting_input(&self, tenant: &TenantId, id: &SessionId) {
        if let Some(mut entry) = self.tenants.get_mut(tenant) {
            entry.awaiting_input.retain(|sid| sid != id);
        }
    }

    /// Number of this tenant's sessions currently flagged awaiting input.
    pub fn awaiting_count(&self, tenant: &TenantId) -> usize {
        self.tenants
            .get(tenant)
            .map(|entry| entry.awaiting_input.len())
            .unwrap_or(0)
    }

    /// Claim the oldest session awaiting input, clearing its flag atomically
    /// with the claim so two concurrent inputs never target the same prompt.
    pub fn next_awaiting_input(&self, tenant: &TenantId) -> Option<Arc<Session>> {
        let mut entry = self.tenants.get_mut(tenant)?;
        while let Some(id) = entry.awaiting_input.pop_front() {
            if let Some(session) = entry.sessions.get(&id) {
                return Some(Arc::clone(session));
            }
            // Stale flag for a session that already exited; keep scanning.
        }
        None
    }
}
