//! Per-tenant usage statistics.
//!
//! In-memory only; execution history does not survive a restart.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::session::TenantId;

/// Usage counters for one tenant.
#[derive(Debug, Clone, Serialize)]
pub struct TenantStats {
    pub commands: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Tracks how much each tenant uses the engine.
#[derive(Default)]
pub struct UsageTracker {
    tenants: DashMap<TenantId, TenantStats>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one accepted command for a tenant.
    pub fn record_command(&self, tenant: &TenantId) {
        let now = Utc::now();
        self.tenants
            .entry(tenant.clone())
            .and_modify(|stats| {
                stats.commands += 1;
                stats.last_seen = now;
            })
            .or_insert(TenantStats {
                commands: 1,
                first_seen: now,
                last_seen: now,
            });
    }

    pub fn get(&self, tenant: &TenantId) -> Option<TenantStats> {
        self.tenants.get(tenant).map(|stats| stats.clone())
    }

    /// Snapshot of every tenant's stats for the admin surface.
    pub fn snapshot(&self) -> Vec<(TenantId, TenantStats)> {
        self.tenants
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}
