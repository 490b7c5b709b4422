//! Session identities, models and the per-tenant registry.

pub mod models;
pub mod table;

pub use models::{Session, SessionId, SessionSummary, TenantId, TenantSessionsSummary};
pub use table::SessionTable;
