//! Session and identity data models.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::EngineError;
use crate::pty::PtyProcess;

/// An isolated remote identity. Unrelated to OS users; each tenant owns
/// exactly one working directory on disk.
///
/// Tenant IDs double as directory names under the engine's data dir, so
/// string-constructed IDs are restricted to a directory-safe charset.
/// Numeric IDs (the usual case for chat transports) are always valid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TenantId(String);

impl TenantId {
    /// Create a tenant ID from a string, validating it is safe to use as a
    /// single path component: ASCII alphanumerics, `_`, `-`, `.`; never
    /// empty, never `.` or `..`.
    pub fn new(id: impl Into<String>) -> Result<Self, EngineError> {
        let id = id.into();
        if id.is_empty() {
            return Err(EngineError::InvalidTenant("empty".into()));
        }
        if id == "." || id == ".." {
            return Err(EngineError::InvalidTenant(id));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            return Err(EngineError::InvalidTenant(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<i64> for TenantId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<u64> for TenantId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque unique token identifying one command execution. Generated per
/// invocation, never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines and admin listings.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One in-flight command execution.
///
/// Owned exclusively by the owning tenant's entry in the session table; the
/// drain loop is the only mutator (it touches the last-activity instant).
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub tenant: TenantId,
    /// The literal command line handed to the shell.
    pub command: String,
    pub pty: Arc<PtyProcess>,
    pub started_at: DateTime<Utc>,
    last_activity: Mutex<Instant>,
}

impl Session {
    pub fn new(id: SessionId, tenant: TenantId, command: impl Into<String>, pty: PtyProcess) -> Self {
        Self {
            id,
            tenant,
            command: command.into(),
            pty: Arc::new(pty),
            started_at: Utc::now(),
            last_activity: Mutex::new(Instant::now()),
        }
    }

    /// Record a liveness signal from the drain loop.
    pub fn touch(&self) {
        let mut last = self
            .last_activity
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *last = Instant::now();
    }

    /// Time since the last liveness signal.
    pub fn last_activity_elapsed(&self) -> Duration {
        let last = self
            .last_activity
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        last.elapsed()
    }

    pub fn elapsed_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds().max(0)
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            command: self.command.clone(),
            elapsed_secs: self.elapsed_secs(),
            started_at: self.started_at,
        }
    }
}

/// Serializable view of one active session for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub command: String,
    pub elapsed_secs: i64,
    pub started_at: DateTime<Utc>,
}

/// All active sessions of one tenant, for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct TenantSessionsSummary {
    pub tenant: TenantId,
    pub sessions: Vec<SessionSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_id_from_integers() {
        assert_eq!(TenantId::from(42_i64).as_str(), "42");
        assert_eq!(TenantId::from(7_u64).as_str(), "7");
        assert_eq!(TenantId::from(-3_i64).as_str(), "-3");
    }

    #[test]
    fn tenant_id_accepts_directory_safe_strings() {
        assert!(TenantId::new("user_42").is_ok());
        assert!(TenantId::new("a-b.c").is_ok());
        assert!(TenantId::new("1234567890").is_ok());
    }

    #[test]
    fn tenant_id_rejects_unsafe_strings() {
        assert!(TenantId::new("").is_err());
        assert!(TenantId::new(".").is_err());
        assert!(TenantId::new("..").is_err());
        assert!(TenantId::new("a/b").is_err());
        assert!(TenantId::new("../etc").is_err());
        assert!(TenantId::new("user\0evil").is_err());
        assert!(TenantId::new("user name").is_err());
    }

    #[test]
    fn session_ids_are_unique() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert_eq!(a.short().len(), 8);
    }
}
