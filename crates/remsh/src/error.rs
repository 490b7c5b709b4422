use thiserror::Error;

/// Errors surfaced by the execution engine and its building blocks.
///
/// Everything here is scoped to a single tenant or session; none of these
/// conditions is fatal to the engine itself. Operations on unknown or
/// already-exited session IDs are deliberately *not* errors; they return
/// not-found outcomes (`Option`/`bool`) at the call site.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The requested path resolves outside the tenant's root directory.
    /// Callers must treat this as a hard rejection, never fall back to a
    /// default path. The message intentionally names no filesystem detail.
    #[error("invalid path")]
    PathEscape,

    /// The tenant identifier is not usable as a directory name.
    #[error("invalid tenant id: {0}")]
    InvalidTenant(String),

    /// PTY allocation or process creation failed; no session was created.
    #[error("failed to spawn command: {0}")]
    SpawnFailure(String),

    /// Writing input to a session's terminal failed. The session is dead
    /// or its descriptor is closed; the caller retires the session.
    #[error("failed to write to session: {0}")]
    WriteFailure(String),

    /// The tenant already has the maximum number of concurrent sessions.
    #[error("tenant {tenant} reached the concurrent session limit ({limit})")]
    SessionLimit { tenant: String, limit: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
