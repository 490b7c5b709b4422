//! Multi-tenant shell command execution engine.
//!
//! Each tenant (an opaque remote identity, typically a chat user) owns an
//! isolated working directory and can run arbitrary shell commands there.
//! Commands execute inside a pseudo-terminal so interactive programs behave
//! as if attached to a real terminal; output streams back to a pluggable
//! [`sink::OutputSink`] in bounded chunks, and a best-effort prompt detector
//! routes the tenant's next message into a blocked session instead of
//! starting a new command.
//!
//! The moving parts:
//! - [`sandbox::PathSandbox`]: keeps every tenant path under that tenant's
//!   root, centrally.
//! - [`pty::PtyProcess`]: one subprocess bound to a PTY: spawn, poll-read,
//!   write, graceful-then-forced termination.
//! - [`session::SessionTable`]: per-tenant registry plus the awaiting-input
//!   index.
//! - [`engine::ExecutionEngine`]: orchestrates spawn, supervised output
//!   draining, input routing and teardown.
//! - [`reaper::Reaper`]: periodic sweep for stale or dead sessions.

pub mod alerts;
pub mod authz;
pub mod config;
pub mod engine;
pub mod error;
pub mod pty;
pub mod reaper;
pub mod sandbox;
pub mod session;
pub mod sink;
pub mod stats;

pub use alerts::{AlertKind, AlertRing, SystemAlert};
pub use authz::{AdminStore, MemoryAdminStore};
pub use config::EngineConfig;
pub use engine::{Dispatch, ExecutionEngine, PromptDetector, trailing_colon_prompt};
pub use error::EngineError;
pub use pty::{PtyProcess, PtyRead, Termination};
pub use reaper::Reaper;
pub use sandbox::PathSandbox;
pub use session::{Session, SessionId, SessionSummary, SessionTable, TenantId, TenantSessionsSummary};
pub use sink::{ChannelSink, OutputSink, SinkEvent};
pub use stats::{TenantStats, UsageTracker};
