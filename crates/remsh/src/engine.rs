//! Command execution orchestration.
//!
//! The engine accepts `(tenant, command)` pairs, spawns each command in a
//! PTY chdir'd to the tenant's sandboxed directory, registers the session,
//! and drives a supervised output-drain task until the process exits. Every
//! teardown path (natural exit, explicit stop, reaper sweep, drain-task
//! panic) converges on [`ExecutionEngine::finish_session`], which is safe
//! to reach more than once.

use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::task;

use crate::alerts::{AlertKind, AlertRing};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::pty::{PtyProcess, PtyRead, Termination};
use crate::sandbox::PathSandbox;
use crate::session::{Session, SessionId, SessionTable, TenantId, TenantSessionsSummary};
use crate::sink::OutputSink;
use crate::stats::UsageTracker;

/// Heuristic deciding whether the latest output left the process blocked on
/// a prompt.
pub type PromptDetector = Arc<dyn Fn(&[u8]) -> bool + Send + Sync>;

/// Default prompt heuristic: the trailing bytes of the latest read, after
/// trimming trailing whitespace, end with a colon.
///
/// This is inherited best-effort behavior, not a protocol: plenty of real
/// prompts don't end in `:` and plenty of non-prompt output does. Swap it
/// out with [`ExecutionEngine::with_prompt_detector`] if the transport has
/// a better signal.
pub fn trailing_colon_prompt(output: &[u8]) -> bool {
    output.trim_ascii_end().last() == Some(&b':')
}

/// How an inbound message was routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Consumed as input by a session that was awaiting it.
    Input(SessionId),
    /// Started a new command session.
    Command(SessionId),
}

/// Multi-tenant command execution engine.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct ExecutionEngine {
    config: Arc<EngineConfig>,
    sandbox: Arc<PathSandbox>,
    table: Arc<SessionTable>,
    sink: Arc<dyn OutputSink>,
    alerts: Arc<AlertRing>,
    usage: Arc<UsageTracker>,
    prompt_detector: PromptDetector,
}

impl ExecutionEngine {
    pub fn new(config: EngineConfig, sink: Arc<dyn OutputSink>) -> Self {
        let sandbox = Arc::new(PathSandbox::new(config.data_dir.clone()));
        let alerts = Arc::new(AlertRing::new(config.alert_capacity));
        Self {
            config: Arc::new(config),
            sandbox,
            table: Arc::new(SessionTable::new()),
            sink,
            alerts,
            usage: Arc::new(UsageTracker::new()),
            prompt_detector: Arc::new(trailing_colon_prompt),
        }
    }

    /// Replace the prompt heuristic.
    pub fn with_prompt_detector(mut self, detector: PromptDetector) -> Self {
        self.prompt_detector = detector;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn table(&self) -> &SessionTable {
        &self.table
    }

    pub fn sandbox(&self) -> &PathSandbox {
        &self.sandbox
    }

    pub fn alerts(&self) -> &AlertRing {
        &self.alerts
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    /// Route an inbound message: input to an awaiting session if one exists,
    /// otherwise a new command.
    pub async fn dispatch(&self, tenant: &TenantId, text: &str) -> Result<Dispatch, EngineError> {
        if let Some(session_id) = self.deliver_input(tenant, text) {
            return Ok(Dispatch::Input(session_id));
        }
        let session_id = self.execute(tenant, text).await?;
        Ok(Dispatch::Command(session_id))
    }

    /// Start a command for a tenant. Returns as soon as the session is
    /// registered; a background task drives it to completion.
    pub async fn execute(
        &self,
        tenant: &TenantId,
        command: &str,
    ) -> Result<SessionId, EngineError> {
        let active = self.table.session_count(tenant);
        if active >= self.config.max_sessions_per_tenant {
            warn!(
                "tenant {tenant} at session limit ({active}/{})",
                self.config.max_sessions_per_tenant
            );
            return Err(EngineError::SessionLimit {
                tenant: tenant.to_string(),
                limit: self.config.max_sessions_per_tenant,
            });
        }

        let workdir = self.sandbox.tenant_root(tenant)?;
        let shell = self.config.shell.clone();
        let command_line = command.to_string();
        let pty = task::spawn_blocking(move || PtyProcess::spawn(&command_line, &shell, &workdir))
            .await
            .map_err(|e| EngineError::SpawnFailure(e.to_string()))??;

        let session = Arc::new(Session::new(
            SessionId::generate(),
            tenant.clone(),
            command,
            pty,
        ));
        let session_id = session.id.clone();
        if !self
            .table
            .try_register(Arc::clone(&session), self.config.max_sessions_per_tenant)
        {
            // A racing execute filled the last slot while we were spawning.
            session.pty.force_kill();
            return Err(EngineError::SessionLimit {
                tenant: tenant.to_string(),
                limit: self.config.max_sessions_per_tenant,
            });
        }
        self.usage.record_command(tenant);
        info!(
            "session {} started for tenant {tenant} (pid {}): {command}",
            session_id.short(),
            session.pty.pid()
        );

        self.spawn_drain_task(session);
        Ok(session_id)
    }

    /// Deliver plain text as input to the tenant's oldest awaiting session.
    /// Returns the consuming session's ID, or `None` when no session is
    /// awaiting input and the caller should treat the text as a new command.
    pub fn deliver_input(&self, tenant: &TenantId, text: &str) -> Option<SessionId> {
        loop {
            let session = self.table.next_awaiting_input(tenant)?;
            let mut payload = Vec::with_capacity(text.len() + 1);
            payload.extend_from_slice(text.as_bytes());
            payload.push(b'\n');

            match session.pty.write_all(&payload) {
                Ok(()) => {
                    session.touch();
                    debug!(
                        "input routed to session {} of tenant {tenant}",
                        session.id.short()
                    );
                    return Some(session.id.clone());
                }
                Err(e) => {
                    // A dead terminal means the session is over; retire it
                    // and see whether another session wants the input.
                    warn!(
                        "input write to session {} failed, retiring it: {e}",
                        session.id.short()
                    );
                    self.finish_session(tenant, &session.id);
                }
            }
        }
    }

    /// Stop every active session of a tenant, graceful-then-forced. Returns
    /// how many sessions were stopped. Best-effort: individual failures are
    /// logged, never propagated.
    pub async fn stop_all(&self, tenant: &TenantId) -> usize {
        let sessions = self.table.list_active(tenant);
        let mut stopped = 0;
        for session in sessions {
            let outcome = session.pty.terminate(self.config.grace_period()).await;
            let removed = self.finish_session(tenant, &session.id);
            // The drain loop may notice the death first and deregister
            // before we do; the session was still stopped by this call.
            if removed || outcome != Termination::AlreadyDead {
                stopped += 1;
            }
        }
        if stopped > 0 {
            info!("stopped {stopped} session(s) for tenant {tenant}");
            self.alerts.push(
                AlertKind::Info,
                format!("tenant {tenant} stopped {stopped} session(s)"),
            );
        }
        stopped
    }

    /// Stop every session of every tenant. Admin surface only.
    pub async fn stop_everything(&self) -> usize {
        let mut stopped = 0;
        for (tenant, _) in self.table.list_all() {
            stopped += self.stop_all(&tenant).await;
        }
        stopped
    }

    /// Per-tenant summaries of all active sessions, for the admin surface.
    pub fn list_active_sessions(&self) -> Vec<TenantSessionsSummary> {
        self.table.summaries()
    }

    /// Deregister a session and release its resources. The single teardown
    /// point: natural exit, explicit stop, reaper sweep and drain-task
    /// failure all land here, and only the first caller does any work.
    pub(crate) fn finish_session(&self, tenant: &TenantId, id: &SessionId) -> bool {
        let Some(session) = self.table.remove(tenant, id) else {
            return false;
        };
        session.pty.force_kill();
        self.sink.notify_ended(tenant, id);
        info!(
            "session {} of tenant {tenant} ended after {}s",
            id.short(),
            session.elapsed_secs()
        );
        true
    }

    fn spawn_drain_task(&self, session: Arc<Session>) {
        let engine = self.clone();
        let supervised = Arc::clone(&session);
        let handle = task::spawn_blocking(move || engine.drain_loop(&session));

        let engine = self.clone();
        tokio::spawn(async move {
            if let Err(e) = handle.await {
                // The drain loop itself never panics on I/O; this guards the
                // task as a whole so a bug cannot leak a registered session
                // or an open descriptor.
                error!(
                    "drain task for session {} failed: {e}",
                    supervised.id.short()
                );
                engine.alerts.push(
                    AlertKind::Error,
                    format!("drain task for session {} failed", supervised.id.short()),
                );
                engine.finish_session(&supervised.tenant, &supervised.id);
            }
        });
    }

    /// Pump output from the PTY to the sink until the process dies, then
    /// tear the session down. Runs on the blocking pool: the poll-read is
    /// the engine's one legitimate blocking point.
    fn drain_loop(&self, session: &Arc<Session>) {
        let poll_timeout = self.config.poll_timeout();
        loop {
            match session.pty.read_timeout(poll_timeout) {
                PtyRead::Data(output) => {
                    session.touch();
                    for chunk in output.chunks(self.config.chunk_size) {
                        self.sink.emit(&session.tenant, &session.id, chunk);
                    }
                    if (self.prompt_detector)(&output) {
                        debug!(
                            "session {} looks blocked on a prompt",
                            session.id.short()
                        );
                        self.table.mark_awaiting_input(&session.tenant, &session.id);
                    }
                }
                PtyRead::Timeout => {
                    session.touch();
                    // Probe liveness only once the buffer is drained, so a
                    // process that exits with output still queued never
                    // loses its tail.
                    if !session.pty.is_alive() {
                        break;
                    }
                }
                PtyRead::Eof => break,
            }
        }
        self.finish_session(&session.tenant, &session.id);
    }
}
