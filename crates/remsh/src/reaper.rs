//! Background sweep for stale and dead sessions.
//!
//! Sessions normally retire themselves through the drain loop; the reaper is
//! the backstop for everything that didn't: bookkeeping left behind by a
//! wedged drain task, or a process whose liveness probe fails without the
//! loop noticing. Each sweep is isolated per session: one bad session never
//! blocks the rest of the sweep.

use std::time::Duration;

use log::{debug, info};
use tokio::task::JoinHandle;

use crate::alerts::AlertKind;
use crate::engine::ExecutionEngine;

/// Periodic garbage collector for sessions across all tenants.
pub struct Reaper {
    engine: ExecutionEngine,
    interval: Duration,
    stale_after: Duration,
}

impl Reaper {
    /// Build a reaper from the engine's configuration.
    pub fn new(engine: ExecutionEngine) -> Self {
        let interval = engine.config().sweep_interval();
        let stale_after = engine.config().stale_after();
        Self {
            engine,
            interval,
            stale_after,
        }
    }

    /// Override the sweep cadence and staleness bound.
    pub fn with_timing(mut self, interval: Duration, stale_after: Duration) -> Self {
        self.interval = interval;
        self.stale_after = stale_after;
        self
    }

    /// Start the periodic sweep task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            // The first tick fires immediately; skip it so a fresh engine
            // isn't swept before it has done anything.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.sweep().await;
            }
        })
    }

    /// One sweep over every tenant's sessions, reaping each one whose
    /// last-activity exceeds the staleness bound or whose process no longer
    /// answers the liveness probe.
    pub async fn sweep(&self) {
        let mut reaped = 0_usize;
        for (tenant, sessions) in self.engine.table().list_all() {
            for session in sessions {
                let dead = !session.pty.is_alive();
                let stale = session.last_activity_elapsed() > self.stale_after;
                if !dead && !stale {
                    continue;
                }

                let reason = if dead { "process gone" } else { "stale" };
                debug!(
                    "reaping session {} of tenant {tenant} ({reason})",
                    session.id.short()
                );
                session
                    .pty
                    .terminate(self.engine.config().grace_period())
                    .await;
                if self.engine.finish_session(&tenant, &session.id) {
                    reaped += 1;
                    self.engine.alerts().push(
                        AlertKind::Warning,
                        format!(
                            "reaped session {} of tenant {tenant} ({reason})",
                            session.id.short()
                        ),
                    );
                }
            }
        }
        if reaped > 0 {
            info!("reaper removed {reaped} session(s)");
        }
    }
}
