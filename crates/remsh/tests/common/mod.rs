//! Shared test fixtures.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use remsh::{EngineConfig, ExecutionEngine, OutputSink, SessionId, TenantId};

/// Sink that records every event for later assertions.
#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<Event>>,
}

#[derive(Debug, Clone)]
pub enum Event {
    Output { session: SessionId, chunk: Vec<u8> },
    Ended { session: SessionId },
}

impl OutputSink for CollectingSink {
    fn emit(&self, _tenant: &TenantId, session: &SessionId, chunk: &[u8]) {
        self.events.lock().unwrap().push(Event::Output {
            session: session.clone(),
            chunk: chunk.to_vec(),
        });
    }

    fn notify_ended(&self, _tenant: &TenantId, session: &SessionId) {
        self.events.lock().unwrap().push(Event::Ended {
            session: session.clone(),
        });
    }
}

impl CollectingSink {
    /// All output chunks for one session, in emission order.
    pub fn chunks(&self, session: &SessionId) -> Vec<Vec<u8>> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                Event::Output { session: s, chunk } if s == session => Some(chunk.clone()),
                _ => None,
            })
            .collect()
    }

    /// Concatenated output of one session.
    pub fn output(&self, session: &SessionId) -> Vec<u8> {
        self.chunks(session).concat()
    }

    pub fn output_text(&self, session: &SessionId) -> String {
        String::from_utf8_lossy(&self.output(session)).to_string()
    }

    pub fn ended(&self, session: &SessionId) -> bool {
        self.events
            .lock()
            .unwrap()
            .iter()
            .any(|event| matches!(event, Event::Ended { session: s } if s == session))
    }
}

/// Engine wired to a collecting sink, with fast test timings and a
/// throwaway data directory.
pub fn test_engine(dir: &tempfile::TempDir) -> (ExecutionEngine, Arc<CollectingSink>) {
    test_engine_with(dir, |_| {})
}

pub fn test_engine_with(
    dir: &tempfile::TempDir,
    tweak: impl FnOnce(&mut EngineConfig),
) -> (ExecutionEngine, Arc<CollectingSink>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut config = EngineConfig {
        data_dir: dir.path().to_path_buf(),
        poll_timeout_ms: 25,
        grace_period_ms: 200,
        ..EngineConfig::default()
    };
    tweak(&mut config);
    let sink = Arc::new(CollectingSink::default());
    let engine = ExecutionEngine::new(config, Arc::clone(&sink) as Arc<dyn OutputSink>);
    (engine, sink)
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_for(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
