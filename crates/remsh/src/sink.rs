//! Output sink boundary.
//!
//! The transport that ferries output back to the remote user lives outside
//! the engine; it plugs in through [`OutputSink`]. Implementations must not
//! block the drain loop: a slow transport may lose throughput but can never
//! deadlock a session.

use std::sync::Arc;

use log::warn;
use tokio::sync::mpsc;

use crate::session::{SessionId, TenantId};

/// Consumer of session output, implemented by the transport layer.
///
/// `emit` chunks for one session arrive in production order; chunks across
/// sessions interleave freely. `notify_ended` fires exactly once per
/// session, after its final chunk.
pub trait OutputSink: Send + Sync {
    fn emit(&self, tenant: &TenantId, session: &SessionId, chunk: &[u8]);
    fn notify_ended(&self, tenant: &TenantId, session: &SessionId);
}

/// One event on the sink channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Output {
        tenant: TenantId,
        session: SessionId,
        chunk: Vec<u8>,
    },
    Ended {
        tenant: TenantId,
        session: SessionId,
    },
}

/// Bounded, fire-and-forget sink backed by a tokio channel.
///
/// `try_send` keeps the drain loop non-blocking; when the transport falls
/// behind and the queue fills up, chunks are dropped with a warning rather
/// than stalling every session.
pub struct ChannelSink {
    tx: mpsc::Sender<SinkEvent>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<SinkEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Arc::new(Self { tx }), rx)
    }
}

impl OutputSink for ChannelSink {
    fn emit(&self, tenant: &TenantId, session: &SessionId, chunk: &[u8]) {
        let event = SinkEvent::Output {
            tenant: tenant.clone(),
            session: session.clone(),
            chunk: chunk.to_vec(),
        };
        if let Err(e) = self.tx.try_send(event) {
            warn!("dropping output chunk for session {}: {e}", session.short());
        }
    }

    fn notify_ended(&self, tenant: &TenantId, session: &SessionId) {
        let event = SinkEvent::Ended {
            tenant: tenant.clone(),
            session: session.clone(),
        };
        if let Err(e) = self.tx.try_send(event) {
            warn!(
                "dropping end-of-session notice for session {}: {e}",
                session.short()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelSink::new(16);
        let tenant = TenantId::from(1_i64);
        let session = SessionId::generate();

        sink.emit(&tenant, &session, b"first");
        sink.emit(&tenant, &session, b"second");
        sink.notify_ended(&tenant, &session);

        match rx.recv().await.unwrap() {
            SinkEvent::Output { chunk, .. } => assert_eq!(chunk, b"first"),
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.recv().await.unwrap() {
            SinkEvent::Output { chunk, .. } => assert_eq!(chunk, b"second"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(rx.recv().await.unwrap(), SinkEvent::Ended { .. }));
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let (sink, mut rx) = ChannelSink::new(1);
        let tenant = TenantId::from(2_i64);
        let session = SessionId::generate();

        sink.emit(&tenant, &session, b"kept");
        // Queue is full; this must return immediately instead of blocking.
        sink.emit(&tenant, &session, b"dropped");

        assert!(matches!(rx.recv().await.unwrap(), SinkEvent::Output { .. }));
        assert!(rx.try_recv().is_err());
    }
}
