//! Connection worker: one task per accepted console connection.
//!
//! ```text
//! accept ─▶ anti-flood delay ─▶ allow-list ──rejected──▶ close, no reply
//!                                   │
//!                                   ▼
//!                   ┌──▶ read frame ─▶ Session::handle_frame ─▶ write reply ──┐
//!                   └─────────────────────────────────────────────────────────┘
//!                   until EOF, transport error, or a supervisor signal
//! ```
//!
//! The worker watches a [`RunSignal`] channel owned by the supervisor:
//!
//! - `Draining`: an unauthenticated session ends at once; an authenticated
//!   session keeps running on the configuration it started with.
//! - `Stopping`: every session ends.
//!
//! The signal is checked between frames and while waiting for the next one,
//! never in the middle of a request/reply exchange.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use relay_core::{is_allowed, RelayConfig};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::application::{Downstream, EventSink, LockoutLedger, Session};
use crate::domain::RelayEvent;
use crate::infrastructure::frame_io::{write_frame, FrameReader};

/// Control signal broadcast from the supervisor to its listener and workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunSignal {
    Running,
    Draining,
    Stopping,
}

/// Everything a worker needs besides its sockets.
pub struct WorkerContext {
    /// Snapshot active when the connection was accepted.
    pub config: Arc<RelayConfig>,
    pub accept_delay: Duration,
    pub max_frame_bytes: usize,
    pub ledger: LockoutLedger,
    pub events: Arc<dyn EventSink>,
    pub control: watch::Receiver<RunSignal>,
}

/// Serves one console connection to completion.
///
/// Never returns an error: every failure is local to this connection and is
/// logged, then the stream and the downstream connection are dropped.
pub async fn serve_connection<S, D>(
    stream: S,
    peer: SocketAddr,
    mut downstream: D,
    ctx: WorkerContext,
) where
    S: AsyncRead + AsyncWrite + Send + Unpin,
    D: Downstream,
{
    if !ctx.accept_delay.is_zero() {
        tokio::time::sleep(ctx.accept_delay).await;
    }

    let peer_address = peer.to_string();
    if !is_allowed(&peer_address, &ctx.config.allowed_addresses) {
        warn!(%peer, "peer not in allow-list; closing without reply");
        ctx.events.notify(RelayEvent::IpRejected { peer });
        return;
    }
    ctx.events.notify(RelayEvent::Connected { peer });

    let mut session = Session::new(peer_address, &ctx.config);
    info!(session = %session.id(), %peer, "session opened");

    let (reader, mut writer) = tokio::io::split(stream);
    let mut frames = FrameReader::with_limit(reader, ctx.max_frame_bytes);
    let mut control = ctx.control;
    let mut control_open = true;

    loop {
        let signal = *control.borrow_and_update();
        match signal {
            RunSignal::Stopping => {
                debug!(session = %session.id(), "stop requested");
                break;
            }
            RunSignal::Draining if !session.is_authenticated() => {
                debug!(session = %session.id(), "drain requested before authentication");
                break;
            }
            _ => {}
        }

        let frame = tokio::select! {
            read = frames.read_frame() => read,
            changed = control.changed(), if control_open => {
                // A closed channel means the supervisor is gone; keep serving.
                if changed.is_err() {
                    control_open = false;
                }
                continue;
            }
        };

        let frame = match frame {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!(session = %session.id(), "peer closed the connection");
                break;
            }
            Err(e) => {
                warn!(session = %session.id(), "read failed: {e}");
                break;
            }
        };

        let reply = session.handle_frame(&frame, &ctx.ledger, &mut downstream).await;
        if let Err(e) = write_frame(&mut writer, &reply).await {
            warn!(session = %session.id(), "write failed: {e}");
            break;
        }
    }

    info!(
        session = %session.id(),
        authenticated = session.is_authenticated(),
        "session closed"
    );
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::notify::MockEventSink;
    use async_trait::async_trait;
    use relay_core::auth::nonce::nonce_digest;
    use relay_core::protocol::messages::extract_tag;
    use tokio::io::{duplex, AsyncReadExt, DuplexStream, ReadHalf, WriteHalf};
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    struct EchoDownstream;

    #[async_trait]
    impl Downstream for EchoDownstream {
        async fn forward(&mut self, request: &[u8]) -> Vec<u8> {
            let mut reply = b"echo:".to_vec();
            reply.extend_from_slice(request);
            reply
        }
    }

    fn config(allowed: &[&str]) -> RelayConfig {
        RelayConfig {
            enabled: true,
            shared_secret: "secret".to_string(),
            allowed_addresses: allowed.iter().map(|s| s.to_string()).collect(),
            ..RelayConfig::default()
        }
    }

    fn context(
        config: RelayConfig,
        events: MockEventSink,
        control: watch::Receiver<RunSignal>,
    ) -> WorkerContext {
        WorkerContext {
            config: Arc::new(config),
            accept_delay: Duration::ZERO,
            max_frame_bytes: 1024,
            ledger: LockoutLedger::new(),
            events: Arc::new(events),
            control,
        }
    }

    fn connected_sink() -> MockEventSink {
        let mut events = MockEventSink::new();
        events
            .expect_notify()
            .withf(|e| matches!(e, RelayEvent::Connected { .. }))
            .times(1)
            .return_const(());
        events
    }

    struct Console {
        reader: FrameReader<ReadHalf<DuplexStream>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl Console {
        async fn request(&mut self, payload: &[u8]) -> Option<Vec<u8>> {
            write_frame(&mut self.writer, payload).await.unwrap();
            timeout(WAIT, self.reader.read_frame()).await.unwrap().unwrap()
        }

        async fn authenticate(&mut self) {
            let reply = self.request(b"<auth1/>").await.unwrap();
            let reply = String::from_utf8(reply).unwrap();
            let nonce = extract_tag(&reply, "nonce").unwrap().to_string();
            let answer = format!("<nonce_hash>{}</nonce_hash>", nonce_digest(&nonce, "secret"));
            let reply = self.request(answer.as_bytes()).await.unwrap();
            assert!(String::from_utf8(reply).unwrap().contains("<authorized/>"));
        }
    }

    fn spawn_worker(peer: &str, ctx: WorkerContext) -> (Console, JoinHandle<()>) {
        let (client, server) = duplex(4096);
        let peer: SocketAddr = peer.parse().unwrap();
        let task = tokio::spawn(serve_connection(server, peer, EchoDownstream, ctx));
        let (r, w) = tokio::io::split(client);
        let console = Console {
            reader: FrameReader::new(r),
            writer: w,
        };
        (console, task)
    }

    #[tokio::test]
    async fn test_rejected_peer_is_closed_without_reply_and_reported() {
        // Arrange
        let mut events = MockEventSink::new();
        events
            .expect_notify()
            .withf(|e| matches!(e, RelayEvent::IpRejected { .. }))
            .times(1)
            .return_const(());
        let (_tx, rx) = watch::channel(RunSignal::Running);
        let ctx = context(config(&["192.168.10"]), events, rx);
        let (mut client, server) = duplex(64);

        // Act
        serve_connection(server, "10.0.0.1:4444".parse().unwrap(), EchoDownstream, ctx).await;

        // Assert: not a single byte was written
        let mut buf = Vec::new();
        client.read_to_end(&mut buf).await.unwrap();
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_authenticated_session_forwards_frames() {
        // Arrange
        let (_tx, rx) = watch::channel(RunSignal::Running);
        let ctx = context(config(&["192.168.10"]), connected_sink(), rx);
        let (mut console, task) = spawn_worker("192.168.10.5:4444", ctx);

        // Act
        console.authenticate().await;
        let reply = console.request(b"<get_state/>").await;

        // Assert
        assert_eq!(reply, Some(b"echo:<get_state/>".to_vec()));
        drop(console);
        timeout(WAIT, task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_drain_ends_unauthenticated_session() {
        // Arrange
        let (tx, rx) = watch::channel(RunSignal::Running);
        let ctx = context(config(&[]), connected_sink(), rx);
        let (mut console, task) = spawn_worker("127.0.0.1:5000", ctx);
        assert!(console.request(b"<get_state/>").await.is_some());

        // Act
        tx.send(RunSignal::Draining).unwrap();

        // Assert
        timeout(WAIT, task).await.unwrap().unwrap();
        let eof = timeout(WAIT, console.reader.read_frame()).await.unwrap().unwrap();
        assert_eq!(eof, None);
    }

    #[tokio::test]
    async fn test_drain_keeps_authenticated_session_until_stop() {
        // Arrange
        let (tx, rx) = watch::channel(RunSignal::Running);
        let ctx = context(config(&[]), connected_sink(), rx);
        let (mut console, task) = spawn_worker("127.0.0.1:5000", ctx);
        console.authenticate().await;

        // Act: drain, then keep talking
        tx.send(RunSignal::Draining).unwrap();
        let reply = console.request(b"<get_results/>").await;

        // Assert
        assert_eq!(reply, Some(b"echo:<get_results/>".to_vec()));
        assert!(!task.is_finished());

        tx.send(RunSignal::Stopping).unwrap();
        timeout(WAIT, task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_dropped_supervisor_does_not_end_session() {
        // Arrange
        let (tx, rx) = watch::channel(RunSignal::Running);
        let ctx = context(config(&[]), connected_sink(), rx);
        let (mut console, task) = spawn_worker("127.0.0.1:5000", ctx);

        // Act
        drop(tx);
        let reply = console.request(b"<auth1/>").await;

        // Assert
        assert!(reply.is_some());
        drop(console);
        timeout(WAIT, task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_oversized_frame_closes_connection() {
        // Arrange: limit is 1024 bytes in the test context
        let (_tx, rx) = watch::channel(RunSignal::Running);
        let ctx = context(config(&[]), connected_sink(), rx);
        let (mut console, task) = spawn_worker("127.0.0.1:5000", ctx);

        // Act
        let reply = console.request(&[b'x'; 2048]).await;

        // Assert
        assert_eq!(reply, None);
        timeout(WAIT, task).await.unwrap().unwrap();
    }
}
