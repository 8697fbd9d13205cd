//! Channel-backed [`EventSink`].
//!
//! Events go into a bounded `tokio::sync::mpsc` channel with `try_send`, so a
//! slow or absent consumer never stalls the listener or a worker.  When the
//! channel is full or the receiver is gone the event is dropped.

use tokio::sync::mpsc;

use crate::application::EventSink;
use crate::domain::RelayEvent;

#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::Sender<RelayEvent>,
}

impl ChannelEventSink {
    /// Creates the sink and the receiver the hosting application reads from.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<RelayEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn notify(&self, event: RelayEvent) {
        let _ = self.tx.try_send(event);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        // Arrange
        let (sink, mut rx) = ChannelEventSink::new(8);

        // Act
        sink.notify(RelayEvent::Reconfiguring);
        sink.notify(RelayEvent::IdleWait);

        // Assert
        assert_eq!(rx.recv().await, Some(RelayEvent::Reconfiguring));
        assert_eq!(rx.recv().await, Some(RelayEvent::IdleWait));
    }

    #[test]
    fn test_full_channel_drops_event_instead_of_blocking() {
        let (sink, mut rx) = ChannelEventSink::new(1);

        sink.notify(RelayEvent::IdleWait);
        sink.notify(RelayEvent::Reconfiguring);

        assert_eq!(rx.try_recv().ok(), Some(RelayEvent::IdleWait));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_notify_after_receiver_dropped_is_silent() {
        let (sink, rx) = ChannelEventSink::new(1);
        drop(rx);
        sink.notify(RelayEvent::IdleWait);
    }
}
