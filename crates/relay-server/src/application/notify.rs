use crate::domain::RelayEvent;

/// One-way channel to the hosting application.
///
/// Implementations must not block and must not fail: an event nobody is
/// listening for is simply dropped.
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send + Sync {
    fn notify(&self, event: RelayEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn notify(&self, _event: RelayEvent) {}
}
