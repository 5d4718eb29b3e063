//! Hooks consumed from the protocol session layer.
//!
//! The session supplies the time used to stamp every mutation and receives
//! change events produced by control operations so it can place them in its
//! own class-buffered event queues.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::types::{ClassMask, EventValue, ObjectGroup, PointFlags, Timestamp};

/// A reportable change produced by the database.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Event object group (g2, g11, g42, ...)
    pub group: ObjectGroup,
    pub index: u16,
    pub class_mask: ClassMask,
    pub value: EventValue,
    pub flags: PointFlags,
    pub time: Timestamp,
}

/// Protocol session collaborator.
pub trait Session: Send + Sync {
    /// Current session time.
    fn date_time(&self) -> Timestamp;

    /// Append a change event to the session's event buffers.
    fn append_event(&self, event: ChangeEvent) {
        let _ = event;
    }
}

/// Session backed by the system clock that drops events.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSession;

impl Session for SystemSession {
    fn date_time(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Session with a settable clock that records appended events.
///
/// Returns a predetermined time, useful for deterministic tests.
#[derive(Debug, Default)]
pub struct FixedSession {
    now_ms: AtomicU64,
    events: Mutex<Vec<ChangeEvent>>,
}

impl FixedSession {
    /// Create a session whose clock reads `now`.
    pub fn new(now: Timestamp) -> Self {
        Self {
            now_ms: AtomicU64::new(now.as_millis()),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Set the clock.
    pub fn set_time(&self, now: Timestamp) {
        self.now_ms.store(now.as_millis(), Ordering::SeqCst);
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let by = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        // The closure always returns Some
        let _ = self
            .now_ms
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |ms| Some(ms.saturating_add(by)));
    }

    /// Drain the recorded events.
    pub fn take_events(&self) -> Vec<ChangeEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl Session for FixedSession {
    fn date_time(&self) -> Timestamp {
        Timestamp::from_millis(self.now_ms.load(Ordering::SeqCst))
    }

    fn append_event(&self, event: ChangeEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MAX_DNP3_TIME;

    #[test]
    fn test_fixed_session_clock() {
        let session = FixedSession::new(Timestamp::from_millis(1_000));
        assert_eq!(session.date_time().as_millis(), 1_000);

        session.advance(Duration::from_millis(250));
        assert_eq!(session.date_time().as_millis(), 1_250);

        session.set_time(Timestamp::from_millis(5));
        assert_eq!(session.date_time().as_millis(), 5);
    }

    #[test]
    fn test_fixed_session_advance_saturates() {
        let session = FixedSession::new(Timestamp::from_millis(1_000));
        session.advance(Duration::MAX);
        assert_eq!(session.date_time().as_millis(), MAX_DNP3_TIME);
        session.advance(Duration::from_secs(1));
        assert_eq!(session.date_time().as_millis(), MAX_DNP3_TIME);
    }

    #[test]
    fn test_fixed_session_records_events() {
        let session = FixedSession::new(Timestamp::EPOCH);
        session.append_event(ChangeEvent {
            group: ObjectGroup::BinaryOutputEvent,
            index: 2,
            class_mask: ClassMask::CLASS_1,
            value: EventValue::Binary(true),
            flags: PointFlags::Online,
            time: Timestamp::EPOCH,
        });

        let events = session.take_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].index, 2);
        assert!(session.take_events().is_empty());
    }

    #[test]
    fn test_system_session_is_recent() {
        // 2020-01-01
        assert!(SystemSession.date_time().as_millis() > 1_577_836_800_000);
    }
}
