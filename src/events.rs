//! User-managed event queues.
//!
//! One bounded queue per event object group, polled by the session layer
//! during a response cycle: entries are enumerated with [`get_next`], the
//! most recently returned entry is marked sent with [`mark_sent`], and at
//! the end of the cycle sent entries are either reset (not confirmed) or
//! removed (confirmed).
//!
//! [`get_next`]: UserEventQueues::get_next
//! [`mark_sent`]: UserEventQueues::mark_sent

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::{DbError, Result};
use crate::types::{ClassMask, EventValue, ObjectGroup, PointFlags, Timestamp};

/// Event groups that get a queue.
pub const QUEUED_GROUPS: [ObjectGroup; 10] = [
    ObjectGroup::BinaryInputEvent,
    ObjectGroup::DoubleBitInputEvent,
    ObjectGroup::BinaryOutputEvent,
    ObjectGroup::CounterEvent,
    ObjectGroup::FrozenCounterEvent,
    ObjectGroup::AnalogInputEvent,
    ObjectGroup::FrozenAnalogInputEvent,
    ObjectGroup::AnalogOutputEvent,
    ObjectGroup::OctetStringEvent,
    ObjectGroup::DatasetEvent,
];

/// One queued event.
#[derive(Debug, Clone, PartialEq)]
pub struct UserEvent {
    pub group: ObjectGroup,
    pub index: u16,
    pub class_mask: ClassMask,
    pub variation: u8,
    pub flags: PointFlags,
    pub value: EventValue,
    pub timestamp: Timestamp,
    pub sent: bool,
}

impl UserEvent {
    /// Create an unsent event.
    pub fn new(
        group: ObjectGroup,
        index: u16,
        class_mask: ClassMask,
        variation: u8,
        flags: PointFlags,
        value: EventValue,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            group,
            index,
            class_mask,
            variation,
            flags,
            value,
            timestamp,
            sent: false,
        }
    }
}

#[derive(Debug)]
struct Queue {
    events: Vec<UserEvent>,
    capacity: usize,
}

impl Queue {
    fn is_full(&self) -> bool {
        self.events.len() >= self.capacity
    }
}

/// Bounded event queues, one per event group.
///
/// The authentication error queue (g120) holds a single entry; a new error
/// replaces the one waiting.
#[derive(Debug)]
pub struct UserEventQueues {
    queues: BTreeMap<ObjectGroup, Queue>,
    /// Enumeration position shared by every queue
    cursor: usize,
    /// Entry most recently returned by `get_next`
    last_event: Option<(ObjectGroup, usize)>,
}

impl UserEventQueues {
    /// Create queues holding `capacity` events per group.
    pub fn new(capacity: usize) -> Self {
        let mut queues = BTreeMap::new();
        for group in QUEUED_GROUPS {
            queues.insert(
                group,
                Queue {
                    events: Vec::new(),
                    capacity,
                },
            );
        }
        queues.insert(
            ObjectGroup::Authentication,
            Queue {
                events: Vec::new(),
                capacity: 1,
            },
        );
        Self {
            queues,
            cursor: 0,
            last_event: None,
        }
    }

    /// Queue `event` on its group's queue.
    pub fn add(&mut self, event: UserEvent) -> Result<()> {
        let group = event.group;
        let queue = self
            .queues
            .get_mut(&group)
            .ok_or(DbError::UnknownGroup(group.as_u8()))?;

        if queue.is_full() {
            if group != ObjectGroup::Authentication {
                warn!(%group, capacity = queue.capacity, "user event queue full");
                return Err(DbError::capacity("user events", queue.capacity));
            }
            debug!(%group, "authentication error replaced");
            queue.events.clear();
            if matches!(self.last_event, Some((g, _)) if g == group) {
                self.last_event = None;
            }
        }
        queue.events.push(event);
        Ok(())
    }

    /// Number of queued events in `group`.
    pub fn len(&self, group: ObjectGroup) -> usize {
        self.queues.get(&group).map_or(0, |q| q.events.len())
    }

    /// Queued events in `group`, oldest first.
    pub fn events(&self, group: ObjectGroup) -> &[UserEvent] {
        self.queues
            .get(&group)
            .map(|q| q.events.as_slice())
            .unwrap_or_default()
    }

    /// Count unsent events whose class intersects `mask`.
    pub fn not_sent_count(&self, group: ObjectGroup, mask: ClassMask) -> usize {
        self.queues.get(&group).map_or(0, |q| {
            q.events
                .iter()
                .filter(|e| !e.sent && e.class_mask.intersects(mask))
                .count()
        })
    }

    /// Next unsent event in `group` whose class intersects `mask`.
    ///
    /// `first` restarts enumeration from the start of the queue.
    pub fn get_next(&mut self, group: ObjectGroup, mask: ClassMask, first: bool) -> Option<&UserEvent> {
        if first {
            self.cursor = 0;
        }
        let queue = self.queues.get(&group)?;
        while self.cursor < queue.events.len() {
            let position = self.cursor;
            self.cursor += 1;
            let event = &queue.events[position];
            if !event.sent && event.class_mask.intersects(mask) {
                self.last_event = Some((group, position));
                return Some(event);
            }
        }
        None
    }

    /// Mark the event most recently returned by [`get_next`](Self::get_next) as sent.
    ///
    /// `index` is not used to look the event up: only the last returned
    /// entry can be marked. Returns false if that entry is not in `group`.
    pub fn mark_sent(&mut self, group: ObjectGroup, index: u16) -> bool {
        let Some((last_group, position)) = self.last_event else {
            return false;
        };
        if last_group != group {
            return false;
        }
        match self.queues.get_mut(&group).and_then(|q| q.events.get_mut(position)) {
            Some(event) => {
                if event.index != index {
                    debug!(%group, index, marked = event.index, "marked event differs from requested point");
                }
                event.sent = true;
                true
            }
            None => false,
        }
    }

    /// Clear the sent flag on every event in `group`.
    ///
    /// Returns true if the queue is still full.
    pub fn reset_unacked(&mut self, group: ObjectGroup) -> bool {
        let Some(queue) = self.queues.get_mut(&group) else {
            return false;
        };
        for event in &mut queue.events {
            event.sent = false;
        }
        queue.is_full()
    }

    /// Drop every sent event in `group`.
    ///
    /// Returns true if the queue is still full.
    pub fn remove_acked(&mut self, group: ObjectGroup) -> bool {
        let Some(queue) = self.queues.get_mut(&group) else {
            return false;
        };
        let before = queue.events.len();
        queue.events.retain(|e| !e.sent);
        if queue.events.len() != before {
            debug!(%group, removed = before - queue.events.len(), "acknowledged events removed");
            if matches!(self.last_event, Some((g, _)) if g == group) {
                self.last_event = None;
            }
        }
        queue.is_full()
    }

    /// Drop every event in every queue.
    pub fn clear(&mut self) {
        for queue in self.queues.values_mut() {
            queue.events.clear();
        }
        self.cursor = 0;
        self.last_event = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(index: u16, class_mask: ClassMask) -> UserEvent {
        UserEvent::new(
            ObjectGroup::BinaryInputEvent,
            index,
            class_mask,
            2,
            PointFlags::Online,
            EventValue::Binary(true),
            Timestamp::from_millis(index as u64),
        )
    }

    fn auth_error(user: u16) -> UserEvent {
        UserEvent::new(
            ObjectGroup::Authentication,
            0,
            ClassMask::CLASS_3,
            7,
            PointFlags::default(),
            EventValue::AuthError {
                user,
                association: 1,
                error_code: 1,
            },
            Timestamp::EPOCH,
        )
    }

    const G: ObjectGroup = ObjectGroup::BinaryInputEvent;

    #[test]
    fn test_add_beyond_capacity() {
        let mut queues = UserEventQueues::new(2);
        queues.add(event(0, ClassMask::CLASS_1)).unwrap();
        queues.add(event(1, ClassMask::CLASS_1)).unwrap();
        assert_eq!(
            queues.add(event(2, ClassMask::CLASS_1)),
            Err(DbError::capacity("user events", 2))
        );
        assert_eq!(queues.len(G), 2);
    }

    #[test]
    fn test_add_unknown_group() {
        let mut queues = UserEventQueues::new(2);
        let mut e = event(0, ClassMask::CLASS_1);
        e.group = ObjectGroup::BinaryInput;
        assert_eq!(queues.add(e), Err(DbError::UnknownGroup(1)));
    }

    #[test]
    fn test_authentication_queue_evicts() {
        let mut queues = UserEventQueues::new(8);
        queues.add(auth_error(1)).unwrap();
        queues.add(auth_error(2)).unwrap();
        let queued = queues.events(ObjectGroup::Authentication);
        assert_eq!(queued.len(), 1);
        assert!(matches!(queued[0].value, EventValue::AuthError { user: 2, .. }));
    }

    #[test]
    fn test_get_next_filters_by_class() {
        let mut queues = UserEventQueues::new(8);
        queues.add(event(0, ClassMask::CLASS_1)).unwrap();
        queues.add(event(1, ClassMask::CLASS_2)).unwrap();
        queues.add(event(2, ClassMask::CLASS_1)).unwrap();

        assert_eq!(queues.not_sent_count(G, ClassMask::CLASS_1), 2);
        assert_eq!(queues.get_next(G, ClassMask::CLASS_1, true).unwrap().index, 0);
        assert_eq!(queues.get_next(G, ClassMask::CLASS_1, false).unwrap().index, 2);
        assert!(queues.get_next(G, ClassMask::CLASS_1, false).is_none());

        // Restart regardless of where the cursor was
        assert_eq!(queues.get_next(G, ClassMask::CLASS_2, true).unwrap().index, 1);
    }

    #[test]
    fn test_mark_sent_uses_last_returned() {
        let mut queues = UserEventQueues::new(8);
        queues.add(event(5, ClassMask::CLASS_1)).unwrap();
        queues.add(event(5, ClassMask::CLASS_1)).unwrap();
        assert!(!queues.mark_sent(G, 5));

        queues.get_next(G, ClassMask::CLASS_1, true);
        queues.get_next(G, ClassMask::CLASS_1, false);
        assert!(queues.mark_sent(G, 5));

        let sent: Vec<bool> = queues.events(G).iter().map(|e| e.sent).collect();
        assert_eq!(sent, vec![false, true]);
        assert_eq!(queues.not_sent_count(G, ClassMask::ALL_EVENTS), 1);
        assert!(!queues.mark_sent(ObjectGroup::CounterEvent, 5));
    }

    #[test]
    fn test_reset_unacked() {
        let mut queues = UserEventQueues::new(2);
        queues.add(event(0, ClassMask::CLASS_1)).unwrap();
        queues.add(event(1, ClassMask::CLASS_1)).unwrap();
        queues.get_next(G, ClassMask::CLASS_1, true);
        queues.mark_sent(G, 0);

        assert!(queues.reset_unacked(G));
        assert_eq!(queues.not_sent_count(G, ClassMask::CLASS_1), 2);
    }

    #[test]
    fn test_remove_acked_keeps_unsent() {
        let mut queues = UserEventQueues::new(3);
        for i in 0..3 {
            queues.add(event(i, ClassMask::CLASS_1)).unwrap();
        }
        queues.get_next(G, ClassMask::CLASS_1, true);
        queues.get_next(G, ClassMask::CLASS_1, false);
        queues.mark_sent(G, 1);

        assert!(!queues.remove_acked(G));
        let left: Vec<u16> = queues.events(G).iter().map(|e| e.index).collect();
        assert_eq!(left, vec![0, 2]);
        // The marked entry is gone; nothing left to mark
        assert!(!queues.mark_sent(G, 1));

        assert!(!queues.remove_acked(G));
        assert_eq!(queues.len(G), 2);
    }
}
