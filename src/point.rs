//! Point model shared by every typed table.
//!
//! A [`Point`] is a [`PointHeader`] (index, enable state, flags, class
//! membership, timestamp, test overrides) plus a kind-specific payload
//! implementing [`PointKind`].

use std::fmt;

use crate::control::ControlStatus;
use crate::table::DbContext;
use crate::types::{ClassMask, EventValue, ObjectGroup, PointFlags, Timestamp};

/// Event buffering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EventMode {
    /// Keep every change (sequence of events)
    #[default]
    Soe,
    /// Keep only the most recent change
    MostRecent,
}

/// Configuration applied when a point is added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointConfig {
    pub class_mask: ClassMask,
    pub flags: PointFlags,
    pub enabled: bool,
    /// Default static variation, `None` for the kind's default
    pub static_variation: Option<u8>,
    /// Default event variation, `None` for the kind's default
    pub event_variation: Option<u8>,
    pub event_mode: EventMode,
}

impl PointConfig {
    /// Create a configuration with the given class mask and flags.
    pub fn new(class_mask: ClassMask, flags: PointFlags) -> Self {
        Self {
            class_mask,
            flags,
            ..Self::default()
        }
    }

    /// Set default static variation.
    pub fn static_variation(mut self, variation: u8) -> Self {
        self.static_variation = Some(variation);
        self
    }

    /// Set default event variation.
    pub fn event_variation(mut self, variation: u8) -> Self {
        self.event_variation = Some(variation);
        self
    }

    /// Set event buffering mode.
    pub fn event_mode(mut self, mode: EventMode) -> Self {
        self.event_mode = mode;
        self
    }

    /// Create the point disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

impl Default for PointConfig {
    fn default() -> Self {
        Self {
            class_mask: ClassMask::CLASS_1,
            flags: PointFlags::Restart,
            enabled: true,
            static_variation: None,
            event_variation: None,
            event_mode: EventMode::Soe,
        }
    }
}

/// State common to every point.
#[derive(Debug, Clone, PartialEq)]
pub struct PointHeader {
    pub(crate) index: u16,
    pub enabled: bool,
    pub flags: PointFlags,
    pub class_mask: ClassMask,
    pub static_variation: u8,
    pub event_variation: u8,
    pub event_mode: EventMode,
    pub timestamp: Timestamp,
    /// Test harness override: controls fail with this status
    pub test_failure: Option<ControlStatus>,
    /// Point is under local (manual override) control
    pub local_mode: bool,
}

impl PointHeader {
    pub(crate) fn new<T: PointKind>(index: u16, config: &PointConfig, now: Timestamp) -> Self {
        Self {
            index,
            enabled: config.enabled,
            flags: config.flags,
            class_mask: config.class_mask,
            static_variation: config.static_variation.unwrap_or(T::DEFAULT_STATIC_VARIATION),
            event_variation: config.event_variation.unwrap_or(T::DEFAULT_EVENT_VARIATION),
            event_mode: config.event_mode,
            timestamp: now,
            test_failure: None,
            local_mode: false,
        }
    }

    /// Point index, immutable once added.
    #[inline]
    pub const fn index(&self) -> u16 {
        self.index
    }
}

/// Kind-specific point payload.
pub trait PointKind: fmt::Debug + Send + 'static {
    /// Static object group.
    const GROUP: ObjectGroup;
    /// Label used in logs and capacity errors.
    const LABEL: &'static str;
    const DEFAULT_STATIC_VARIATION: u8;
    const DEFAULT_EVENT_VARIATION: u8;

    type Value: Clone + PartialEq + fmt::Debug;

    /// Create a payload holding `value`.
    fn new(value: Self::Value) -> Self;

    /// Current value.
    fn value(&self) -> Self::Value;

    /// Replace the current value.
    fn set_value(&mut self, value: Self::Value);

    /// Value as carried by an event.
    fn event_value(&self) -> EventValue;

    /// Report whether value or flags changed since the last reported
    /// snapshot, and take the current state as reported if so.
    fn detect_change(&mut self, flags: PointFlags) -> bool;

    /// Convert a caller-supplied value into database-owned storage.
    fn prepare(value: Self::Value, _ctx: &DbContext) -> Self::Value {
        value
    }
}

/// A point: common header plus kind payload.
#[derive(Debug)]
pub struct Point<T: PointKind> {
    pub(crate) header: PointHeader,
    pub(crate) data: T,
}

impl<T: PointKind> Point<T> {
    #[inline]
    pub fn index(&self) -> u16 {
        self.header.index
    }

    #[inline]
    pub fn header(&self) -> &PointHeader {
        &self.header
    }

    #[inline]
    pub fn data(&self) -> &T {
        &self.data
    }

    #[inline]
    pub fn enabled(&self) -> bool {
        self.header.enabled
    }

    #[inline]
    pub fn flags(&self) -> PointFlags {
        self.header.flags
    }

    #[inline]
    pub fn class_mask(&self) -> ClassMask {
        self.header.class_mask
    }

    #[inline]
    pub fn timestamp(&self) -> Timestamp {
        self.header.timestamp
    }

    #[inline]
    pub fn value(&self) -> T::Value {
        self.data.value()
    }

    /// Snapshot of value, flags and time.
    pub fn snapshot(&self) -> PointSnapshot<T::Value> {
        PointSnapshot {
            index: self.header.index,
            value: self.data.value(),
            flags: self.header.flags,
            timestamp: self.header.timestamp,
        }
    }
}

/// Value, flags and time of a point at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct PointSnapshot<V> {
    pub index: u16,
    pub value: V,
    pub flags: PointFlags,
    pub timestamp: Timestamp,
}

/// Last reported value and flags, used for change detection.
#[derive(Debug, Clone, Default)]
pub(crate) struct Reported<V> {
    last: Option<(V, PointFlags)>,
}

impl<V: Clone> Reported<V> {
    pub(crate) const fn new() -> Self {
        Self { last: None }
    }

    /// Compare against the last report; `differs` decides value changes.
    pub(crate) fn check(
        &mut self,
        value: &V,
        flags: PointFlags,
        differs: impl FnOnce(&V, &V) -> bool,
    ) -> bool {
        let changed = match &self.last {
            None => true,
            Some((last_value, last_flags)) => *last_flags != flags || differs(last_value, value),
        };
        if changed {
            self.last = Some((value.clone(), flags));
        }
        changed
    }

    /// Last reported value.
    pub(crate) fn value(&self) -> Option<&V> {
        self.last.as_ref().map(|(v, _)| v)
    }
}
