//! Concrete point kinds.
//!
//! | Kind | Group | Value |
//! |------|-------|-------|
//! | `BinaryInput` | g1 | `bool` |
//! | `DoubleBitInput` | g3 | `DoubleBit` |
//! | `BinaryOutput` | g10 | `bool` |
//! | `Counter` | g20 | `u32` |
//! | `FrozenCounter` | g21 | `u32` |
//! | `AnalogInput` | g30 | `f64` |
//! | `FrozenAnalogInput` | g31 | `f64` |
//! | `AnalogOutput` | g40 | `f64` |
//! | `OctetString` | g110 | `Bytes` |

use bytes::Bytes;

use crate::analog::Encoded;
use crate::error::{DbError, Result};
use crate::freeze::FreezeState;
use crate::point::{PointKind, PointSnapshot, Reported};
use crate::table::{DbContext, PointTable, TwinnedTable};
use crate::types::{
    AnalogValue, ControlMask, DeadbandValue, DoubleBit, EventValue, ObjectGroup, PointFlags,
};

/// Binary input (g1).
#[derive(Debug)]
pub struct BinaryInput {
    value: bool,
    reported: Reported<bool>,
}

impl PointKind for BinaryInput {
    const GROUP: ObjectGroup = ObjectGroup::BinaryInput;
    const LABEL: &'static str = "binary input";
    const DEFAULT_STATIC_VARIATION: u8 = 2;
    const DEFAULT_EVENT_VARIATION: u8 = 2;

    type Value = bool;

    fn new(value: bool) -> Self {
        Self {
            value,
            reported: Reported::new(),
        }
    }

    fn value(&self) -> bool {
        self.value
    }

    fn set_value(&mut self, value: bool) {
        self.value = value;
    }

    fn event_value(&self) -> EventValue {
        EventValue::Binary(self.value)
    }

    fn detect_change(&mut self, flags: PointFlags) -> bool {
        self.reported.check(&self.value, flags, |a, b| a != b)
    }
}

/// Double-bit binary input (g3).
#[derive(Debug)]
pub struct DoubleBitInput {
    value: DoubleBit,
    reported: Reported<DoubleBit>,
}

impl PointKind for DoubleBitInput {
    const GROUP: ObjectGroup = ObjectGroup::DoubleBitInput;
    const LABEL: &'static str = "double-bit input";
    const DEFAULT_STATIC_VARIATION: u8 = 2;
    const DEFAULT_EVENT_VARIATION: u8 = 3;

    type Value = DoubleBit;

    fn new(value: DoubleBit) -> Self {
        Self {
            value,
            reported: Reported::new(),
        }
    }

    fn value(&self) -> DoubleBit {
        self.value
    }

    fn set_value(&mut self, value: DoubleBit) {
        self.value = value;
    }

    fn event_value(&self) -> EventValue {
        EventValue::DoubleBit(self.value)
    }

    fn detect_change(&mut self, flags: PointFlags) -> bool {
        self.reported.check(&self.value, flags, |a, b| a != b)
    }
}

/// Binary output status (g10), controlled through CROBs (g12).
#[derive(Debug)]
pub struct BinaryOutput {
    value: bool,
    pub(crate) control_mask: ControlMask,
    reported: Reported<bool>,
}

impl BinaryOutput {
    /// Control modes this output accepts.
    pub fn control_mask(&self) -> ControlMask {
        self.control_mask
    }
}

impl PointKind for BinaryOutput {
    const GROUP: ObjectGroup = ObjectGroup::BinaryOutput;
    const LABEL: &'static str = "binary output";
    const DEFAULT_STATIC_VARIATION: u8 = 2;
    const DEFAULT_EVENT_VARIATION: u8 = 2;

    type Value = bool;

    fn new(value: bool) -> Self {
        Self {
            value,
            control_mask: ControlMask::ALL,
            reported: Reported::new(),
        }
    }

    fn value(&self) -> bool {
        self.value
    }

    fn set_value(&mut self, value: bool) {
        self.value = value;
    }

    fn event_value(&self) -> EventValue {
        EventValue::Binary(self.value)
    }

    fn detect_change(&mut self, flags: PointFlags) -> bool {
        self.reported.check(&self.value, flags, |a, b| a != b)
    }
}

/// Counter (g20).
#[derive(Debug)]
pub struct Counter {
    value: u32,
    reported: Reported<u32>,
    pub(crate) freeze: FreezeState,
}

impl Counter {
    /// Freeze schedule of this counter.
    pub fn freeze_state(&self) -> &FreezeState {
        &self.freeze
    }
}

impl PointKind for Counter {
    const GROUP: ObjectGroup = ObjectGroup::Counter;
    const LABEL: &'static str = "counter";
    const DEFAULT_STATIC_VARIATION: u8 = 1;
    const DEFAULT_EVENT_VARIATION: u8 = 1;

    type Value = u32;

    fn new(value: u32) -> Self {
        Self {
            value,
            reported: Reported::new(),
            freeze: FreezeState::default(),
        }
    }

    fn value(&self) -> u32 {
        self.value
    }

    fn set_value(&mut self, value: u32) {
        self.value = value;
    }

    fn event_value(&self) -> EventValue {
        EventValue::Counter(self.value)
    }

    fn detect_change(&mut self, flags: PointFlags) -> bool {
        self.reported.check(&self.value, flags, |a, b| a != b)
    }
}

/// Frozen counter (g21), addressed by the same index as its counter.
#[derive(Debug)]
pub struct FrozenCounter {
    value: u32,
    pub(crate) changed: bool,
}

impl PointKind for FrozenCounter {
    const GROUP: ObjectGroup = ObjectGroup::FrozenCounter;
    const LABEL: &'static str = "frozen counter";
    const DEFAULT_STATIC_VARIATION: u8 = 1;
    const DEFAULT_EVENT_VARIATION: u8 = 1;

    type Value = u32;

    fn new(value: u32) -> Self {
        Self {
            value,
            changed: false,
        }
    }

    fn value(&self) -> u32 {
        self.value
    }

    fn set_value(&mut self, value: u32) {
        self.value = value;
    }

    fn event_value(&self) -> EventValue {
        EventValue::Counter(self.value)
    }

    fn detect_change(&mut self, _flags: PointFlags) -> bool {
        std::mem::take(&mut self.changed)
    }
}

/// Analog input (g30).
#[derive(Debug)]
pub struct AnalogInput {
    value: f64,
    deadband: f64,
    reported: Reported<f64>,
    pub(crate) freeze: FreezeState,
}

impl AnalogInput {
    /// Minimum change from the last reported value that counts as a change.
    pub fn deadband(&self) -> f64 {
        self.deadband
    }

    /// Value of the last reported change, the reference for deadband checks.
    pub fn last_reported(&self) -> Option<f64> {
        self.reported.value().copied()
    }

    /// Freeze schedule of this input.
    pub fn freeze_state(&self) -> &FreezeState {
        &self.freeze
    }
}

impl PointKind for AnalogInput {
    const GROUP: ObjectGroup = ObjectGroup::AnalogInput;
    const LABEL: &'static str = "analog input";
    const DEFAULT_STATIC_VARIATION: u8 = 1;
    const DEFAULT_EVENT_VARIATION: u8 = 1;

    type Value = f64;

    fn new(value: f64) -> Self {
        Self {
            value,
            deadband: 0.0,
            reported: Reported::new(),
            freeze: FreezeState::default(),
        }
    }

    fn value(&self) -> f64 {
        self.value
    }

    fn set_value(&mut self, value: f64) {
        self.value = value;
    }

    fn event_value(&self) -> EventValue {
        EventValue::Analog(self.value)
    }

    fn detect_change(&mut self, flags: PointFlags) -> bool {
        let deadband = self.deadband;
        self.reported
            .check(&self.value, flags, |last, current| {
                current != last && (current - last).abs() >= deadband
            })
    }
}

/// Frozen analog input (g31), addressed by the same index as its input.
#[derive(Debug)]
pub struct FrozenAnalogInput {
    value: f64,
    pub(crate) changed: bool,
}

impl PointKind for FrozenAnalogInput {
    const GROUP: ObjectGroup = ObjectGroup::FrozenAnalogInput;
    const LABEL: &'static str = "frozen analog input";
    const DEFAULT_STATIC_VARIATION: u8 = 1;
    const DEFAULT_EVENT_VARIATION: u8 = 1;

    type Value = f64;

    fn new(value: f64) -> Self {
        Self {
            value,
            changed: false,
        }
    }

    fn value(&self) -> f64 {
        self.value
    }

    fn set_value(&mut self, value: f64) {
        self.value = value;
    }

    fn event_value(&self) -> EventValue {
        EventValue::Analog(self.value)
    }

    fn detect_change(&mut self, _flags: PointFlags) -> bool {
        std::mem::take(&mut self.changed)
    }
}

/// Analog output status (g40), controlled through g41.
#[derive(Debug)]
pub struct AnalogOutput {
    value: f64,
    reported: Reported<f64>,
}

impl PointKind for AnalogOutput {
    const GROUP: ObjectGroup = ObjectGroup::AnalogOutput;
    const LABEL: &'static str = "analog output";
    const DEFAULT_STATIC_VARIATION: u8 = 1;
    const DEFAULT_EVENT_VARIATION: u8 = 1;

    type Value = f64;

    fn new(value: f64) -> Self {
        Self {
            value,
            reported: Reported::new(),
        }
    }

    fn value(&self) -> f64 {
        self.value
    }

    fn set_value(&mut self, value: f64) {
        self.value = value;
    }

    fn event_value(&self) -> EventValue {
        EventValue::Analog(self.value)
    }

    fn detect_change(&mut self, flags: PointFlags) -> bool {
        self.reported.check(&self.value, flags, |a, b| a != b)
    }
}

/// Octet string (g110).
#[derive(Debug)]
pub struct OctetString {
    value: Bytes,
    reported: Reported<Bytes>,
}

impl PointKind for OctetString {
    const GROUP: ObjectGroup = ObjectGroup::OctetString;
    const LABEL: &'static str = "octet string";
    const DEFAULT_STATIC_VARIATION: u8 = 0;
    const DEFAULT_EVENT_VARIATION: u8 = 0;

    type Value = Bytes;

    fn new(value: Bytes) -> Self {
        Self {
            value,
            reported: Reported::new(),
        }
    }

    fn value(&self) -> Bytes {
        self.value.clone()
    }

    fn set_value(&mut self, value: Bytes) {
        self.value = value;
    }

    fn event_value(&self) -> EventValue {
        EventValue::OctetString(self.value.clone())
    }

    fn detect_change(&mut self, flags: PointFlags) -> bool {
        self.reported.check(&self.value, flags, |a, b| a != b)
    }

    fn prepare(value: Bytes, ctx: &DbContext) -> Bytes {
        ctx.storage.store(&value)
    }
}

impl PointTable<OctetString> {
    /// Copy `data` into the string at `index` under the storage policy.
    pub fn write_bytes(&mut self, index: u16, data: &[u8]) -> Result<()> {
        self.write(index, Bytes::copy_from_slice(data))
    }
}

impl TwinnedTable<'_, AnalogInput> {
    /// Set the deadband from an internal value.
    pub fn set_deadband(&mut self, index: u16, deadband: f64) -> Result<()> {
        self.table.set_deadband(index, deadband)
    }

    /// Write a deadband received from the master (g34).
    pub fn write_deadband(&mut self, index: u16, wire: DeadbandValue) -> Result<()> {
        self.table.write_deadband(index, wire)
    }
}

impl PointTable<AnalogInput> {
    /// Set the deadband from an internal value.
    pub fn set_deadband(&mut self, index: u16, deadband: f64) -> Result<()> {
        let point = self.get_mut(index).ok_or(DbError::NotFound)?;
        point.data.deadband = deadband.max(0.0);
        self.context()
            .notifier()
            .update(ObjectGroup::AnalogInputDeadband, index);
        Ok(())
    }

    /// Write a deadband received from the master (g34).
    pub fn write_deadband(&mut self, index: u16, wire: DeadbandValue) -> Result<()> {
        let deadband = self.context().codec().decode_deadband(wire);
        self.set_deadband(index, deadband)
    }

    /// Deadband of an enabled point in the configured wire encoding.
    pub fn read_deadband(&self, index: u16) -> Option<Encoded<DeadbandValue>> {
        let point = self.get_enabled(index)?;
        Some(self.context().codec().encode_deadband(point.data.deadband))
    }

    /// Value of an enabled point in the configured wire encoding.
    ///
    /// The reported flags carry over-range if the value was clamped.
    pub fn read_encoded(&self, index: u16) -> Option<PointSnapshot<AnalogValue>> {
        let point = self.get_enabled(index)?;
        Some(encode_snapshot(self.context(), point.snapshot()))
    }
}

impl PointTable<FrozenAnalogInput> {
    /// Value of an enabled frozen point in the configured wire encoding.
    pub fn read_encoded(&self, index: u16) -> Option<PointSnapshot<AnalogValue>> {
        let point = self.get_enabled(index)?;
        Some(encode_snapshot(self.context(), point.snapshot()))
    }
}

impl PointTable<AnalogOutput> {
    /// Value of an enabled output in the configured wire encoding.
    pub fn read_encoded(&self, index: u16) -> Option<PointSnapshot<AnalogValue>> {
        let point = self.get_enabled(index)?;
        Some(encode_snapshot(self.context(), point.snapshot()))
    }
}

fn encode_snapshot(ctx: &DbContext, snapshot: PointSnapshot<f64>) -> PointSnapshot<AnalogValue> {
    let encoded = ctx.codec().encode(snapshot.value);
    let flags = if encoded.over_range {
        snapshot.flags.set_over_range(true)
    } else {
        snapshot.flags
    };
    PointSnapshot {
        index: snapshot.index,
        value: encoded.value,
        flags,
        timestamp: snapshot.timestamp,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::analog::{NumericMode, ValueCodec};
    use crate::notify::{Notifier, RecordingNotifier};
    use crate::point::PointConfig;
    use crate::session::FixedSession;
    use crate::types::{ClassMask, StoragePolicy, Timestamp};

    fn context(mode: NumericMode, storage: StoragePolicy) -> DbContext {
        DbContext::new(
            Notifier::new(Arc::new(RecordingNotifier::new())),
            Arc::new(FixedSession::new(Timestamp::EPOCH)),
            storage,
            ValueCodec::new(mode),
        )
    }

    #[test]
    fn test_double_bit_change() {
        let mut table: PointTable<DoubleBitInput> =
            PointTable::new(4, context(NumericMode::Double, StoragePolicy::default()));
        table.add(PointConfig::new(ClassMask::CLASS_1, PointFlags::Online), DoubleBit::Off).unwrap();
        assert!(table.changed(0).is_none());

        table.write(0, DoubleBit::On).unwrap();
        assert_eq!(table.changed(0).unwrap().value, DoubleBit::On);
    }

    #[test]
    fn test_counter_change_has_no_deadband() {
        let mut table: PointTable<Counter> =
            PointTable::new(4, context(NumericMode::Double, StoragePolicy::default()));
        table.add(PointConfig::default(), 100).unwrap();
        table.changed(0);

        table.write(0, 101).unwrap();
        assert_eq!(table.changed(0).unwrap().value, 101);
        table.write(0, 101).unwrap();
        assert!(table.changed(0).is_none());
    }

    #[test]
    fn test_analog_zero_deadband_any_difference() {
        let mut table: PointTable<AnalogInput> =
            PointTable::new(4, context(NumericMode::Double, StoragePolicy::default()));
        table.add(PointConfig::default(), 1.0).unwrap();

        table.write(0, 1.0).unwrap();
        assert!(table.changed(0).is_none());
        table.write(0, 1.000_001).unwrap();
        assert!(table.changed(0).is_some());
    }

    #[test]
    fn test_analog_read_encoded_sets_over_range() {
        let mut table: PointTable<AnalogInput> =
            PointTable::new(4, context(NumericMode::IntegerOnly, StoragePolicy::default()));
        table.add(PointConfig::new(ClassMask::CLASS_1, PointFlags::Online), 0.0).unwrap();
        table.write(0, 5.0e10).unwrap();

        let snapshot = table.read_encoded(0).unwrap();
        assert_eq!(snapshot.value, AnalogValue::Long(i32::MAX));
        assert!(snapshot.flags.over_range());
        assert!(snapshot.flags.online());
        // The stored flags are untouched
        assert!(!table.get(0).unwrap().flags().over_range());
    }

    #[test]
    fn test_deadband_write_and_read() {
        let mut table: PointTable<AnalogInput> =
            PointTable::new(4, context(NumericMode::Float, StoragePolicy::default()));
        table.add(PointConfig::default(), 0.0).unwrap();

        table.write_deadband(0, DeadbandValue::Float(2.5)).unwrap();
        assert_eq!(table.get(0).unwrap().data().deadband(), 2.5);
        assert_eq!(table.read_deadband(0).unwrap().value, DeadbandValue::Float(2.5));
        assert_eq!(table.write_deadband(3, DeadbandValue::Float(1.0)), Err(DbError::NotFound));
    }

    #[test]
    fn test_octet_string_fixed_storage() {
        let mut table: PointTable<OctetString> =
            PointTable::new(4, context(NumericMode::Double, StoragePolicy::Fixed { max_len: 3 }));
        table.add(PointConfig::default(), Bytes::from_static(b"hello")).unwrap();
        assert_eq!(&table.get(0).unwrap().value()[..], b"hel");

        table.write_bytes(0, b"ab").unwrap();
        assert_eq!(&table.read(0).unwrap().value[..], b"ab");
    }

    #[test]
    fn test_octet_string_dynamic_storage() {
        let mut table: PointTable<OctetString> =
            PointTable::new(4, context(NumericMode::Double, StoragePolicy::Dynamic));
        let long = vec![b'x'; 1024];
        table.add(PointConfig::default(), Bytes::new()).unwrap();
        table.write_bytes(0, &long).unwrap();
        assert_eq!(table.get(0).unwrap().value().len(), 1024);
    }

    #[test]
    fn test_frozen_changed_is_read_once() {
        let mut table: PointTable<FrozenCounter> =
            PointTable::new(4, context(NumericMode::Double, StoragePolicy::default()));
        table.add(PointConfig::default(), 0).unwrap();
        assert!(table.changed(0).is_none());

        table.get_mut(0).unwrap().data.changed = true;
        assert!(table.changed(0).is_some());
        assert!(table.changed(0).is_none());
    }
}
