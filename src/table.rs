//! Index-keyed, append-only point tables.
//!
//! Point counts are configured, not sparse: `add` only appends at index
//! `quantity()`, and `delete_last` only removes the highest index. Every
//! mutation stamps the point with the session time and notifies the
//! registered [`UpdateNotifier`](crate::notify::UpdateNotifier).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::analog::ValueCodec;
use crate::control::ControlStatus;
use crate::error::{DbError, Result};
use crate::notify::Notifier;
use crate::point::{Point, PointConfig, PointHeader, PointKind, PointSnapshot};
use crate::session::{ChangeEvent, Session};
use crate::types::{ClassMask, PointFlags, StoragePolicy, Timestamp};

/// Collaborators and policies shared by every table of one database.
#[derive(Clone)]
pub struct DbContext {
    pub(crate) notifier: Notifier,
    pub(crate) session: Arc<dyn Session>,
    pub(crate) storage: StoragePolicy,
    pub(crate) codec: ValueCodec,
    device_local: Arc<AtomicBool>,
}

impl DbContext {
    pub fn new(
        notifier: Notifier,
        session: Arc<dyn Session>,
        storage: StoragePolicy,
        codec: ValueCodec,
    ) -> Self {
        Self {
            notifier,
            session,
            storage,
            codec,
            device_local: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Current session time.
    #[inline]
    pub fn now(&self) -> Timestamp {
        self.session.date_time()
    }

    #[inline]
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    #[inline]
    pub fn codec(&self) -> ValueCodec {
        self.codec
    }

    #[inline]
    pub fn storage(&self) -> StoragePolicy {
        self.storage
    }

    /// Check if the whole device is in local control mode.
    #[inline]
    pub fn device_local_mode(&self) -> bool {
        self.device_local.load(Ordering::Relaxed)
    }

    /// Shared by every table built from clones of this context.
    pub(crate) fn set_device_local_mode(&self, local: bool) {
        self.device_local.store(local, Ordering::Relaxed);
    }

    /// Hand a change event to the session's event buffers.
    pub(crate) fn append_event(&self, event: ChangeEvent) {
        self.session.append_event(event);
    }
}

impl std::fmt::Debug for DbContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbContext")
            .field("storage", &self.storage)
            .field("codec", &self.codec)
            .finish()
    }
}

/// Ordered collection of points of one kind.
#[derive(Debug)]
pub struct PointTable<T: PointKind> {
    points: Vec<Point<T>>,
    capacity: usize,
    ctx: DbContext,
}

impl<T: PointKind> PointTable<T> {
    /// Create an empty table holding at most `capacity` points.
    ///
    /// Capacity is limited to `u16::MAX` so `quantity()` always fits.
    pub fn new(capacity: usize, ctx: DbContext) -> Self {
        Self {
            points: Vec::new(),
            capacity: capacity.min(u16::MAX as usize),
            ctx,
        }
    }

    /// Number of points; also the index the next `add` assigns.
    #[inline]
    pub fn quantity(&self) -> u16 {
        self.points.len() as u16
    }

    /// Maximum number of points.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[inline]
    pub(crate) fn context(&self) -> &DbContext {
        &self.ctx
    }

    /// Append a point at index `quantity()`.
    pub fn add(&mut self, config: PointConfig, value: T::Value) -> Result<u16> {
        if self.points.len() >= self.capacity {
            debug!(kind = T::LABEL, capacity = self.capacity, "table full");
            return Err(DbError::capacity(T::LABEL, self.capacity));
        }

        let index = self.points.len() as u16;
        let mut data = T::new(T::prepare(value, &self.ctx));
        // Prime change detection with the initial state
        data.detect_change(config.flags);

        let header = PointHeader::new::<T>(index, &config, self.ctx.now());
        self.points.push(Point { header, data });

        debug!(kind = T::LABEL, index, "point added");
        self.ctx.notifier.add(T::GROUP, index);
        Ok(index)
    }

    /// Remove the highest-indexed point. Returns false if the table is empty.
    pub fn delete_last(&mut self) -> bool {
        match self.points.pop() {
            Some(point) => {
                debug!(kind = T::LABEL, index = point.index(), "point deleted");
                self.ctx.notifier.delete(T::GROUP, point.index());
                true
            }
            None => false,
        }
    }

    /// Look up a point by index.
    #[inline]
    pub fn get(&self, index: u16) -> Option<&Point<T>> {
        self.points.get(index as usize)
    }

    /// Look up a point by index, treating disabled points as absent.
    #[inline]
    pub fn get_enabled(&self, index: u16) -> Option<&Point<T>> {
        self.get(index).filter(|p| p.enabled())
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, index: u16) -> Option<&mut Point<T>> {
        self.points.get_mut(index as usize)
    }

    /// Iterate over every point in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Point<T>> {
        self.points.iter()
    }

    /// Value, flags and time of an enabled point.
    pub fn read(&self, index: u16) -> Option<PointSnapshot<T::Value>> {
        self.get_enabled(index).map(Point::snapshot)
    }

    /// Snapshot of an enabled point if it changed since it was last reported.
    ///
    /// A reported change is consumed: a second call without an intervening
    /// change returns `None`.
    pub fn changed(&mut self, index: u16) -> Option<PointSnapshot<T::Value>> {
        let point = self.get_mut(index).filter(|p| p.header.enabled)?;
        if point.data.detect_change(point.header.flags) {
            Some(point.snapshot())
        } else {
            None
        }
    }

    /// Write a new value, stamped with the session time.
    pub fn write(&mut self, index: u16, value: T::Value) -> Result<()> {
        let now = self.ctx.now();
        self.write_at(index, value, now)
    }

    /// Write a new value with an explicit timestamp.
    pub fn write_at(&mut self, index: u16, value: T::Value, time: Timestamp) -> Result<()> {
        let value = T::prepare(value, &self.ctx);
        let point = self.get_mut(index).ok_or(DbError::NotFound)?;
        point.data.set_value(value);
        point.header.timestamp = time;
        self.ctx.notifier.update(T::GROUP, index);
        Ok(())
    }

    /// Replace the flags byte.
    pub fn set_flags(&mut self, index: u16, flags: PointFlags) -> Result<()> {
        let now = self.ctx.now();
        let point = self.get_mut(index).ok_or(DbError::NotFound)?;
        point.header.flags = flags;
        point.header.timestamp = now;
        self.ctx.notifier.update(T::GROUP, index);
        Ok(())
    }

    /// Enable or disable a point.
    pub fn set_enabled(&mut self, index: u16, enabled: bool) -> Result<()> {
        self.modify(index, |h| h.enabled = enabled)
    }

    /// Change event class membership.
    pub fn set_class_mask(&mut self, index: u16, class_mask: ClassMask) -> Result<()> {
        self.modify(index, |h| h.class_mask = class_mask)
    }

    /// Put a point into (or take it out of) local control mode.
    pub fn set_local_mode(&mut self, index: u16, local: bool) -> Result<()> {
        self.modify(index, |h| h.local_mode = local)
    }

    /// Force controls and freezes on this point to fail with `status`.
    pub fn set_test_failure(&mut self, index: u16, status: Option<ControlStatus>) -> Result<()> {
        let point = self.get_mut(index).ok_or(DbError::NotFound)?;
        point.header.test_failure = status;
        Ok(())
    }

    fn modify(&mut self, index: u16, f: impl FnOnce(&mut PointHeader)) -> Result<()> {
        let point = self.get_mut(index).ok_or(DbError::NotFound)?;
        f(&mut point.header);
        self.ctx.notifier.update(T::GROUP, index);
        Ok(())
    }

    /// Remove every point in descending index order, notifying each delete.
    pub fn destroy(&mut self) {
        while self.delete_last() {}
    }
}

/// Mutable access to a table whose points come and go with a twin table.
///
/// Counters and analog inputs are added and deleted together with their
/// frozen counterparts through [`Database`](crate::Database), so this view
/// allows value, flag and configuration updates but never `add` or
/// `delete_last`. Read-only methods are reached through `Deref`.
///
/// ```rust,compile_fail
/// # use std::sync::Arc;
/// # use voltage_dnp3::{Database, DatabaseConfig, PointConfig};
/// # use voltage_dnp3::notify::NoopNotifier;
/// # use voltage_dnp3::session::SystemSession;
/// # use voltage_dnp3::timer::ManualTimers;
/// let mut db = Database::new(
///     DatabaseConfig::new(),
///     Arc::new(NoopNotifier),
///     Arc::new(SystemSession),
///     Box::new(ManualTimers::new()),
/// );
/// db.analog_inputs_mut().add(PointConfig::default(), 0.0);
/// ```
pub struct TwinnedTable<'a, T: PointKind> {
    pub(crate) table: &'a mut PointTable<T>,
}

impl<'a, T: PointKind> TwinnedTable<'a, T> {
    pub(crate) fn new(table: &'a mut PointTable<T>) -> Self {
        Self { table }
    }

    /// See [`PointTable::changed`].
    pub fn changed(&mut self, index: u16) -> Option<PointSnapshot<T::Value>> {
        self.table.changed(index)
    }

    /// See [`PointTable::write`].
    pub fn write(&mut self, index: u16, value: T::Value) -> Result<()> {
        self.table.write(index, value)
    }

    /// See [`PointTable::write_at`].
    pub fn write_at(&mut self, index: u16, value: T::Value, time: Timestamp) -> Result<()> {
        self.table.write_at(index, value, time)
    }

    pub fn set_flags(&mut self, index: u16, flags: PointFlags) -> Result<()> {
        self.table.set_flags(index, flags)
    }

    pub fn set_enabled(&mut self, index: u16, enabled: bool) -> Result<()> {
        self.table.set_enabled(index, enabled)
    }

    pub fn set_class_mask(&mut self, index: u16, class_mask: ClassMask) -> Result<()> {
        self.table.set_class_mask(index, class_mask)
    }

    pub fn set_test_failure(&mut self, index: u16, status: Option<ControlStatus>) -> Result<()> {
        self.table.set_test_failure(index, status)
    }
}

impl<T: PointKind> std::ops::Deref for TwinnedTable<'_, T> {
    type Target = PointTable<T>;

    fn deref(&self) -> &PointTable<T> {
        self.table
    }
}

impl<T: PointKind> std::fmt::Debug for TwinnedTable<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwinnedTable")
            .field("kind", &T::LABEL)
            .field("quantity", &self.table.quantity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::{AnalogInput, BinaryInput};
    use crate::notify::{RecordingNotifier, UpdateKind};
    use crate::session::FixedSession;
    use crate::types::ObjectGroup;

    fn context(notifier: Arc<RecordingNotifier>, session: Arc<FixedSession>) -> DbContext {
        DbContext::new(
            Notifier::new(notifier),
            session,
            StoragePolicy::default(),
            ValueCodec::default(),
        )
    }

    fn binary_table(capacity: usize) -> (PointTable<BinaryInput>, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::new());
        let session = Arc::new(FixedSession::new(Timestamp::from_millis(1_000)));
        (PointTable::new(capacity, context(notifier.clone(), session)), notifier)
    }

    #[test]
    fn test_add_assigns_dense_indices() {
        let (mut table, notifier) = binary_table(10);
        for expected in 0..3u16 {
            let index = table.add(PointConfig::default(), false).unwrap();
            assert_eq!(index, expected);
        }
        assert_eq!(table.quantity(), 3);

        let updates = notifier.take();
        assert_eq!(updates.len(), 3);
        assert!(updates.iter().all(|u| u.kind == UpdateKind::Add && u.group == ObjectGroup::BinaryInput));
        assert_eq!(updates[2].index, 2);
    }

    #[test]
    fn test_add_capacity_exceeded() {
        let (mut table, _) = binary_table(2);
        table.add(PointConfig::default(), false).unwrap();
        table.add(PointConfig::default(), false).unwrap();
        assert_eq!(
            table.add(PointConfig::default(), false),
            Err(DbError::capacity("binary input", 2))
        );
        assert_eq!(table.quantity(), 2);
    }

    #[test]
    fn test_capacity_limited_to_u16_quantity() {
        let ctx = DbContext::new(
            Notifier::default(),
            Arc::new(FixedSession::new(Timestamp::EPOCH)),
            StoragePolicy::default(),
            ValueCodec::default(),
        );
        let mut table: PointTable<BinaryInput> = PointTable::new(70_000, ctx);
        assert_eq!(table.capacity(), u16::MAX as usize);

        for expected in 0..u16::MAX {
            assert_eq!(table.add(PointConfig::default(), false), Ok(expected));
        }
        assert_eq!(table.quantity(), u16::MAX);
        assert_eq!(
            table.add(PointConfig::default(), false),
            Err(DbError::capacity("binary input", u16::MAX as usize))
        );
        assert_eq!(table.quantity(), u16::MAX);
    }

    #[test]
    fn test_delete_last_stack_order() {
        let (mut table, notifier) = binary_table(10);
        for _ in 0..4 {
            table.add(PointConfig::default(), false).unwrap();
        }
        notifier.take();

        assert!(table.delete_last());
        assert!(table.delete_last());
        assert_eq!(table.quantity(), 2);
        assert!(table.get(1).is_some());
        assert!(table.get(2).is_none());

        let deleted: Vec<u16> = notifier.take().iter().map(|u| u.index).collect();
        assert_eq!(deleted, vec![3, 2]);
    }

    #[test]
    fn test_delete_from_empty_table() {
        let (mut table, notifier) = binary_table(10);
        assert!(!table.delete_last());
        assert_eq!(table.quantity(), 0);
        assert!(notifier.updates().is_empty());
    }

    #[test]
    fn test_get_enabled_filters_disabled() {
        let (mut table, _) = binary_table(10);
        table.add(PointConfig::default(), true).unwrap();
        table.add(PointConfig::default().disabled(), true).unwrap();

        assert!(table.get_enabled(0).is_some());
        assert!(table.get(1).is_some());
        assert!(table.get_enabled(1).is_none());
        assert!(table.read(1).is_none());
        assert!(table.get_enabled(7).is_none());
    }

    #[test]
    fn test_binary_input_scenario() {
        let (mut table, _) = binary_table(10);
        for _ in 0..3 {
            table
                .add(PointConfig::new(ClassMask::CLASS_1, PointFlags::Online), false)
                .unwrap();
        }
        assert_eq!(table.quantity(), 3);
        assert_eq!(table.get(2).unwrap().flags().as_raw(), 0x01);

        table.write(2, true).unwrap();
        let changed = table.changed(2).unwrap();
        assert!(changed.value);
        assert_eq!(changed.flags.as_raw(), 0x01);
        assert!(table.changed(2).is_none());

        assert!(table.delete_last());
        assert_eq!(table.quantity(), 2);
    }

    #[test]
    fn test_write_stamps_session_time() {
        let notifier = Arc::new(RecordingNotifier::new());
        let session = Arc::new(FixedSession::new(Timestamp::from_millis(1_000)));
        let mut table: PointTable<BinaryInput> =
            PointTable::new(4, context(notifier.clone(), session.clone()));
        table.add(PointConfig::default(), false).unwrap();
        assert_eq!(table.get(0).unwrap().timestamp().as_millis(), 1_000);

        session.set_time(Timestamp::from_millis(9_000));
        table.write(0, true).unwrap();
        assert_eq!(table.get(0).unwrap().timestamp().as_millis(), 9_000);
        assert_eq!(notifier.updates().last().unwrap().kind, UpdateKind::Update);
    }

    #[test]
    fn test_write_missing_point() {
        let (mut table, _) = binary_table(10);
        assert_eq!(table.write(0, true), Err(DbError::NotFound));
        assert_eq!(table.set_flags(0, PointFlags::Online), Err(DbError::NotFound));
    }

    #[test]
    fn test_flags_change_is_reported() {
        let (mut table, _) = binary_table(10);
        table.add(PointConfig::new(ClassMask::CLASS_1, PointFlags::Online), false).unwrap();
        assert!(table.changed(0).is_none());

        table.set_flags(0, PointFlags::Online.set_comm_lost(true)).unwrap();
        assert!(table.changed(0).is_some());
        assert!(table.changed(0).is_none());
    }

    #[test]
    fn test_analog_deadband_compares_last_reported() {
        let notifier = Arc::new(RecordingNotifier::new());
        let session = Arc::new(FixedSession::new(Timestamp::EPOCH));
        let mut table: PointTable<AnalogInput> = PointTable::new(4, context(notifier, session));
        table.add(PointConfig::new(ClassMask::CLASS_2, PointFlags::Online), 0.0).unwrap();
        table.set_deadband(0, 5.0).unwrap();

        table.write(0, 10.0).unwrap();
        assert!(table.changed(0).is_some());

        table.write(0, 12.0).unwrap();
        assert!(table.changed(0).is_none());
        assert_eq!(table.get(0).unwrap().data().last_reported(), Some(10.0));

        // 16 is 6 away from the last reported 10, not from the last written 12
        table.write(0, 16.0).unwrap();
        assert_eq!(table.changed(0).unwrap().value, 16.0);
    }

    #[test]
    fn test_destroy_descending() {
        let (mut table, notifier) = binary_table(10);
        for _ in 0..3 {
            table.add(PointConfig::default(), false).unwrap();
        }
        notifier.take();

        table.destroy();
        assert!(table.is_empty());
        let order: Vec<(UpdateKind, u16)> = notifier.take().iter().map(|u| (u.kind, u.index)).collect();
        assert_eq!(
            order,
            vec![(UpdateKind::Delete, 2), (UpdateKind::Delete, 1), (UpdateKind::Delete, 0)]
        );
    }

    #[test]
    fn test_size_matches_adds_minus_deletes() {
        let (mut table, _) = binary_table(64);
        let mut expected = 0u16;
        for round in 0..20u16 {
            if round % 3 == 2 {
                if table.delete_last() {
                    expected -= 1;
                }
            } else {
                table.add(PointConfig::default(), round % 2 == 0).unwrap();
                expected += 1;
            }
            assert_eq!(table.quantity(), expected);
            for i in 0..expected {
                assert_eq!(table.get(i).unwrap().index(), i);
            }
        }
    }
}
