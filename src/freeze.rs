//! Counter and analog input freezes.
//!
//! A freeze copies the live value into the twin frozen point at the same
//! index, stamps it with the session time and marks it changed. Freezes run
//! on demand or from a per-point timer armed through a [`TimerChannel`].

use std::time::Duration;

use tracing::{debug, trace};

use crate::error::{DbError, Result};
use crate::kinds::{AnalogInput, Counter, FrozenAnalogInput, FrozenCounter};
use crate::point::PointKind;
use crate::table::PointTable;
use crate::timer::{FreezeTarget, TimerChannel, TimerId};
use crate::types::Timestamp;

/// Longest delay a freeze timer can be armed for (0xFFFF seconds).
pub const MAX_TIMER_DELAY_MS: u64 = 65_535_000;

/// When a scheduled freeze first fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreezeTime {
    /// Cancel any scheduled freeze
    Cancel,
    /// Align to multiples of the interval past the top of the hour
    Zero,
    /// Fire at an absolute time; a time in the past fires immediately
    Absolute(Timestamp),
}

/// Freeze schedule carried by freezable points.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreezeState {
    pub(crate) timer: Option<TimerId>,
    pub(crate) interval_ms: u64,
    pub(crate) clear_after: bool,
}

impl FreezeState {
    /// Check if a freeze timer is armed.
    #[inline]
    pub fn is_scheduled(&self) -> bool {
        self.timer.is_some()
    }

    /// Repeat interval, zero for a one-shot freeze.
    #[inline]
    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Whether the live value is reset after each freeze.
    #[inline]
    pub fn clear_after(&self) -> bool {
        self.clear_after
    }
}

/// Delay in milliseconds until the first freeze, `None` for [`FreezeTime::Cancel`].
pub fn compute_delay(now: Timestamp, time: FreezeTime, interval_ms: u64) -> Result<Option<u64>> {
    let delay = match time {
        FreezeTime::Cancel => return Ok(None),
        FreezeTime::Zero if interval_ms == 0 => 0,
        FreezeTime::Zero => {
            let into_hour = now.millis_into_hour();
            let next = (into_hour / interval_ms + 1) * interval_ms;
            next - into_hour
        }
        FreezeTime::Absolute(at) => at.saturating_since(now),
    };

    if delay > MAX_TIMER_DELAY_MS {
        return Err(DbError::InvalidInterval { delay_ms: delay });
    }
    if interval_ms > MAX_TIMER_DELAY_MS {
        return Err(DbError::InvalidInterval { delay_ms: interval_ms });
    }
    Ok(Some(delay))
}

/// Frozen twin of a freezable point kind.
pub trait FrozenKind: PointKind {
    /// Mark the point changed so the next change scan reports it.
    fn mark_frozen(&mut self);
}

impl FrozenKind for FrozenCounter {
    fn mark_frozen(&mut self) {
        self.changed = true;
    }
}

impl FrozenKind for FrozenAnalogInput {
    fn mark_frozen(&mut self) {
        self.changed = true;
    }
}

/// Point kind with a frozen twin.
pub trait Freezable: PointKind {
    type Frozen: FrozenKind<Value = Self::Value>;

    /// Whether a disabled frozen twin blocks the freeze.
    const REQUIRE_ENABLED_FROZEN: bool;

    /// Value the live point is reset to by freeze-and-clear.
    const CLEARED: Self::Value;

    fn target(index: u16) -> FreezeTarget;

    fn freeze_state_mut(&mut self) -> &mut FreezeState;
}

impl Freezable for Counter {
    type Frozen = FrozenCounter;
    const REQUIRE_ENABLED_FROZEN: bool = false;
    const CLEARED: u32 = 0;

    fn target(index: u16) -> FreezeTarget {
        FreezeTarget::Counter(index)
    }

    fn freeze_state_mut(&mut self) -> &mut FreezeState {
        &mut self.freeze
    }
}

impl Freezable for AnalogInput {
    type Frozen = FrozenAnalogInput;
    const REQUIRE_ENABLED_FROZEN: bool = true;
    const CLEARED: f64 = 0.0;

    fn target(index: u16) -> FreezeTarget {
        FreezeTarget::AnalogInput(index)
    }

    fn freeze_state_mut(&mut self) -> &mut FreezeState {
        &mut self.freeze
    }
}

/// Freeze the point at `index` into its frozen twin.
///
/// Returns false without touching either point when the live point is
/// missing, when either point has a test failure set, or when the frozen
/// twin is missing (or disabled, for analog inputs).
pub fn freeze<T: Freezable>(
    live: &mut PointTable<T>,
    frozen: &mut PointTable<T::Frozen>,
    index: u16,
    clear_after: bool,
) -> bool {
    let now = live.context().now();

    let Some(source) = live.get(index) else {
        return false;
    };
    if source.header.test_failure.is_some() {
        debug!(kind = T::LABEL, index, "freeze skipped: test failure");
        return false;
    }
    let value = source.value();
    let flags = source.flags();

    let Some(target) = frozen.get_mut(index) else {
        return false;
    };
    if target.header.test_failure.is_some() {
        debug!(kind = T::Frozen::LABEL, index, "freeze skipped: test failure");
        return false;
    }
    if T::REQUIRE_ENABLED_FROZEN && !target.header.enabled {
        return false;
    }

    target.data.set_value(value);
    target.data.mark_frozen();
    target.header.flags = flags;
    target.header.timestamp = now;
    frozen.context().notifier().update(T::Frozen::GROUP, index);

    if clear_after {
        if let Some(source) = live.get_mut(index) {
            source.data.set_value(T::CLEARED);
            source.header.timestamp = now;
        }
        live.context().notifier().update(T::GROUP, index);
    }

    trace!(kind = T::LABEL, index, clear_after, "frozen");
    true
}

/// Arms, re-arms and cancels per-point freeze timers.
pub struct FreezeScheduler {
    timers: Box<dyn TimerChannel>,
}

impl FreezeScheduler {
    pub fn new(timers: Box<dyn TimerChannel>) -> Self {
        Self { timers }
    }

    /// Schedule (or with [`FreezeTime::Cancel`], cancel) freezes of one point.
    ///
    /// A zero delay freezes at once; the timer is then armed only for a
    /// nonzero repeat interval. Returns the delay until the first timed
    /// freeze, or `None` if no timer is armed.
    pub fn schedule<T: Freezable>(
        &mut self,
        live: &mut PointTable<T>,
        frozen: &mut PointTable<T::Frozen>,
        index: u16,
        time: FreezeTime,
        interval_ms: u64,
        clear_after: bool,
    ) -> Result<Option<Duration>> {
        let now = live.context().now();
        let point = live.get_mut(index).ok_or(DbError::NotFound)?;
        let delay = compute_delay(now, time, interval_ms)?;

        let state = point.data.freeze_state_mut();
        if let Some(id) = state.timer.take() {
            self.timers.cancel(id);
        }
        *state = FreezeState::default();

        let Some(delay) = delay else {
            debug!(kind = T::LABEL, index, "freeze cancelled");
            return Ok(None);
        };

        let first = if delay == 0 {
            freeze(live, frozen, index, clear_after);
            if interval_ms == 0 {
                return Ok(None);
            }
            interval_ms
        } else {
            delay
        };

        let id = self.timers.arm(Duration::from_millis(first), T::target(index));
        if let Some(point) = live.get_mut(index) {
            *point.data.freeze_state_mut() = FreezeState {
                timer: Some(id),
                interval_ms,
                clear_after,
            };
        }
        debug!(kind = T::LABEL, index, delay_ms = first, interval_ms, "freeze scheduled");
        Ok(Some(Duration::from_millis(first)))
    }

    /// Cancel the scheduled freeze of one point.
    pub fn cancel<T: Freezable>(&mut self, live: &mut PointTable<T>, index: u16) -> Result<()> {
        let point = live.get_mut(index).ok_or(DbError::NotFound)?;
        let state = point.data.freeze_state_mut();
        if let Some(id) = state.timer.take() {
            self.timers.cancel(id);
        }
        *state = FreezeState::default();
        Ok(())
    }

    /// Cancel every scheduled freeze in a table.
    pub fn cancel_all<T: Freezable>(&mut self, live: &mut PointTable<T>) {
        for index in 0..live.quantity() {
            // Every index below quantity exists
            let _ = self.cancel(live, index);
        }
    }

    /// Handle an expired timer for the point at `index`.
    ///
    /// Stale timers (cancelled or replaced since they were armed) are
    /// ignored. A nonzero interval re-arms the timer before freezing.
    pub fn on_timer<T: Freezable>(
        &mut self,
        live: &mut PointTable<T>,
        frozen: &mut PointTable<T::Frozen>,
        index: u16,
        id: TimerId,
    ) -> bool {
        let Some(point) = live.get_mut(index) else {
            return false;
        };
        let state = point.data.freeze_state_mut();
        if state.timer != Some(id) {
            trace!(kind = T::LABEL, index, id = id.as_u64(), "stale freeze timer");
            return false;
        }

        let clear_after = state.clear_after;
        if state.interval_ms > 0 {
            let interval = Duration::from_millis(state.interval_ms);
            state.timer = Some(self.timers.arm(interval, T::target(index)));
        } else {
            *state = FreezeState::default();
        }

        freeze(live, frozen, index, clear_after)
    }
}

impl std::fmt::Debug for FreezeScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FreezeScheduler").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::analog::ValueCodec;
    use crate::control::ControlStatus;
    use crate::notify::{Notifier, RecordingNotifier, UpdateKind};
    use crate::point::PointConfig;
    use crate::session::FixedSession;
    use crate::table::DbContext;
    use crate::timer::ManualTimers;
    use crate::types::{ObjectGroup, StoragePolicy, MILLIS_PER_HOUR};

    const HOUR: u64 = 1_718_452_800_000;

    struct Fixture {
        session: Arc<FixedSession>,
        notifier: Arc<RecordingNotifier>,
        counters: PointTable<Counter>,
        frozen: PointTable<FrozenCounter>,
        timers: ManualTimers,
        scheduler: FreezeScheduler,
    }

    fn fixture(points: u16) -> Fixture {
        let session = Arc::new(FixedSession::new(Timestamp::from_millis(HOUR)));
        let notifier = Arc::new(RecordingNotifier::new());
        let ctx = DbContext::new(
            Notifier::new(notifier.clone()),
            session.clone(),
            StoragePolicy::default(),
            ValueCodec::default(),
        );
        let mut counters = PointTable::new(8, ctx.clone());
        let mut frozen = PointTable::new(8, ctx);
        for _ in 0..points {
            counters.add(PointConfig::default(), 0).unwrap();
            frozen.add(PointConfig::default(), 0).unwrap();
        }
        notifier.take();
        let timers = ManualTimers::new();
        let scheduler = FreezeScheduler::new(Box::new(timers.clone()));
        Fixture {
            session,
            notifier,
            counters,
            frozen,
            timers,
            scheduler,
        }
    }

    // ===== Delay computation =====

    #[test]
    fn test_zero_mode_aligns_to_interval() {
        // 10 minutes past the hour, 15 minute interval: next is :15
        let now = Timestamp::from_millis(HOUR + 600_000);
        assert_eq!(compute_delay(now, FreezeTime::Zero, 900_000), Ok(Some(300_000)));

        // Exactly on a boundary: the next one, strictly in the future
        let now = Timestamp::from_millis(HOUR + 900_000);
        assert_eq!(compute_delay(now, FreezeTime::Zero, 900_000), Ok(Some(900_000)));
    }

    #[test]
    fn test_zero_mode_lands_on_multiple() {
        let interval = 7 * 60_000;
        for offset in [0u64, 1, 59_999, 419_999, 420_000, 3_599_999] {
            let now = Timestamp::from_millis(HOUR + offset);
            let delay = compute_delay(now, FreezeTime::Zero, interval).unwrap().unwrap();
            assert!(delay > 0);
            let fire = now.as_millis() + delay;
            assert_eq!((fire - HOUR) % interval, 0);
            assert!(delay <= interval);
        }
    }

    #[test]
    fn test_zero_mode_zero_interval_is_immediate() {
        let now = Timestamp::from_millis(HOUR + 1_234);
        assert_eq!(compute_delay(now, FreezeTime::Zero, 0), Ok(Some(0)));
    }

    #[test]
    fn test_absolute_time() {
        let now = Timestamp::from_millis(HOUR);
        let at = Timestamp::from_millis(HOUR + 5_000);
        assert_eq!(compute_delay(now, FreezeTime::Absolute(at), 0), Ok(Some(5_000)));

        let past = Timestamp::from_millis(HOUR - 5_000);
        assert_eq!(compute_delay(now, FreezeTime::Absolute(past), 0), Ok(Some(0)));
    }

    #[test]
    fn test_delay_limits() {
        let now = Timestamp::from_millis(HOUR);
        let edge = Timestamp::from_millis(HOUR + MAX_TIMER_DELAY_MS);
        assert_eq!(
            compute_delay(now, FreezeTime::Absolute(edge), 0),
            Ok(Some(MAX_TIMER_DELAY_MS))
        );

        let beyond = Timestamp::from_millis(HOUR + MAX_TIMER_DELAY_MS + 1);
        assert_eq!(
            compute_delay(now, FreezeTime::Absolute(beyond), 0),
            Err(DbError::InvalidInterval { delay_ms: MAX_TIMER_DELAY_MS + 1 })
        );

        assert!(compute_delay(now, FreezeTime::Zero, 20 * MILLIS_PER_HOUR).is_err());
        assert_eq!(compute_delay(now, FreezeTime::Cancel, 20 * MILLIS_PER_HOUR), Ok(None));
    }

    // ===== Freeze =====

    #[test]
    fn test_freeze_copies_value_and_time() {
        let mut f = fixture(2);
        f.counters.write(1, 42).unwrap();
        f.session.set_time(Timestamp::from_millis(HOUR + 77));

        assert!(freeze(&mut f.counters, &mut f.frozen, 1, false));
        let frozen = f.frozen.get(1).unwrap();
        assert_eq!(frozen.value(), 42);
        assert_eq!(frozen.timestamp().as_millis(), HOUR + 77);
        assert_eq!(f.counters.get(1).unwrap().value(), 42);
        assert!(f.frozen.changed(1).is_some());
        assert!(f.frozen.changed(1).is_none());

        let updates = f.notifier.take();
        assert!(updates.contains(&crate::notify::PointUpdate::new(
            UpdateKind::Update,
            ObjectGroup::FrozenCounter,
            1
        )));
    }

    #[test]
    fn test_freeze_and_clear() {
        let mut f = fixture(1);
        f.counters.write(0, 500).unwrap();

        assert!(freeze(&mut f.counters, &mut f.frozen, 0, true));
        assert_eq!(f.frozen.get(0).unwrap().value(), 500);
        assert_eq!(f.counters.get(0).unwrap().value(), 0);
    }

    #[test]
    fn test_freeze_blocked_by_test_failure() {
        let mut f = fixture(1);
        f.counters.write(0, 9).unwrap();
        f.frozen
            .set_test_failure(0, Some(ControlStatus::HardwareError))
            .unwrap();

        assert!(!freeze(&mut f.counters, &mut f.frozen, 0, true));
        assert_eq!(f.frozen.get(0).unwrap().value(), 0);
        assert_eq!(f.counters.get(0).unwrap().value(), 9);
    }

    #[test]
    fn test_freeze_missing_point() {
        let mut f = fixture(1);
        assert!(!freeze(&mut f.counters, &mut f.frozen, 5, false));
    }

    #[test]
    fn test_analog_freeze_requires_enabled_twin() {
        let session = Arc::new(FixedSession::new(Timestamp::from_millis(HOUR)));
        let ctx = DbContext::new(
            Notifier::default(),
            session,
            StoragePolicy::default(),
            ValueCodec::default(),
        );
        let mut inputs: PointTable<AnalogInput> = PointTable::new(4, ctx.clone());
        let mut frozen: PointTable<FrozenAnalogInput> = PointTable::new(4, ctx);
        inputs.add(PointConfig::default(), 3.5).unwrap();
        frozen.add(PointConfig::default().disabled(), 0.0).unwrap();

        assert!(!freeze(&mut inputs, &mut frozen, 0, false));
        frozen.set_enabled(0, true).unwrap();
        assert!(freeze(&mut inputs, &mut frozen, 0, false));
        assert_eq!(frozen.get(0).unwrap().value(), 3.5);
    }

    // ===== Scheduling =====

    #[test]
    fn test_schedule_arms_timer() {
        let mut f = fixture(1);
        f.session.set_time(Timestamp::from_millis(HOUR + 600_000));

        let delay = f
            .scheduler
            .schedule(&mut f.counters, &mut f.frozen, 0, FreezeTime::Zero, 900_000, false)
            .unwrap();
        assert_eq!(delay, Some(Duration::from_millis(300_000)));
        assert!(f.counters.get(0).unwrap().data().freeze_state().is_scheduled());
        assert_eq!(
            f.timers.armed_for(FreezeTarget::Counter(0)).unwrap().delay,
            Duration::from_millis(300_000)
        );
    }

    #[test]
    fn test_schedule_zero_time_zero_interval_freezes_now() {
        let mut f = fixture(1);
        f.counters.write(0, 12).unwrap();

        let delay = f
            .scheduler
            .schedule(&mut f.counters, &mut f.frozen, 0, FreezeTime::Zero, 0, false)
            .unwrap();
        assert_eq!(delay, None);
        assert_eq!(f.frozen.get(0).unwrap().value(), 12);
        assert!(f.timers.armed().is_empty());
    }

    #[test]
    fn test_schedule_absolute_now_freezes_once() {
        let mut f = fixture(1);
        f.session.set_time(Timestamp::from_millis(HOUR + 5_000));
        f.counters.write(0, 21).unwrap();

        let now = Timestamp::from_millis(HOUR + 5_000);
        let delay = f
            .scheduler
            .schedule(&mut f.counters, &mut f.frozen, 0, FreezeTime::Absolute(now), 0, false)
            .unwrap();
        assert_eq!(delay, None);
        let frozen = f.frozen.get(0).unwrap();
        assert_eq!(frozen.value(), 21);
        assert_eq!(frozen.timestamp(), now);
        assert!(f.timers.armed().is_empty());
        assert!(!f.counters.get(0).unwrap().data().freeze_state().is_scheduled());
    }

    #[test]
    fn test_schedule_past_absolute_freezes_then_arms_interval() {
        let mut f = fixture(1);
        f.session.set_time(Timestamp::from_millis(HOUR + 10_000));
        f.counters.write(0, 33).unwrap();

        let past = Timestamp::from_millis(HOUR + 2_000);
        let delay = f
            .scheduler
            .schedule(&mut f.counters, &mut f.frozen, 0, FreezeTime::Absolute(past), 30_000, true)
            .unwrap();
        assert_eq!(delay, Some(Duration::from_millis(30_000)));
        assert_eq!(f.frozen.get(0).unwrap().value(), 33);
        assert_eq!(f.counters.get(0).unwrap().value(), 0);

        let armed = f.timers.armed_for(FreezeTarget::Counter(0)).unwrap();
        assert_eq!(armed.delay, Duration::from_millis(30_000));
        let state = f.counters.get(0).unwrap().data().freeze_state().clone();
        assert!(state.is_scheduled());
        assert_eq!(state.interval_ms(), 30_000);
        assert!(state.clear_after());
    }

    #[test]
    fn test_timer_rearms_with_interval() {
        let mut f = fixture(1);
        let at = Timestamp::from_millis(HOUR + 1_000);
        f.scheduler
            .schedule(&mut f.counters, &mut f.frozen, 0, FreezeTime::Absolute(at), 60_000, true)
            .unwrap();

        f.counters.write(0, 7).unwrap();
        let fired = f.timers.fire_all();
        assert_eq!(fired.len(), 1);
        assert!(f.scheduler.on_timer(&mut f.counters, &mut f.frozen, 0, fired[0].id));
        assert_eq!(f.frozen.get(0).unwrap().value(), 7);
        assert_eq!(f.counters.get(0).unwrap().value(), 0);

        let rearmed = f.timers.armed_for(FreezeTarget::Counter(0)).unwrap();
        assert_eq!(rearmed.delay, Duration::from_millis(60_000));
        assert_ne!(rearmed.id, fired[0].id);
    }

    #[test]
    fn test_stale_timer_ignored() {
        let mut f = fixture(1);
        let at = Timestamp::from_millis(HOUR + 1_000);
        f.scheduler
            .schedule(&mut f.counters, &mut f.frozen, 0, FreezeTime::Absolute(at), 0, false)
            .unwrap();
        let first = f.timers.armed()[0].id;

        // Rescheduling replaces the timer
        f.scheduler
            .schedule(&mut f.counters, &mut f.frozen, 0, FreezeTime::Absolute(at), 0, false)
            .unwrap();
        assert_eq!(f.timers.armed().len(), 1);
        assert!(!f.scheduler.on_timer(&mut f.counters, &mut f.frozen, 0, first));

        f.scheduler.cancel(&mut f.counters, 0).unwrap();
        assert!(f.timers.armed().is_empty());
        assert!(!f.counters.get(0).unwrap().data().freeze_state().is_scheduled());
    }

    #[test]
    fn test_schedule_rejects_long_delay() {
        let mut f = fixture(1);
        let far = Timestamp::from_millis(HOUR + 19 * MILLIS_PER_HOUR);
        let result = f
            .scheduler
            .schedule(&mut f.counters, &mut f.frozen, 0, FreezeTime::Absolute(far), 0, false);
        assert!(matches!(result, Err(DbError::InvalidInterval { .. })));
        assert!(f.timers.armed().is_empty());
    }

    #[test]
    fn test_schedule_cancel_time() {
        let mut f = fixture(1);
        f.scheduler
            .schedule(&mut f.counters, &mut f.frozen, 0, FreezeTime::Zero, 60_000, false)
            .unwrap();
        assert_eq!(f.timers.armed().len(), 1);

        let delay = f
            .scheduler
            .schedule(&mut f.counters, &mut f.frozen, 0, FreezeTime::Cancel, 0, false)
            .unwrap();
        assert_eq!(delay, None);
        assert!(f.timers.armed().is_empty());
    }
}
