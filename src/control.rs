//! Select/operate handling for binary and analog outputs.
//!
//! Controls are validated in a fixed order before anything is mutated:
//!
//! 1. the point must exist and be enabled (`NotSupported`)
//! 2. no test harness override (`TestInducedFailure`)
//! 3. the point is not in local mode (`LocalModeRejected`)
//! 4. the requested mode is in the point's capability mask (`NotSupported`)
//!
//! A successful operate that changes the value stamps the point, notifies,
//! and hands an output event to the session.

use tracing::{debug, warn};

use crate::error::{DbError, Result};
use crate::kinds::{AnalogOutput, BinaryOutput};
use crate::point::{Point, PointKind};
use crate::session::ChangeEvent;
use crate::table::{DbContext, PointTable};
use crate::types::{AnalogValue, ControlMask, ObjectGroup};

/// DNP3 control status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ControlStatus {
    Success = 0,
    Timeout = 1,
    NoSelect = 2,
    FormatError = 3,
    NotSupported = 4,
    AlreadyActive = 5,
    HardwareError = 6,
    Local = 7,
    TooManyOps = 8,
    NotAuthorized = 9,
    AutomationInhibit = 10,
    ProcessingLimited = 11,
    OutOfRange = 12,
    Undefined = 127,
}

impl ControlStatus {
    /// Create from raw byte value; unknown codes map to `Undefined`.
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Success,
            1 => Self::Timeout,
            2 => Self::NoSelect,
            3 => Self::FormatError,
            4 => Self::NotSupported,
            5 => Self::AlreadyActive,
            6 => Self::HardwareError,
            7 => Self::Local,
            8 => Self::TooManyOps,
            9 => Self::NotAuthorized,
            10 => Self::AutomationInhibit,
            11 => Self::ProcessingLimited,
            12 => Self::OutOfRange,
            _ => Self::Undefined,
        }
    }

    /// Convert to raw byte value.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// CROB operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpType {
    Nul,
    PulseOn,
    PulseOff,
    LatchOn,
    LatchOff,
}

/// CROB trip/close code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TripClose {
    Nul,
    Close,
    Trip,
}

/// Control relay output block (g12v1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crob {
    pub op: OpType,
    pub trip_close: TripClose,
    pub count: u8,
    pub on_time_ms: u32,
    pub off_time_ms: u32,
}

impl Crob {
    /// Single latch on or off.
    pub const fn latch(on: bool) -> Self {
        Self {
            op: if on { OpType::LatchOn } else { OpType::LatchOff },
            trip_close: TripClose::Nul,
            count: 1,
            on_time_ms: 0,
            off_time_ms: 0,
        }
    }

    /// Single pulse on or off.
    pub const fn pulse(on: bool, on_time_ms: u32) -> Self {
        Self {
            op: if on { OpType::PulseOn } else { OpType::PulseOff },
            trip_close: TripClose::Nul,
            count: 1,
            on_time_ms,
            off_time_ms: 0,
        }
    }

    /// Paired close or trip.
    pub const fn trip_close(close: bool) -> Self {
        Self {
            op: OpType::PulseOn,
            trip_close: if close { TripClose::Close } else { TripClose::Trip },
            count: 1,
            on_time_ms: 0,
            off_time_ms: 0,
        }
    }

    /// Control modes this CROB needs.
    pub fn required_mask(&self) -> ControlMask {
        match self.trip_close {
            TripClose::Close => return ControlMask::CLOSE,
            TripClose::Trip => return ControlMask::TRIP,
            TripClose::Nul => {}
        }
        match self.op {
            OpType::Nul => ControlMask::NONE,
            OpType::PulseOn => ControlMask::PULSE_ON,
            OpType::PulseOff => ControlMask::PULSE_OFF,
            OpType::LatchOn => ControlMask::LATCH_ON,
            OpType::LatchOff => ControlMask::LATCH_OFF,
        }
    }

    /// Output state after the control, `None` for a no-op.
    pub fn target_state(&self) -> Option<bool> {
        if self.count == 0 {
            return None;
        }
        match self.trip_close {
            TripClose::Close => return Some(true),
            TripClose::Trip => return Some(false),
            TripClose::Nul => {}
        }
        match self.op {
            OpType::Nul => None,
            OpType::PulseOn | OpType::LatchOn => Some(true),
            OpType::PulseOff | OpType::LatchOff => Some(false),
        }
    }
}

/// Common pre-control checks on an output point.
fn validate<'a, T: PointKind>(point: Option<&'a Point<T>>, ctx: &DbContext) -> Result<&'a Point<T>> {
    let point = point.filter(|p| p.enabled()).ok_or(DbError::NotSupported)?;
    if let Some(status) = point.header().test_failure {
        return Err(DbError::TestInducedFailure(status));
    }
    if point.header().local_mode || ctx.device_local_mode() {
        return Err(DbError::LocalModeRejected);
    }
    Ok(point)
}

fn log_rejection(group: ObjectGroup, index: u16, err: DbError) -> DbError {
    warn!(%group, index, error = %err, "control rejected");
    err
}

impl PointTable<BinaryOutput> {
    /// Restrict the control modes an output accepts.
    pub fn set_control_mask(&mut self, index: u16, mask: ControlMask) -> Result<()> {
        let point = self.get_mut(index).ok_or(DbError::NotFound)?;
        point.data.control_mask = mask;
        Ok(())
    }

    /// Validate a CROB without acting on it.
    pub fn select(&self, index: u16, crob: &Crob) -> Result<()> {
        self.check_crob(index, crob)
            .map_err(|e| log_rejection(ObjectGroup::BinaryCommand, index, e))
    }

    /// Validate and execute a CROB.
    pub fn operate(&mut self, index: u16, crob: &Crob) -> Result<()> {
        self.check_crob(index, crob)
            .map_err(|e| log_rejection(ObjectGroup::BinaryCommand, index, e))?;

        let Some(state) = crob.target_state() else {
            return Ok(());
        };
        debug!(index, state, "binary output operate");
        self.apply_output(index, state)
    }

    fn check_crob(&self, index: u16, crob: &Crob) -> Result<()> {
        let point = validate(self.get(index), self.context())?;
        if !point.data().control_mask().contains(crob.required_mask()) {
            return Err(DbError::NotSupported);
        }
        Ok(())
    }
}

impl PointTable<AnalogOutput> {
    /// Validate an analog output command without acting on it.
    ///
    /// The value itself is only decoded at operate time.
    pub fn select(&self, index: u16, _value: AnalogValue) -> Result<()> {
        validate(self.get(index), self.context())
            .map(|_| ())
            .map_err(|e| log_rejection(ObjectGroup::AnalogCommand, index, e))
    }

    /// Validate and execute an analog output command.
    pub fn operate(&mut self, index: u16, value: AnalogValue) -> Result<()> {
        validate(self.get(index), self.context())
            .map(|_| ())
            .map_err(|e| log_rejection(ObjectGroup::AnalogCommand, index, e))?;

        let value = self.context().codec().decode(value);
        debug!(index, value, "analog output operate");
        self.apply_output(index, value)
    }
}

impl<T: PointKind> PointTable<T> {
    /// Set an output value from a control and report the change to the session.
    fn apply_output(&mut self, index: u16, value: T::Value) -> Result<()> {
        let before = self.get(index).ok_or(DbError::NotFound)?.value();
        self.write(index, value.clone())?;
        if before == value {
            return Ok(());
        }

        let point = self.get(index).ok_or(DbError::NotFound)?;
        let header = point.header();
        if let (Some(group), false) = (T::GROUP.event_group(), header.class_mask.is_empty()) {
            self.context().append_event(ChangeEvent {
                group,
                index,
                class_mask: header.class_mask,
                value: point.data().event_value(),
                flags: header.flags,
                time: header.timestamp,
            });
        }
        Ok(())
    }
}
