//! DNP3 object group identification.
//!
//! Object groups identify the kind of point a notification or event refers to.

use crate::error::{DbError, Result};

/// DNP3 object group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ObjectGroup {
    // ============================================
    // Static data
    // ============================================
    /// Device attributes (g0)
    DeviceAttributes = 0,

    /// Binary input (g1)
    BinaryInput = 1,

    /// Double-bit binary input (g3)
    DoubleBitInput = 3,

    /// Binary output status (g10)
    BinaryOutput = 10,

    /// Counter (g20)
    Counter = 20,

    /// Frozen counter (g21)
    FrozenCounter = 21,

    /// Analog input (g30)
    AnalogInput = 30,

    /// Frozen analog input (g31)
    FrozenAnalogInput = 31,

    /// Analog input deadband (g34)
    AnalogInputDeadband = 34,

    /// Analog output status (g40)
    AnalogOutput = 40,

    /// Octet string (g110)
    OctetString = 110,

    // ============================================
    // Events
    // ============================================
    /// Binary input event (g2)
    BinaryInputEvent = 2,

    /// Double-bit binary input event (g4)
    DoubleBitInputEvent = 4,

    /// Binary output event (g11)
    BinaryOutputEvent = 11,

    /// Counter event (g22)
    CounterEvent = 22,

    /// Frozen counter event (g23)
    FrozenCounterEvent = 23,

    /// Analog input event (g32)
    AnalogInputEvent = 32,

    /// Frozen analog input event (g33)
    FrozenAnalogInputEvent = 33,

    /// Analog output event (g42)
    AnalogOutputEvent = 42,

    /// Octet string event (g111)
    OctetStringEvent = 111,

    // ============================================
    // Controls
    // ============================================
    /// Control relay output block (g12)
    BinaryCommand = 12,

    /// Analog output command (g41)
    AnalogCommand = 41,

    // ============================================
    // Datasets
    // ============================================
    /// Dataset prototype (g85)
    DatasetPrototype = 85,

    /// Dataset descriptor (g86)
    DatasetDescriptor = 86,

    /// Dataset present value (g87)
    DatasetPresentValue = 87,

    /// Dataset event (g88)
    DatasetEvent = 88,

    // ============================================
    // Secure authentication
    // ============================================
    /// Authentication (g120)
    Authentication = 120,
}

impl ObjectGroup {
    /// Create ObjectGroup from raw byte value.
    #[inline]
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::DeviceAttributes),
            1 => Ok(Self::BinaryInput),
            2 => Ok(Self::BinaryInputEvent),
            3 => Ok(Self::DoubleBitInput),
            4 => Ok(Self::DoubleBitInputEvent),
            10 => Ok(Self::BinaryOutput),
            11 => Ok(Self::BinaryOutputEvent),
            12 => Ok(Self::BinaryCommand),
            20 => Ok(Self::Counter),
            21 => Ok(Self::FrozenCounter),
            22 => Ok(Self::CounterEvent),
            23 => Ok(Self::FrozenCounterEvent),
            30 => Ok(Self::AnalogInput),
            31 => Ok(Self::FrozenAnalogInput),
            32 => Ok(Self::AnalogInputEvent),
            33 => Ok(Self::FrozenAnalogInputEvent),
            34 => Ok(Self::AnalogInputDeadband),
            40 => Ok(Self::AnalogOutput),
            41 => Ok(Self::AnalogCommand),
            42 => Ok(Self::AnalogOutputEvent),
            85 => Ok(Self::DatasetPrototype),
            86 => Ok(Self::DatasetDescriptor),
            87 => Ok(Self::DatasetPresentValue),
            88 => Ok(Self::DatasetEvent),
            110 => Ok(Self::OctetString),
            111 => Ok(Self::OctetStringEvent),
            120 => Ok(Self::Authentication),
            _ => Err(DbError::UnknownGroup(value)),
        }
    }

    /// Convert to raw byte value.
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Event group carrying changes of this static group, if any.
    #[inline]
    pub const fn event_group(self) -> Option<Self> {
        match self {
            Self::BinaryInput => Some(Self::BinaryInputEvent),
            Self::DoubleBitInput => Some(Self::DoubleBitInputEvent),
            Self::BinaryOutput => Some(Self::BinaryOutputEvent),
            Self::Counter => Some(Self::CounterEvent),
            Self::FrozenCounter => Some(Self::FrozenCounterEvent),
            Self::AnalogInput => Some(Self::AnalogInputEvent),
            Self::FrozenAnalogInput => Some(Self::FrozenAnalogInputEvent),
            Self::AnalogOutput => Some(Self::AnalogOutputEvent),
            Self::OctetString => Some(Self::OctetStringEvent),
            Self::DatasetDescriptor | Self::DatasetPresentValue => Some(Self::DatasetEvent),
            _ => None,
        }
    }

    /// Check if this group carries events.
    #[inline]
    pub const fn is_event(&self) -> bool {
        matches!(
            self,
            Self::BinaryInputEvent
                | Self::DoubleBitInputEvent
                | Self::BinaryOutputEvent
                | Self::CounterEvent
                | Self::FrozenCounterEvent
                | Self::AnalogInputEvent
                | Self::FrozenAnalogInputEvent
                | Self::AnalogOutputEvent
                | Self::OctetStringEvent
                | Self::DatasetEvent
                | Self::Authentication
        )
    }

    /// Check if notifications for this group use a packed two-level index.
    #[inline]
    pub const fn has_packed_index(&self) -> bool {
        matches!(
            self,
            Self::DeviceAttributes | Self::DatasetDescriptor | Self::DatasetPresentValue
        )
    }

    /// Human readable group name.
    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::DeviceAttributes => "Device Attributes",
            Self::BinaryInput => "Binary Input",
            Self::BinaryInputEvent => "Binary Input Event",
            Self::DoubleBitInput => "Double-bit Input",
            Self::DoubleBitInputEvent => "Double-bit Input Event",
            Self::BinaryOutput => "Binary Output",
            Self::BinaryOutputEvent => "Binary Output Event",
            Self::BinaryCommand => "CROB",
            Self::Counter => "Counter",
            Self::FrozenCounter => "Frozen Counter",
            Self::CounterEvent => "Counter Event",
            Self::FrozenCounterEvent => "Frozen Counter Event",
            Self::AnalogInput => "Analog Input",
            Self::FrozenAnalogInput => "Frozen Analog Input",
            Self::AnalogInputEvent => "Analog Input Event",
            Self::FrozenAnalogInputEvent => "Frozen Analog Input Event",
            Self::AnalogInputDeadband => "Analog Input Deadband",
            Self::AnalogOutput => "Analog Output",
            Self::AnalogCommand => "Analog Output Command",
            Self::AnalogOutputEvent => "Analog Output Event",
            Self::DatasetPrototype => "Dataset Prototype",
            Self::DatasetDescriptor => "Dataset Descriptor",
            Self::DatasetPresentValue => "Dataset Present Value",
            Self::DatasetEvent => "Dataset Event",
            Self::OctetString => "Octet String",
            Self::OctetStringEvent => "Octet String Event",
            Self::Authentication => "Authentication",
        }
    }
}

impl std::fmt::Display for ObjectGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "g{}", self.as_u8())
    }
}
