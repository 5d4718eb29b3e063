//! Point value types.
//!
//! This module defines the value shapes carried by points and events, and
//! the storage policy applied to variable-length values.

use bytes::Bytes;

use super::Timestamp;
use crate::error::{DbError, Result};

/// Largest DNP3 octet string length.
pub const MAX_OCTET_STRING_LEN: usize = 255;

/// Double-bit binary state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum DoubleBit {
    /// Transitioning between states
    #[default]
    Intermediate = 0,
    /// Determined off
    Off = 1,
    /// Determined on
    On = 2,
    /// Abnormal or custom condition
    Indeterminate = 3,
}

impl DoubleBit {
    /// Create from the two low bits of a byte.
    #[inline]
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Self::Intermediate,
            1 => Self::Off,
            2 => Self::On,
            _ => Self::Indeterminate,
        }
    }

    /// Two-bit wire value.
    #[inline]
    pub const fn as_bits(self) -> u8 {
        self as u8
    }
}

/// Analog value in one of the wire-representable encodings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnalogValue {
    /// 64-bit floating point
    Double(f64),
    /// 32-bit floating point
    Float(f32),
    /// 32-bit signed scaled integer
    Long(i32),
}

impl AnalogValue {
    /// Widen to f64 without any clamping.
    #[inline]
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Double(v) => *v,
            Self::Float(v) => *v as f64,
            Self::Long(v) => *v as f64,
        }
    }
}

/// Analog deadband in one of the wire-representable encodings.
///
/// Deadbands carry magnitude only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeadbandValue {
    /// 64-bit floating point
    Double(f64),
    /// 32-bit floating point
    Float(f32),
    /// 32-bit unsigned integer
    Unsigned(u32),
}

impl DeadbandValue {
    /// Widen to f64 without any clamping.
    #[inline]
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Double(v) => *v,
            Self::Float(v) => *v as f64,
            Self::Unsigned(v) => *v as f64,
        }
    }
}

/// Value carried by an event, mirroring the shape of its point.
#[derive(Debug, Clone, PartialEq)]
pub enum EventValue {
    /// Binary input or binary output state
    Binary(bool),
    /// Double-bit input state
    DoubleBit(DoubleBit),
    /// Counter or frozen counter
    Counter(u32),
    /// Analog input, frozen analog input or analog output
    Analog(f64),
    /// Octet string contents
    OctetString(Bytes),
    /// Secure authentication error
    AuthError {
        user: u16,
        association: u16,
        error_code: u8,
    },
}

impl EventValue {
    /// Convert to f64 if numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Binary(v) => Some(if *v { 1.0 } else { 0.0 }),
            Self::Counter(v) => Some(*v as f64),
            Self::Analog(v) => Some(*v),
            _ => None,
        }
    }
}

/// Storage policy for variable-length values.
///
/// Resolved once from configuration; every store through the policy makes
/// an owned copy so the database never aliases a caller's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoragePolicy {
    /// Truncate into a bounded buffer
    Fixed { max_len: usize },
    /// Keep the whole value in a growable owned buffer
    Dynamic,
}

impl Default for StoragePolicy {
    fn default() -> Self {
        Self::Fixed {
            max_len: MAX_OCTET_STRING_LEN,
        }
    }
}

impl StoragePolicy {
    /// Copy `data` into database-owned storage.
    pub fn store(&self, data: &[u8]) -> Bytes {
        match self {
            Self::Fixed { max_len } => Bytes::copy_from_slice(&data[..data.len().min(*max_len)]),
            Self::Dynamic => Bytes::copy_from_slice(data),
        }
    }

    /// Check whether a value of `len` bytes would be truncated.
    pub fn truncates(&self, len: usize) -> bool {
        matches!(self, Self::Fixed { max_len } if len > *max_len)
    }
}

/// Data type of a device attribute or dataset element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    /// Visible string (VSTR)
    VisibleString = 1,
    /// Unsigned integer (UINT)
    Unsigned = 2,
    /// Signed integer (INT)
    Signed = 3,
    /// Floating point (FLT)
    Float = 4,
    /// Octet string (OSTR)
    OctetString = 5,
    /// Bit string (BSTR)
    BitString = 6,
    /// Absolute time (TIME)
    Time = 7,
}

impl DataType {
    /// Create DataType from raw byte value.
    #[inline]
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::VisibleString),
            2 => Ok(Self::Unsigned),
            3 => Ok(Self::Signed),
            4 => Ok(Self::Float),
            5 => Ok(Self::OctetString),
            6 => Ok(Self::BitString),
            7 => Ok(Self::Time),
            _ => Err(DbError::NotSupported),
        }
    }

    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Placeholder value for a freshly materialized slot of this type.
    pub fn zero_value(self, now: Timestamp) -> DataValue {
        match self {
            Self::VisibleString => DataValue::VisibleString(Bytes::from_static(b"V")),
            Self::Unsigned => DataValue::Unsigned(0),
            Self::Signed => DataValue::Signed(0),
            Self::Float => DataValue::Float(0.0),
            Self::OctetString => DataValue::OctetString(Bytes::from_static(b"O")),
            Self::BitString => DataValue::BitString(Bytes::from_static(b"B")),
            Self::Time => DataValue::Time(now),
        }
    }
}

/// Typed value of a device attribute or dataset element.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    VisibleString(Bytes),
    Unsigned(u32),
    Signed(i32),
    Float(f64),
    OctetString(Bytes),
    BitString(Bytes),
    Time(Timestamp),
}

impl DataValue {
    /// Declared type of this value.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::VisibleString(_) => DataType::VisibleString,
            Self::Unsigned(_) => DataType::Unsigned,
            Self::Signed(_) => DataType::Signed,
            Self::Float(_) => DataType::Float,
            Self::OctetString(_) => DataType::OctetString,
            Self::BitString(_) => DataType::BitString,
            Self::Time(_) => DataType::Time,
        }
    }

    /// Variable-length payload, if any.
    pub fn bytes(&self) -> Option<&Bytes> {
        match self {
            Self::VisibleString(b) | Self::OctetString(b) | Self::BitString(b) => Some(b),
            _ => None,
        }
    }

    /// Copy variable-length payloads into storage owned under `policy`.
    pub fn stored(self, policy: StoragePolicy) -> Self {
        match self {
            Self::VisibleString(b) => Self::VisibleString(policy.store(&b)),
            Self::OctetString(b) => Self::OctetString(policy.store(&b)),
            Self::BitString(b) => Self::BitString(policy.store(&b)),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_bit_bits() {
        assert_eq!(DoubleBit::from_bits(0x02), DoubleBit::On);
        assert_eq!(DoubleBit::from_bits(0xFD), DoubleBit::Off);
        assert_eq!(DoubleBit::Indeterminate.as_bits(), 3);
        assert_eq!(DoubleBit::default(), DoubleBit::Intermediate);
    }

    #[test]
    fn test_analog_as_f64() {
        assert_eq!(AnalogValue::Double(1.25).as_f64(), 1.25);
        assert_eq!(AnalogValue::Float(-2.5).as_f64(), -2.5);
        assert_eq!(AnalogValue::Long(i32::MIN).as_f64(), i32::MIN as f64);
        assert_eq!(DeadbandValue::Unsigned(7).as_f64(), 7.0);
    }

    #[test]
    fn test_event_value_as_f64() {
        assert_eq!(EventValue::Binary(true).as_f64(), Some(1.0));
        assert_eq!(EventValue::Counter(42).as_f64(), Some(42.0));
        assert_eq!(EventValue::OctetString(Bytes::from_static(b"x")).as_f64(), None);
    }

    #[test]
    fn test_fixed_storage_truncates() {
        let policy = StoragePolicy::Fixed { max_len: 4 };
        assert_eq!(&policy.store(b"abcdef")[..], b"abcd");
        assert!(policy.truncates(5));
        assert!(!policy.truncates(4));
    }

    #[test]
    fn test_dynamic_storage_copies() {
        let mut source = vec![1u8, 2, 3];
        let stored = StoragePolicy::Dynamic.store(&source);
        source[0] = 9;
        assert_eq!(&stored[..], &[1, 2, 3]);
        assert!(!StoragePolicy::Dynamic.truncates(100_000));
    }

    #[test]
    fn test_data_type_zero_values() {
        let now = Timestamp::from_millis(5_000);
        assert_eq!(
            DataType::VisibleString.zero_value(now),
            DataValue::VisibleString(Bytes::from_static(b"V"))
        );
        assert_eq!(
            DataType::OctetString.zero_value(now),
            DataValue::OctetString(Bytes::from_static(b"O"))
        );
        assert_eq!(
            DataType::BitString.zero_value(now),
            DataValue::BitString(Bytes::from_static(b"B"))
        );
        assert_eq!(DataType::Signed.zero_value(now), DataValue::Signed(0));
        assert_eq!(DataType::Float.zero_value(now), DataValue::Float(0.0));
        assert_eq!(DataType::Time.zero_value(now), DataValue::Time(now));
        assert_eq!(DataType::from_u8(9), Err(DbError::NotSupported));
    }

    #[test]
    fn test_data_value_stored_truncates() {
        let value = DataValue::VisibleString(Bytes::from_static(b"substation"));
        let stored = value.stored(StoragePolicy::Fixed { max_len: 3 });
        assert_eq!(stored.bytes().unwrap().as_ref(), b"sub");
        assert_eq!(DataValue::Unsigned(4).stored(StoragePolicy::Dynamic), DataValue::Unsigned(4));
    }
}
