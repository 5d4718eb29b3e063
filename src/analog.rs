//! Analog value conversion between the internal scalar and wire encodings.
//!
//! Internally every analog value is an `f64`. On the wire the outstation
//! reports one of three encodings depending on the configured numeric
//! capability:
//!
//! | Mode | Wire value | Clamping |
//! |------|------------|----------|
//! | `Double` | `f64` | none |
//! | `Float` | `f32` | to `±f32::MAX`, only when also outside the long range |
//! | `IntegerOnly` | `i32` | to `i32::MIN`/`i32::MAX` |
//!
//! Deadbands follow the same selection but are unsigned.

use crate::types::{AnalogValue, DeadbandValue};

const LONG_MIN: f64 = i32::MIN as f64;
const LONG_MAX: f64 = i32::MAX as f64;
const FLOAT_MAX: f64 = f32::MAX as f64;
const ULONG_MAX: f64 = u32::MAX as f64;

/// Numeric capability of the outstation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericMode {
    /// 64-bit floating point support
    Double,
    /// 32-bit floating point support
    Float,
    /// Scaled 32-bit integers only
    IntegerOnly,
}

impl NumericMode {
    /// Mode compiled into this build.
    #[cfg(feature = "analog-double")]
    pub const BUILD: Self = Self::Double;

    /// Mode compiled into this build.
    #[cfg(all(not(feature = "analog-double"), feature = "analog-float"))]
    pub const BUILD: Self = Self::Float;

    /// Mode compiled into this build.
    #[cfg(not(any(feature = "analog-double", feature = "analog-float")))]
    pub const BUILD: Self = Self::IntegerOnly;
}

impl Default for NumericMode {
    fn default() -> Self {
        Self::BUILD
    }
}

/// Result of an encode: the wire value plus whether it was clamped out of range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Encoded<T> {
    pub value: T,
    pub over_range: bool,
}

impl<T> Encoded<T> {
    #[inline]
    const fn exact(value: T) -> Self {
        Self {
            value,
            over_range: false,
        }
    }

    #[inline]
    const fn clamped(value: T) -> Self {
        Self {
            value,
            over_range: true,
        }
    }
}

/// Converts analog values and deadbands to and from the wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValueCodec {
    mode: NumericMode,
}

impl ValueCodec {
    /// Create a codec for the given numeric mode.
    pub const fn new(mode: NumericMode) -> Self {
        Self { mode }
    }

    /// Configured numeric mode.
    pub const fn mode(&self) -> NumericMode {
        self.mode
    }

    /// Encode an internal value for transmission.
    pub fn encode(&self, value: f64) -> Encoded<AnalogValue> {
        match self.mode {
            NumericMode::Double => Encoded::exact(AnalogValue::Double(value)),
            NumericMode::Float => {
                if (LONG_MIN..=LONG_MAX).contains(&value) {
                    return Encoded::exact(AnalogValue::Float(value as f32));
                }
                if value > FLOAT_MAX {
                    Encoded::clamped(AnalogValue::Float(f32::MAX))
                } else if value < -FLOAT_MAX {
                    Encoded::clamped(AnalogValue::Float(f32::MIN))
                } else {
                    Encoded::exact(AnalogValue::Float(value as f32))
                }
            }
            NumericMode::IntegerOnly => {
                if value > LONG_MAX {
                    Encoded::clamped(AnalogValue::Long(i32::MAX))
                } else if value < LONG_MIN {
                    Encoded::clamped(AnalogValue::Long(i32::MIN))
                } else {
                    Encoded::exact(AnalogValue::Long(value as i32))
                }
            }
        }
    }

    /// Decode a received wire value. The wire is already bounded, so no clamping.
    pub fn decode(&self, wire: AnalogValue) -> f64 {
        wire.as_f64()
    }

    /// Encode a deadband for transmission.
    ///
    /// Negative deadbands are clamped to zero and flagged over range.
    pub fn encode_deadband(&self, value: f64) -> Encoded<DeadbandValue> {
        let negative = value < 0.0;
        let magnitude = if negative { 0.0 } else { value };

        let encoded = match self.mode {
            NumericMode::Double => Encoded::exact(DeadbandValue::Double(magnitude)),
            NumericMode::Float => {
                if magnitude > FLOAT_MAX {
                    Encoded::clamped(DeadbandValue::Float(f32::MAX))
                } else {
                    Encoded::exact(DeadbandValue::Float(magnitude as f32))
                }
            }
            NumericMode::IntegerOnly => {
                if magnitude > ULONG_MAX {
                    Encoded::clamped(DeadbandValue::Unsigned(u32::MAX))
                } else {
                    Encoded::exact(DeadbandValue::Unsigned(magnitude as u32))
                }
            }
        };

        Encoded {
            value: encoded.value,
            over_range: encoded.over_range || negative,
        }
    }

    /// Decode a received deadband.
    pub fn decode_deadband(&self, wire: DeadbandValue) -> f64 {
        wire.as_f64()
    }
}
