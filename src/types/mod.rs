//! DNP3 outstation type definitions.
//!
//! This module contains the core types shared by every table:
//!
//! - `ObjectGroup` - DNP3 object group (g1, g30, etc.)
//! - `PointFlags` - Packed point flags byte
//! - `ClassMask` - Event class membership
//! - `ControlMask` - Allowed control modes
//! - `Timestamp` - DNP3 absolute time
//! - `AnalogValue` / `DeadbandValue` - Wire-representable numeric encodings
//! - `EventValue` - Event payload variants
//! - `DataType` / `DataValue` - Typed attribute and dataset element values

mod flags;
mod group;
mod time;
mod value;

pub use flags::*;
pub use group::*;
pub use time::*;
pub use value::*;
