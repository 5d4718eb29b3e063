//! Packed flag types: point flags, class masks and control capability masks.

/// DNP3 point flags.
///
/// Packed into a single byte exactly as transmitted. Bit layout:
/// - Bit 0: online
/// - Bit 1: restart
/// - Bit 2: comm_lost
/// - Bit 3: remote_forced
/// - Bit 4: local_forced
/// - Bit 5: over_range (analog), chatter_filter (binary), rollover (counter)
/// - Bit 6: reference_err (analog), discontinuity (counter)
/// - Bit 7: state (binary value bit)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct PointFlags(u8);

impl PointFlags {
    const ONLINE_MASK: u8 = 0b0000_0001;
    const RESTART_MASK: u8 = 0b0000_0010;
    const COMM_LOST_MASK: u8 = 0b0000_0100;
    const REMOTE_FORCED_MASK: u8 = 0b0000_1000;
    const LOCAL_FORCED_MASK: u8 = 0b0001_0000;
    const OVER_RANGE_MASK: u8 = 0b0010_0000;
    const REFERENCE_ERR_MASK: u8 = 0b0100_0000;
    const STATE_MASK: u8 = 0b1000_0000;
}

macro_rules! flag_accessors {
    ($($get:ident, $set:ident, $mask:ident, $doc:literal;)*) => {
        impl PointFlags {
            $(
                #[doc = $doc]
                #[inline(always)]
                pub const fn $get(&self) -> bool {
                    (self.0 & Self::$mask) != 0
                }

                #[doc = concat!("Set or clear: ", $doc)]
                #[inline(always)]
                pub const fn $set(mut self, value: bool) -> Self {
                    if value {
                        self.0 |= Self::$mask;
                    } else {
                        self.0 &= !Self::$mask;
                    }
                    self
                }
            )*
        }
    };
}

flag_accessors! {
    online, set_online, ONLINE_MASK, "Point is online";
    restart, set_restart, RESTART_MASK, "Point has not been updated since restart";
    comm_lost, set_comm_lost, COMM_LOST_MASK, "Communication with the source was lost";
    remote_forced, set_remote_forced, REMOTE_FORCED_MASK, "Value forced at a remote device";
    local_forced, set_local_forced, LOCAL_FORCED_MASK, "Value forced locally";
    over_range, set_over_range, OVER_RANGE_MASK, "Value exceeds the representable range";
    reference_err, set_reference_err, REFERENCE_ERR_MASK, "Reference check failed";
    state, set_state, STATE_MASK, "Binary state bit";
}

impl PointFlags {
    /// Online only.
    #[allow(non_upper_case_globals)]
    pub const Online: Self = Self(Self::ONLINE_MASK);

    /// Restart only, the flags of a freshly created point.
    #[allow(non_upper_case_globals)]
    pub const Restart: Self = Self(Self::RESTART_MASK);

    /// Get the raw packed byte value
    #[inline(always)]
    pub const fn as_raw(&self) -> u8 {
        self.0
    }

    /// Create from raw packed byte value
    #[inline(always)]
    pub const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    /// Flags with the value-carrying state bit removed.
    #[inline(always)]
    pub const fn without_state(self) -> Self {
        Self(self.0 & !Self::STATE_MASK)
    }
}

impl std::fmt::Debug for PointFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PointFlags({:#04x})", self.0)
    }
}

impl std::fmt::Display for PointFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const NAMES: [&str; 8] = ["ONLINE", "RESTART", "COMM_LOST", "REMOTE_FORCED", "LOCAL_FORCED", "OVER_RANGE", "REFERENCE_ERR", "STATE"];

        if self.0 == 0 {
            return f.write_str("-");
        }

        let mut first = true;
        for (bit, name) in NAMES.iter().enumerate() {
            if self.0 & (1 << bit) != 0 {
                if !first {
                    f.write_str("|")?;
                }
                first = false;
                f.write_str(name)?;
            }
        }
        Ok(())
    }
}

/// Report class membership of a point (classes 0 through 3).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct ClassMask(u8);

impl ClassMask {
    /// No class; changes are never reported as events.
    pub const NONE: Self = Self(0);
    /// Class 0 (static data).
    pub const CLASS_0: Self = Self(0x01);
    /// Class 1.
    pub const CLASS_1: Self = Self(0x02);
    /// Class 2.
    pub const CLASS_2: Self = Self(0x04);
    /// Class 3.
    pub const CLASS_3: Self = Self(0x08);
    /// Every event class (1, 2 and 3).
    pub const ALL_EVENTS: Self = Self(0x0E);

    /// Create from raw packed byte value
    #[inline(always)]
    pub const fn from_raw(raw: u8) -> Self {
        Self(raw & 0x0F)
    }

    /// Get the raw packed byte value
    #[inline(always)]
    pub const fn as_raw(&self) -> u8 {
        self.0
    }

    /// Check whether any class is shared with `other`.
    #[inline(always)]
    pub const fn intersects(&self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }

    /// Check whether no class is set.
    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Union of two masks.
    #[inline(always)]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl std::ops::BitOr for ClassMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl std::fmt::Debug for ClassMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ClassMask({:#04x})", self.0)
    }
}

/// Control modes a binary or analog output accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct ControlMask(u8);

impl ControlMask {
    pub const NONE: Self = Self(0);
    pub const PULSE_ON: Self = Self(0x01);
    pub const PULSE_OFF: Self = Self(0x02);
    pub const LATCH_ON: Self = Self(0x04);
    pub const LATCH_OFF: Self = Self(0x08);
    pub const CLOSE: Self = Self(0x10);
    pub const TRIP: Self = Self(0x20);
    /// Every control mode.
    pub const ALL: Self = Self(0x3F);

    /// Create from raw packed byte value
    #[inline(always)]
    pub const fn from_raw(raw: u8) -> Self {
        Self(raw & 0x3F)
    }

    /// Get the raw packed byte value
    #[inline(always)]
    pub const fn as_raw(&self) -> u8 {
        self.0
    }

    /// Check whether every mode in `required` is allowed.
    #[inline(always)]
    pub const fn contains(&self, required: Self) -> bool {
        (self.0 & required.0) == required.0
    }
}

impl std::ops::BitOr for ControlMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_flags_builder() {
        let flags = PointFlags::default().set_online(true).set_over_range(true);
        assert!(flags.online());
        assert!(flags.over_range());
        assert!(!flags.restart());
        assert_eq!(flags.as_raw(), 0x21);

        let flags = flags.set_online(false);
        assert!(!flags.online());
        assert_eq!(flags.as_raw(), 0x20);
    }

    #[test]
    fn test_point_flags_constants() {
        assert_eq!(PointFlags::Online.as_raw(), 0x01);
        assert_eq!(PointFlags::Restart.as_raw(), 0x02);
        assert_eq!(std::mem::size_of::<PointFlags>(), 1);
    }

    #[test]
    fn test_point_flags_without_state() {
        let flags = PointFlags::from_raw(0x81);
        assert!(flags.state());
        assert_eq!(flags.without_state().as_raw(), 0x01);
    }

    #[test]
    fn test_point_flags_display() {
        assert_eq!(PointFlags::default().to_string(), "-");
        assert_eq!(PointFlags::Online.to_string(), "ONLINE");
        assert_eq!(PointFlags::from_raw(0x23).to_string(), "ONLINE|RESTART|OVER_RANGE");
    }

    #[test]
    fn test_class_mask_intersects() {
        let mask = ClassMask::CLASS_1 | ClassMask::CLASS_3;
        assert!(mask.intersects(ClassMask::CLASS_1));
        assert!(mask.intersects(ClassMask::ALL_EVENTS));
        assert!(!mask.intersects(ClassMask::CLASS_2));
        assert!(!ClassMask::NONE.intersects(ClassMask::ALL_EVENTS));
        assert!(ClassMask::NONE.is_empty());
        assert_eq!(ClassMask::from_raw(0xFF).as_raw(), 0x0F);
    }

    #[test]
    fn test_control_mask_contains() {
        let mask = ControlMask::LATCH_ON | ControlMask::LATCH_OFF;
        assert!(mask.contains(ControlMask::LATCH_ON));
        assert!(!mask.contains(ControlMask::PULSE_ON));
        assert!(!mask.contains(ControlMask::LATCH_ON | ControlMask::TRIP));
        assert!(ControlMask::ALL.contains(ControlMask::TRIP | ControlMask::CLOSE));
    }
}
