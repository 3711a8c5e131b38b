//! # Unit Converter
//!
//! Fixed-point conversion between kernel ticks and nanoseconds.
//!
//! A conversion is a `(mult, shift)` pair such that
//!
//! ```text
//! to = (from * mult) >> shift
//! ```
//!
//! The pair is chosen once, when the manager binds its clock, with the
//! largest shift for which `from * mult` still fits in 64 bits over the whole
//! representable interval. The idle path then converts with one multiply and
//! one shift and no division.

use crate::platform::Tick;

/// One direction of a fixed-point conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conversion {
    pub mult: u32,
    pub shift: u32,
}

impl Conversion {
    /// Derive the factors converting a `from_hz` unit into a `to_hz` unit,
    /// valid for intervals up to `max_sec` seconds.
    pub const fn new(from_hz: u32, to_hz: u32, max_sec: u32) -> Self {
        // Bits of headroom left once the largest input is accounted for.
        let mut tmp = (max_sec as u64 * from_hz as u64) >> 32;
        let mut sftacc: u32 = 32;
        while tmp != 0 {
            tmp >>= 1;
            sftacc -= 1;
        }

        // Largest shift whose rounded multiplier fits in the headroom.
        let mut shift: u32 = 32;
        while shift > 0 {
            tmp = (to_hz as u64) << shift;
            tmp += from_hz as u64 / 2;
            tmp /= from_hz as u64;
            if (tmp >> sftacc) == 0 {
                break;
            }
            shift -= 1;
        }

        Self {
            mult: tmp as u32,
            shift,
        }
    }

    /// Largest input that converts without overflowing.
    #[inline]
    pub const fn max_input(&self) -> u64 {
        if self.mult == 0 {
            u64::MAX
        } else {
            u64::MAX / self.mult as u64
        }
    }

    /// Convert `value`, saturating inputs beyond [`Self::max_input`].
    #[inline]
    pub const fn apply(&self, value: u64) -> u64 {
        let value = if value > self.max_input() {
            self.max_input()
        } else {
            value
        };
        (value * self.mult as u64) >> self.shift
    }
}

/// The two conversions the manager needs: ticks-until-wake into a sleep
/// target, and measured sleep time back into ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickConverter {
    pub to_nsec: Conversion,
    pub to_ticks: Conversion,
}

impl TickConverter {
    pub const fn new(tick_hz: u32, nsec_per_sec: u32, max_sec: u32) -> Self {
        Self {
            to_nsec: Conversion::new(tick_hz, nsec_per_sec, max_sec),
            to_ticks: Conversion::new(nsec_per_sec, tick_hz, max_sec),
        }
    }

    #[inline]
    pub const fn ticks_to_nsec(&self, ticks: Tick) -> u64 {
        self.to_nsec.apply(ticks as u64)
    }

    /// Ticks covered by `nsec`, truncated. Saturates at `Tick::MAX`.
    #[inline]
    pub const fn nsec_to_ticks(&self, nsec: u64) -> Tick {
        let ticks = self.to_ticks.apply(nsec);
        if ticks > Tick::MAX as u64 {
            Tick::MAX
        } else {
            ticks as Tick
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NSEC_PER_SEC, TICK_HZ};
    use proptest::prelude::*;

    // 32-bit counter at 32.768 kHz: ~36 hours representable.
    const LPTIM32_MAX_SEC: u32 = (u32::MAX as u64 / 32_768) as u32;
    // 16-bit counter at 32.768 kHz: under two seconds.
    const LPTIM16_MAX_SEC: u32 = 0xFFFF / 32_768;

    #[test]
    fn test_tick_to_nsec_is_exact_at_1khz() {
        let conv = TickConverter::new(TICK_HZ, NSEC_PER_SEC, LPTIM32_MAX_SEC);
        assert_eq!(conv.to_nsec, Conversion { mult: 4_096_000_000, shift: 12 });
        assert_eq!(conv.ticks_to_nsec(1), 1_000_000);
        assert_eq!(conv.ticks_to_nsec(50), 50_000_000);
        assert_eq!(conv.ticks_to_nsec(Tick::MAX), Tick::MAX as u64 * 1_000_000);
    }

    #[test]
    fn test_nsec_to_tick_short_interval() {
        let conv = TickConverter::new(TICK_HZ, NSEC_PER_SEC, LPTIM16_MAX_SEC);
        assert_eq!(conv.to_ticks, Conversion { mult: 4295, shift: 32 });
        assert_eq!(conv.nsec_to_ticks(10_000_000), 10);
        assert_eq!(conv.nsec_to_ticks(999_000), 0);
        assert_eq!(conv.nsec_to_ticks(0), 0);
    }

    #[test]
    fn test_headroom_shrinks_with_range() {
        let short = Conversion::new(NSEC_PER_SEC, TICK_HZ, 1);
        let long = Conversion::new(NSEC_PER_SEC, TICK_HZ, LPTIM32_MAX_SEC);
        assert!(long.shift <= short.shift);
        // The largest representable nanosecond count must not overflow.
        let max_nsec = LPTIM32_MAX_SEC as u64 * NSEC_PER_SEC as u64;
        assert!(max_nsec <= long.max_input());
    }

    #[test]
    fn test_apply_saturates_instead_of_overflowing() {
        let conv = Conversion::new(NSEC_PER_SEC, TICK_HZ, 1);
        assert_eq!(conv.apply(u64::MAX), conv.apply(conv.max_input()));
    }

    proptest! {
        #[test]
        fn prop_round_trip_within_rounding_bound(ticks in 0u32..(LPTIM32_MAX_SEC * TICK_HZ)) {
            let conv = TickConverter::new(TICK_HZ, NSEC_PER_SEC, LPTIM32_MAX_SEC);
            let back = conv.nsec_to_ticks(conv.ticks_to_nsec(ticks));
            // `mult` is rounded to nearest: relative error at most 1 / (2 * mult).
            let bound = ticks as u64 / (2 * conv.to_ticks.mult as u64) + 1;
            prop_assert!((back as i64 - ticks as i64).unsigned_abs() <= bound);
        }

        #[test]
        fn prop_no_overflow_over_representable_range(sec in 0u32..=LPTIM32_MAX_SEC) {
            let conv = TickConverter::new(TICK_HZ, NSEC_PER_SEC, LPTIM32_MAX_SEC);
            let nsec = sec as u64 * NSEC_PER_SEC as u64;
            prop_assert!(nsec <= conv.to_ticks.max_input());
            let ticks = conv.nsec_to_ticks(nsec) as u64;
            let expected = sec as u64 * TICK_HZ as u64;
            prop_assert!(ticks >= expected);
            prop_assert!(ticks - expected <= expected / (2 * conv.to_ticks.mult as u64) + 1);
        }
    }
}
