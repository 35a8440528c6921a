//! Version timestamps: seconds in the high 32 bits, microseconds in the low.

use std::fmt;

/// Row version timestamp.
pub type KvTimestamp = u64;

const USEC_PER_SEC: u64 = 1_000_000;

/// Seconds part.
#[inline]
pub fn high_part(ts: KvTimestamp) -> u64 {
    ts >> 32
}

/// Microseconds part.
#[inline]
pub fn low_part(ts: KvTimestamp) -> u64 {
    ts & 0xFFFF_FFFF
}

/// Build a timestamp from seconds and microseconds.
#[inline]
pub fn from_parts(secs: u32, usecs: u32) -> KvTimestamp {
    debug_assert!(u64::from(usecs) < USEC_PER_SEC);
    (u64::from(secs) << 32) | u64::from(usecs)
}

/// `a - b`, borrowing a second when the microsecond part underflows.
pub fn timestamp_sub(a: KvTimestamp, b: KvTimestamp) -> KvTimestamp {
    let mut d = a.wrapping_sub(b);
    if low_part(d) >= USEC_PER_SEC {
        d = d.wrapping_sub((1 << 32) - USEC_PER_SEC);
    }
    d
}

/// Displays a timestamp as `secs.usecs`.
#[derive(Debug, Clone, Copy)]
pub struct TsParts(pub KvTimestamp);

impl fmt::Display for TsParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", high_part(self.0), low_part(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_without_borrow() {
        let d = timestamp_sub(from_parts(10, 500), from_parts(3, 200));
        assert_eq!((high_part(d), low_part(d)), (7, 300));
    }

    #[test]
    fn sub_borrows_a_second() {
        let d = timestamp_sub(from_parts(10, 100), from_parts(3, 999_000));
        assert_eq!((high_part(d), low_part(d)), (6, 1_100));
    }

    #[test]
    fn display_pads_micros() {
        assert_eq!(TsParts(from_parts(2, 42)).to_string(), "2.000042");
    }
}
