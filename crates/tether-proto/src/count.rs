//! Flow-control counters.
//!
//! Both ends count transferred bytes modulo 2^28, so every comparison between
//! a sent count and a confirmed count has to go through these helpers.

/// Mask applied to every counter value.
pub const MASK28: u32 = 0x0fff_ffff;

/// Add `n` bytes to a counter, wrapping at 2^28.
pub fn advance(count: u32, n: usize) -> u32 {
    // Truncating `n` is fine: only the low 28 bits survive the mask.
    count.wrapping_add(n as u32) & MASK28
}

/// Bytes sent but not yet confirmed by the peer.
pub fn backlog(sent: u32, confirmed: u32) -> u32 {
    sent.wrapping_sub(confirmed) & MASK28
}

/// Interpret a peer-reported decimal count (which may be any integer) as a
/// counter value.
pub fn from_wire(value: i64) -> u32 {
    (value & MASK28 as i64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backlog_simple() {
        assert_eq!(backlog(10, 4), 6);
        assert_eq!(backlog(0, 0), 0);
    }

    #[test]
    fn test_backlog_wraparound() {
        assert_eq!(backlog(5, MASK28), 6);
        assert_eq!(backlog(0, MASK28), 1);
    }

    #[test]
    fn test_backlog_stays_in_range() {
        for &(sent, confirmed) in &[(0, 1), (MASK28, 0), (12345, 67890), (1 << 27, MASK28)] {
            assert!(backlog(sent, confirmed) <= MASK28);
        }
    }

    #[test]
    fn test_advance_wraps() {
        assert_eq!(advance(MASK28, 1), 0);
        assert_eq!(advance(MASK28 - 2, 10), 7);
        assert_eq!(advance(100, 0), 100);
    }

    #[test]
    fn test_from_wire_masks() {
        assert_eq!(from_wire(42), 42);
        assert_eq!(from_wire((MASK28 as i64) + 1), 0);
        assert_eq!(from_wire(-1), MASK28);
    }
}
