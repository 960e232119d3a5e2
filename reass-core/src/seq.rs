#![forbid(unsafe_code)]

//! TCP sequence number arithmetic.
//!
//! Sequence numbers live in a 32-bit space that wraps. Two numbers are ordered by the sign of
//! their wrapping difference, so `0xffff_fff0` comes before `0x10`. The relation is only
//! meaningful for numbers less than 2<sup>31</sup> apart, which the TCP window guarantees.

use std::{cmp, fmt, ops};

/// A TCP sequence number.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Hash)]
pub struct SeqNum(pub u32);

impl SeqNum {
    /// Signed distance from `other` to `self`.
    pub fn diff(self, other: SeqNum) -> i32 {
        self.0.wrapping_sub(other.0) as i32
    }

    /// The later of two sequence numbers.
    pub fn max(self, other: SeqNum) -> SeqNum {
        if seq_lt(self, other) { other } else { self }
    }

    /// The earlier of two sequence numbers.
    pub fn min(self, other: SeqNum) -> SeqNum {
        if seq_gt(self, other) { other } else { self }
    }
}

impl fmt::Display for SeqNum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SeqNum {
    fn from(v: u32) -> Self {
        SeqNum(v)
    }
}

impl ops::Add<u32> for SeqNum {
    type Output = SeqNum;

    fn add(self, rhs: u32) -> SeqNum {
        SeqNum(self.0.wrapping_add(rhs))
    }
}

impl ops::AddAssign<u32> for SeqNum {
    fn add_assign(&mut self, rhs: u32) {
        *self = *self + rhs;
    }
}

impl ops::Sub for SeqNum {
    type Output = i32;

    fn sub(self, rhs: SeqNum) -> i32 {
        self.diff(rhs)
    }
}

impl cmp::PartialOrd for SeqNum {
    fn partial_cmp(&self, other: &SeqNum) -> Option<cmp::Ordering> {
        self.diff(*other).partial_cmp(&0)
    }
}

/// `a` comes strictly before `b`.
pub fn seq_lt(a: SeqNum, b: SeqNum) -> bool {
    a.diff(b) < 0
}

/// `a` comes before or is equal to `b`.
pub fn seq_leq(a: SeqNum, b: SeqNum) -> bool {
    a.diff(b) <= 0
}

/// `a` comes strictly after `b`.
pub fn seq_gt(a: SeqNum, b: SeqNum) -> bool {
    a.diff(b) > 0
}

/// `a` comes after or is equal to `b`.
pub fn seq_geq(a: SeqNum, b: SeqNum) -> bool {
    a.diff(b) >= 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_across_wrap() {
        let before = SeqNum(0xffff_fff0);
        let after = SeqNum(0x10);
        assert!(seq_lt(before, after));
        assert!(seq_gt(after, before));
        assert!(before < after);
        assert_eq!(after - before, 0x20);
        assert_eq!(before - after, -0x20);
    }

    #[test]
    fn add_wraps() {
        let mut s = SeqNum(u32::MAX - 4);
        s += 10;
        assert_eq!(s, SeqNum(5));
        assert_eq!(SeqNum(u32::MAX) + 1, SeqNum(0));
    }

    #[test]
    fn leq_geq_on_equal() {
        let s = SeqNum(42);
        assert!(seq_leq(s, s));
        assert!(seq_geq(s, s));
        assert!(!seq_lt(s, s));
        assert!(!seq_gt(s, s));
    }

    #[test]
    fn max_min_wrap_aware() {
        let a = SeqNum(u32::MAX);
        let b = SeqNum(3);
        assert_eq!(a.max(b), b);
        assert_eq!(a.min(b), a);
    }
}
