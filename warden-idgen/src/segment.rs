//! Local segment arithmetic.
//!
//! A segment checked out at `start` issues `start + 1 ..= start + interval`.
//! The next segment starts where the shared counter points after this one
//! was taken, so segments of different allocators never overlap.

use serde::{Deserialize, Serialize};

/// A checked-out range of IDs and the highest value issued from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub start: i64,
    pub interval: i64,
    /// Highest value issued so far, `start` when none has been
    pub last: i64,
}

impl Segment {
    pub fn new(start: i64, interval: i64) -> Self {
        Self {
            start,
            interval,
            last: start,
        }
    }

    /// Highest value this segment may issue.
    pub fn end(&self) -> i64 {
        self.start.saturating_add(self.interval)
    }

    pub fn remaining(&self) -> i64 {
        self.end() - self.last
    }

    pub fn is_exhausted(&self) -> bool {
        self.last >= self.end()
    }

    /// Issue the next value, `None` once the segment is used up.
    pub fn advance(&mut self) -> Option<i64> {
        if self.is_exhausted() {
            return None;
        }
        self.last += 1;
        Some(self.last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_issues_start_plus_one_through_end() {
        let mut segment = Segment::new(0, 3);
        assert_eq!(segment.remaining(), 3);
        assert_eq!(segment.advance(), Some(1));
        assert_eq!(segment.advance(), Some(2));
        assert_eq!(segment.advance(), Some(3));
        assert!(segment.is_exhausted());
        assert_eq!(segment.advance(), None);
        assert_eq!(segment.last, 3);
    }

    #[test]
    fn test_saturating_end() {
        let mut segment = Segment::new(i64::MAX - 1, 10);
        assert_eq!(segment.end(), i64::MAX);
        assert_eq!(segment.advance(), Some(i64::MAX));
        assert_eq!(segment.advance(), None);
    }

    proptest! {
        #[test]
        fn prop_bounds_hold(start in 0i64..1_000_000, interval in 1i64..500, draws in 0usize..1000) {
            let mut segment = Segment::new(start, interval);
            let mut previous = start;
            for _ in 0..draws {
                match segment.advance() {
                    Some(value) => {
                        prop_assert!(value > previous);
                        prop_assert!(value <= start + interval);
                        previous = value;
                    }
                    None => prop_assert_eq!(segment.last, start + interval),
                }
                prop_assert!(segment.start <= segment.last && segment.last <= segment.end());
            }
        }
    }
}
