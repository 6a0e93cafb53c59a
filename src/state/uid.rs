//! Identity allocation for locally connected users.

use meshirc_proto::{ServerId, UserUuid, UuidCounter};

/// Upper bound on distinct counter values: a letter followed by five
/// positions of at most 36 symbols.
const COUNTER_SPACE: u64 = 26 * 36 * 36 * 36 * 36 * 36;

/// Generates network-unique user uuids: server ID + 6-character counter.
///
/// The counter starts at `AAAAAA`. A value that is still held by a live
/// user is skipped.
pub struct UidGenerator {
    sid: ServerId,
    counter: UuidCounter,
}

impl UidGenerator {
    /// Create a new generator for the given server ID.
    pub fn new(sid: ServerId) -> Self {
        Self {
            sid,
            counter: UuidCounter::default(),
        }
    }

    /// Resume from a specific counter value.
    pub fn starting_at(sid: ServerId, counter: UuidCounter) -> Self {
        Self { sid, counter }
    }

    /// Allocate the next uuid not rejected by `in_use`.
    ///
    /// Gives up after `COUNTER_SPACE` candidates, which can only happen if
    /// every value is live. The counter does not return to arbitrary start
    /// values, so the bound is a count rather than a revisit check.
    pub fn next(&mut self, in_use: impl Fn(&UserUuid) -> bool) -> Option<UserUuid> {
        self.next_within(COUNTER_SPACE, in_use)
    }

    fn next_within(&mut self, attempts: u64, in_use: impl Fn(&UserUuid) -> bool) -> Option<UserUuid> {
        for _ in 0..attempts {
            let candidate = UserUuid::from_counter(&self.sid, &self.counter);
            self.counter.advance();
            if !in_use(&candidate) {
                return Some(candidate);
            }
            tracing::debug!(uuid = %candidate, "uuid still live, retrying");
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid() -> ServerId {
        ServerId::parse("1AA").unwrap()
    }

    #[test]
    fn test_uid_generation() {
        let mut generator = UidGenerator::new(sid());
        assert_eq!(generator.next(|_| false).unwrap().as_str(), "1AAAAAAAA");
        assert_eq!(generator.next(|_| false).unwrap().as_str(), "1AAAAAAAB");
    }

    #[test]
    fn test_rolls_digit_into_next_position() {
        let counter = UuidCounter::from_suffix("AAAAA9").unwrap();
        let mut generator = UidGenerator::starting_at(sid(), counter);
        assert_eq!(generator.next(|_| false).unwrap().as_str(), "1AAAAAAA9");
        assert_eq!(generator.next(|_| false).unwrap().as_str(), "1AAAAAAB0");
    }

    #[test]
    fn test_overflow_wraps_to_start() {
        let counter = UuidCounter::from_suffix("Z99999").unwrap();
        let mut generator = UidGenerator::starting_at(sid(), counter);
        assert_eq!(generator.next(|_| false).unwrap().as_str(), "1AAZ99999");
        assert_eq!(generator.next(|_| false).unwrap().as_str(), "1AAAAAAAA");
    }

    #[test]
    fn test_gives_up_when_every_candidate_is_live() {
        // Starts off the counter's orbit: letters in the last position are
        // never produced again once it has wrapped to digits.
        let counter = UuidCounter::from_suffix("AAAABA").unwrap();
        let mut generator = UidGenerator::starting_at(sid(), counter);
        assert!(generator.next_within(500, |_| true).is_none());
        assert_eq!(
            generator.next(|_| false).unwrap().as_str(),
            UserUuid::from_counter(&sid(), &generator_counter_after(500)).as_str()
        );
    }

    fn generator_counter_after(steps: usize) -> UuidCounter {
        let mut counter = UuidCounter::from_suffix("AAAABA").unwrap();
        for _ in 0..steps {
            counter.advance();
        }
        counter
    }

    #[test]
    fn test_skips_live_uuid() {
        let mut generator = UidGenerator::new(sid());
        let uuid = generator.next(|u| u.as_str() == "1AAAAAAAA").unwrap();
        assert_eq!(uuid.as_str(), "1AAAAAAAB");
    }
}
