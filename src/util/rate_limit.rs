//! Per-connection input throttling

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;

/// Input messages a single connection may send per second
pub const INPUT_RATE_LIMIT: u32 = 30;

/// What to do with one incoming input message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accept,
    /// Over quota. `burst_start` is set for the first drop after an accepted message.
    Drop { burst_start: bool },
}

/// Throttle owned by one socket reader. Remembers how many inputs it refused
/// and whether the connection is currently flooding.
pub struct InputThrottle {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    dropped: u64,
    flooding: bool,
}

impl InputThrottle {
    pub fn new() -> Self {
        Self::with_rate(INPUT_RATE_LIMIT)
    }

    pub fn with_rate(per_second: u32) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN));
        Self {
            limiter: RateLimiter::direct(quota),
            dropped: 0,
            flooding: false,
        }
    }

    pub fn admit(&mut self) -> Admission {
        if self.limiter.check().is_ok() {
            self.flooding = false;
            return Admission::Accept;
        }
        self.dropped += 1;
        let burst_start = !self.flooding;
        self.flooding = true;
        Admission::Drop { burst_start }
    }

    /// Inputs refused over the connection's lifetime
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for InputThrottle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_is_capped_and_counted() {
        let mut throttle = InputThrottle::with_rate(5);
        let verdicts: Vec<Admission> = (0..20).map(|_| throttle.admit()).collect();

        let accepted = verdicts.iter().filter(|v| **v == Admission::Accept).count();
        assert!(accepted >= 5);
        assert!(accepted < 20);
        assert_eq!(throttle.dropped(), (20 - accepted) as u64);
    }

    #[test]
    fn test_only_first_drop_of_a_burst_is_flagged() {
        let mut throttle = InputThrottle::with_rate(1);
        assert_eq!(throttle.admit(), Admission::Accept);

        let drops: Vec<Admission> = (0..4).map(|_| throttle.admit()).collect();
        assert_eq!(drops[0], Admission::Drop { burst_start: true });
        assert!(drops[1..]
            .iter()
            .all(|v| *v == Admission::Drop { burst_start: false }));
        assert_eq!(throttle.dropped(), 4);
    }

    #[test]
    fn test_zero_rate_still_admits_one() {
        let mut throttle = InputThrottle::with_rate(0);
        assert_eq!(throttle.admit(), Admission::Accept);
        assert_eq!(throttle.admit(), Admission::Drop { burst_start: true });
    }
}
