//! Exponential retry timer with jitter.
//!
//! The first firing is always immediate. Every firing after the first doubles
//! the timeout up to a cap, and each firing re-randomizes the timeout by up to
//! `timeout / jitter_fraction` in either direction.

use rand::Rng;

use crate::core::time::{
    elapsed,
    Ticks,
};

#[derive(Clone, Debug)]
pub struct Backoff {
    start_timeout: Ticks,
    max_timeout: Ticks,
    timeout: Ticks,
    timeout_with_jitter: Ticks,
    jitter_fraction: u32,
    count: u32,
    fired_at: Ticks,
}

impl Backoff {
    /// Creates a backoff which starts at start_timeout ticks and never exceeds
    /// max_timeout ticks before jitter.
    pub fn new(start_timeout: Ticks, max_timeout: Ticks, jitter_fraction: u32) -> Backoff {
        Backoff {
            start_timeout,
            max_timeout,
            timeout: start_timeout,
            timeout_with_jitter: start_timeout,
            jitter_fraction,
            count: 0,
            fired_at: 0,
        }
    }

    /// Checks if it's time to fire again.
    pub fn timeout(&self, now: Ticks) -> bool {
        self.count == 0 || elapsed(self.fired_at, now) > self.timeout_with_jitter
    }

    /// Records a firing at now and computes the next timeout.
    pub fn fire<R: Rng>(&mut self, now: Ticks, rng: &mut R) {
        self.fired_at = now;
        self.count = self.count.saturating_add(1);

        if self.count > 1 {
            self.timeout = self.timeout.saturating_mul(2).min(self.max_timeout);
        }

        self.timeout_with_jitter = self.jitter(rng);
    }

    /// Restarts the backoff so the next timeout(...) check fires immediately.
    pub fn reset(&mut self) {
        self.count = 0;
        self.timeout = self.start_timeout;
        self.timeout_with_jitter = self.start_timeout;
    }

    /// Returns the current timeout before jitter.
    pub fn current_timeout(&self) -> Ticks {
        self.timeout
    }

    /// Returns the current timeout after jitter.
    pub fn current_timeout_with_jitter(&self) -> Ticks {
        self.timeout_with_jitter
    }

    /// Returns the number of firings since creation or the last reset.
    pub fn count(&self) -> u32 {
        self.count
    }

    fn jitter<R: Rng>(&self, rng: &mut R) -> Ticks {
        let span = match self.jitter_fraction {
            0 => 0,
            fraction => self.timeout / fraction,
        };

        if span == 0 {
            return self.timeout;
        }

        let offset = rng.gen_range(0 .. span);
        if rng.gen::<bool>() {
            self.timeout.saturating_add(offset)
        } else {
            self.timeout - offset
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_first_timeout_is_immediate() {
        let backoff = Backoff::new(500, 60000, 4);
        assert!(backoff.timeout(0));
        assert!(backoff.timeout(12345));
    }

    #[test]
    fn test_timeout_after_fire() {
        let mut rng = rng();
        let mut backoff = Backoff::new(500, 60000, 4);
        backoff.fire(1000, &mut rng);

        let jittered = backoff.current_timeout_with_jitter();
        assert!(jittered > 375 && jittered <= 625);
        assert!(!backoff.timeout(1000 + jittered));
        assert!(backoff.timeout(1000 + jittered + 1));
    }

    #[test]
    fn test_timeout_doubles_after_first_fire() {
        let mut rng = rng();
        let mut backoff = Backoff::new(500, 60000, 4);

        backoff.fire(0, &mut rng);
        assert_eq!(backoff.current_timeout(), 500);

        for n in 2 .. 10 {
            backoff.fire(0, &mut rng);
            let expected = (500 * 2u32.pow(n - 1)).min(60000);
            assert_eq!(backoff.current_timeout(), expected);
        }
    }

    #[test]
    fn test_timeout_is_capped() {
        let mut rng = rng();
        let mut backoff = Backoff::new(500, 1200, 4);

        for _ in 0 .. 5 {
            backoff.fire(0, &mut rng);
        }

        assert_eq!(backoff.current_timeout(), 1200);
        let jittered = backoff.current_timeout_with_jitter();
        assert!(jittered > 900 && jittered <= 1500);
    }

    #[test]
    fn test_reset() {
        let mut rng = rng();
        let mut backoff = Backoff::new(500, 60000, 4);
        backoff.fire(0, &mut rng);
        backoff.fire(0, &mut rng);
        assert!(!backoff.timeout(1));

        backoff.reset();
        assert_eq!(backoff.count(), 0);
        assert_eq!(backoff.current_timeout(), 500);
        assert!(backoff.timeout(1));
    }

    #[test]
    fn test_timeout_across_tick_wraparound() {
        let mut rng = rng();
        let mut backoff = Backoff::new(100, 100, 0);
        backoff.fire(u32::max_value() - 50, &mut rng);
        assert!(!backoff.timeout(40));
        assert!(backoff.timeout(50));
    }
}
