//! Exponential retry delay with jitter.

use std::time::Duration;

use rand::Rng;

/// Relative jitter applied to every delay (±20%).
const JITTER: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap: cap.max(base),
            attempt: 0,
        }
    }

    /// Failures since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay before the next retry. Never exceeds the cap.
    pub fn next_delay(&mut self) -> Duration {
        let exp = self.base.saturating_mul(2u32.saturating_pow(self.attempt.min(16)));
        let nominal = exp.min(self.cap);
        self.attempt = self.attempt.saturating_add(1);

        let factor = 1.0 + rand::thread_rng().gen_range(-JITTER..=JITTER);
        nominal.mul_f64(factor).min(self.cap)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
