//! Jittered exponential backoff (C4) for upstream reconnect attempts.

use std::time::Duration;

use rand::Rng;

use crate::config::UpstreamConfig;

/// Produces successive backoff delays that grow exponentially up to a cap,
/// with symmetric jitter applied to each, and reset on successful connect.
pub struct ExponentialBackoff {
    initial_ms: u64,
    multiplier: f64,
    cap_ms: u64,
    jitter_fraction: f64,
    attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(config: &UpstreamConfig) -> Self {
        Self {
            initial_ms: config.backoff_initial_ms,
            multiplier: config.backoff_multiplier,
            cap_ms: config.backoff_cap_ms,
            jitter_fraction: config.backoff_jitter_fraction,
            attempt: 0,
        }
    }

    /// Returns the next delay and advances the internal attempt counter.
    pub fn next(&mut self) -> Duration {
        let base = (self.initial_ms as f64 * self.multiplier.powi(self.attempt as i32))
            .min(self.cap_ms as f64);
        self.attempt += 1;

        let jitter_span = base * self.jitter_fraction;
        let jittered = if jitter_span > 0.0 {
            let offset = rand::thread_rng().gen_range(-jitter_span..=jitter_span);
            (base + offset).max(0.0)
        } else {
            base
        };

        Duration::from_millis(jittered.round() as u64)
    }

    /// Resets the attempt counter after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> UpstreamConfig {
        let mut c = UpstreamConfig::default();
        c.backoff_initial_ms = 500;
        c.backoff_multiplier = 2.0;
        c.backoff_cap_ms = 15_000;
        c.backoff_jitter_fraction = 0.2;
        c
    }

    #[test]
    fn first_delay_is_near_initial_with_jitter() {
        let mut backoff = ExponentialBackoff::new(&config());
        let delay = backoff.next().as_millis() as f64;
        assert!(delay >= 400.0 && delay <= 600.0, "delay was {delay}");
    }

    #[test]
    fn delay_grows_and_caps() {
        let mut backoff = ExponentialBackoff::new(&config());
        for _ in 0..20 {
            let delay = backoff.next().as_millis() as u64;
            assert!(delay <= 15_000 + (15_000 / 5));
        }
        assert!(backoff.attempt() == 20);
    }

    #[test]
    fn reset_restarts_from_initial() {
        let mut backoff = ExponentialBackoff::new(&config());
        backoff.next();
        backoff.next();
        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        let delay = backoff.next().as_millis() as f64;
        assert!(delay >= 400.0 && delay <= 600.0);
    }

    #[test]
    fn zero_jitter_fraction_is_deterministic() {
        let mut config = config();
        config.backoff_jitter_fraction = 0.0;
        let mut backoff = ExponentialBackoff::new(&config);
        assert_eq!(backoff.next().as_millis(), 500);
        assert_eq!(backoff.next().as_millis(), 1000);
        assert_eq!(backoff.next().as_millis(), 2000);
    }
}
