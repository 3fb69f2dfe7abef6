//! Adaptive rate limiter (C3).
//!
//! Tracks a penalty level that escalates on each observed rate-limit signal
//! and decays on sustained success, gating whether the session may send the
//! next client audio chunk upstream.

use std::time::{Duration, Instant};

use crate::protocol_constants::{
    RATE_LIMITER_MAX_LEVEL, RATE_LIMITER_PENALTY_BASE_MS, RATE_LIMITER_PENALTY_OFFSET_MS,
};

/// Gates outbound sends based on an escalating/decaying penalty level.
pub struct AdaptiveRateLimiter {
    level: u8,
    blocked_until: Option<Instant>,
    consecutive_successes: u32,
}

impl AdaptiveRateLimiter {
    pub fn new() -> Self {
        Self {
            level: 0,
            blocked_until: None,
            consecutive_successes: 0,
        }
    }

    /// Returns `true` if a send is currently allowed.
    pub fn allow_send(&self, now: Instant) -> bool {
        match self.blocked_until {
            Some(until) => now >= until,
            None => true,
        }
    }

    /// Time remaining (ms) until the next send is allowed, 0 if allowed now.
    pub fn retry_after_ms(&self, now: Instant) -> u64 {
        match self.blocked_until {
            Some(until) if until > now => (until - now).as_millis() as u64,
            _ => 0,
        }
    }

    /// Records a rate-limit signal from upstream, escalating the penalty
    /// level (capped) and resetting the success streak.
    pub fn mark_rate_limited(&mut self, now: Instant) {
        self.level = (self.level + 1).min(RATE_LIMITER_MAX_LEVEL);
        self.consecutive_successes = 0;
        let penalty_ms = RATE_LIMITER_PENALTY_BASE_MS * self.level as u64
            + RATE_LIMITER_PENALTY_OFFSET_MS;
        self.blocked_until = Some(now + Duration::from_millis(penalty_ms));
        log::warn!(
            "[RateLimiter] escalated to level {} ({}ms penalty)",
            self.level,
            penalty_ms
        );
    }

    /// Records a successful send. After enough consecutive successes the
    /// penalty level decays by one step.
    pub fn mark_success(&mut self) {
        if self.level == 0 {
            return;
        }
        self.consecutive_successes += 1;
        if self.consecutive_successes >= 10 {
            self.level -= 1;
            self.consecutive_successes = 0;
            log::debug!("[RateLimiter] decayed to level {}", self.level);
        }
    }

    pub fn level(&self) -> u8 {
        self.level
    }
}

impl Default for AdaptiveRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_send_initially() {
        let limiter = AdaptiveRateLimiter::new();
        assert!(limiter.allow_send(Instant::now()));
    }

    #[test]
    fn rate_limit_blocks_sends_until_penalty_elapses() {
        let mut limiter = AdaptiveRateLimiter::new();
        let now = Instant::now();
        limiter.mark_rate_limited(now);
        assert!(!limiter.allow_send(now));
        assert!(limiter.allow_send(now + Duration::from_millis(2000)));
    }

    #[test]
    fn level_escalates_and_caps() {
        let mut limiter = AdaptiveRateLimiter::new();
        let now = Instant::now();
        for _ in 0..10 {
            limiter.mark_rate_limited(now);
        }
        assert_eq!(limiter.level(), RATE_LIMITER_MAX_LEVEL);
    }

    #[test]
    fn sustained_success_decays_level() {
        let mut limiter = AdaptiveRateLimiter::new();
        limiter.mark_rate_limited(Instant::now());
        assert_eq!(limiter.level(), 1);
        for _ in 0..10 {
            limiter.mark_success();
        }
        assert_eq!(limiter.level(), 0);
    }

    #[test]
    fn success_at_level_zero_is_a_no_op() {
        let mut limiter = AdaptiveRateLimiter::new();
        limiter.mark_success();
        assert_eq!(limiter.level(), 0);
    }
}
