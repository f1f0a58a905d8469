use std::time::Duration;
use rand::Rng;
use serde::Deserialize;

/// Reconnect timing of the push subscriber.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponent: f64,
    /// Fraction of the delay that may be randomly added or removed, 0.0..=1.0
    pub jitter: f64,
    /// `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            min_delay_ms: 1000,
            max_delay_ms: 3000,
            exponent: 2.0,
            jitter: 0.5,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Un-jittered delay before attempt number `attempt` (0-based).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let max = self.max_delay_ms as f64;
        let ms = self.min_delay_ms as f64 * self.exponent.powi(attempt.min(i32::MAX as u32) as i32);
        let ms = if ms.is_finite() { ms.min(max) } else { max };
        Duration::from_millis(ms.max(0.0) as u64)
    }
}

/// Attempt counter driving the reconnect delays.
#[derive(Debug)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Called on every successful open.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Delay before the next attempt, or `None` once `max_attempts` is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.next_delay_with(&mut rand::rng())
    }

    pub fn next_delay_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<Duration> {
        if let Some(max) = self.policy.max_attempts {
            if self.attempt >= max {
                return None;
            }
        }

        let base = self.policy.base_delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);

        let jitter = self.policy.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return Some(base);
        }

        let deviation = base.mul_f64(rng.random::<f64>() * jitter);
        let delay = if rng.random_bool(0.5) {
            base.saturating_sub(deviation)
        } else {
            base + deviation
        };
        Some(delay.min(Duration::from_millis(self.policy.max_delay_ms)))
    }
}
