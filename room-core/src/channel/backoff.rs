//! Reconnect backoff

use std::time::Duration;

use rand::Rng;

/// First retry delay
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Longest wait between two attempts
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Consecutive failed attempts before giving up
const DEFAULT_MAX_RETRIES: u32 = 10;

/// Highest exponent used for doubling (keeps the shift well inside u32)
const MAX_EXPONENT: u32 = 16;

/// Reconnect policy for the room channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// 0 disables reconnecting entirely
    pub max_retries: u32,
    /// Spread delays by ±20% so a room's members don't reconnect in lockstep
    pub jitter: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
            jitter: true,
        }
    }
}

/// Exponential backoff over consecutive failures
#[derive(Debug)]
pub struct Backoff {
    config: ReconnectConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Number of retries handed out since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Forget past failures (after a successful connection)
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Delay before attempt `attempt` (1-based), without jitter
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_EXPONENT);
        self.config
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.config.max_delay)
    }

    /// Delay before the next attempt, or `None` once retries are exhausted
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.config.max_retries {
            return None;
        }
        self.attempt += 1;

        let delay = self.base_delay_for(self.attempt);
        if !self.config.jitter {
            return Some(delay);
        }

        let factor = rand::thread_rng().gen_range(0.8..=1.2);
        Some(delay.mul_f64(factor).min(self.config.max_delay))
    }
}
