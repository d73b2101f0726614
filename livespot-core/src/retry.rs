//! Per-key exponential backoff with jitter.
//!
//! Every reconnect and refresh path shares one [`RetryTracker`]. Keys name the
//! thing being retried (`stream:{cast}`, `auth:refresh`, `viewers:{cast}`), so
//! a successful credential refresh can clear all stream counters at once with
//! [`RetryTracker::reset_by_prefix`].

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::store::{remove_by_prefix, KeyedStore, MemoryStore};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

#[derive(Clone)]
pub struct RetryTracker {
    config: RetryConfig,
    failures: Arc<dyn KeyedStore<String, u32>>,
}

impl RetryTracker {
    pub fn new(config: RetryConfig) -> Self {
        Self::with_store(config, MemoryStore::shared())
    }

    pub fn with_store(config: RetryConfig, failures: Arc<dyn KeyedStore<String, u32>>) -> Self {
        Self { config, failures }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn failure_count(&self, key: &str) -> u32 {
        self.failures.get(&key.to_string()).unwrap_or(0)
    }

    /// `min(base * 2^failures, max)` without jitter.
    pub fn backoff_base(&self, key: &str) -> Duration {
        let count = self.failure_count(key);
        let base_ms = self.config.base_delay.as_millis() as u64;
        let max_ms = self.config.max_delay.as_millis() as u64;
        let ms = 2u64
            .checked_pow(count)
            .and_then(|factor| base_ms.checked_mul(factor))
            .unwrap_or(u64::MAX)
            .min(max_ms);
        Duration::from_millis(ms)
    }

    /// Backoff for the next attempt, with 10-30% jitter added.
    pub fn get_delay(&self, key: &str) -> Duration {
        let fraction = rand::rng().random_range(0.1..=0.3);
        with_jitter(self.backoff_base(key), fraction)
    }

    /// Counts a failure. Returns false once the count exceeds `max_retries`.
    pub fn record_failure(&self, key: &str) -> bool {
        let count = self.failures.upsert(key.to_string(), 0, &mut |c| *c += 1);
        if count > self.config.max_retries {
            warn!("[Retry] {} exhausted after {} failures", key, count);
            false
        } else {
            debug!("[Retry] {} failure #{}", key, count);
            true
        }
    }

    pub fn record_success(&self, key: &str) {
        self.failures.remove(&key.to_string());
    }

    pub fn should_retry(&self, key: &str) -> bool {
        self.failure_count(key) <= self.config.max_retries
    }

    pub fn reset(&self, key: &str) {
        self.failures.remove(&key.to_string());
    }

    pub fn reset_by_prefix(&self, prefix: &str) -> usize {
        let removed = remove_by_prefix(self.failures.as_ref(), prefix);
        if removed > 0 {
            debug!("[Retry] cleared {} counters under '{}'", removed, prefix);
        }
        removed
    }
}

impl Default for RetryTracker {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

fn with_jitter(base: Duration, fraction: f64) -> Duration {
    base + base.mul_f64(fraction)
}
