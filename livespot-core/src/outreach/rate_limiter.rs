// livespot-core/src/outreach/rate_limiter.rs

use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::time::Instant;

use livespot_common::traits::OutreachRepository;

use crate::config::OutreachConfig;
use crate::utils::time::{hours_ago, jst_day_start};
use crate::Error;

/// Minimum inter-send interval, per-account daily cap and per-user cooldown.
///
/// The interval is enforced in-process. The other two are reads against the
/// queue's history and are only as strong as a single sender per account.
pub struct RateLimiter {
    interval: Duration,
    daily_limit: i64,
    cooldown_hours: i64,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration, daily_limit: i64, cooldown_hours: i64) -> Self {
        Self {
            interval,
            daily_limit,
            cooldown_hours,
            next_slot: Mutex::new(None),
        }
    }

    pub fn from_config(config: &OutreachConfig) -> Self {
        Self::new(config.send_interval, config.daily_limit, config.user_cooldown_hours)
    }

    pub fn daily_limit(&self) -> i64 {
        self.daily_limit
    }

    /// Reserves the next send slot and sleeps until it opens. Concurrent
    /// callers get consecutive slots.
    pub async fn wait_for_slot(&self) {
        let slot = {
            let mut next = self.next_slot.lock();
            let now = Instant::now();
            let slot = match *next {
                Some(t) if t > now => t,
                _ => now,
            };
            *next = Some(slot + self.interval);
            slot
        };
        tokio::time::sleep_until(slot).await;
    }

    /// Successful sends since JST midnight.
    pub async fn sent_today(&self, repo: &dyn OutreachRepository, account_id: &str) -> Result<i64, Error> {
        repo.count_sent_since(account_id, jst_day_start(Utc::now())).await
    }

    pub async fn is_daily_limit_reached(
        &self,
        repo: &dyn OutreachRepository,
        account_id: &str,
    ) -> Result<bool, Error> {
        Ok(self.sent_today(repo, account_id).await? >= self.daily_limit)
    }

    /// A successful send to the same user from the same cast inside the window.
    /// A zero or negative window disables the check.
    pub async fn is_user_on_cooldown(
        &self,
        repo: &dyn OutreachRepository,
        account_id: &str,
        cast_name: &str,
        user_name: &str,
    ) -> Result<bool, Error> {
        if self.cooldown_hours <= 0 {
            return Ok(false);
        }
        let since = hours_ago(Utc::now(), self.cooldown_hours);
        repo.has_recent_success(account_id, cast_name, user_name, since).await
    }
}
