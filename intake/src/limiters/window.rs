use std::sync::Arc;

use tracing::instrument;

use crate::api::Action;
use crate::prometheus::report_rate_limiter_fail_open;
use crate::redis::Client;
use crate::time::TimeSource;

pub const RATE_LIMIT_CACHE_KEY: &str = "@intake/rate-limit/";

/// Per-category submission thresholds over a fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLimits {
    pub window_secs: u64,
    pub rsvp: u64,
    pub payment: u64,
}

impl WindowLimits {
    pub fn threshold(&self, action: Action) -> u64 {
        match action {
            Action::Rsvp => self.rsvp,
            Action::Payment => self.payment,
        }
    }
}

impl Default for WindowLimits {
    fn default() -> Self {
        WindowLimits {
            window_secs: 60,
            rsvp: 50,
            payment: 20,
        }
    }
}

/// Fixed-window counter per action category, shared by every replica through
/// the counter store.
///
/// Counters are keyed by the window index, so a new window starts from zero
/// without any reset. The store stays off the critical path: when it cannot be
/// reached the submission goes through.
#[derive(Clone)]
pub struct SubmissionLimiter {
    redis: Arc<dyn Client + Send + Sync>,
    timesource: Arc<dyn TimeSource + Send + Sync>,
    key_prefix: String,
    limits: WindowLimits,
}

impl SubmissionLimiter {
    pub fn new(
        redis: Arc<dyn Client + Send + Sync>,
        timesource: Arc<dyn TimeSource + Send + Sync>,
        redis_key_prefix: Option<String>,
        limits: WindowLimits,
    ) -> SubmissionLimiter {
        SubmissionLimiter {
            redis,
            timesource,
            key_prefix: redis_key_prefix.unwrap_or_default(),
            limits: WindowLimits {
                // a zero window would divide by zero
                window_secs: limits.window_secs.max(1),
                ..limits
            },
        }
    }

    pub fn limits(&self) -> WindowLimits {
        self.limits
    }

    /// Counter key for the window the current time falls into.
    pub fn current_key(&self, action: Action) -> String {
        let window_secs = i64::try_from(self.limits.window_secs).unwrap_or(i64::MAX);
        let window = self.timesource.now().unix_timestamp().div_euclid(window_secs);
        format!(
            "{}{}{}/{}",
            self.key_prefix, RATE_LIMIT_CACHE_KEY, action, window
        )
    }

    /// Counts this submission and reports whether it went over the threshold.
    #[instrument(skip(self))]
    pub async fn is_limited(&self, action: Action) -> bool {
        let key = self.current_key(action);

        match self.redis.incr_window(key, self.limits.window_secs).await {
            Ok(count) => count > self.limits.threshold(action),
            Err(err) => {
                tracing::warn!(
                    action = action.as_str(),
                    "rate limiter counter unavailable, allowing submission: {}",
                    err
                );
                report_rate_limiter_fail_open(action);
                false
            }
        }
    }
}
