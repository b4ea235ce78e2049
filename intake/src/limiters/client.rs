//! Per-client-IP burst protection, applied before the category limiter so a
//! single noisy form cannot use up the whole category budget on its own.
//!
//! State is local to each replica, which is fine for a coarse spam guard.
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{clock, state::keyed::DefaultKeyedStateStore, Quota, RateLimiter};
use rand::Rng;

use crate::prometheus::report_client_limiter_keys;

// See: https://docs.rs/governor/latest/governor/_guide/index.html#usage-in-multiple-threads
#[derive(Clone)]
pub struct ClientLimiter {
    limiter: Arc<RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, clock::DefaultClock>>,
}

impl ClientLimiter {
    pub fn new(per_second: NonZeroU32, burst: NonZeroU32) -> Self {
        let quota = Quota::per_second(per_second).allow_burst(burst);
        let limiter = Arc::new(governor::RateLimiter::dashmap(quota));

        ClientLimiter { limiter }
    }

    pub fn is_limited(&self, ip: &IpAddr) -> bool {
        self.limiter.check_key(ip).is_err()
    }

    /// Reports the number of tracked addresses every 10 seconds,
    /// needs to be spawned in a separate task.
    pub async fn report_metrics(&self) {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(10));
        loop {
            interval.tick().await;
            report_client_limiter_keys(self.limiter.len());
        }
    }

    /// Forgets addresses that are back to a full burst, about once per minute.
    pub async fn clean_state(&self) {
        // Jitter so replicas don't all take the shard locks at the same time
        let interval_secs = rand::thread_rng().gen_range(60..70);

        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;

            self.limiter.retain_recent();
            self.limiter.shrink_to_fit();
        }
    }
}
