use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::time::timeout;

const REDIS_TIMEOUT_MILLISECS: u64 = 100;

/// A simple counter store wrapper, exposing only the commands the limiters use.
/// Allows for testing + injecting failures.
#[async_trait]
pub trait Client {
    /// Increments `key` and returns the new count. The key expires `ttl_secs`
    /// after it was first created.
    async fn incr_window(&self, key: String, ttl_secs: u64) -> Result<u64>;
}

pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub fn new(addr: String) -> Result<RedisClient> {
        let client = redis::Client::open(addr)?;

        Ok(RedisClient { client })
    }
}

#[async_trait]
impl Client for RedisClient {
    async fn incr_window(&self, key: String, ttl_secs: u64) -> Result<u64> {
        let mut conn = self.client.get_async_connection().await?;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .incr(&key, 1u64)
            .expire(&key, ttl_secs as usize)
            .ignore();
        let results = pipe.query_async::<_, (u64,)>(&mut conn);
        let (count,) = timeout(Duration::from_millis(REDIS_TIMEOUT_MILLISECS), results).await??;

        Ok(count)
    }
}

/// Process-local counters, used when no redis is configured. Only correct for
/// a single replica.
#[derive(Clone, Default)]
pub struct LocalClient {
    counters: Arc<Mutex<HashMap<String, (u64, Instant)>>>,
}

impl LocalClient {
    pub fn new() -> LocalClient {
        LocalClient::default()
    }
}

#[async_trait]
impl Client for LocalClient {
    async fn incr_window(&self, key: String, ttl_secs: u64) -> Result<u64> {
        let now = Instant::now();
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| anyhow!("local counter lock poisoned"))?;
        counters.retain(|_, (_, expires_at)| *expires_at > now);

        let (count, _) = counters
            .entry(key)
            .or_insert((0, now + Duration::from_secs(ttl_secs)));
        *count += 1;
        Ok(*count)
    }
}

// Hand-rolled rather than mockall, to inject failures on the fail-open paths
#[derive(Clone, Default)]
pub struct MockRedisClient {
    counters: Arc<Mutex<HashMap<String, u64>>>,
    failing: bool,
}

impl MockRedisClient {
    pub fn new() -> MockRedisClient {
        MockRedisClient::default()
    }

    /// Every command fails, as if the server were unreachable.
    pub fn failing() -> MockRedisClient {
        MockRedisClient {
            failing: true,
            ..Default::default()
        }
    }

    pub fn set_count(&mut self, key: &str, count: u64) -> Self {
        if let Ok(mut counters) = self.counters.lock() {
            counters.insert(key.to_owned(), count);
        }
        self.clone()
    }

    pub fn keys(&self) -> Vec<String> {
        match self.counters.lock() {
            Ok(counters) => counters.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }
}

#[async_trait]
impl Client for MockRedisClient {
    async fn incr_window(&self, key: String, _ttl_secs: u64) -> Result<u64> {
        if self.failing {
            return Err(anyhow!("connection refused"));
        }
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| anyhow!("mock lock poisoned"))?;
        let count = counters.entry(key).or_insert(0);
        *count += 1;
        Ok(*count)
    }
}
