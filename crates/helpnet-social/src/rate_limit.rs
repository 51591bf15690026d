//! Per-provider token buckets.
//!
//! Each provider gets its own bucket behind a `tokio::sync::Mutex`. The mutex
//! queues waiters in FIFO order and a waiter keeps the lock while it sleeps
//! for its token, so callers are served strictly in arrival order.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex},
  time::Duration,
};

use helpnet_core::provider::{Provider, RateLimitPolicy};
use tokio::time::Instant;

use crate::{Error, Result};

/// Longest a caller waits for a token when no bound is configured.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(120);

#[derive(Debug)]
struct Bucket {
  tokens:   f64,
  capacity: f64,
  /// Tokens per second.
  rate:     f64,
  last:     Instant,
}

impl Bucket {
  fn new(policy: RateLimitPolicy) -> Self {
    let capacity = f64::from(policy.capacity());
    Self {
      tokens: capacity,
      capacity,
      rate: f64::from(policy.per_minute) / 60.0,
      last: Instant::now(),
    }
  }

  fn refill(&mut self, now: Instant) {
    let elapsed = now.saturating_duration_since(self.last).as_secs_f64();
    self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
    self.last = now;
  }

  /// Time until one whole token is available; `None` if it never will be.
  fn shortfall(&self) -> Option<Duration> {
    if self.tokens >= 1.0 {
      return Some(Duration::ZERO);
    }
    if self.rate <= 0.0 {
      return None;
    }
    Some(Duration::from_secs_f64((1.0 - self.tokens) / self.rate))
  }
}

#[derive(Debug)]
pub struct RateLimiter {
  buckets:  Mutex<HashMap<String, Arc<tokio::sync::Mutex<Bucket>>>>,
  max_wait: Duration,
}

impl Default for RateLimiter {
  fn default() -> Self { Self::new(DEFAULT_MAX_WAIT) }
}

impl RateLimiter {
  pub fn new(max_wait: Duration) -> Self {
    Self { buckets: Mutex::new(HashMap::new()), max_wait }
  }

  fn bucket(&self, provider: &Provider) -> Arc<tokio::sync::Mutex<Bucket>> {
    let mut buckets = self
      .buckets
      .lock()
      .unwrap_or_else(std::sync::PoisonError::into_inner);
    Arc::clone(
      buckets
        .entry(provider.id.clone())
        .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(Bucket::new(provider.rate_limit)))),
    )
  }

  /// Take one token from the provider's bucket, waiting in line if it is
  /// empty. Fails with [`Error::RateLimitTimeout`] once `max_wait` elapses.
  pub async fn acquire(&self, provider: &Provider) -> Result<()> {
    let bucket = self.bucket(provider);
    let started = Instant::now();

    let take = async {
      let mut bucket = bucket.lock().await;
      bucket.refill(Instant::now());
      match bucket.shortfall() {
        Some(wait) if !wait.is_zero() => {
          tracing::debug!(provider = %provider.id, ?wait, "waiting for rate limit");
          tokio::time::sleep(wait).await;
          bucket.refill(Instant::now());
        }
        Some(_) => {}
        None => std::future::pending::<()>().await,
      }
      bucket.tokens = (bucket.tokens - 1.0).max(0.0);
    };

    tokio::time::timeout(self.max_wait, take)
      .await
      .map_err(|_| Error::RateLimitTimeout {
        provider_id: provider.id.clone(),
        waited:      started.elapsed(),
      })
  }
}
