//! Per-endpoint token-bucket rate limiting
//!
//! This module handles:
//! - Lazily creating one bucket per logical endpoint key
//! - Suspending callers until enough tokens have accrued
//! - Sharing each bucket across every job that hits the same endpoint
//!
//! The first caller for a key fixes that bucket's rate and capacity. Later
//! callers asking for different parameters get the existing bucket.

mod bucket;

pub use bucket::{RateBucket, MIN_RATE_PER_SECOND};

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Endpoint key for general API requests
pub const API_REQUEST_ENDPOINT: &str = "api_request";

/// Endpoint key for single keyword searches
pub const KEYWORD_SEARCH_ENDPOINT: &str = "keyword_search";

/// Endpoint key for batch searches
pub const BATCH_SEARCH_ENDPOINT: &str = "batch_search";

/// Rate and capacity for one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct EndpointLimit {
    /// Tokens added per second
    pub rate: f64,

    /// Maximum burst size
    pub capacity: f64,
}

impl EndpointLimit {
    pub fn new(rate: f64, capacity: f64) -> Self {
        Self { rate, capacity }
    }
}

impl Default for EndpointLimit {
    fn default() -> Self {
        Self::new(2.0, 5.0)
    }
}

/// Built-in limits for the known endpoints
pub fn default_limits() -> HashMap<String, EndpointLimit> {
    HashMap::from([
        (API_REQUEST_ENDPOINT.to_string(), EndpointLimit::new(5.0, 10.0)),
        (KEYWORD_SEARCH_ENDPOINT.to_string(), EndpointLimit::new(2.0, 5.0)),
        (BATCH_SEARCH_ENDPOINT.to_string(), EndpointLimit::new(1.0, 3.0)),
    ])
}

/// Returned when an acquire is abandoned because its job was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireCancelled;

/// Shared registry of token buckets
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Arc<Mutex<RateBucket>>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until `tokens` are available on the bucket for `endpoint_key`
    ///
    /// # Arguments
    ///
    /// * `endpoint_key` - Logical endpoint the call is made against
    /// * `limit` - Rate and capacity used if the bucket does not exist yet
    /// * `tokens` - Tokens to debit
    pub async fn acquire(&self, endpoint_key: &str, limit: EndpointLimit, tokens: f64) {
        let never = CancellationToken::new();
        // An uncancelled token never fires, so this cannot fail.
        let _ = self.acquire_with_cancel(endpoint_key, limit, tokens, &never).await;
    }

    /// Waits for tokens like [`RateLimiter::acquire`], giving up on cancellation
    pub async fn acquire_with_cancel(
        &self,
        endpoint_key: &str,
        limit: EndpointLimit,
        tokens: f64,
        cancel: &CancellationToken,
    ) -> Result<(), AcquireCancelled> {
        let bucket = self.bucket(endpoint_key, limit);

        let tokens = {
            let guard = bucket.lock().unwrap_or_else(PoisonError::into_inner);
            if tokens > guard.capacity {
                tracing::warn!(
                    "Requested {} tokens from '{}' but capacity is {}; clamping",
                    tokens,
                    endpoint_key,
                    guard.capacity
                );
                guard.capacity
            } else {
                tokens
            }
        };

        loop {
            if cancel.is_cancelled() {
                return Err(AcquireCancelled);
            }

            let wait = {
                let mut guard = bucket.lock().unwrap_or_else(PoisonError::into_inner);
                match guard.try_acquire(tokens, Instant::now()) {
                    Ok(()) => return Ok(()),
                    Err(wait) => wait,
                }
            };

            tracing::trace!("Waiting {:?} for {} token(s) on '{}'", wait, tokens, endpoint_key);

            tokio::select! {
                _ = cancel.cancelled() => return Err(AcquireCancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Returns a copy of the bucket for `endpoint_key`, if one exists
    pub fn bucket_snapshot(&self, endpoint_key: &str) -> Option<RateBucket> {
        let buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        buckets.get(endpoint_key).map(|bucket| {
            let mut snapshot = bucket.lock().unwrap_or_else(PoisonError::into_inner).clone();
            snapshot.refill(Instant::now());
            snapshot
        })
    }

    fn bucket(&self, endpoint_key: &str, limit: EndpointLimit) -> Arc<Mutex<RateBucket>> {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = buckets.get(endpoint_key) {
            let guard = existing.lock().unwrap_or_else(PoisonError::into_inner);
            if guard.rate_per_second != limit.rate || guard.capacity != limit.capacity {
                tracing::debug!(
                    "Bucket '{}' keeps rate={} capacity={}; ignoring rate={} capacity={}",
                    endpoint_key,
                    guard.rate_per_second,
                    guard.capacity,
                    limit.rate,
                    limit.capacity
                );
            }
            return Arc::clone(existing);
        }

        if !(limit.rate.is_finite() && limit.rate > 0.0) {
            tracing::warn!(
                "Bucket '{}' has unusable rate {}; refilling at {} tokens/s",
                endpoint_key,
                limit.rate,
                MIN_RATE_PER_SECOND
            );
        }

        tracing::debug!(
            "Creating bucket '{}' with rate={} capacity={}",
            endpoint_key,
            limit.rate,
            limit.capacity
        );
        let bucket = Arc::new(Mutex::new(RateBucket::new(
            endpoint_key,
            limit.rate,
            limit.capacity,
            Instant::now(),
        )));
        buckets.insert(endpoint_key.to_string(), Arc::clone(&bucket));
        bucket
    }
}
