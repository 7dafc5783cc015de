//! Requests-per-minute throttle for provider calls.
//!
//! A token bucket of capacity 1, refilled every `60s / rpm`. The first token
//! is available immediately. `wait` is cancellable and fails fast once the
//! limiter is closed. Must be constructed inside a tokio runtime; the refill
//! ticker is a background task stopped by `close` (or drop).

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::generator::CancelToken;

const NANOS_PER_MINUTE: u64 = 60_000_000_000;

/// Why a `wait` did not return a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WaitError {
    #[error("rate limiter wait cancelled")]
    Cancelled,
    #[error("rate limiter closed")]
    Closed,
}

/// Token-bucket rate limiter. `rpm == 0` disables throttling entirely.
pub struct RateLimiter {
    inner: Option<Inner>,
}

struct Inner {
    tokens: Arc<Semaphore>,
    done: watch::Sender<bool>,
    ticker: JoinHandle<()>,
}

impl RateLimiter {
    /// Create a limiter for the given requests per minute.
    pub fn new(rpm: u32) -> Self {
        if rpm == 0 {
            return Self { inner: None };
        }

        let interval = Duration::from_nanos((NANOS_PER_MINUTE / u64::from(rpm)).max(1));
        // One token buffered up front so the first request never waits.
        let tokens = Arc::new(Semaphore::new(1));
        let (done_tx, mut done_rx) = watch::channel(false);

        let refill = Arc::clone(&tokens);
        let ticker = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The immediate first tick accounts for the preloaded token.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = done_rx.wait_for(|d| *d) => break,
                    _ = ticker.tick() => {
                        if refill.available_permits() == 0 && !refill.is_closed() {
                            refill.add_permits(1);
                        }
                    }
                }
            }
        });

        Self {
            inner: Some(Inner {
                tokens,
                done: done_tx,
                ticker,
            }),
        }
    }

    /// Block until a token is available, the cancel token fires, or the
    /// limiter is closed. A no-op when throttling is disabled.
    pub async fn wait(&self, cancel: &CancelToken) -> Result<(), WaitError> {
        let Some(inner) = &self.inner else {
            return Ok(());
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(WaitError::Cancelled),
            permit = inner.tokens.acquire() => match permit {
                Ok(permit) => {
                    permit.forget();
                    Ok(())
                }
                Err(_) => Err(WaitError::Closed),
            },
        }
    }

    /// Stop the refill ticker and fail pending and future waits. Idempotent.
    pub fn close(&self) {
        if let Some(inner) = &self.inner {
            let _ = inner.done.send(true);
            inner.tokens.close();
        }
    }

    /// Whether the limiter has been closed. Disabled limiters never close.
    pub fn is_closed(&self) -> bool {
        self.inner.as_ref().is_some_and(|i| i.tokens.is_closed())
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.close();
        if let Some(inner) = &self.inner {
            inner.ticker.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test]
    async fn disabled_limiter_never_waits() {
        let limiter = RateLimiter::new(0);
        let cancel = CancelToken::new();
        for _ in 0..100 {
            limiter.wait(&cancel).await.unwrap();
        }
        assert!(!limiter.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn first_token_is_immediate() {
        let limiter = RateLimiter::new(6); // one token per 10s
        let cancel = CancelToken::new();

        let start = Instant::now();
        limiter.wait(&cancel).await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn second_token_waits_for_refill() {
        let limiter = RateLimiter::new(60); // one token per second
        let cancel = CancelToken::new();

        let start = Instant::now();
        limiter.wait(&cancel).await.unwrap();
        limiter.wait(&cancel).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(900));
    }

    #[tokio::test(start_paused = true)]
    async fn bucket_capacity_is_one() {
        let limiter = RateLimiter::new(60);
        let cancel = CancelToken::new();

        // Let several refill intervals pass without consuming.
        tokio::time::sleep(Duration::from_secs(5)).await;

        // Only one token should be buffered: the second wait must block.
        let start = Instant::now();
        limiter.wait(&cancel).await.unwrap();
        limiter.wait(&cancel).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(900));
    }

    #[tokio::test]
    async fn cancel_unblocks_waiter() {
        let limiter = Arc::new(RateLimiter::new(1)); // one per minute
        let cancel = CancelToken::new();

        // Drain the preloaded token.
        limiter.wait(&cancel).await.unwrap();

        let waiter_limiter = Arc::clone(&limiter);
        let waiter_cancel = cancel.clone();
        let waiter =
            tokio::spawn(async move { waiter_limiter.wait(&waiter_cancel).await });

        cancel.cancel();
        let outcome = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, Err(WaitError::Cancelled));
    }

    #[tokio::test]
    async fn close_unblocks_waiter_and_is_idempotent() {
        let limiter = Arc::new(RateLimiter::new(1));
        let cancel = CancelToken::new();

        limiter.wait(&cancel).await.unwrap();

        let waiter_limiter = Arc::clone(&limiter);
        let waiter_cancel = cancel.clone();
        let waiter =
            tokio::spawn(async move { waiter_limiter.wait(&waiter_cancel).await });

        limiter.close();
        limiter.close();

        let outcome = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, Err(WaitError::Closed));

        // Subsequent waits fail immediately.
        assert_eq!(limiter.wait(&cancel).await, Err(WaitError::Closed));
        assert!(limiter.is_closed());
    }
}
