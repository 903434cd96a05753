//! Wall-clock and suspension source for expiry math and polling.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

/// Time source used by the token store and the poll loop.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;

    /// Suspend the calling task without blocking a worker thread.
    async fn sleep(&self, duration: Duration);
}

/// Real clock backed by `chrono` and the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
