//! Cooperative timer abstraction: wraps `tokio::time::interval` behind a
//! trait so cycle drivers can be tested without waiting on real wall-clock
//! time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;

/// Cooperative clock: everything that would otherwise call `tokio::time::sleep`
/// goes through here, so tests can swap in a `ManualClock`.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    async fn sleep(&self, duration: Duration);
}

/// Real wall-clock time, backed by `tokio::time`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Fixed-interval ticker with an optional immediate first tick and
/// cooperative cancellation. One instance drives exactly one long-lived
/// loop.
pub struct Ticker {
    clock: Arc<dyn Clock>,
    interval: Duration,
    immediate_first_tick: bool,
    cancelled: Arc<Notify>,
    stopped: std::sync::atomic::AtomicBool,
}

impl Ticker {
    pub fn new(clock: Arc<dyn Clock>, interval: Duration, immediate_first_tick: bool) -> Self {
        Self {
            clock,
            interval,
            immediate_first_tick,
            cancelled: Arc::new(Notify::new()),
            stopped: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Wait for the next tick, or `None` if cancelled first.
    pub async fn tick(&self, first: bool) -> Option<()> {
        if self.stopped.load(std::sync::atomic::Ordering::Acquire) {
            return None;
        }
        if first && self.immediate_first_tick {
            return Some(());
        }
        tokio::select! {
            _ = self.clock.sleep(self.interval) => Some(()),
            _ = self.cancelled.notified() => None,
        }
    }

    pub fn cancel(&self) {
        self.stopped.store(true, std::sync::atomic::Ordering::Release);
        self.cancelled.notify_waiters();
    }
}

/// A clock driven explicitly by test code: `now()` never advances on its
/// own, and `sleep` resolves as soon as the test calls `advance`.
#[cfg(test)]
pub mod fake {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::broadcast;

    pub struct ManualClock {
        now: Mutex<DateTime<Utc>>,
        tx: broadcast::Sender<()>,
    }

    impl ManualClock {
        pub fn new(start: DateTime<Utc>) -> Arc<Self> {
            let (tx, _) = broadcast::channel(16);
            Arc::new(Self {
                now: Mutex::new(start),
                tx,
            })
        }

        pub fn advance(&self, by: Duration) {
            let mut now = self.now.lock().unwrap();
            *now = *now + chrono::Duration::from_std(by).unwrap();
            let _ = self.tx.send(());
        }
    }

    #[async_trait]
    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }

        async fn sleep(&self, _duration: Duration) {
            let mut rx = self.tx.subscribe();
            let _ = rx.recv().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn immediate_first_tick_does_not_wait() {
        let ticker = Ticker::new(Arc::new(SystemClock), Duration::from_secs(3600), true);
        let result = tokio::time::timeout(Duration::from_millis(50), ticker.tick(true)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn cancel_unblocks_pending_tick() {
        let ticker = Arc::new(Ticker::new(Arc::new(SystemClock), Duration::from_secs(3600), false));
        let t2 = ticker.clone();
        let handle = tokio::spawn(async move { t2.tick(false).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        ticker.cancel();
        let result = tokio::time::timeout(Duration::from_millis(100), handle)
            .await
            .expect("task should finish promptly")
            .unwrap();
        assert_eq!(result, None);
    }
}
