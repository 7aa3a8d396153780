//! Structured, append-only decision log. Writes are
//! batched in memory and flushed to the `Store` either when the batch fills
//! or on an explicit `shutdown`/`flush` call — batching must never risk
//! losing a decision across a graceful shutdown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use crate::domain::{Decision, Trade};
use crate::errors::StoreError;
use crate::store::Store;

pub struct DecisionLogger {
    store: Arc<dyn Store>,
    buffer: Mutex<Vec<(Decision, Option<Trade>)>>,
    batch_size: usize,
    batches_flushed: AtomicU64,
    decisions_logged: AtomicU64,
}

impl DecisionLogger {
    pub fn new(store: Arc<dyn Store>, batch_size: usize) -> Self {
        Self {
            store,
            buffer: Mutex::new(Vec::with_capacity(batch_size)),
            batch_size: batch_size.max(1),
            batches_flushed: AtomicU64::new(0),
            decisions_logged: AtomicU64::new(0),
        }
    }

    /// Queue a Decision (and its simulated trade, if the decision produced
    /// one) for persistence. Flushes immediately once the batch fills.
    pub async fn log(&self, decision: Decision, trade: Option<Trade>) {
        self.decisions_logged.fetch_add(1, Ordering::Relaxed);
        let mut buffer = self.buffer.lock().await;
        buffer.push((decision, trade));
        if buffer.len() >= self.batch_size {
            self.flush_locked(&mut buffer).await;
        }
    }

    /// Force a flush regardless of batch fill level. Call on graceful
    /// shutdown so no buffered decision is lost.
    pub async fn flush(&self) {
        let mut buffer = self.buffer.lock().await;
        if !buffer.is_empty() {
            self.flush_locked(&mut buffer).await;
        }
    }

    async fn flush_locked(&self, buffer: &mut Vec<(Decision, Option<Trade>)>) {
        let batch = std::mem::take(buffer);
        let batch_len = batch.len();
        for (decision, trade) in batch {
            if let Err(err) = self.store.append_decision(decision, trade).await {
                self.report_store_error(err);
            }
        }
        if batch_len > 0 {
            self.batches_flushed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn report_store_error(&self, err: StoreError) {
        // StoreError is recovered locally: the decision stays
        // lost for this flush but the logger itself keeps running.
        warn!(error = %err, "decision logger failed to persist a batch entry");
    }

    pub fn batches_flushed(&self) -> u64 {
        self.batches_flushed.load(Ordering::Relaxed)
    }

    pub fn decisions_logged(&self) -> u64 {
        self.decisions_logged.load(Ordering::Relaxed)
    }

    /// Graceful shutdown: flush whatever remains buffered.
    pub async fn shutdown(&self) {
        self.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AgentId, DecisionType, Goal, GoalTree};
    use crate::store::InMemoryStore;

    fn decision(cycle_id: &str) -> Decision {
        Decision::builder(
            "d1".into(),
            AgentId::new("agent"),
            cycle_id.into(),
            DecisionType::ExpertMethodologyIntegration,
            GoalTree::new(Goal::new("p", "d", 1.0)),
            0.8,
            chrono::Utc::now(),
        )
        .build()
    }

    #[tokio::test]
    async fn flush_on_shutdown_persists_buffered_decisions() {
        let store = Arc::new(InMemoryStore::new());
        let logger = DecisionLogger::new(store.clone(), 10);
        logger.log(decision("c0"), None).await;
        assert_eq!(logger.batches_flushed(), 0);

        logger.shutdown().await;
        assert_eq!(logger.batches_flushed(), 1);

        let executions = store.list_recent_trades(10).await.unwrap();
        assert!(executions.is_empty());
    }

    #[tokio::test]
    async fn batch_fills_and_flushes_automatically() {
        let store = Arc::new(InMemoryStore::new());
        let logger = DecisionLogger::new(store, 2);
        logger.log(decision("c0"), None).await;
        logger.log(decision("c0"), None).await;
        assert_eq!(logger.batches_flushed(), 1);
        assert_eq!(logger.decisions_logged(), 2);
    }
}
