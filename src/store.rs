//! Persistence adapter. The trait is intentionally not
//! SQL-specific: `InMemoryStore` backs tests and the in-memory decision
//! buffer used for `StoreError` recovery; `SledStore` is the one real
//! backend.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::domain::{
    AgentExecutionRecord, Decision, MarketSnapshot, PerformanceMetrics, Portfolio, Signal,
    SignalKind, SourceMetricMap, Trade,
};
use crate::errors::StoreError;

#[async_trait]
pub trait Store: Send + Sync {
    async fn read_portfolio(&self) -> Result<Portfolio, StoreError>;
    async fn write_portfolio(&self, portfolio: Portfolio) -> Result<(), StoreError>;
    async fn append_portfolio_snapshot(&self, snapshot: MarketSnapshot) -> Result<(), StoreError>;

    async fn append_agent_execution(&self, record: AgentExecutionRecord) -> Result<(), StoreError>;

    /// Persists a Decision and its ExecutionResult as one logical commit
    ///.
    async fn append_decision(&self, decision: Decision, trade: Option<Trade>) -> Result<(), StoreError>;

    async fn append_signal(&self, kind: SignalKind, signal: Signal) -> Result<(), StoreError>;

    async fn read_source_metrics(&self) -> Result<SourceMetricMap, StoreError>;
    async fn write_source_metrics(&self, metrics: SourceMetricMap) -> Result<(), StoreError>;

    async fn list_agent_executions(
        &self,
        agent_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AgentExecutionRecord>, StoreError>;

    async fn list_recent_trades(&self, limit: usize) -> Result<Vec<Trade>, StoreError>;

    async fn read_performance_metrics(&self) -> Result<PerformanceMetrics, StoreError>;
}

/// In-process store; the default DSN (`memory://`) and what every unit
/// test uses. Not durable across restarts.
pub struct InMemoryStore {
    inner: Mutex<InMemoryState>,
}

#[derive(Default)]
struct InMemoryState {
    portfolio: Option<Portfolio>,
    portfolio_history: Vec<MarketSnapshot>,
    agent_executions: Vec<AgentExecutionRecord>,
    decisions: Vec<Decision>,
    trades: Vec<Trade>,
    signals: HashMap<SignalKind, Vec<Signal>>,
    source_metrics: SourceMetricMap,
    performance: PerformanceMetrics,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(InMemoryState::default()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn read_portfolio(&self) -> Result<Portfolio, StoreError> {
        self.inner
            .lock()
            .portfolio
            .ok_or_else(|| StoreError::Constraint("portfolio not yet initialized".into()))
    }

    async fn write_portfolio(&self, portfolio: Portfolio) -> Result<(), StoreError> {
        self.inner.lock().portfolio = Some(portfolio);
        Ok(())
    }

    async fn append_portfolio_snapshot(&self, snapshot: MarketSnapshot) -> Result<(), StoreError> {
        self.inner.lock().portfolio_history.push(snapshot);
        Ok(())
    }

    async fn append_agent_execution(&self, record: AgentExecutionRecord) -> Result<(), StoreError> {
        let mut state = self.inner.lock();
        let prior_total = state.performance.total_executions;
        state.performance.total_executions += 1;
        if record.success {
            state.performance.successful_executions += 1;
        }
        state.performance.average_quality_score = (state.performance.average_quality_score
            * prior_total as f64
            + record.quality_score)
            / state.performance.total_executions as f64;
        state.agent_executions.push(record);
        Ok(())
    }

    async fn append_decision(&self, decision: Decision, trade: Option<Trade>) -> Result<(), StoreError> {
        let mut state = self.inner.lock();
        if let Some(trade) = trade {
            state.trades.push(trade);
        }
        state.decisions.push(decision);
        Ok(())
    }

    async fn append_signal(&self, kind: SignalKind, signal: Signal) -> Result<(), StoreError> {
        self.inner.lock().signals.entry(kind).or_default().push(signal);
        Ok(())
    }

    async fn read_source_metrics(&self) -> Result<SourceMetricMap, StoreError> {
        Ok(self.inner.lock().source_metrics.clone())
    }

    async fn write_source_metrics(&self, metrics: SourceMetricMap) -> Result<(), StoreError> {
        self.inner.lock().source_metrics = metrics;
        Ok(())
    }

    async fn list_agent_executions(
        &self,
        agent_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AgentExecutionRecord>, StoreError> {
        let state = self.inner.lock();
        let mut results: Vec<AgentExecutionRecord> = state
            .agent_executions
            .iter()
            .filter(|r| agent_id.map(|id| r.agent_id.as_str() == id).unwrap_or(true))
            .cloned()
            .collect();
        if results.len() > limit {
            results = results.split_off(results.len() - limit);
        }
        Ok(results)
    }

    async fn list_recent_trades(&self, limit: usize) -> Result<Vec<Trade>, StoreError> {
        let state = self.inner.lock();
        let mut results = state.trades.clone();
        if results.len() > limit {
            results = results.split_off(results.len() - limit);
        }
        Ok(results)
    }

    async fn read_performance_metrics(&self) -> Result<PerformanceMetrics, StoreError> {
        Ok(self.inner.lock().performance)
    }
}

/// sled-backed store for real deployments (`sled://<path>` DSN).
pub struct SledStore {
    db: sled::Db,
}

#[derive(Serialize, Deserialize, Default)]
struct SledDecisionsBlob {
    decisions: Vec<Decision>,
}

#[derive(Serialize, Deserialize, Default)]
struct SledTradesBlob {
    trades: Vec<Trade>,
}

#[derive(Serialize, Deserialize, Default)]
struct SledExecutionsBlob {
    executions: Vec<AgentExecutionRecord>,
}

#[derive(Serialize, Deserialize, Default)]
struct SledSignalsBlob {
    signals: HashMap<SignalKind, Vec<Signal>>,
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|e| StoreError::Unreachable(e.to_string()))?;
        Ok(Self { db })
    }

    fn read_blob<T: for<'de> Deserialize<'de> + Default>(&self, key: &str) -> Result<T, StoreError> {
        match self
            .db
            .get(key)
            .map_err(|e| StoreError::Unreachable(e.to_string()))?
        {
            Some(bytes) => bincode::deserialize(&bytes)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            None => Ok(T::default()),
        }
    }

    fn write_blob<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let bytes = bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.db
            .insert(key, bytes)
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl Store for SledStore {
    async fn read_portfolio(&self) -> Result<Portfolio, StoreError> {
        match self
            .db
            .get("portfolio")
            .map_err(|e| StoreError::Unreachable(e.to_string()))?
        {
            Some(bytes) => {
                bincode::deserialize(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))
            }
            None => Err(StoreError::Constraint("portfolio not yet initialized".into())),
        }
    }

    async fn write_portfolio(&self, portfolio: Portfolio) -> Result<(), StoreError> {
        self.write_blob("portfolio", &portfolio)
    }

    async fn append_portfolio_snapshot(&self, snapshot: MarketSnapshot) -> Result<(), StoreError> {
        let mut history: Vec<MarketSnapshot> = self.read_blob("portfolio_history")?;
        history.push(snapshot);
        self.write_blob("portfolio_history", &history)
    }

    async fn append_agent_execution(&self, record: AgentExecutionRecord) -> Result<(), StoreError> {
        let mut blob: SledExecutionsBlob = self.read_blob("agent_executions")?;
        blob.executions.push(record);
        self.write_blob("agent_executions", &blob)
    }

    async fn append_decision(&self, decision: Decision, trade: Option<Trade>) -> Result<(), StoreError> {
        let mut decisions: SledDecisionsBlob = self.read_blob("agent_decisions")?;
        decisions.decisions.push(decision);
        self.write_blob("agent_decisions", &decisions)?;
        if let Some(trade) = trade {
            let mut trades: SledTradesBlob = self.read_blob("trades")?;
            trades.trades.push(trade);
            self.write_blob("trades", &trades)?;
        }
        Ok(())
    }

    async fn append_signal(&self, kind: SignalKind, signal: Signal) -> Result<(), StoreError> {
        let mut blob: SledSignalsBlob = self.read_blob("signals")?;
        blob.signals.entry(kind).or_default().push(signal);
        self.write_blob("signals", &blob)
    }

    async fn read_source_metrics(&self) -> Result<SourceMetricMap, StoreError> {
        self.read_blob("source_metrics")
    }

    async fn write_source_metrics(&self, metrics: SourceMetricMap) -> Result<(), StoreError> {
        self.write_blob("source_metrics", &metrics)
    }

    async fn list_agent_executions(
        &self,
        agent_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AgentExecutionRecord>, StoreError> {
        let blob: SledExecutionsBlob = self.read_blob("agent_executions")?;
        let mut results: Vec<AgentExecutionRecord> = blob
            .executions
            .into_iter()
            .filter(|r| agent_id.map(|id| r.agent_id.as_str() == id).unwrap_or(true))
            .collect();
        if results.len() > limit {
            results = results.split_off(results.len() - limit);
        }
        Ok(results)
    }

    async fn list_recent_trades(&self, limit: usize) -> Result<Vec<Trade>, StoreError> {
        let blob: SledTradesBlob = self.read_blob("trades")?;
        let mut trades = blob.trades;
        if trades.len() > limit {
            trades = trades.split_off(trades.len() - limit);
        }
        Ok(trades)
    }

    async fn read_performance_metrics(&self) -> Result<PerformanceMetrics, StoreError> {
        let blob: SledExecutionsBlob = self.read_blob("agent_executions")?;
        let total = blob.executions.len() as u64;
        let successful = blob.executions.iter().filter(|r| r.success).count() as u64;
        let average_quality_score = if total == 0 {
            0.0
        } else {
            blob.executions.iter().map(|r| r.quality_score).sum::<f64>() / total as f64
        };
        Ok(PerformanceMetrics {
            total_executions: total,
            successful_executions: successful,
            average_quality_score,
        })
    }
}

/// Parse a `STORE_DSN` into a concrete backend (`memory://` or
/// `sled://<path>`).
pub async fn open_store(dsn: &str) -> Result<Box<dyn Store>, StoreError> {
    if dsn == "memory://" || dsn.is_empty() {
        return Ok(Box::new(InMemoryStore::new()));
    }
    if let Some(path) = dsn.strip_prefix("sled://") {
        return Ok(Box::new(SledStore::open(path)?));
    }
    Err(StoreError::Constraint(format!("unsupported store dsn: {dsn}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn in_memory_store_round_trips_portfolio() {
        let store = InMemoryStore::new();
        let p = Portfolio::new(1.0, 100.0, 50_000.0, Utc::now());
        store.write_portfolio(p).await.unwrap();
        let read = store.read_portfolio().await.unwrap();
        assert_eq!(read.btc, p.btc);
    }

    #[tokio::test]
    async fn source_metrics_round_trip() {
        let store = InMemoryStore::new();
        let mut map = SourceMetricMap::new();
        map.insert(
            "whale_alert".to_string(),
            crate::domain::SourceMetric::new("whale_alert"),
        );
        store.write_source_metrics(map.clone()).await.unwrap();
        let read = store.read_source_metrics().await.unwrap();
        assert_eq!(read.len(), map.len());
    }

    #[tokio::test]
    async fn open_store_rejects_unknown_scheme() {
        let result = open_store("postgres://localhost").await;
        assert!(result.is_err());
    }
}
