//! Portfolio and market snapshot entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Portfolio {
    pub btc: f64,
    pub usd: f64,
    pub total_value_usd: f64,
    pub updated_at: DateTime<Utc>,
}

impl Portfolio {
    pub fn new(btc: f64, usd: f64, price_usd: f64, at: DateTime<Utc>) -> Self {
        let total_value_usd = (btc.max(0.0) * price_usd) + usd.max(0.0);
        Self {
            btc: btc.max(0.0),
            usd: usd.max(0.0),
            total_value_usd: total_value_usd.max(0.0),
            updated_at: at,
        }
    }

    /// Apply a new valuation, enforcing `updated_at` monotonicity
    ///. Stale updates are silently ignored.
    pub fn revalue(&mut self, btc: f64, usd: f64, price_usd: f64, at: DateTime<Utc>) {
        if at < self.updated_at {
            return;
        }
        self.btc = btc.max(0.0);
        self.usd = usd.max(0.0);
        self.total_value_usd = (self.btc * price_usd + self.usd).max(0.0);
        self.updated_at = at;
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub price_usd: f64,
    pub volume_24h: f64,
    pub change_24h: f64,
    pub fear_greed: f64,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revalue_ignores_stale_updates() {
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(10);
        let mut p = Portfolio::new(1.0, 0.0, 50_000.0, t1);
        p.revalue(2.0, 0.0, 60_000.0, t0);
        assert_eq!(p.btc, 1.0);
        assert_eq!(p.updated_at, t1);
    }

    #[test]
    fn total_value_never_negative() {
        let p = Portfolio::new(-5.0, -10.0, 50_000.0, Utc::now());
        assert!(p.total_value_usd >= 0.0);
    }
}
