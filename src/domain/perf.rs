//! Per-agent performance sample.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PerfSample {
    pub efficiency: f64,
    pub accuracy: f64,
    pub responsiveness: f64,
    pub at: DateTime<Utc>,
}

impl PerfSample {
    pub fn new(efficiency: f64, accuracy: f64, responsiveness: f64, at: DateTime<Utc>) -> Self {
        Self {
            efficiency: efficiency.clamp(0.0, 1.0),
            accuracy: accuracy.clamp(0.0, 1.0),
            responsiveness: responsiveness.clamp(0.0, 1.0),
            at,
        }
    }
}
