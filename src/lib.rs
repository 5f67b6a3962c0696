pub mod config;
pub mod connection;
pub mod poller;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category of a pushed alert.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Fire,
    Traffic,
    Aqi,
    Other,
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertKind::Fire => write!(f, "fire"),
            AlertKind::Traffic => write!(f, "traffic"),
            AlertKind::Aqi => write!(f, "aqi"),
            AlertKind::Other => write!(f, "other"),
        }
    }
}

/// A single alert event. Identity is `id`: re-delivery of the same id is the
/// same logical event and must not duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub lat: f64,
    pub lon: f64,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub source: String,
}

/// Counts per storage tier carried in a metrics snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierBreakdown {
    pub hot: u64,
    pub warm: u64,
    pub cold: u64,
}

/// One pipeline metrics snapshot. No history is kept beyond what the caller
/// keeps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataMetrics {
    pub throughput: Vec<f64>,
    pub breakdown: TierBreakdown,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedAlert {
    pub id: String,
}

/// Wire envelope for inbound stream frames: `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamMessage {
    Alert(Alert),
    Metrics(DataMetrics),
    AlertResolved(ResolvedAlert),
}
