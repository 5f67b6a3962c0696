//! Pull-based refresh of aggregate statistics
//!
//! Complements the push stream: while a dashboard view is active, the poller
//! fetches system stats, the edge-node roster, and a timed health probe on a
//! fixed cadence. The three sources are independent; one failing never stops
//! the others or the timer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, trace, warn};

/// Default pull cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Latency at or above this is reported as elevated.
const ELEVATED_LATENCY: Duration = Duration::from_millis(1000);

/// Latency above this is reported as slow.
const SLOW_LATENCY: Duration = Duration::from_millis(2000);

/// Aggregate pipeline statistics pulled from the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStats {
    pub hot_count: u64,
    pub warm_count: u64,
    pub cold_count: u64,
    pub total_count: u64,
    pub incoming_rate: f64,
    pub processed_rate: f64,
    #[serde(default)]
    pub rate_history: Vec<RateSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateSnapshot {
    pub timestamp: i64,
    pub incoming_rate: f64,
    pub processed_rate: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Online,
    Offline,
}

/// One edge node in the roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeNode {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub status: NodeStatus,
    #[serde(default)]
    pub last_ping: Option<String>,
}

/// Backend health classification. The previous classification is always
/// overwritten, never merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendHealth {
    Healthy,
    Degraded,
    Offline,
}

impl std::fmt::Display for BackendHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendHealth::Healthy => write!(f, "healthy"),
            BackendHealth::Degraded => write!(f, "degraded"),
            BackendHealth::Offline => write!(f, "offline"),
        }
    }
}

/// Result of one health probe.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub status: BackendHealth,
    pub message: String,
    pub response_time: Duration,
    pub last_check: Option<DateTime<Utc>>,
}

impl Default for HealthReport {
    fn default() -> Self {
        Self {
            status: BackendHealth::Offline,
            message: "checking...".to_string(),
            response_time: Duration::ZERO,
            last_check: None,
        }
    }
}

/// Classify backend health from a successful probe's round-trip latency.
pub fn classify_latency(elapsed: Duration) -> (BackendHealth, &'static str) {
    if elapsed > SLOW_LATENCY {
        (BackendHealth::Degraded, "slow response time")
    } else if elapsed >= ELEVATED_LATENCY {
        (BackendHealth::Degraded, "elevated response time")
    } else {
        (BackendHealth::Healthy, "all systems operational")
    }
}

/// Configuration for the polling orchestrator.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Base URL of the pull API, without a trailing slash.
    pub api_url: String,

    /// Cadence of the fetch cycle.
    pub interval: Duration,
}

impl PollerConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Lifecycle-scoped polling orchestrator.
///
/// `start()`/`stop()` are paired with the consuming view becoming active and
/// inactive; both are idempotent, so re-entering the view never creates
/// duplicate timers.
pub struct Poller {
    config: PollerConfig,
    client: reqwest::Client,
    stats: RwLock<SystemStats>,
    nodes: RwLock<Vec<EdgeNode>>,
    health: RwLock<HealthReport>,
    last_error: RwLock<Option<String>>,
    polling: AtomicBool,
    shutdown: Mutex<Option<mpsc::Sender<()>>>,
}

impl Poller {
    pub fn new(config: PollerConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to build HTTP client"),
            stats: RwLock::new(SystemStats::default()),
            nodes: RwLock::new(Vec::new()),
            health: RwLock::new(HealthReport::default()),
            last_error: RwLock::new(None),
            polling: AtomicBool::new(false),
            shutdown: Mutex::new(None),
        }
    }

    /// Begin polling: one immediate fetch cycle, then the recurring timer.
    /// No-op when already running.
    pub fn start(self: &Arc<Self>) {
        let mut guard = self.shutdown.lock().expect("shutdown slot poisoned");
        if guard.is_some() {
            debug!("poller already running");
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        *guard = Some(shutdown_tx);
        self.polling.store(true, Ordering::SeqCst);

        let poller = Arc::clone(self);
        tokio::spawn(async move {
            // The first tick fires immediately.
            let mut ticker = interval(poller.config.interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        poller.poll_cycle().await;
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("poller stopped");
                        break;
                    }
                }
            }
        });
    }

    /// Cancel the timer and clear the polling flag. Safe to call when not
    /// started, and safe to call twice.
    pub fn stop(&self) {
        let mut guard = self.shutdown.lock().expect("shutdown slot poisoned");
        if let Some(shutdown) = guard.take() {
            let _ = shutdown.try_send(());
        }
        self.polling.store(false, Ordering::SeqCst);
    }

    pub fn is_polling(&self) -> bool {
        self.polling.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> SystemStats {
        self.stats.read().expect("stats lock poisoned").clone()
    }

    pub fn nodes(&self) -> Vec<EdgeNode> {
        self.nodes.read().expect("nodes lock poisoned").clone()
    }

    pub fn online_nodes(&self) -> Vec<EdgeNode> {
        self.nodes()
            .into_iter()
            .filter(|n| n.status == NodeStatus::Online)
            .collect()
    }

    pub fn offline_nodes(&self) -> Vec<EdgeNode> {
        self.nodes()
            .into_iter()
            .filter(|n| n.status == NodeStatus::Offline)
            .collect()
    }

    pub fn health(&self) -> HealthReport {
        self.health.read().expect("health lock poisoned").clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .read()
            .expect("error lock poisoned")
            .clone()
    }

    /// One fetch cycle. The sub-fetches run concurrently and fail
    /// independently.
    async fn poll_cycle(&self) {
        trace!("poll cycle");

        let (stats, nodes, _) = tokio::join!(self.fetch_stats(), self.fetch_nodes(), self.probe_health());

        match stats {
            Ok(()) => self.set_error(None),
            Err(e) => {
                warn!("stats fetch failed: {e:#}");
                self.set_error(Some(format!("stats: {e:#}")));
            }
        }

        if let Err(e) = nodes {
            warn!("node roster fetch failed: {e:#}");
            self.set_error(Some(format!("nodes: {e:#}")));
        }
    }

    async fn fetch_stats(&self) -> Result<()> {
        let url = format!("{}/api/stats", self.config.api_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("failed to send stats request")?;

        if !response.status().is_success() {
            anyhow::bail!("HTTP error: {}", response.status());
        }

        let stats: SystemStats = response
            .json()
            .await
            .context("failed to parse stats response")?;

        *self.stats.write().expect("stats lock poisoned") = stats;
        Ok(())
    }

    async fn fetch_nodes(&self) -> Result<()> {
        let url = format!("{}/api/nodes", self.config.api_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("failed to send node roster request")?;

        if !response.status().is_success() {
            anyhow::bail!("HTTP error: {}", response.status());
        }

        let nodes: Vec<EdgeNode> = response
            .json()
            .await
            .context("failed to parse node roster response")?;

        *self.nodes.write().expect("nodes lock poisoned") = nodes;
        Ok(())
    }

    /// Timed probe against a representative endpoint. Never returns an error:
    /// a failed probe is itself a classification (`offline`).
    async fn probe_health(&self) {
        let url = format!("{}/api/stats", self.config.api_url);
        let started = Instant::now();

        let report = match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                let elapsed = started.elapsed();
                let (status, message) = classify_latency(elapsed);
                HealthReport {
                    status,
                    message: message.to_string(),
                    response_time: elapsed,
                    last_check: Some(Utc::now()),
                }
            }
            Ok(response) => HealthReport {
                status: BackendHealth::Offline,
                message: format!("HTTP error: {}", response.status()),
                response_time: started.elapsed(),
                last_check: Some(Utc::now()),
            },
            Err(e) => HealthReport {
                status: BackendHealth::Offline,
                message: format!("backend unreachable: {e}"),
                response_time: started.elapsed(),
                last_check: Some(Utc::now()),
            },
        };

        if report.status != BackendHealth::Healthy {
            debug!(
                "backend health {}: {} ({}ms)",
                report.status,
                report.message,
                report.response_time.as_millis()
            );
        }

        *self.health.write().expect("health lock poisoned") = report;
    }

    fn set_error(&self, error: Option<String>) {
        *self.last_error.write().expect("error lock poisoned") = error;
    }
}
