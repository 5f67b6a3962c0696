//! Deduplicating, TTL-bounded alert store
//!
//! Holds the active alert set, a bounded most-recent-first history, and the
//! latest metrics snapshot. The active set is persisted through an injected
//! [`PersistenceBackend`] after every mutation; persistence failures degrade
//! to in-memory-only operation and are never surfaced to callers.

pub mod backend;
pub mod error;
pub mod file;
pub mod memory;

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, warn};

use crate::{Alert, DataMetrics, StreamMessage};

pub use backend::PersistenceBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::MemoryBackend;

/// Key-value slot name shared with the dashboard frontend.
pub const STORAGE_KEY: &str = "smart-city-alerts";

/// Alerts older than this are purged, never revived.
const RETENTION_MINUTES: i64 = 30;

/// Period of the recurring expiry sweep.
const SWEEP_PERIOD: Duration = Duration::from_secs(60);

/// Cap on the recent-history sequence.
const RECENT_CAP: usize = 20;

struct Inner {
    /// Active alerts in insertion order, unique by id.
    active: Vec<Alert>,

    /// Display aid: most-recent-first, capped at [`RECENT_CAP`].
    recent: VecDeque<Alert>,

    /// Latest metrics snapshot; replaced wholesale, no history.
    metrics: DataMetrics,
}

/// Deduplicating alert store with durable backing.
///
/// Explicitly constructed and dependency-injected; create one per process (or
/// one per test) instead of sharing ambient global state.
pub struct AlertStore {
    inner: RwLock<Inner>,
    backend: Box<dyn PersistenceBackend>,
}

impl AlertStore {
    /// Open the store, reconciling the persisted set with the retention
    /// window: entries that expired while the client was offline are dropped
    /// silently, so a restart behaves as if the sweep had run continuously.
    pub async fn open(backend: impl PersistenceBackend + 'static) -> Self {
        let active = match backend.load().await {
            Ok(Some(bytes)) => match serde_json::from_slice::<Vec<Alert>>(&bytes) {
                Ok(alerts) => {
                    let total = alerts.len();
                    let fresh: Vec<Alert> =
                        alerts.into_iter().filter(|a| !is_expired(a)).collect();
                    debug!(
                        "loaded {} persisted alerts, {} still within retention",
                        total,
                        fresh.len()
                    );
                    fresh
                }
                Err(e) => {
                    warn!("corrupt persisted alert payload, starting empty: {e}");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("could not load persisted alerts, starting empty: {e}");
                Vec::new()
            }
        };

        Self {
            inner: RwLock::new(Inner {
                active,
                recent: VecDeque::new(),
                metrics: DataMetrics::default(),
            }),
            backend: Box::new(backend),
        }
    }

    /// Insert an alert unless an entry with the same id already exists.
    /// Re-delivery is idempotent. Returns whether the alert was inserted.
    pub async fn add(&self, alert: Alert) -> bool {
        let snapshot = {
            let mut inner = self.write();
            if inner.active.iter().any(|a| a.id == alert.id) {
                debug!("duplicate alert {} ignored", alert.id);
                return false;
            }

            inner.recent.push_front(alert.clone());
            if inner.recent.len() > RECENT_CAP {
                inner.recent.pop_back();
            }

            inner.active.push(alert);
            inner.active.clone()
        };

        self.persist(&snapshot).await;
        true
    }

    /// Remove the alert with the given id, if present.
    pub async fn remove(&self, id: &str) {
        let snapshot = {
            let mut inner = self.write();
            inner.active.retain(|a| a.id != id);
            inner.active.clone()
        };

        self.persist(&snapshot).await;
    }

    /// Purge every entry older than the retention window. Persists only when
    /// something was removed. Returns the number of purged entries.
    pub async fn sweep(&self) -> usize {
        let (removed, snapshot) = {
            let mut inner = self.write();
            let before = inner.active.len();
            inner.active.retain(|a| !is_expired(a));
            let removed = before - inner.active.len();
            (removed, inner.active.clone())
        };

        if removed > 0 {
            debug!("swept {removed} expired alerts");
            self.persist(&snapshot).await;
        }

        removed
    }

    /// Replace the current metrics snapshot.
    pub fn update_metrics(&self, metrics: DataMetrics) {
        self.write().metrics = metrics;
    }

    /// Drop all active and recent alerts and persist the empty set.
    pub async fn clear(&self) {
        {
            let mut inner = self.write();
            inner.active.clear();
            inner.recent.clear();
        }

        self.persist(&[]).await;
    }

    /// Stream-message entry point: routes each envelope to the matching
    /// mutation.
    pub async fn apply(&self, message: StreamMessage) {
        match message {
            StreamMessage::Alert(alert) => {
                self.add(alert).await;
            }
            StreamMessage::AlertResolved(resolved) => {
                self.remove(&resolved.id).await;
            }
            StreamMessage::Metrics(metrics) => {
                self.update_metrics(metrics);
            }
        }
    }

    pub fn active_alerts(&self) -> Vec<Alert> {
        self.read().active.clone()
    }

    /// Most-recent-first, at most 20 entries.
    pub fn recent_alerts(&self) -> Vec<Alert> {
        self.read().recent.iter().cloned().collect()
    }

    pub fn current_metrics(&self) -> DataMetrics {
        self.read().metrics.clone()
    }

    /// Arm the recurring expiry sweep. The returned handle cancels the task;
    /// dropping it cancels as well, so tests never leak timers.
    pub fn spawn_sweeper(self: &Arc<Self>) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let store = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = interval(SWEEP_PERIOD);
            // The first tick fires immediately; the load-time reconciliation
            // already covered it.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        store.sweep().await;
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("sweeper stopped");
                        break;
                    }
                }
            }
        });

        SweeperHandle {
            shutdown: shutdown_tx,
        }
    }

    async fn persist(&self, active: &[Alert]) {
        let bytes = match serde_json::to_vec(active) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("failed to serialize alert set: {e}");
                return;
            }
        };

        if let Err(e) = self.backend.save(&bytes).await {
            warn!("persistence unavailable, continuing in-memory: {e}");
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().expect("alert store lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().expect("alert store lock poisoned")
    }
}

fn is_expired(alert: &Alert) -> bool {
    Utc::now() - alert.timestamp >= chrono::Duration::minutes(RETENTION_MINUTES)
}

/// Cancellation handle for the recurring sweep.
pub struct SweeperHandle {
    shutdown: mpsc::Sender<()>,
}

impl SweeperHandle {
    /// Stop the sweep task. Idempotent: cancelling twice is a no-op.
    pub fn cancel(&self) {
        let _ = self.shutdown.try_send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AlertKind, ResolvedAlert, TierBreakdown};
    use pretty_assertions::assert_eq;

    fn alert(id: &str, age_minutes: i64) -> Alert {
        Alert {
            id: id.to_string(),
            kind: AlertKind::Fire,
            lat: 52.52,
            lon: 13.405,
            timestamp: Utc::now() - chrono::Duration::minutes(age_minutes),
            description: format!("test alert {id}"),
            source: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn add_deduplicates_on_id() {
        let store = AlertStore::open(MemoryBackend::new()).await;

        assert!(store.add(alert("a1", 0)).await);
        assert!(!store.add(alert("a1", 0)).await);

        let active = store.active_alerts();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "a1");
    }

    #[tokio::test]
    async fn duplicate_with_different_fields_keeps_first_write() {
        let store = AlertStore::open(MemoryBackend::new()).await;

        let mut first = alert("a1", 0);
        first.description = "original".to_string();
        store.add(first).await;

        let mut second = alert("a1", 0);
        second.description = "updated".to_string();
        store.add(second).await;

        assert_eq!(store.active_alerts()[0].description, "original");
    }

    #[tokio::test]
    async fn resolved_alert_leaves_recent_history_intact() {
        let store = AlertStore::open(MemoryBackend::new()).await;

        store.apply(StreamMessage::Alert(alert("a1", 0))).await;
        store
            .apply(StreamMessage::AlertResolved(ResolvedAlert {
                id: "a1".to_string(),
            }))
            .await;

        assert!(store.active_alerts().is_empty());
        let recent = store.recent_alerts();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, "a1");
    }

    #[tokio::test]
    async fn remove_unknown_id_is_a_noop() {
        let store = AlertStore::open(MemoryBackend::new()).await;
        store.add(alert("a1", 0)).await;

        store.remove("nope").await;

        assert_eq!(store.active_alerts().len(), 1);
    }

    #[tokio::test]
    async fn recent_history_is_bounded_and_most_recent_first() {
        let store = AlertStore::open(MemoryBackend::new()).await;

        for i in 0..25 {
            store.add(alert(&format!("a{i}"), 0)).await;
        }

        let recent = store.recent_alerts();
        assert_eq!(recent.len(), 20);
        assert_eq!(recent[0].id, "a24");
        assert_eq!(recent[19].id, "a5");
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_entries() {
        let store = AlertStore::open(MemoryBackend::new()).await;

        store.add(alert("fresh", 0)).await;
        store.add(alert("borderline", 29)).await;
        store.add(alert("stale", 31)).await;

        let removed = store.sweep().await;

        assert_eq!(removed, 1);
        let ids: Vec<String> = store.active_alerts().iter().map(|a| a.id.clone()).collect();
        assert_eq!(ids, vec!["fresh".to_string(), "borderline".to_string()]);
    }

    #[tokio::test]
    async fn expired_entries_are_dropped_at_load_time() {
        let persisted = serde_json::to_vec(&vec![alert("old", 40), alert("fresh", 5)]).unwrap();
        let store = AlertStore::open(MemoryBackend::with_contents(persisted)).await;

        let active = store.active_alerts();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "fresh");
    }

    #[tokio::test]
    async fn fully_expired_persisted_set_loads_empty() {
        let persisted = serde_json::to_vec(&vec![alert("x", 40)]).unwrap();
        let store = AlertStore::open(MemoryBackend::with_contents(persisted)).await;

        assert!(store.active_alerts().is_empty());
    }

    #[tokio::test]
    async fn corrupt_persisted_payload_degrades_to_empty() {
        let backend = MemoryBackend::with_contents(b"{definitely not an array".to_vec());
        let store = AlertStore::open(backend).await;

        assert!(store.active_alerts().is_empty());
        // And the store still works afterwards.
        assert!(store.add(alert("a1", 0)).await);
    }

    #[tokio::test]
    async fn active_set_survives_a_restart() {
        let backend = MemoryBackend::new();
        {
            let store = AlertStore::open(backend.clone()).await;
            store.add(alert("a1", 0)).await;
        }

        let reopened = AlertStore::open(backend).await;
        let active = reopened.active_alerts();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "a1");
    }

    #[tokio::test]
    async fn clear_empties_everything_and_persists() {
        let backend = MemoryBackend::new();
        let store = AlertStore::open(backend.clone()).await;
        store.add(alert("a1", 0)).await;

        store.clear().await;

        assert!(store.active_alerts().is_empty());
        assert!(store.recent_alerts().is_empty());

        let reopened = AlertStore::open(backend).await;
        assert!(reopened.active_alerts().is_empty());
    }

    #[tokio::test]
    async fn metrics_snapshot_is_replaced_wholesale() {
        let store = AlertStore::open(MemoryBackend::new()).await;

        store.update_metrics(DataMetrics {
            throughput: vec![1.0],
            breakdown: TierBreakdown {
                hot: 1,
                warm: 2,
                cold: 3,
            },
            timestamp: 1,
        });
        store.update_metrics(DataMetrics {
            throughput: vec![9.0],
            breakdown: TierBreakdown::default(),
            timestamp: 2,
        });

        let metrics = store.current_metrics();
        assert_eq!(metrics.timestamp, 2);
        assert_eq!(metrics.throughput, vec![9.0]);
        assert_eq!(metrics.breakdown.hot, 0);
    }

    #[tokio::test]
    async fn sweeper_cancel_is_idempotent() {
        let store = Arc::new(AlertStore::open(MemoryBackend::new()).await);
        let sweeper = store.spawn_sweeper();

        sweeper.cancel();
        sweeper.cancel();
    }
}
