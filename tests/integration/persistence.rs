//! File-backed persistence across store restarts

use citypulse::store::{AlertStore, FileBackend, STORAGE_KEY};

use crate::helpers::test_alert;

#[tokio::test]
async fn active_set_survives_a_restart_on_disk() {
    let dir = tempfile::tempdir().unwrap();

    {
        let store = AlertStore::open(FileBackend::in_dir(dir.path())).await;
        store.add(test_alert("a1", 0)).await;
        store.add(test_alert("a2", 5)).await;
    }

    let reopened = AlertStore::open(FileBackend::in_dir(dir.path())).await;
    let ids: Vec<String> = reopened
        .active_alerts()
        .iter()
        .map(|a| a.id.clone())
        .collect();
    assert_eq!(ids, vec!["a1".to_string(), "a2".to_string()]);
}

#[tokio::test]
async fn slot_file_uses_the_shared_storage_key() {
    let dir = tempfile::tempdir().unwrap();

    let store = AlertStore::open(FileBackend::in_dir(dir.path())).await;
    store.add(test_alert("a1", 0)).await;

    assert!(dir.path().join(format!("{STORAGE_KEY}.json")).exists());
}

#[tokio::test]
async fn entries_expired_while_offline_are_dropped_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(format!("{STORAGE_KEY}.json"));

    // Simulate a previous session that persisted one expired and one fresh
    // alert before shutting down.
    let persisted = serde_json::to_vec(&vec![test_alert("old", 40), test_alert("fresh", 10)]).unwrap();
    std::fs::write(&path, persisted).unwrap();

    let store = AlertStore::open(FileBackend::new(path)).await;
    let active = store.active_alerts();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, "fresh");
}

#[tokio::test]
async fn unreadable_slot_degrades_to_an_empty_set() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(format!("{STORAGE_KEY}.json"));
    std::fs::write(&path, b"[{\"id\": truncated").unwrap();

    let store = AlertStore::open(FileBackend::new(path)).await;

    assert!(store.active_alerts().is_empty());
    assert!(store.add(test_alert("a1", 0)).await);
}
