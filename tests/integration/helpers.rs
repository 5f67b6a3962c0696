//! Helper functions for integration tests

use chrono::Utc;
use citypulse::{Alert, AlertKind};

pub fn test_alert(id: &str, age_minutes: i64) -> Alert {
    Alert {
        id: id.to_string(),
        kind: AlertKind::Traffic,
        lat: 52.52,
        lon: 13.405,
        timestamp: Utc::now() - chrono::Duration::minutes(age_minutes),
        description: format!("test alert {id}"),
        source: "integration".to_string(),
    }
}

pub fn alert_frame(id: &str) -> String {
    serde_json::json!({
        "type": "alert",
        "data": test_alert(id, 0),
    })
    .to_string()
}

pub fn resolved_frame(id: &str) -> String {
    serde_json::json!({
        "type": "alert_resolved",
        "data": {"id": id},
    })
    .to_string()
}

pub fn metrics_frame(timestamp: i64) -> String {
    serde_json::json!({
        "type": "metrics",
        "data": {
            "throughput": [21.0, 22.5],
            "breakdown": {"hot": 4, "warm": 9, "cold": 31},
            "timestamp": timestamp,
        },
    })
    .to_string()
}
