//! Serde serialization/deserialization tests for core types.
//!
//! These tests pin the camelCase wire format of the usage service rather
//! than exercising mechanical round-trips for every type.

use chrono::{TimeZone, Utc};
use serde_json::json;

use crate::{QuotaPlan, UsageSnapshot, WarningLevel};

// ============================================================================
// UsageSnapshot Wire Format
// ============================================================================

fn wire_snapshot() -> serde_json::Value {
    json!({
        "currentUsage": {
            "totalTokens": 45000,
            "totalCost": 12.5,
            "totalMessages": 180
        },
        "modelDistribution": {
            "claude-sonnet": {
                "tokens": 31500,
                "cost": 8.0,
                "messages": 150,
                "percentage": 70.0
            },
            "claude-opus": {
                "tokens": 13500,
                "cost": 4.5,
                "messages": 30,
                "percentage": 30.0
            }
        },
        "sessionWindow": {
            "start": "2025-06-01T10:00:00Z",
            "end": "2025-06-01T15:00:00Z"
        },
        "burnRate": { "tokensPerMinute": 50.0 },
        "activeSessions": 2,
        "warnings": [
            { "type": "warning", "message": "approaching token limit" }
        ]
    })
}

#[test]
fn test_snapshot_deserializes_wire_format() {
    let snapshot: UsageSnapshot = serde_json::from_value(wire_snapshot()).unwrap();

    assert_eq!(snapshot.current_usage.total_tokens, 45_000);
    assert_eq!(snapshot.current_usage.total_messages, 180);
    assert_eq!(snapshot.active_sessions, 2);
    assert_eq!(snapshot.model_distribution.len(), 2);
    assert_eq!(
        snapshot.model_distribution["claude-sonnet"].percentage,
        70.0
    );
    assert_eq!(
        snapshot.session_window.start,
        Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap()
    );
    assert_eq!(snapshot.warnings.len(), 1);
    assert_eq!(snapshot.warnings[0].level, WarningLevel::Warning);
    assert!(snapshot.validate().is_ok());
}

#[test]
fn test_snapshot_serializes_camel_case() {
    let snapshot: UsageSnapshot = serde_json::from_value(wire_snapshot()).unwrap();
    let value = serde_json::to_value(&snapshot).unwrap();

    assert!(value.get("currentUsage").is_some());
    assert!(value["burnRate"].get("tokensPerMinute").is_some());
    assert_eq!(value["warnings"][0]["type"], "warning");
}

#[test]
fn test_snapshot_optional_fields_default() {
    // A minimal snapshot: no distribution, no warnings, open-ended window.
    let minimal = json!({
        "currentUsage": { "totalTokens": 0, "totalCost": 0.0, "totalMessages": 0 },
        "sessionWindow": { "start": "2025-06-01T10:00:00Z" },
        "burnRate": { "tokensPerMinute": 0.0 }
    });

    let snapshot: UsageSnapshot = serde_json::from_value(minimal).unwrap();
    assert!(snapshot.model_distribution.is_empty());
    assert!(snapshot.warnings.is_empty());
    assert!(snapshot.session_window.end.is_none());
    assert_eq!(snapshot.active_sessions, 0);
}

#[test]
fn test_warning_level_rejects_unknown() {
    let result: Result<WarningLevel, _> = serde_json::from_str(r#""fatal""#);
    assert!(result.is_err());
}

// ============================================================================
// QuotaPlan Wire Format
// ============================================================================

#[test]
fn test_plan_roundtrip() {
    let plan = QuotaPlan {
        id: "pro".to_string(),
        name: "Pro".to_string(),
        token_limit: 44_000,
        cost_limit: 18.0,
        message_limit: 250,
    };

    let json = serde_json::to_string(&plan).unwrap();
    assert!(json.contains("tokenLimit"));
    let back: QuotaPlan = serde_json::from_str(&json).unwrap();
    assert_eq!(plan, back);
}
