//! Event and profile normalization

use crate::domain::{NormalizedRecord, QuarryError, RawRecord, RecordKind, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Epoch values above this are milliseconds rather than seconds
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Normalize a raw export event
///
/// Expects `{"event": name, "properties": {...}}`. The id is `$insert_id`
/// when present, otherwise a SHA-256 over the canonical raw JSON.
pub fn normalize_event(raw: &RawRecord) -> Result<NormalizedRecord> {
    let object = as_object(raw, "event")?;

    let event_name = object
        .get("event")
        .and_then(Value::as_str)
        .ok_or_else(|| QuarryError::Transform("event record is missing 'event' name".to_string()))?
        .to_string();

    let mut properties = match object.get("properties") {
        Some(Value::Object(map)) => map.clone(),
        None | Some(Value::Null) => Map::new(),
        Some(_) => {
            return Err(QuarryError::Transform(format!(
                "event '{event_name}' has non-object properties"
            )))
        }
    };

    let insert_id = properties.remove("$insert_id");
    let distinct_id = properties.remove("distinct_id").and_then(id_string);
    let event_time = properties.remove("time").and_then(|t| epoch_to_datetime(&t));

    let id = match insert_id.and_then(id_string) {
        Some(id) => id,
        None => content_hash(&raw.0)?,
    };

    Ok(NormalizedRecord {
        id,
        kind: RecordKind::Event,
        event_name: Some(event_name),
        distinct_id,
        event_time,
        properties: Value::Object(properties),
    })
}

/// Normalize a raw engage profile
///
/// Expects `{"$distinct_id": id, "$properties": {...}}`. The distinct id is
/// the record id; `$last_seen` becomes the event time when parseable.
pub fn normalize_profile(raw: &RawRecord) -> Result<NormalizedRecord> {
    let object = as_object(raw, "profile")?;

    let distinct_id = object
        .get("$distinct_id")
        .cloned()
        .and_then(id_string)
        .ok_or_else(|| {
            QuarryError::Transform("profile record is missing '$distinct_id'".to_string())
        })?;

    let mut properties = match object.get("$properties") {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };

    let event_time = properties
        .remove("$last_seen")
        .and_then(|v| v.as_str().and_then(parse_timestamp));

    Ok(NormalizedRecord {
        id: distinct_id.clone(),
        kind: RecordKind::Profile,
        event_name: None,
        distinct_id: Some(distinct_id),
        event_time,
        properties: Value::Object(properties),
    })
}

fn as_object<'a>(raw: &'a RawRecord, what: &str) -> Result<&'a Map<String, Value>> {
    raw.0
        .as_object()
        .ok_or_else(|| QuarryError::Transform(format!("{what} record is not a JSON object")))
}

/// Ids arrive as strings or numbers; anything else is treated as absent
fn id_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn epoch_to_datetime(value: &Value) -> Option<DateTime<Utc>> {
    let raw = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
        Value::String(s) => s.parse::<i64>().ok()?,
        _ => return None,
    };

    if raw > MILLIS_THRESHOLD {
        Utc.timestamp_millis_opt(raw).single()
    } else {
        Utc.timestamp_opt(raw, 0).single()
    }
}

/// Accepts RFC 3339 and the zone-less `YYYY-MM-DDTHH:MM:SS` form (read as UTC)
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Hex SHA-256 of the record serialized with sorted keys
fn content_hash(value: &Value) -> Result<String> {
    let canonical = serde_json::to_string(&canonicalize(value))?;

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_uses_insert_id() {
        let raw = RawRecord(json!({
            "event": "Purchase",
            "properties": {
                "distinct_id": "u-1",
                "time": 1704067200,
                "$insert_id": "ins-123",
                "amount": 9.99
            }
        }));

        let record = normalize_event(&raw).unwrap();
        assert_eq!(record.id, "ins-123");
        assert_eq!(record.kind, RecordKind::Event);
        assert_eq!(record.distinct_id.as_deref(), Some("u-1"));
        assert_eq!(
            record.event_time.unwrap().to_rfc3339(),
            "2024-01-01T00:00:00+00:00"
        );
        assert_eq!(record.properties["amount"], 9.99);
        assert!(record.properties.get("$insert_id").is_none());
        assert!(record.properties.get("time").is_none());
    }

    #[test]
    fn test_event_hash_id_is_stable_across_key_order() {
        let a: Value =
            serde_json::from_str(r#"{"event":"View","properties":{"distinct_id":"u","page":"/"}}"#)
                .unwrap();
        let b: Value =
            serde_json::from_str(r#"{"properties":{"page":"/","distinct_id":"u"},"event":"View"}"#)
                .unwrap();

        let id_a = normalize_event(&RawRecord(a)).unwrap().id;
        let id_b = normalize_event(&RawRecord(b)).unwrap().id;
        assert_eq!(id_a.len(), 64);
        assert_eq!(id_a, id_b);

        let c = json!({"event": "View", "properties": {"distinct_id": "u", "page": "/pricing"}});
        assert_ne!(id_a, normalize_event(&RawRecord(c)).unwrap().id);
    }

    #[test]
    fn test_event_time_in_milliseconds() {
        let raw = RawRecord(json!({
            "event": "View",
            "properties": {"time": 1704067200123_i64}
        }));
        let record = normalize_event(&raw).unwrap();
        assert_eq!(record.event_time.unwrap().timestamp_millis(), 1704067200123);
    }

    #[test]
    fn test_event_without_name_fails() {
        let raw = RawRecord(json!({"properties": {"distinct_id": "u"}}));
        assert!(matches!(normalize_event(&raw), Err(QuarryError::Transform(_))));

        let raw = RawRecord(json!({"event": "View", "properties": [1, 2]}));
        assert!(normalize_event(&raw).is_err());
    }

    #[test]
    fn test_profile_normalization() {
        let raw = RawRecord(json!({
            "$distinct_id": 42,
            "$properties": {"$last_seen": "2024-03-05T10:15:00", "$email": "a@example.com"}
        }));

        let record = normalize_profile(&raw).unwrap();
        assert_eq!(record.id, "42");
        assert_eq!(record.kind, RecordKind::Profile);
        assert_eq!(record.event_name, None);
        assert_eq!(
            record.event_time.unwrap().to_rfc3339(),
            "2024-03-05T10:15:00+00:00"
        );
        assert_eq!(record.properties["$email"], "a@example.com");
    }

    #[test]
    fn test_profile_without_distinct_id_fails() {
        let raw = RawRecord(json!({"$properties": {"$email": "a@example.com"}}));
        assert!(matches!(
            normalize_profile(&raw),
            Err(QuarryError::Transform(_))
        ));
    }

    #[test]
    fn test_profile_unparseable_last_seen_is_dropped() {
        let raw = RawRecord(json!({
            "$distinct_id": "u-9",
            "$properties": {"$last_seen": "last tuesday"}
        }));
        assert!(normalize_profile(&raw).unwrap().event_time.is_none());
    }
}
