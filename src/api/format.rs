//! Response shaping
//!
//! Three modes: `json` wraps the payload in an annotated envelope, `minimal`
//! strips OData noise for token-frugal callers, `raw` is the compact payload
//! and nothing else.

use crate::api::paginate::PageSet;
use crate::api::request::ResponseFormat;
use serde_json::{json, Map, Value};
use std::time::Duration;

const FETCH_ALL_NOTE: &str =
    "More results are available but were not fetched. Repeat the call with fetchAll: true to retrieve every page.";

/// Outcome of a dispatched call, before shaping
pub enum CallOutcome {
    Single(Value),
    Collection(PageSet),
}

pub fn format_response(outcome: CallOutcome, format: ResponseFormat, elapsed: Duration) -> String {
    let (payload, item_count) = match outcome {
        CallOutcome::Single(value) => (value, None),
        CallOutcome::Collection(set) => {
            let count = set.total_count;
            (set.into_payload(), Some(count))
        }
    };

    // A single-page get that still carries a cursor means the caller saw a
    // truncated collection.
    let truncated = item_count.is_none() && has_continuation(&payload);

    match format {
        ResponseFormat::Raw => payload.to_string(),
        ResponseFormat::Minimal => {
            let mut text = strip_metadata(payload).to_string();
            if truncated {
                text.push_str("\n\n");
                text.push_str(FETCH_ALL_NOTE);
            }
            text
        }
        ResponseFormat::Json => {
            let mut envelope = Map::new();
            envelope.insert(
                "executionTimeMs".to_string(),
                json!(elapsed.as_millis() as u64),
            );
            if let Some(count) = item_count {
                envelope.insert("itemCount".to_string(), json!(count));
            }
            if truncated {
                envelope.insert("note".to_string(), json!(FETCH_ALL_NOTE));
            }
            envelope.insert("result".to_string(), payload);
            serde_json::to_string_pretty(&Value::Object(envelope)).unwrap_or_default()
        }
    }
}

fn has_continuation(payload: &Value) -> bool {
    payload.get("@odata.nextLink").is_some() || payload.get("nextLink").is_some()
}

/// Drop OData/pagination metadata. `@odata.*` keys go at every level;
/// cursor and accumulator annotations only exist at the top.
fn strip_metadata(payload: Value) -> Value {
    let stripped = strip_odata_keys(payload);
    match stripped {
        Value::Object(mut map) => {
            map.remove("nextLink");
            map.remove("totalCount");
            map.remove("fetchedAt");
            // A bare collection collapses to its array
            if map.len() == 1 {
                if let Some(Value::Array(items)) = map.get("value") {
                    return Value::Array(items.clone());
                }
            }
            Value::Object(map)
        }
        other => other,
    }
}

fn strip_odata_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| !key.starts_with("@odata."))
                .map(|(key, value)| (key, strip_odata_keys(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_odata_keys).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_set() -> PageSet {
        PageSet {
            items: vec![json!({"id": "1"}), json!({"id": "2"})],
            total_count: 2,
            fetched_at: "2026-08-06T12:00:00+00:00".to_string(),
            context: Some("https://graph.microsoft.com/v1.0/$metadata#users".to_string()),
        }
    }

    #[test]
    fn test_raw_is_compact_and_idempotent() {
        let payload = json!({"value": [{"id": "1"}], "@odata.context": "ctx"});
        let elapsed = Duration::from_millis(5);

        let first = format_response(
            CallOutcome::Single(payload.clone()),
            ResponseFormat::Raw,
            elapsed,
        );
        let second = format_response(CallOutcome::Single(payload), ResponseFormat::Raw, elapsed);

        assert_eq!(first, second);
        assert!(!first.contains('\n'));
        assert!(!first.contains("executionTimeMs"));
    }

    #[test]
    fn test_json_envelope_annotates_collection() {
        let text = format_response(
            CallOutcome::Collection(page_set()),
            ResponseFormat::Json,
            Duration::from_millis(42),
        );
        let envelope: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(envelope["executionTimeMs"], 42);
        assert_eq!(envelope["itemCount"], 2);
        assert_eq!(envelope["result"]["totalCount"], 2);
        assert_eq!(envelope["result"]["value"].as_array().unwrap().len(), 2);
        assert!(envelope["result"]["@odata.context"].is_string());
    }

    #[test]
    fn test_minimal_strips_metadata_and_collapses_collection() {
        let payload = json!({
            "@odata.context": "ctx",
            "value": [
                {"id": "1", "@odata.etag": "W/\"1\""},
                {"id": "2"}
            ]
        });

        let text = format_response(
            CallOutcome::Single(payload),
            ResponseFormat::Minimal,
            Duration::from_millis(1),
        );
        let value: Value = serde_json::from_str(&text).unwrap();

        let items = value.as_array().expect("bare collection collapses");
        assert_eq!(items.len(), 2);
        assert!(items[0].get("@odata.etag").is_none());
    }

    #[test]
    fn test_minimal_keeps_non_collection_objects() {
        let payload = json!({"id": "1", "displayName": "Ada"});
        let text = format_response(
            CallOutcome::Single(payload),
            ResponseFormat::Minimal,
            Duration::from_millis(1),
        );
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["displayName"], "Ada");
    }

    #[test]
    fn test_truncated_single_get_carries_note() {
        let payload = json!({
            "value": [{"id": "1"}],
            "@odata.nextLink": "https://graph.microsoft.com/v1.0/users?$skiptoken=abc"
        });

        let text = format_response(
            CallOutcome::Single(payload.clone()),
            ResponseFormat::Json,
            Duration::from_millis(1),
        );
        let envelope: Value = serde_json::from_str(&text).unwrap();
        assert!(envelope["note"].as_str().unwrap().contains("fetchAll"));

        // raw stays annotation-free
        let raw = format_response(
            CallOutcome::Single(payload),
            ResponseFormat::Raw,
            Duration::from_millis(1),
        );
        assert!(!raw.contains("fetchAll: true"));
    }

    #[test]
    fn test_collection_outcome_has_no_note() {
        let text = format_response(
            CallOutcome::Collection(page_set()),
            ResponseFormat::Json,
            Duration::from_millis(1),
        );
        let envelope: Value = serde_json::from_str(&text).unwrap();
        assert!(envelope.get("note").is_none());
    }
}
