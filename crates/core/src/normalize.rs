//! Canonicalisation of worker result payloads.
//!
//! The ML worker reports segment and word timings as `start_time` /
//! `end_time` while everything downstream expects `start` / `end`. The
//! transform below walks the whole payload and returns a new value; the
//! input is never mutated, so callers may keep using the original.

use serde_json::{Map, Value};

/// `(alternate, canonical)` timing field names.
const TIMING_ALIASES: [(&str, &str); 2] = [("start_time", "start"), ("end_time", "end")];

/// Rename every `start_time`/`end_time` key to `start`/`end`, recursively
/// through nested objects and arrays.
///
/// When an object carries both spellings the canonical key is kept and the
/// alternate dropped. Applying the function twice yields the same value as
/// applying it once.
pub fn normalize_timestamp_fields(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(normalize_object(map)),
        Value::Array(items) => Value::Array(items.iter().map(normalize_timestamp_fields).collect()),
        other => other.clone(),
    }
}

fn normalize_object(map: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::with_capacity(map.len());
    for (key, value) in map {
        let normalized = normalize_timestamp_fields(value);
        match canonical_for(key) {
            Some(canonical) if map.contains_key(canonical) => {
                // The canonical spelling is present and wins.
            }
            Some(canonical) => {
                out.insert(canonical.to_string(), normalized);
            }
            None => {
                out.insert(key.clone(), normalized);
            }
        }
    }
    out
}

fn canonical_for(key: &str) -> Option<&'static str> {
    TIMING_ALIASES
        .iter()
        .find(|(alternate, _)| *alternate == key)
        .map(|(_, canonical)| *canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renames_flat_fields() {
        let out = normalize_timestamp_fields(&json!({"start_time": 1, "end_time": 2}));
        assert_eq!(out, json!({"start": 1, "end": 2}));
    }

    #[test]
    fn canonical_field_wins_when_both_present() {
        let out = normalize_timestamp_fields(&json!({
            "start": 1.5, "start_time": 9.9, "end_time": 3.0
        }));
        assert_eq!(out, json!({"start": 1.5, "end": 3.0}));
    }

    #[test]
    fn walks_nested_objects_and_arrays() {
        let input = json!({
            "segments": [
                {
                    "start_time": 0.0,
                    "end_time": 1.2,
                    "words": [
                        {"word": "hi", "start_time": 0.0, "end_time": 0.4},
                        [{"start_time": 7}]
                    ]
                }
            ],
            "metadata": {"window": {"end_time": 5}}
        });
        let expected = json!({
            "segments": [
                {
                    "start": 0.0,
                    "end": 1.2,
                    "words": [
                        {"word": "hi", "start": 0.0, "end": 0.4},
                        [{"start": 7}]
                    ]
                }
            ],
            "metadata": {"window": {"end": 5}}
        });
        assert_eq!(normalize_timestamp_fields(&input), expected);
    }

    #[test]
    fn is_idempotent() {
        let input = json!({
            "segments": [{"start_time": 1, "end": 2, "end_time": 4, "text": "a"}],
            "speakers": ["A", "B"]
        });
        let once = normalize_timestamp_fields(&input);
        let twice = normalize_timestamp_fields(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn already_normalized_payload_is_unchanged() {
        let input = json!({"segments": [{"start": 1, "end": 2}], "language": "ko"});
        assert_eq!(normalize_timestamp_fields(&input), input);
    }

    #[test]
    fn input_is_not_mutated() {
        let input = json!({"start_time": 1});
        let _ = normalize_timestamp_fields(&input);
        assert_eq!(input, json!({"start_time": 1}));
    }

    #[test]
    fn scalars_pass_through() {
        assert_eq!(normalize_timestamp_fields(&json!("start_time")), json!("start_time"));
        assert_eq!(normalize_timestamp_fields(&Value::Null), Value::Null);
    }
}
