//! Read-only helpers over the opaque render scenario document.

use serde_json::Value;

/// The scenario's `cues` array, if it has one.
pub fn cues(scenario: &Value) -> Option<&Vec<Value>> {
    scenario.get("cues").and_then(Value::as_array)
}

/// Number of cues in the scenario; zero when there is no cue list.
pub fn cue_count(scenario: &Value) -> i64 {
    cues(scenario).map_or(0, |cues| cues.len() as i64)
}

/// Character length of a cue's `text`, rendering non-string values as JSON.
pub(crate) fn cue_text_len(cue: &Value) -> Option<usize> {
    match cue.get("text")? {
        Value::String(text) => Some(text.chars().count()),
        other => Some(other.to_string().chars().count()),
    }
}
