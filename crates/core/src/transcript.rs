//! Inspection of transcription results produced by the ML worker.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Value;

/// Markers the ML worker emits when it returns canned test output instead of
/// a real analysis.
pub const PLACEHOLDER_MARKERS: &[&str] = &["[테스트]", "테스트 결과"];

/// Counts derived from a completed transcription result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TranscriptSummary {
    pub segment_count: usize,
    pub word_count: usize,
    pub speaker_count: usize,
    pub speakers: Vec<String>,
}

/// Whether a worker response body carries a placeholder transcript in
/// `result.transcript`.
pub fn is_placeholder_transcript(response: &Value) -> bool {
    response
        .pointer("/result/transcript")
        .and_then(Value::as_str)
        .is_some_and(|text| PLACEHOLDER_MARKERS.iter().any(|m| text.contains(m)))
}

/// Summarize a (normalized) transcription result.
///
/// Speakers are collected from each segment's `speaker` field and from a
/// top-level `speakers` array, deduplicated and sorted.
pub fn summarize(result: &Value) -> TranscriptSummary {
    let segments = result
        .get("segments")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut speakers = BTreeSet::new();
    let mut word_count = 0;
    for segment in segments {
        word_count += segment
            .get("words")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        if let Some(speaker) = segment.get("speaker").and_then(speaker_label) {
            speakers.insert(speaker);
        }
    }
    if let Some(listed) = result.get("speakers").and_then(Value::as_array) {
        speakers.extend(listed.iter().filter_map(speaker_label));
    }

    TranscriptSummary {
        segment_count: segments.len(),
        word_count,
        speaker_count: speakers.len(),
        speakers: speakers.into_iter().collect(),
    }
}

/// Speakers arrive either as plain labels or as `{ "id": ... }` objects.
fn speaker_label(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map.get("id").and_then(speaker_label),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_placeholder_transcript() {
        assert!(is_placeholder_transcript(&json!({"result": {"transcript": "[테스트] 샘플"}})));
        assert!(is_placeholder_transcript(&json!({"result": {"transcript": "이것은 테스트 결과입니다"}})));
        assert!(!is_placeholder_transcript(&json!({"result": {"transcript": "real words"}})));
        assert!(!is_placeholder_transcript(&json!({"status": "accepted"})));
    }

    #[test]
    fn summarizes_segments_words_and_speakers() {
        let result = json!({
            "segments": [
                {"speaker": "A", "words": [{"word": "hi"}, {"word": "there"}]},
                {"speaker": {"id": "B"}, "words": [{"word": "yo"}]},
                {"speaker": "A"}
            ],
            "speakers": ["C", "A"]
        });
        let summary = summarize(&result);
        assert_eq!(summary.segment_count, 3);
        assert_eq!(summary.word_count, 3);
        assert_eq!(summary.speaker_count, 3);
        assert_eq!(summary.speakers, vec!["A", "B", "C"]);
    }

    #[test]
    fn empty_result_summarizes_to_zero() {
        assert_eq!(summarize(&json!({})), TranscriptSummary::default());
    }
}
