//! Render time estimation and display name derivation.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::scenario::{cue_text_len, cues};

/// Seconds assumed for any render, before per-cue costs.
pub const BASE_RENDER_SECS: i32 = 30;
/// Seconds added per cue.
pub const SECS_PER_CUE: i32 = 5;
/// Lower bound of a reported estimate.
pub const MIN_ESTIMATE_SECS: i32 = 20;
/// Upper bound of a reported estimate.
pub const MAX_ESTIMATE_SECS: i32 = 300;

/// Cue text longer than this (in characters) counts as complex.
const LONG_TEXT_CHARS: usize = 50;
const LONG_TEXT_WEIGHT: f64 = 0.2;
const EFFECTS_WEIGHT: f64 = 0.3;

/// Fallback name when nothing usable remains in the URL.
pub const UNTITLED: &str = "Untitled";

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("valid regex"));
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Estimate how many seconds a render of `scenario` will take.
///
/// `(30 + 5 * cues) * multiplier`, where the multiplier starts at 1.0 and
/// grows by 0.2 per cue with long text and 0.3 per cue carrying `effects`
/// or `animations`. Clamped to `[20, 300]`. A scenario without a cue list
/// estimates at the base time.
pub fn estimate_render_seconds(scenario: &Value) -> i32 {
    let Some(cues) = cues(scenario) else {
        return BASE_RENDER_SECS;
    };

    let mut multiplier = 1.0_f64;
    for cue in cues.iter().filter(|cue| cue.is_object()) {
        if cue_text_len(cue).is_some_and(|len| len > LONG_TEXT_CHARS) {
            multiplier += LONG_TEXT_WEIGHT;
        }
        if cue.get("effects").is_some() || cue.get("animations").is_some() {
            multiplier += EFFECTS_WEIGHT;
        }
    }

    let cue_secs = i64::try_from(cues.len()).unwrap_or(i64::MAX).saturating_mul(SECS_PER_CUE as i64);
    let raw = ((BASE_RENDER_SECS as i64).saturating_add(cue_secs) as f64 * multiplier) as i64;
    raw.clamp(MIN_ESTIMATE_SECS as i64, MAX_ESTIMATE_SECS as i64) as i32
}

/// Derive a human-readable name from a video URL.
///
/// Takes the last path segment, drops the extension, strips characters
/// other than word characters, whitespace and `-`, and collapses runs of
/// whitespace. Falls back to `"Untitled"`.
pub fn extract_video_name(video_url: &str) -> String {
    let path = url_path(video_url);
    let filename = path.rsplit('/').next().unwrap_or_default();
    let stem = match filename.rsplit_once('.') {
        Some((stem, _ext)) => stem,
        None => filename,
    };

    let cleaned = NON_WORD.replace_all(stem, "");
    let collapsed = WHITESPACE_RUN.replace_all(&cleaned, " ");
    let name = collapsed.trim();

    if name.is_empty() {
        UNTITLED.to_string()
    } else {
        name.to_string()
    }
}

/// The path component of a URL: scheme, authority, query and fragment removed.
fn url_path(url: &str) -> &str {
    let without_fragment = url.split('#').next().unwrap_or_default();
    let without_query = without_fragment.split('?').next().unwrap_or_default();
    match without_query.split_once("://") {
        Some((_scheme, rest)) => rest.find('/').map_or("", |idx| &rest[idx..]),
        None => without_query,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plain_cues(n: usize) -> Value {
        let cues: Vec<Value> = (0..n).map(|i| json!({"id": i, "text": "hi"})).collect();
        json!({"version": "1.0", "cues": cues})
    }

    #[test]
    fn no_cue_list_is_base_time() {
        assert_eq!(estimate_render_seconds(&json!({"version": "1.0"})), 30);
        assert_eq!(estimate_render_seconds(&json!({"cues": {}})), 30);
    }

    #[test]
    fn ten_plain_cues() {
        assert_eq!(estimate_render_seconds(&plain_cues(10)), 80);
    }

    #[test]
    fn estimate_is_deterministic_and_bounded() {
        let scenario = plain_cues(10);
        let first = estimate_render_seconds(&scenario);
        assert_eq!(first, estimate_render_seconds(&scenario));
        assert!((MIN_ESTIMATE_SECS..=MAX_ESTIMATE_SECS).contains(&first));
    }

    #[test]
    fn complexity_raises_multiplier() {
        let long = "x".repeat(51);
        let scenario = json!({"cues": [
            {"id": 1, "text": long},
            {"id": 2, "effects": ["glow"]},
        ]});
        // (30 + 10) * 1.5
        assert_eq!(estimate_render_seconds(&scenario), 60);
    }

    #[test]
    fn clamps_to_maximum() {
        assert_eq!(estimate_render_seconds(&plain_cues(200)), 300);
    }

    #[test]
    fn empty_cue_list_is_base_time() {
        assert_eq!(estimate_render_seconds(&json!({"cues": []})), 30);
    }

    #[test]
    fn video_name_from_s3_url() {
        assert_eq!(
            extract_video_name("https://bucket.s3.amazonaws.com/videos/My Clip (final).mp4"),
            "My Clip final"
        );
    }

    #[test]
    fn video_name_drops_query_and_only_last_extension() {
        assert_eq!(
            extract_video_name("https://cdn.example.com/a/b/day-1.take.2.mov?sig=abc"),
            "day-1take2"
        );
    }

    #[test]
    fn video_name_keeps_unicode_words() {
        assert_eq!(extract_video_name("https://x.com/영상_01.mp4"), "영상_01");
    }

    #[test]
    fn video_name_falls_back_to_untitled() {
        assert_eq!(extract_video_name("https://x.com/"), UNTITLED);
        assert_eq!(extract_video_name("https://x.com/!!!.mp4"), UNTITLED);
        assert_eq!(extract_video_name(""), UNTITLED);
    }
}
