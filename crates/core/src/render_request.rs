//! Render request validation: source URL, scenario document, output options.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

/// Hosts a render source may be fetched from. Subdomains are accepted, so
/// virtual-hosted S3 bucket URLs match `s3.amazonaws.com`.
pub const ALLOWED_VIDEO_DOMAINS: &[&str] = &[
    "s3.amazonaws.com",
    "s3.ap-northeast-2.amazonaws.com",
    "s3.us-east-1.amazonaws.com",
    "storage.googleapis.com",
    "storage.cloud.google.com",
    "d1234567890.cloudfront.net",
    "localhost",
    "127.0.0.1",
];

/// Accepted source container extensions (lowercase, with dot).
pub const ALLOWED_VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".mov", ".avi", ".mkv", ".webm"];

/// Accepted output formats.
pub const ALLOWED_OUTPUT_FORMATS: &[&str] = &["mp4", "mov", "webm"];

pub const MAX_CUES: usize = 1000;
pub const MAX_SCENARIO_BYTES: usize = 5 * 1024 * 1024;

/// Hosts allowed to use plain `http`.
const LOOPBACK_HOSTS: &[&str] = &["localhost", "127.0.0.1"];

static SCENARIO_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+$").expect("valid regex"));

/// Output settings for a render. Missing fields take the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RenderOptions {
    #[validate(range(min = 480, max = 3840, message = "width must be between 480 and 3840"))]
    pub width: i32,
    #[validate(range(min = 360, max = 2160, message = "height must be between 360 and 2160"))]
    pub height: i32,
    #[validate(range(min = 1, max = 60, message = "fps must be between 1 and 60"))]
    pub fps: i32,
    #[validate(range(min = 10, max = 100, message = "quality must be between 10 and 100"))]
    pub quality: i32,
    pub format: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 30,
            quality: 90,
            format: "mp4".to_string(),
        }
    }
}

/// One rejected field of a render request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a complete render request, collecting every problem found.
pub fn validate_render_request(
    video_url: &str,
    scenario: &Value,
    options: &RenderOptions,
) -> Result<(), Vec<ValidationIssue>> {
    let mut issues = Vec::new();

    if let Err(message) = validate_video_url(video_url) {
        issues.push(ValidationIssue::new("videoUrl", message));
    }
    issues.extend(validate_scenario(scenario));
    issues.extend(validate_options(options));

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

/// Check scheme, host and extension of a render source URL.
pub fn validate_video_url(url: &str) -> Result<(), String> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| "videoUrl must be an absolute URL".to_string())?;
    let scheme = scheme.to_ascii_lowercase();

    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };
    let host = host_of(authority).to_ascii_lowercase();
    if host.is_empty() {
        return Err("videoUrl has no host".to_string());
    }

    let loopback = LOOPBACK_HOSTS.contains(&host.as_str());
    match scheme.as_str() {
        "https" => {}
        "http" if loopback => {}
        _ => return Err("videoUrl must use https".to_string()),
    }

    let allowed = ALLOWED_VIDEO_DOMAINS
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")));
    if !allowed {
        return Err(format!("videoUrl host '{host}' is not an allowed storage domain"));
    }

    let path = path.split(['?', '#']).next().unwrap_or_default().to_ascii_lowercase();
    if !ALLOWED_VIDEO_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return Err(format!(
            "videoUrl must point to one of: {}",
            ALLOWED_VIDEO_EXTENSIONS.join(", ")
        ));
    }

    Ok(())
}

/// Strip userinfo and port from a URL authority.
fn host_of(authority: &str) -> &str {
    let authority = authority.split(['?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    host_port.split(':').next().unwrap_or_default()
}

/// Structural checks on the scenario document.
pub fn validate_scenario(scenario: &Value) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    let Some(doc) = scenario.as_object() else {
        issues.push(ValidationIssue::new("scenario", "scenario must be an object"));
        return issues;
    };

    match doc.get("version").and_then(Value::as_str) {
        Some(version) if SCENARIO_VERSION.is_match(version) => {}
        Some(_) => issues.push(ValidationIssue::new(
            "scenario.version",
            "version must look like \"1.0\"",
        )),
        None => issues.push(ValidationIssue::new("scenario.version", "version is required")),
    }

    match doc.get("cues") {
        Some(Value::Array(cues)) => {
            if cues.len() > MAX_CUES {
                issues.push(ValidationIssue::new(
                    "scenario.cues",
                    format!("at most {MAX_CUES} cues are allowed"),
                ));
            }
            for (idx, cue) in cues.iter().enumerate() {
                issues.extend(validate_cue(idx, cue));
            }
        }
        Some(_) => issues.push(ValidationIssue::new("scenario.cues", "cues must be an array")),
        None => issues.push(ValidationIssue::new("scenario.cues", "cues is required")),
    }

    let size = serde_json::to_vec(scenario).map_or(0, |bytes| bytes.len());
    if size > MAX_SCENARIO_BYTES {
        issues.push(ValidationIssue::new(
            "scenario",
            format!("scenario is {size} bytes, limit is {MAX_SCENARIO_BYTES}"),
        ));
    }

    issues
}

fn validate_cue(idx: usize, cue: &Value) -> Vec<ValidationIssue> {
    let field = format!("scenario.cues[{idx}]");
    let Some(cue) = cue.as_object() else {
        return vec![ValidationIssue::new(field, "cue must be an object")];
    };

    let mut issues = Vec::new();
    if !cue.contains_key("id") {
        issues.push(ValidationIssue::new(format!("{field}.id"), "cue id is required"));
    }

    if let Some(hint) = cue.get("hintTime") {
        let hint_field = format!("{field}.hintTime");
        let Some(hint) = hint.as_object() else {
            issues.push(ValidationIssue::new(hint_field, "hintTime must be an object"));
            return issues;
        };
        let start = hint.get("start");
        let end = hint.get("end");
        for (name, value) in [("start", start), ("end", end)] {
            match value.map(Value::as_f64) {
                None => {}
                Some(Some(secs)) if secs >= 0.0 => {}
                Some(Some(_)) => issues.push(ValidationIssue::new(
                    format!("{hint_field}.{name}"),
                    "must not be negative",
                )),
                Some(None) => issues.push(ValidationIssue::new(
                    format!("{hint_field}.{name}"),
                    "must be a number",
                )),
            }
        }
        if let (Some(start), Some(end)) = (
            start.and_then(Value::as_f64),
            end.and_then(Value::as_f64),
        ) {
            if start >= end {
                issues.push(ValidationIssue::new(hint_field, "start must be before end"));
            }
        }
    }

    issues
}

/// Range checks from the derive plus the output format whitelist.
pub fn validate_options(options: &RenderOptions) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if let Err(errors) = options.validate() {
        for (field, field_errors) in errors.field_errors() {
            for error in field_errors.iter() {
                let message = error
                    .message
                    .as_ref()
                    .map_or_else(|| error.code.to_string(), |m| m.to_string());
                issues.push(ValidationIssue::new(format!("options.{field}"), message));
            }
        }
        issues.sort_by(|a, b| a.field.cmp(&b.field));
    }

    if !ALLOWED_OUTPUT_FORMATS.contains(&options.format.as_str()) {
        issues.push(ValidationIssue::new(
            "options.format",
            format!("format must be one of: {}", ALLOWED_OUTPUT_FORMATS.join(", ")),
        ));
    }

    issues
}
