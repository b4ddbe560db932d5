//! Configuration loaded from environment variables.
//!
//! Every setting has a development default except `DATABASE_URL`, which
//! `main` reads directly. A value that is present but unparseable is an
//! error so misconfiguration fails at startup.

use std::str::FromStr;
use std::time::Duration;

use hoit_compute::gpu::RENDER_CALLBACK_PATH;
use hoit_core::quota::QuotaLimits;
use hoit_pipeline::retry::RetryPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} has an invalid value: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Read `key` through `lookup`, parsing it when present.
fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}

fn string_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Time allowed for in-flight dispatch tasks to drain on shutdown.
    pub shutdown_timeout_secs: u64,
}

impl ServerConfig {
    /// | Env Var                 | Default                 |
    /// |-------------------------|-------------------------|
    /// | `HOST`                  | `0.0.0.0`               |
    /// | `PORT`                  | `8000`                  |
    /// | `CORS_ORIGINS`          | `http://localhost:3000` |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`                    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let cors_origins = string_or(&lookup, "CORS_ORIGINS", "http://localhost:3000")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            host: string_or(&lookup, "HOST", "0.0.0.0"),
            port: parse_or(&lookup, "PORT", 8000)?,
            cors_origins,
            request_timeout_secs: parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 30)?,
            shutdown_timeout_secs: parse_or(&lookup, "SHUTDOWN_TIMEOUT_SECS", 30)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Worker endpoints, dispatch tuning and render limits.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub ml_server_url: String,
    pub ml_timeout: Duration,
    pub gpu_server_url: String,
    pub gpu_timeout: Duration,
    /// Public base URL of this service, sent to the ML worker so it can call
    /// back.
    pub public_base_url: String,
    /// Full URL the GPU worker posts render callbacks to.
    pub render_callback_url: String,
    /// HMAC secret for worker callbacks. Unset disables verification.
    pub webhook_secret: Option<String>,
    pub s3_bucket: String,
    pub aws_region: String,
    pub dispatch_workers: usize,
    pub dispatch_queue_capacity: usize,
    pub retry: RetryPolicy,
    pub quota: QuotaLimits,
    /// Redis holding live render progress. Unset disables the overlay.
    pub redis_url: Option<String>,
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let public_base_url = trim_slash(string_or(&lookup, "FASTAPI_BASE_URL", "http://localhost:8000"));
        let callback_base = lookup("RENDER_CALLBACK_URL")
            .filter(|v| !v.trim().is_empty())
            .map(trim_slash)
            .unwrap_or_else(|| public_base_url.clone());

        let defaults = QuotaLimits::default();
        let retry_defaults = RetryPolicy::default();

        Ok(Self {
            ml_server_url: trim_slash(string_or(&lookup, "MODEL_SERVER_URL", "http://localhost:8080")),
            ml_timeout: Duration::from_secs(parse_or(&lookup, "ML_API_TIMEOUT", 300)?),
            gpu_server_url: trim_slash(string_or(
                &lookup,
                "GPU_RENDER_SERVER_URL",
                "http://localhost:8090",
            )),
            gpu_timeout: Duration::from_secs(parse_or(&lookup, "GPU_RENDER_TIMEOUT", 1800)?),
            render_callback_url: format!("{callback_base}{RENDER_CALLBACK_PATH}"),
            public_base_url,
            webhook_secret: lookup("WEBHOOK_SECRET_KEY").filter(|v| !v.is_empty()),
            s3_bucket: string_or(&lookup, "S3_BUCKET_NAME", "default-bucket"),
            aws_region: string_or(&lookup, "AWS_REGION", "us-east-1"),
            dispatch_workers: parse_or(&lookup, "DISPATCH_WORKERS", 4)?,
            dispatch_queue_capacity: parse_or(&lookup, "DISPATCH_QUEUE_CAPACITY", 256)?,
            retry: RetryPolicy {
                max_retries: parse_or(&lookup, "DISPATCH_MAX_RETRIES", retry_defaults.max_retries)?,
                backoff_step: Duration::from_secs(parse_or(
                    &lookup,
                    "DISPATCH_BACKOFF_STEP_SECS",
                    retry_defaults.backoff_step.as_secs(),
                )?),
            },
            quota: QuotaLimits {
                daily: parse_or(&lookup, "RENDER_QUOTA_DAILY", defaults.daily)?,
                monthly: parse_or(&lookup, "RENDER_QUOTA_MONTHLY", defaults.monthly)?,
                concurrent: parse_or(&lookup, "RENDER_CONCURRENT_LIMIT", defaults.concurrent)?,
            },
            redis_url: lookup("REDIS_URL").filter(|v| !v.trim().is_empty()),
        })
    }

    /// Public URL of an uploaded object.
    pub fn s3_object_url(&self, file_key: &str) -> String {
        format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            self.s3_bucket, self.aws_region, file_key
        )
    }
}

fn trim_slash(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
