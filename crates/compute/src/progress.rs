//! Read-only view of the render progress the GPU worker keeps in Redis.
//!
//! The relational store stays the source of truth; this cache only enriches
//! status responses with fresher progress between callbacks. Read failures
//! are logged and treated as a miss.

use async_trait::async_trait;
use hoit_core::types::JobId;
use redis::AsyncCommands;
use serde_json::Value;

#[async_trait]
pub trait ProgressCache: Send + Sync {
    /// Latest progress document for a render job, if the worker wrote one.
    async fn render_progress(&self, job_id: JobId) -> Option<Value>;
}

/// Key under which the GPU worker stores a job's progress document.
pub fn render_progress_key(job_id: JobId) -> String {
    format!("render_progress:{job_id}")
}

/// Redis-backed [`ProgressCache`].
pub struct RedisProgressCache {
    client: redis::Client,
}

impl RedisProgressCache {
    pub fn new(redis_url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    async fn fetch(&self, key: &str) -> Result<Option<String>, redis::RedisError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.get(key).await
    }
}

#[async_trait]
impl ProgressCache for RedisProgressCache {
    async fn render_progress(&self, job_id: JobId) -> Option<Value> {
        let key = render_progress_key(job_id);
        match self.fetch(&key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(%job_id, error = %e, "Unparseable render progress entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(%job_id, error = %e, "Render progress read failed");
                None
            }
        }
    }
}

/// [`ProgressCache`] used when no Redis is configured.
pub struct NoopProgressCache;

#[async_trait]
impl ProgressCache for NoopProgressCache {
    async fn render_progress(&self, _job_id: JobId) -> Option<Value> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_format() {
        let job_id = JobId::nil();
        assert_eq!(
            render_progress_key(job_id),
            "render_progress:00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn rejects_malformed_url() {
        assert!(RedisProgressCache::new("not a url").is_err());
    }

    #[tokio::test]
    async fn noop_always_misses() {
        assert!(NoopProgressCache.render_progress(JobId::new_v4()).await.is_none());
    }
}
