#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use hoit_api::config::{PipelineConfig, ServerConfig};
use hoit_api::router::build_app_router;
use hoit_api::state::{AppState, Transports};
use hoit_compute::progress::{NoopProgressCache, ProgressCache};
use hoit_compute::testing::ScriptedTransport;
use hoit_db::memory::MemoryStore;
use hoit_pipeline::queue::DispatchWorkers;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

pub const ML_URL: &str = "http://ml.test";
pub const GPU_URL: &str = "http://gpu.test";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:3000".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
    }
}

/// Pipeline settings pointing at the scripted workers, with no retry delay.
pub fn pipeline_config() -> PipelineConfig {
    let lookup = |key: &str| match key {
        "MODEL_SERVER_URL" => Some(ML_URL.to_string()),
        "GPU_RENDER_SERVER_URL" => Some(GPU_URL.to_string()),
        "FASTAPI_BASE_URL" => Some("http://api.test".to_string()),
        "S3_BUCKET_NAME" => Some("uploads".to_string()),
        "DISPATCH_BACKOFF_STEP_SECS" => Some("0".to_string()),
        _ => None,
    };
    PipelineConfig::from_lookup(lookup).expect("test config is valid")
}

/// Full router over an in-memory store and scripted workers.
pub struct TestApp {
    pub app: Router,
    pub store: Arc<MemoryStore>,
    pub ml: Arc<ScriptedTransport>,
    pub gpu: Arc<ScriptedTransport>,
    pub workers: Option<DispatchWorkers>,
}

pub fn build_test_app() -> TestApp {
    build_test_app_with(pipeline_config(), Arc::new(NoopProgressCache))
}

pub fn build_test_app_with(config: PipelineConfig, progress: Arc<dyn ProgressCache>) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let ml = Arc::new(ScriptedTransport::new());
    let gpu = Arc::new(ScriptedTransport::new());
    let (state, workers) = AppState::build(
        store.clone(),
        progress,
        Transports {
            ml: ml.clone(),
            gpu: gpu.clone(),
        },
        config,
    );
    TestApp {
        app: build_app_router(state, &test_config()),
        store,
        ml,
        gpu,
        workers: Some(workers),
    }
}

impl TestApp {
    /// Drain and stop the dispatch pool; later enqueues see a closed queue.
    pub async fn stop_workers(&mut self) {
        if let Some(workers) = self.workers.take() {
            assert!(workers.shutdown(Duration::from_secs(5)).await);
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, user: Option<&str>) -> Response<Body> {
        self.send(request(Method::GET, uri, user, Body::empty())).await
    }

    pub async fn delete(&self, uri: &str, user: Option<&str>) -> Response<Body> {
        self.send(request(Method::DELETE, uri, user, Body::empty())).await
    }

    pub async fn post_json(&self, uri: &str, user: Option<&str>, body: &Value) -> Response<Body> {
        self.send(request(Method::POST, uri, user, Body::from(body.to_string())))
            .await
    }
}

pub fn request(method: Method, uri: &str, user: Option<&str>, body: Body) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    builder.body(body).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 2s");
}
