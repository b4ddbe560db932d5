#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use hoit_compute::gpu::GpuRenderApi;
use hoit_compute::ml::{MlServerApi, ProcessVideoRequest, AUTO_LANGUAGE};
use hoit_compute::testing::ScriptedTransport;
use hoit_db::memory::MemoryStore;
use hoit_db::models::job::{CreateJob, Job};
use hoit_db::models::render_job::{CreateRenderJob, RenderJob};
use hoit_db::models::status::JobStatus;
use hoit_db::store::{JobStore, RenderJobStore};
use hoit_pipeline::callback::CallbackGateway;
use hoit_pipeline::dispatch::Dispatcher;
use hoit_pipeline::queue::{DispatchQueue, DispatchWorkers};
use hoit_pipeline::retry::RetryPolicy;
use hoit_pipeline::usage::UsageAccumulator;
use serde_json::json;

pub const ML_URL: &str = "http://ml.test";
pub const GPU_URL: &str = "http://gpu.test";
pub const CALLBACK_URL: &str = "http://api.test/api/render/callback";

/// Dispatcher over an in-memory store and two scripted workers.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub ml: Arc<ScriptedTransport>,
    pub gpu: Arc<ScriptedTransport>,
    pub dispatcher: Arc<Dispatcher>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let ml = Arc::new(ScriptedTransport::new());
        let gpu = Arc::new(ScriptedTransport::new());
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            store.clone(),
            UsageAccumulator::new(store.clone()),
            MlServerApi::new(ml.clone(), ML_URL.to_string(), Duration::from_secs(300)),
            GpuRenderApi::new(gpu.clone(), GPU_URL.to_string(), Duration::from_secs(1800)),
            RetryPolicy::default(),
            CALLBACK_URL.to_string(),
        ));
        Self {
            store,
            ml,
            gpu,
            dispatcher,
        }
    }

    pub fn start_queue(&self) -> (DispatchQueue, DispatchWorkers) {
        DispatchQueue::start(self.dispatcher.clone(), 2, 16)
    }

    pub fn gateway(&self, queue: DispatchQueue) -> CallbackGateway {
        CallbackGateway::new(
            self.store.clone(),
            self.store.clone(),
            UsageAccumulator::new(self.store.clone()),
            queue,
        )
    }

    pub async fn transcription_job(&self) -> Job {
        self.store
            .create_job(&CreateJob {
                job_id: None,
                status: JobStatus::Processing,
                progress: 0,
                video_url: Some("https://bucket.s3.us-east-1.amazonaws.com/v.mp4".to_string()),
                file_key: Some("v.mp4".to_string()),
            })
            .await
            .unwrap()
    }

    pub fn process_request(job: &Job) -> ProcessVideoRequest {
        ProcessVideoRequest {
            job_id: job.job_id,
            video_url: job.video_url.clone().unwrap_or_default(),
            fastapi_base_url: "http://api.test".to_string(),
            language: AUTO_LANGUAGE.to_string(),
        }
    }

    pub async fn render_job(&self, user: Option<&str>) -> RenderJob {
        self.store
            .create_render_job(&CreateRenderJob {
                job_id: None,
                user_id: user.map(str::to_string),
                video_url: "https://cdn.example.com/clip.mp4".to_string(),
                video_name: Some("clip".to_string()),
                scenario: json!({
                    "version": "1.0",
                    "cues": [{"id": "c1", "hintTime": {"start": 0}}, {"id": "c2", "hintTime": {"start": 1}}]
                }),
                options: json!({"width": 1920, "height": 1080, "fps": 30}),
                estimated_time: 40,
            })
            .await
            .unwrap()
    }
}
