use std::sync::Arc;

use hoit_compute::gpu::GpuRenderApi;
use hoit_compute::ml::MlServerApi;
use hoit_compute::progress::ProgressCache;
use hoit_compute::transport::WorkerTransport;
use hoit_db::store::{JobStore, RenderJobStore, RenderLimitStore, StoreHealth, UsageStore};
use hoit_pipeline::callback::CallbackGateway;
use hoit_pipeline::dispatch::Dispatcher;
use hoit_pipeline::queue::{DispatchQueue, DispatchWorkers};
use hoit_pipeline::quota::QuotaGuard;
use hoit_pipeline::usage::UsageAccumulator;

use crate::config::PipelineConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone: everything is behind `Arc` or is a handle.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<PipelineConfig>,
    pub jobs: Arc<dyn JobStore>,
    pub render_jobs: Arc<dyn RenderJobStore>,
    pub store_health: Arc<dyn StoreHealth>,
    pub progress: Arc<dyn ProgressCache>,
    pub dispatcher: Arc<Dispatcher>,
    pub queue: DispatchQueue,
    pub callbacks: CallbackGateway,
    pub quota: QuotaGuard,
    pub usage: UsageAccumulator,
}

/// Worker transports. Production uses one HTTP client for both; tests
/// script them separately.
pub struct Transports {
    pub ml: Arc<dyn WorkerTransport>,
    pub gpu: Arc<dyn WorkerTransport>,
}

impl AppState {
    /// Wire the pipeline over `store` and start the dispatch workers.
    ///
    /// Must be called inside a tokio runtime.
    pub fn build<S>(
        store: Arc<S>,
        progress: Arc<dyn ProgressCache>,
        transports: Transports,
        config: PipelineConfig,
    ) -> (Self, DispatchWorkers)
    where
        S: JobStore + RenderJobStore + UsageStore + RenderLimitStore + StoreHealth + 'static,
    {
        let usage = UsageAccumulator::new(store.clone());
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            store.clone(),
            usage.clone(),
            MlServerApi::new(transports.ml, config.ml_server_url.clone(), config.ml_timeout),
            GpuRenderApi::new(transports.gpu, config.gpu_server_url.clone(), config.gpu_timeout),
            config.retry,
            config.render_callback_url.clone(),
        ));
        let (queue, workers) = DispatchQueue::start(
            Arc::clone(&dispatcher),
            config.dispatch_workers,
            config.dispatch_queue_capacity,
        );
        let callbacks =
            CallbackGateway::new(store.clone(), store.clone(), usage.clone(), queue.clone());
        let quota = QuotaGuard::new(store.clone(), store.clone(), config.quota);

        let state = Self {
            config: Arc::new(config),
            jobs: store.clone(),
            render_jobs: store.clone(),
            store_health: store,
            progress,
            dispatcher,
            queue,
            callbacks,
            quota,
            usage,
        };
        (state, workers)
    }
}
