//! Bounded background dispatch queue.
//!
//! Request handlers enqueue work and return immediately; a fixed pool of
//! tokio tasks drains the queue through the [`Dispatcher`]. A full queue
//! applies backpressure to the enqueuing handler.
//!
//! A task that can no longer run (queue closed, or still pending when the
//! shutdown timeout aborts the pool) fails its job with
//! [`codes::DISPATCH_UNAVAILABLE`] so the job stops counting as active.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use hoit_compute::ml::ProcessVideoRequest;
use hoit_core::types::JobId;
use hoit_db::models::render_job::RenderJob;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::dispatch::{codes, Dispatcher};
use crate::error::PipelineError;

/// Unit of background work.
#[derive(Debug, Clone)]
pub enum DispatchTask {
    Transcribe(ProcessVideoRequest),
    Render(Box<RenderJob>),
    /// Best-effort stop signal to the GPU worker.
    CancelRender(JobId),
    /// Summarize a completed transcription result.
    PostProcess(JobId),
}

impl DispatchTask {
    pub fn job_id(&self) -> JobId {
        match self {
            Self::Transcribe(request) => request.job_id,
            Self::Render(job) => job.job_id,
            Self::CancelRender(job_id) | Self::PostProcess(job_id) => *job_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transcribe(_) => "transcribe",
            Self::Render(_) => "render",
            Self::CancelRender(_) => "cancel_render",
            Self::PostProcess(_) => "post_process",
        }
    }
}

type SharedReceiver = Arc<Mutex<mpsc::Receiver<DispatchTask>>>;

/// Task each worker is currently executing, indexed by worker.
type InFlight = Arc<std::sync::Mutex<Vec<Option<DispatchTask>>>>;

/// Producer handle. Cheap to clone.
#[derive(Clone)]
pub struct DispatchQueue {
    sender: mpsc::Sender<DispatchTask>,
    dispatcher: Arc<Dispatcher>,
}

/// Worker pool handle, used to stop the pool.
pub struct DispatchWorkers {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
    dispatcher: Arc<Dispatcher>,
    receiver: SharedReceiver,
    in_flight: InFlight,
}

impl DispatchQueue {
    /// Spawn `workers` consumer tasks over a queue holding up to `capacity`
    /// pending tasks.
    pub fn start(
        dispatcher: Arc<Dispatcher>,
        workers: usize,
        capacity: usize,
    ) -> (Self, DispatchWorkers) {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let cancel = CancellationToken::new();
        let in_flight: InFlight = Arc::new(std::sync::Mutex::new(vec![None; workers]));

        let handles = (0..workers)
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    Arc::clone(&dispatcher),
                    Arc::clone(&receiver),
                    Arc::clone(&in_flight),
                    cancel.clone(),
                ))
            })
            .collect::<Vec<_>>();

        tracing::info!(workers, capacity, "Dispatch queue started");
        let pool = DispatchWorkers {
            cancel,
            handles,
            dispatcher: Arc::clone(&dispatcher),
            receiver,
            in_flight,
        };
        (Self { sender, dispatcher }, pool)
    }

    /// Queue a task, waiting for room when the queue is full.
    ///
    /// When the queue is closed the task's job is failed before
    /// [`PipelineError::QueueClosed`] is returned.
    pub async fn enqueue(&self, task: DispatchTask) -> Result<(), PipelineError> {
        let job_id = task.job_id();
        let kind = task.kind();
        if let Err(mpsc::error::SendError(task)) = self.sender.send(task).await {
            tracing::error!(%job_id, kind, "Dispatch queue closed, task dropped");
            abandon(&self.dispatcher, &task, "Dispatch queue is closed").await;
            return Err(PipelineError::QueueClosed);
        }
        tracing::debug!(%job_id, kind, "Task queued");
        Ok(())
    }
}

impl DispatchWorkers {
    /// Stop accepting work, let the workers finish what is already queued,
    /// and wait up to `timeout`. Returns `false` if the timeout elapsed
    /// first; unfinished workers are aborted and the jobs they were running
    /// or had yet to pick up are failed.
    pub async fn shutdown(mut self, timeout: Duration) -> bool {
        self.cancel.cancel();

        let drained = tokio::time::timeout(
            timeout,
            futures::future::join_all(self.handles.iter_mut()),
        )
        .await;
        if drained.is_ok() {
            tracing::info!("Dispatch queue drained");
            return true;
        }

        tracing::warn!(
            timeout_ms = timeout.as_millis() as u64,
            "Dispatch queue did not drain in time, aborting workers",
        );
        self.handles.iter().for_each(JoinHandle::abort);
        // Aborted workers release the receiver lock once they are dropped.
        // Handles that already yielded their output must not be polled again.
        futures::future::join_all(self.handles.iter_mut().filter(|handle| !handle.is_finished()))
            .await;

        let mut unfinished: Vec<DispatchTask> = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter_mut()
            .filter_map(Option::take)
            .collect();
        {
            let mut rx = self.receiver.lock().await;
            rx.close();
            while let Ok(task) = rx.try_recv() {
                unfinished.push(task);
            }
        }

        for task in &unfinished {
            tracing::warn!(job_id = %task.job_id(), kind = task.kind(), "Dispatch task abandoned at shutdown");
            abandon(&self.dispatcher, task, "Server shut down before dispatch completed").await;
        }
        false
    }
}

async fn abandon(dispatcher: &Dispatcher, task: &DispatchTask, message: &str) {
    if let Err(e) = dispatcher.abandon(task, message).await {
        tracing::error!(
            job_id = %task.job_id(),
            kind = task.kind(),
            code = codes::DISPATCH_UNAVAILABLE,
            error = %e,
            "Failed to record abandoned dispatch task",
        );
    }
}

async fn run_worker(
    worker: usize,
    dispatcher: Arc<Dispatcher>,
    receiver: SharedReceiver,
    in_flight: InFlight,
    cancel: CancellationToken,
) {
    loop {
        let next = {
            let mut rx = receiver.lock().await;
            let received = tokio::select! {
                biased;
                task = rx.recv() => Some(task),
                _ = cancel.cancelled() => None,
            };
            match received {
                Some(task) => task,
                None => {
                    // Refuse new sends; whatever is buffered still drains.
                    rx.close();
                    rx.try_recv().ok()
                }
            }
        };
        let Some(task) = next else { break };
        set_in_flight(&in_flight, worker, Some(task.clone()));
        execute(&dispatcher, task).await;
        set_in_flight(&in_flight, worker, None);
    }
    tracing::debug!(worker, "Dispatch worker stopped");
}

fn set_in_flight(in_flight: &InFlight, worker: usize, task: Option<DispatchTask>) {
    let mut slots = in_flight.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(slot) = slots.get_mut(worker) {
        *slot = task;
    }
}

async fn execute(dispatcher: &Dispatcher, task: DispatchTask) {
    let job_id = task.job_id();
    let kind = task.kind();

    let outcome = AssertUnwindSafe(run_task(dispatcher, task)).catch_unwind().await;
    match outcome {
        Ok(Ok(())) => {}
        // Already written to the job row by the dispatcher.
        Ok(Err(PipelineError::Dispatch { code, .. })) => {
            tracing::warn!(%job_id, kind, code = %code, "Dispatch task ended with job failure");
        }
        Ok(Err(e)) => tracing::error!(%job_id, kind, error = %e, "Dispatch task failed"),
        Err(_) => tracing::error!(%job_id, kind, "Dispatch task panicked"),
    }
}

async fn run_task(dispatcher: &Dispatcher, task: DispatchTask) -> Result<(), PipelineError> {
    match task {
        DispatchTask::Transcribe(request) => dispatcher.dispatch_transcription(&request).await,
        DispatchTask::Render(job) => dispatcher.dispatch_render(&job).await,
        DispatchTask::CancelRender(job_id) => {
            dispatcher.send_render_cancel(job_id).await;
            Ok(())
        }
        DispatchTask::PostProcess(job_id) => dispatcher.post_process_transcription(job_id).await,
    }
}
