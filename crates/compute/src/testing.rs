//! Scripted [`WorkerTransport`] for tests.
//!
//! Responses are queued per call in order; every request is recorded so
//! tests can assert on URLs, payloads and attempt counts.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::transport::{WorkerError, WorkerResponse, WorkerTransport};

/// One recorded outbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: &'static str,
    pub url: String,
    pub body: Option<Value>,
    pub timeout: Duration,
}

/// What the scripted transport should do for one call.
#[derive(Debug)]
pub enum Scripted {
    Respond(WorkerResponse),
    Connect,
    Timeout,
    Other,
    /// Never answer.
    Hang,
}

/// Transport that plays back a queue of scripted outcomes.
///
/// When the queue runs dry it keeps answering with the fallback (200 `{}`
/// unless changed with [`ScriptedTransport::with_fallback`]).
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    fallback: WorkerResponse,
    calls: Mutex<Vec<RecordedCall>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: WorkerResponse::new(200, "{}"),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fallback(mut self, response: WorkerResponse) -> Self {
        self.fallback = response;
        self
    }

    /// Queue the next outcome.
    pub fn push(&self, outcome: Scripted) -> &Self {
        lock(&self.script).push_back(outcome);
        self
    }

    /// Queue a plain response.
    pub fn respond(&self, status: u16, body: impl Into<String>) -> &Self {
        self.push(Scripted::Respond(WorkerResponse::new(status, body)))
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    async fn next(&self, call: RecordedCall) -> Result<WorkerResponse, WorkerError> {
        let timeout = call.timeout;
        lock(&self.calls).push(call);
        let outcome = lock(&self.script).pop_front();
        match outcome {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Connect) => Err(WorkerError::Connect("connection refused".to_string())),
            Some(Scripted::Timeout) => Err(WorkerError::Timeout(timeout)),
            Some(Scripted::Other) => Err(WorkerError::Other("scripted failure".to_string())),
            Some(Scripted::Hang) => std::future::pending().await,
            None => Ok(self.fallback.clone()),
        }
    }
}

#[async_trait]
impl WorkerTransport for ScriptedTransport {
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<WorkerResponse, WorkerError> {
        self.next(RecordedCall {
            method: "POST",
            url: url.to_string(),
            body: Some(body.clone()),
            timeout,
        })
        .await
    }

    async fn get(&self, url: &str, timeout: Duration) -> Result<WorkerResponse, WorkerError> {
        self.next(RecordedCall {
            method: "GET",
            url: url.to_string(),
            body: None,
            timeout,
        })
        .await
    }
}
