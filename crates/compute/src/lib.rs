//! Outbound side of the job pipelines.
//!
//! HTTP clients for the external ML (transcription) and GPU (render)
//! workers, both built on the [`transport::WorkerTransport`] seam, plus the
//! read-only render progress cache the GPU worker writes to.

pub mod gpu;
pub mod health;
pub mod ml;
pub mod progress;
pub mod transport;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;
