//! Job orchestration: dispatch to external workers, webhook callback
//! handling, render admission control and usage accounting.
//!
//! Everything here works against the store traits from `hoit-db` and the
//! worker clients from `hoit-compute`, injected through constructors.

pub mod callback;
pub mod dispatch;
pub mod error;
pub mod queue;
pub mod quota;
pub mod retry;
pub mod usage;
