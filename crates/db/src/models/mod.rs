//! Row structs, create inputs and patches for each table.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A create input for inserts
//! - A patch struct (all `Option` fields) applied by the store's update

pub mod job;
pub mod render_job;
pub mod render_limits;
pub mod status;
pub mod usage_stats;
