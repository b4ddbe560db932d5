//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod job_repo;
pub mod render_job_repo;
pub mod render_limit_repo;
pub mod usage_stats_repo;

pub use job_repo::JobRepo;
pub use render_job_repo::RenderJobRepo;
pub use render_limit_repo::RenderLimitRepo;
pub use usage_stats_repo::UsageStatsRepo;
