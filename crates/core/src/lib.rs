//! Domain logic shared by every HOIT backend crate.
//!
//! Nothing in here performs IO: persistence lives in `hoit-db`, outbound
//! HTTP in `hoit-compute`, orchestration in `hoit-pipeline`.

pub mod error;
pub mod estimation;
pub mod normalize;
pub mod quota;
pub mod render_request;
pub mod scenario;
pub mod signature;
pub mod transcript;
pub mod types;
