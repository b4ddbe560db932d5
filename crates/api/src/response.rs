//! Response envelope for the read-only account endpoints.
//!
//! Job endpoints answer with flat bodies that workers and existing clients
//! rely on; the usage and quota endpoints wrap their payload in
//! `{ "data": ... }`.

use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
