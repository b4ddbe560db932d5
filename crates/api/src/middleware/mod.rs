//! Request extractors.
//!
//! - [`identity::Caller`] -- the optional caller identity from `X-User-Id`.

pub mod identity;
