//! Remote gateway: the HTTP contract to the backend REST API and the
//! spreadsheet-backed service.
//!
//! The engine depends only on the [`Gateway`] trait's request/response
//! shapes; [`HttpGateway`] is the production transport. Timeouts are
//! explicit and bound every outbound request - a timed-out write is a
//! failure, never a partial success.

pub mod client;
pub mod error;
pub mod gateway;

#[cfg(test)]
pub mod mock;

pub use client::HttpGateway;
pub use error::ApiError;
pub use gateway::{Gateway, LoginRequest, LoginResponse, Profile};
