//! Session state: who is logged in and which token to speak with.
//!
//! Unlike the cached entities, session state is tiny and is kept under two
//! well-known durable keys so a relaunch can pick up where the last run
//! left off without talking to the network.

pub mod session;

pub use session::{Session, SessionData};
