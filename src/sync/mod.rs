//! Replay of queued mutations once the remote side is reachable again.
//!
//! A sync pass drains every pending queue scope for the user, replays each
//! mutation against the gateway, and refreshes the visit snapshots the
//! confirmed mutations touched. Passes are single-flight; a trigger that
//! arrives while one is running is dropped, not queued.

pub mod coordinator;

pub use coordinator::{SyncCoordinator, SyncReport, SyncTrigger};
