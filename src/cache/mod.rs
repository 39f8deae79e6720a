//! Local entity caching for offline data access.
//!
//! Snapshots of server-owned entities are stored per user, per entity type,
//! and optionally per partition (weekday, or route+day). A snapshot is
//! always replaced wholesale; readers see either the old items or the fully
//! new ones, never a half-write. Refreshes are fail-open: when the remote
//! cannot be reached, the stale snapshot stays - stale data beats no data.

pub mod manager;
pub mod scope;

pub use manager::{CacheEntry, EntityCache};
pub use scope::{CacheScope, EntityKind, Partition};
