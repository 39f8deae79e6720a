//! Rutacache - offline-first sync engine for a mobile field-sales app.
//!
//! The crate keeps a locally cached view of server-owned entities (products,
//! routes, clients, visit records, performance rows) usable without
//! connectivity, queues client-originated mutations that could not be
//! confirmed remotely, and reconciles them against the remote source of
//! truth when connectivity returns.
//!
//! The main pieces:
//! - [`storage`]: a thin persistent key-value store everything builds on
//! - [`cache`]: per-user, per-entity, per-partition snapshots with fail-open refresh
//! - [`queue`]: a durable, ordered, deduplicated pending-mutation queue
//! - [`connectivity`]: edge-triggered online/offline detection
//! - [`sync`]: the single-flight reconciliation pass
//! - [`engine`]: the facade wiring sessions, preload, user actions, and sync

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod connectivity;
pub mod engine;
pub mod models;
pub mod preload;
pub mod queue;
pub mod storage;
pub mod sync;

pub use api::{ApiError, Gateway, HttpGateway, LoginRequest, LoginResponse};
pub use auth::{Session, SessionData};
pub use cache::{CacheEntry, CacheScope, EntityCache, EntityKind, Partition};
pub use config::Config;
pub use connectivity::{ConnectivityEdge, ConnectivityMonitor, ConnectivitySnapshot};
pub use engine::{LoginOutcome, StartupOutcome, SyncEngine, WriteOutcome};
pub use models::{
    ClientRecord, OrderItem, PerformanceRow, Product, ProductImage, Route, SuggestedOrder,
    VisitDay, VisitRecord,
};
pub use preload::{preload, PreloadReport};
pub use queue::{MutationKind, PendingMutation, PendingQueue, QueueScope};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StoreError};
pub use sync::{SyncCoordinator, SyncReport, SyncTrigger};
