//! Data models for the field-sales domain.
//!
//! Every entity carries a stable identifier unique within its cache scope:
//! products and clients use `id`, visit records use `orden` (the client's
//! position within a route for a given day).

pub mod client;
pub mod day;
pub mod order;
pub mod performance;
pub mod product;
pub mod route;
pub mod visit;

pub use client::ClientRecord;
pub use day::VisitDay;
pub use order::{OrderItem, SuggestedOrder};
pub use performance::PerformanceRow;
pub use product::{Product, ProductImage};
pub use route::Route;
pub use visit::VisitRecord;
