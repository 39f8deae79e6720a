//! Typed cache scopes and their storage-key derivation.
//!
//! The key scheme `<entity>_cache_<userId>[_<partition>]` is part of the
//! durable contract shared with the pending queue's
//! `pending_<userId>_<scope>` keys: keys must be stable across app restarts
//! and collision-free across scopes.
//!
//! Collision freedom holds because every variable component (user id, route
//! name) is sanitized to lowercase ASCII alphanumerics plus `-` before
//! keys are assembled, leaving `_` as a reserved separator, and day codes
//! are a fixed alphabetic set.

use serde::{Deserialize, Serialize};

use crate::models::VisitDay;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Products,
    Clients,
    Routes,
    Visits,
    Performance,
    Images,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Products => "products",
            EntityKind::Clients => "clients",
            EntityKind::Routes => "routes",
            EntityKind::Visits => "visits",
            EntityKind::Performance => "performance",
            EntityKind::Images => "images",
        }
    }
}

/// Optional partition within one user's entity snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Partition {
    /// One snapshot per weekday, alongside the partition-less aggregate.
    Day(VisitDay),
    /// One snapshot per route worked on a given day.
    RouteDay { route: String, day: VisitDay },
}

impl Partition {
    pub(crate) fn key_fragment(&self) -> String {
        match self {
            Partition::Day(day) => day.code().to_string(),
            Partition::RouteDay { route, day } => {
                format!("{}_{}", sanitize_component(route), day.code())
            }
        }
    }
}

/// Uniquely identifies one cached snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheScope {
    pub user_id: String,
    pub entity: EntityKind,
    pub partition: Option<Partition>,
}

impl CacheScope {
    pub fn new(user_id: impl Into<String>, entity: EntityKind) -> Self {
        Self {
            user_id: user_id.into(),
            entity,
            partition: None,
        }
    }

    pub fn with_partition(
        user_id: impl Into<String>,
        entity: EntityKind,
        partition: Partition,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            entity,
            partition: Some(partition),
        }
    }

    /// The durable storage key for this scope. Pure, deterministic, and
    /// collision-free across distinct scopes.
    pub fn storage_key(&self) -> String {
        let mut key = format!(
            "{}_cache_{}",
            self.entity.as_str(),
            sanitize_component(&self.user_id)
        );
        if let Some(partition) = &self.partition {
            key.push('_');
            key.push_str(&partition.key_fragment());
        }
        key
    }
}

/// Reduce a free-form component to lowercase ASCII alphanumerics, mapping
/// everything else to `-`. `_` stays reserved as the key separator.
pub(crate) fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}
