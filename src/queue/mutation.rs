//! Client-originated mutations awaiting remote confirmation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::Partition;
use crate::models::SuggestedOrder;

/// The operation a pending mutation replays against the remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MutationKind {
    MarkVisited {
        route: String,
        day: crate::models::VisitDay,
        orden: u32,
        visited: bool,
    },
    ClearVisits {
        route: String,
        day: crate::models::VisitDay,
    },
    SubmitSuggested {
        order: SuggestedOrder,
    },
}

impl MutationKind {
    /// Short name used in sync reports and logs.
    pub fn name(&self) -> &'static str {
        match self {
            MutationKind::MarkVisited { .. } => "mark_visited",
            MutationKind::ClearVisits { .. } => "clear_visits",
            MutationKind::SubmitSuggested { .. } => "submit_suggested",
        }
    }

    /// Identity of the logical target. Two mutations with the same target
    /// are the same pending change; enqueueing the second is a no-op.
    pub fn target(&self) -> String {
        match self {
            MutationKind::MarkVisited {
                route, day, orden, ..
            } => format!("visit:{route}:{day}:{orden}"),
            MutationKind::ClearVisits { route, day } => format!("clear:{route}:{day}"),
            MutationKind::SubmitSuggested { order } => {
                format!("sugerido:{}:{}", order.day, order.date)
            }
        }
    }

    /// The queue partition this mutation is scoped to; replay order is
    /// preserved within one partition.
    pub fn queue_partition(&self) -> Partition {
        match self {
            MutationKind::MarkVisited { route, day, .. }
            | MutationKind::ClearVisits { route, day } => Partition::RouteDay {
                route: route.clone(),
                day: *day,
            },
            MutationKind::SubmitSuggested { order } => Partition::Day(order.day),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingMutation {
    pub kind: MutationKind,
    pub created_at: DateTime<Utc>,
    /// Replay attempts so far; bounded by the queue's retry policy.
    #[serde(default)]
    pub attempts: u32,
}

impl PendingMutation {
    pub fn new(kind: MutationKind) -> Self {
        Self {
            kind,
            created_at: Utc::now(),
            attempts: 0,
        }
    }
}
