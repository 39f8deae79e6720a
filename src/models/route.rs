use serde::{Deserialize, Serialize};

use super::VisitDay;

/// A delivery route: a named, ordered collection of clients worked on
/// specific weekdays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub name: String,
    #[serde(default)]
    pub days: Vec<VisitDay>,
    #[serde(default)]
    pub client_count: Option<u32>,
}
