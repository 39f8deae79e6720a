use serde::{Deserialize, Serialize};

use super::VisitDay;

/// A client record as served by the backend `/clients` endpoint.
///
/// `visit_day` drives the per-weekday cache partitioning; records without
/// one only appear in the aggregate snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRecord {
    pub id: String,
    pub contact_name: String,
    pub business_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub visit_day: Option<VisitDay>,
}
