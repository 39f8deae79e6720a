use serde::{Deserialize, Serialize};

/// One row of the day's performance summary (expired and returned units
/// against total moved) for a single product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceRow {
    pub product: String,
    #[serde(default)]
    pub expired: u32,
    #[serde(default)]
    pub returns: u32,
    #[serde(default)]
    pub total: u32,
}
