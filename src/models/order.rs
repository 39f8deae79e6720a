use serde::{Deserialize, Serialize};

use super::VisitDay;

/// One line of a suggested restock order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub name: String,
    pub quantity: u32,
}

/// A suggested restock order (sugerido) for a given day.
///
/// The backend enforces at most one submission per salesperson per day;
/// a second attempt comes back as a business-rule conflict, not a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedOrder {
    pub day: VisitDay,
    /// Calendar date in `YYYY-MM-DD` form.
    pub date: String,
    pub items: Vec<OrderItem>,
}
