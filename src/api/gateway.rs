//! The remote contract the engine is written against.

use serde::{Deserialize, Serialize};

use crate::models::{
    ClientRecord, PerformanceRow, Product, ProductImage, Route, SuggestedOrder, VisitDay,
    VisitRecord,
};

use super::ApiError;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub login_id: String,
    pub password: String,
    pub device_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub profile: Option<Profile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user_id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Everything the engine asks of the remote side. Implementations must be
/// usable through `&self` from interleaved tasks.
#[allow(async_fn_in_trait)]
pub trait Gateway {
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ApiError>;

    async fn fetch_products(&self, owner_id: &str) -> Result<Vec<Product>, ApiError>;
    async fn fetch_clients(&self, owner_id: &str) -> Result<Vec<ClientRecord>, ApiError>;
    async fn fetch_routes(&self, owner_id: &str) -> Result<Vec<Route>, ApiError>;
    async fn fetch_product_images(&self, owner_id: &str) -> Result<Vec<ProductImage>, ApiError>;
    async fn fetch_performance(
        &self,
        day: VisitDay,
        date: &str,
    ) -> Result<Vec<PerformanceRow>, ApiError>;

    /// Submit a suggested restock order. A second submission for the same
    /// day comes back as [`ApiError::DuplicateForDay`].
    async fn submit_suggested_order(
        &self,
        owner_id: &str,
        order: &SuggestedOrder,
    ) -> Result<(), ApiError>;

    /// Clients of one route on one day, from the spreadsheet-backed service.
    async fn sheet_clients(
        &self,
        route: &str,
        day: VisitDay,
    ) -> Result<Vec<VisitRecord>, ApiError>;

    async fn mark_visited(
        &self,
        route: &str,
        day: VisitDay,
        orden: u32,
        visited: bool,
    ) -> Result<(), ApiError>;

    async fn clear_visits(&self, route: &str, day: VisitDay) -> Result<(), ApiError>;

    /// Install (or clear) the bearer token used by authenticated calls.
    /// Transports without token state can ignore this.
    fn set_auth_token(&self, token: Option<String>) {
        let _ = token;
    }
}
