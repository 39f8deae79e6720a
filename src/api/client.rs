//! HTTP transport for the backend REST API and the spreadsheet-backed
//! service.
//!
//! The backend serves entity reads and order submission; the sheet service
//! is a single action-dispatch endpoint (`getRoutes`, `getClients`,
//! `markVisited`, `clearVisits`) answering `{success, ...}` envelopes.

use std::sync::RwLock;
use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::config::Config;
use crate::models::{
    ClientRecord, PerformanceRow, Product, ProductImage, Route, SuggestedOrder, VisitDay,
    VisitRecord,
};

use super::gateway::{Gateway, LoginRequest, LoginResponse};
use super::ApiError;

/// Error code the backend uses for a same-day duplicate order submission.
const DUPLICATE_FOR_DAY: &str = "DUPLICATE_FOR_DAY";

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error_code: Option<String>,
}

/// HTTP gateway over both remote services. One `reqwest::Client` backs
/// every call, so connections are pooled across entity fetches.
pub struct HttpGateway {
    client: Client,
    api_base: String,
    sheet_base: String,
    token: RwLock<Option<String>>,
}

impl HttpGateway {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_base: config.api_base_url.trim_end_matches('/').to_string(),
            sheet_base: config.sheet_base_url.clone(),
            token: RwLock::new(None),
        })
    }

    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let mut request = self.client.get(url);
        if let Some(token) = self.token() {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(ApiError::from)?;
        let status = response.status();
        let text = response.text().await.map_err(ApiError::from)?;
        if !status.is_success() {
            return Err(ApiError::from_status(status, &text));
        }
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("{url}: {e}")))
    }

    async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let mut request = self.client.post(url).json(body);
        if let Some(token) = self.token() {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(ApiError::from)?;
        let status = response.status();
        let text = response.text().await.map_err(ApiError::from)?;
        if !status.is_success() {
            return Err(ApiError::from_status(status, &text));
        }
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("{url}: {e}")))
    }

    /// One round-trip to the sheet endpoint. The envelope must report
    /// `success: true` before the payload is deserialized.
    async fn sheet_call<T: DeserializeOwned>(
        &self,
        body: serde_json::Value,
    ) -> Result<T, ApiError> {
        let response = self
            .client
            .post(&self.sheet_base)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::from)?;
        let status = response.status();
        let text = response.text().await.map_err(ApiError::from)?;
        if !status.is_success() {
            return Err(ApiError::from_status(status, &text));
        }

        let value: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("sheet response: {e}")))?;
        if value.get("success").and_then(serde_json::Value::as_bool) != Some(true) {
            let message = value
                .get("error")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("sheet call reported failure");
            return Err(ApiError::ServerError(message.to_string()));
        }
        serde_json::from_value(value)
            .map_err(|e| ApiError::InvalidResponse(format!("sheet payload: {e}")))
    }

    fn api_url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.api_base, path_and_query)
    }
}

#[derive(Debug, Deserialize)]
struct SheetRoutes {
    #[serde(default)]
    routes: Vec<Route>,
}

#[derive(Debug, Deserialize)]
struct SheetClients {
    #[serde(default)]
    clients: Vec<VisitRecord>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct SheetAck {
    success: bool,
}

impl Gateway for HttpGateway {
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ApiError> {
        let url = self.api_url("/login");
        let response: LoginResponse = self.post_json(&url, request).await?;
        if !response.success {
            return Err(ApiError::Unauthorized);
        }
        Ok(response)
    }

    async fn fetch_products(&self, owner_id: &str) -> Result<Vec<Product>, ApiError> {
        self.get_json(&self.api_url(&format!("/products?ownerId={owner_id}")))
            .await
    }

    async fn fetch_clients(&self, owner_id: &str) -> Result<Vec<ClientRecord>, ApiError> {
        self.get_json(&self.api_url(&format!("/clients?ownerId={owner_id}")))
            .await
    }

    /// Routes come from the backend; when it is unreachable the sheet
    /// service answers the same question through `getRoutes`.
    async fn fetch_routes(&self, owner_id: &str) -> Result<Vec<Route>, ApiError> {
        let url = self.api_url(&format!("/routes?ownerId={owner_id}"));
        match self.get_json::<Vec<Route>>(&url).await {
            Ok(routes) => Ok(routes),
            Err(e) if e.is_transient() => {
                warn!(error = %e, "backend route fetch failed, falling back to sheet");
                let payload: SheetRoutes = self
                    .sheet_call(json!({ "action": "getRoutes", "ownerId": owner_id }))
                    .await?;
                Ok(payload.routes)
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_product_images(&self, owner_id: &str) -> Result<Vec<ProductImage>, ApiError> {
        self.get_json(&self.api_url(&format!("/product-images?ownerId={owner_id}")))
            .await
    }

    async fn fetch_performance(
        &self,
        day: VisitDay,
        date: &str,
    ) -> Result<Vec<PerformanceRow>, ApiError> {
        self.get_json(&self.api_url(&format!("/performance?day={day}&date={date}")))
            .await
    }

    async fn submit_suggested_order(
        &self,
        owner_id: &str,
        order: &SuggestedOrder,
    ) -> Result<(), ApiError> {
        let url = self.api_url("/submit-suggested-order");
        let body = json!({
            "ownerId": owner_id,
            "day": order.day,
            "date": order.date,
            "items": order.items,
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(token) = self.token() {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(ApiError::from)?;
        let status = response.status();
        let text = response.text().await.map_err(ApiError::from)?;

        // The duplicate error code may arrive with any status - check it
        // before the generic status mapping so the conflict is never
        // mistaken for a retryable failure.
        let parsed: SubmitResponse = serde_json::from_str(&text).unwrap_or_default();
        if parsed.error_code.as_deref() == Some(DUPLICATE_FOR_DAY) {
            return Err(ApiError::DuplicateForDay);
        }
        if !status.is_success() {
            return Err(ApiError::from_status(status, &text));
        }
        if !parsed.success {
            return Err(ApiError::InvalidResponse(
                "order submission not acknowledged".to_string(),
            ));
        }
        debug!(day = %order.day, date = %order.date, items = order.items.len(), "suggested order accepted");
        Ok(())
    }

    async fn sheet_clients(
        &self,
        route: &str,
        day: VisitDay,
    ) -> Result<Vec<VisitRecord>, ApiError> {
        let payload: SheetClients = self
            .sheet_call(json!({ "action": "getClients", "route": route, "day": day }))
            .await?;
        Ok(payload.clients)
    }

    async fn mark_visited(
        &self,
        route: &str,
        day: VisitDay,
        orden: u32,
        visited: bool,
    ) -> Result<(), ApiError> {
        let _: SheetAck = self
            .sheet_call(json!({
                "action": "markVisited",
                "route": route,
                "day": day,
                "orden": orden,
                "visited": visited,
            }))
            .await?;
        Ok(())
    }

    async fn clear_visits(&self, route: &str, day: VisitDay) -> Result<(), ApiError> {
        let _: SheetAck = self
            .sheet_call(json!({ "action": "clearVisits", "route": route, "day": day }))
            .await?;
        Ok(())
    }

    fn set_auth_token(&self, token: Option<String>) {
        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = token;
    }
}
