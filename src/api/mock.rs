//! Programmable in-memory gateway for tests: records every call and can be
//! scripted to fail transiently, reject duplicates, go offline, or stall.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::models::{
    ClientRecord, PerformanceRow, Product, ProductImage, Route, SuggestedOrder, VisitDay,
    VisitRecord,
};

use super::gateway::{Gateway, LoginRequest, LoginResponse, Profile};
use super::ApiError;

#[derive(Default)]
pub struct MockGateway {
    pub calls: Mutex<Vec<String>>,
    offline: AtomicBool,
    duplicate_order: AtomicBool,
    call_delay_ms: AtomicU64,
    /// Call descriptors that fail with a transient network error.
    fail_calls: Mutex<HashSet<String>>,
    /// Call descriptors that fail permanently (not found on the remote).
    reject_calls: Mutex<HashSet<String>>,

    pub products: Mutex<Vec<Product>>,
    pub routes: Mutex<Vec<Route>>,
    pub clients: Mutex<Vec<ClientRecord>>,
    pub images: Mutex<Vec<ProductImage>>,
    pub performance: Mutex<Vec<PerformanceRow>>,
    /// Visit snapshots keyed by `route:day`.
    pub visits: Mutex<HashMap<String, Vec<VisitRecord>>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_duplicate_order(&self, duplicate: bool) {
        self.duplicate_order.store(duplicate, Ordering::SeqCst);
    }

    pub fn set_call_delay_ms(&self, delay: u64) {
        self.call_delay_ms.store(delay, Ordering::SeqCst);
    }

    pub fn fail_call(&self, descriptor: &str) {
        self.fail_calls.lock().unwrap().insert(descriptor.to_string());
    }

    pub fn reject_call(&self, descriptor: &str) {
        self.reject_calls
            .lock()
            .unwrap()
            .insert(descriptor.to_string());
    }

    pub fn recorded_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_matching(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    async fn gate(&self, descriptor: &str) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(descriptor.to_string());
        let delay = self.call_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(ApiError::Network("mock offline".to_string()));
        }
        if self.fail_calls.lock().unwrap().contains(descriptor) {
            return Err(ApiError::Network("injected failure".to_string()));
        }
        if self.reject_calls.lock().unwrap().contains(descriptor) {
            return Err(ApiError::NotFound(descriptor.to_string()));
        }
        Ok(())
    }
}

impl Gateway for MockGateway {
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ApiError> {
        self.gate(&format!("login:{}", request.login_id)).await?;
        Ok(LoginResponse {
            success: true,
            token: Some("mock-token".to_string()),
            profile: Some(Profile {
                user_id: "42".to_string(),
                name: Some(request.login_id.clone()),
            }),
        })
    }

    async fn fetch_products(&self, _owner_id: &str) -> Result<Vec<Product>, ApiError> {
        self.gate("fetch_products").await?;
        Ok(self.products.lock().unwrap().clone())
    }

    async fn fetch_clients(&self, _owner_id: &str) -> Result<Vec<ClientRecord>, ApiError> {
        self.gate("fetch_clients").await?;
        Ok(self.clients.lock().unwrap().clone())
    }

    async fn fetch_routes(&self, _owner_id: &str) -> Result<Vec<Route>, ApiError> {
        self.gate("fetch_routes").await?;
        Ok(self.routes.lock().unwrap().clone())
    }

    async fn fetch_product_images(&self, _owner_id: &str) -> Result<Vec<ProductImage>, ApiError> {
        self.gate("fetch_product_images").await?;
        Ok(self.images.lock().unwrap().clone())
    }

    async fn fetch_performance(
        &self,
        day: VisitDay,
        date: &str,
    ) -> Result<Vec<PerformanceRow>, ApiError> {
        self.gate(&format!("fetch_performance:{day}:{date}")).await?;
        Ok(self.performance.lock().unwrap().clone())
    }

    async fn submit_suggested_order(
        &self,
        _owner_id: &str,
        order: &SuggestedOrder,
    ) -> Result<(), ApiError> {
        self.gate(&format!("submit_suggested:{}:{}", order.day, order.date))
            .await?;
        if self.duplicate_order.load(Ordering::SeqCst) {
            return Err(ApiError::DuplicateForDay);
        }
        Ok(())
    }

    async fn sheet_clients(
        &self,
        route: &str,
        day: VisitDay,
    ) -> Result<Vec<VisitRecord>, ApiError> {
        self.gate(&format!("sheet_clients:{route}:{day}")).await?;
        Ok(self
            .visits
            .lock()
            .unwrap()
            .get(&format!("{route}:{day}"))
            .cloned()
            .unwrap_or_default())
    }

    async fn mark_visited(
        &self,
        route: &str,
        day: VisitDay,
        orden: u32,
        visited: bool,
    ) -> Result<(), ApiError> {
        self.gate(&format!("mark_visited:{route}:{day}:{orden}:{visited}"))
            .await?;
        Ok(())
    }

    async fn clear_visits(&self, route: &str, day: VisitDay) -> Result<(), ApiError> {
        self.gate(&format!("clear_visits:{route}:{day}")).await?;
        Ok(())
    }
}
