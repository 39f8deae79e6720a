//! Post-login warm-up: pull every entity the app can show offline.
//!
//! All entity fetches run concurrently and independently. One failing arm
//! never blocks the others, and a failure leaves whatever snapshot was
//! already cached in place, so the report is advisory rather than fatal.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::api::{ApiError, Gateway};
use crate::cache::{CacheScope, EntityCache, EntityKind, Partition};
use crate::models::{Route, VisitDay};
use crate::storage::KeyValueStore;

/// How many route/day visit fetches run at once during warm-up.
const VISIT_FETCH_CONCURRENCY: usize = 4;

/// Outcome of one warm-up pass. Each field carries the error message for
/// that arm, or `None` when the arm refreshed its snapshot.
#[derive(Debug, Default)]
pub struct PreloadReport {
    pub products: Option<String>,
    pub routes: Option<String>,
    pub clients: Option<String>,
    pub images: Option<String>,
    pub performance: Option<String>,
}

impl PreloadReport {
    pub fn is_complete(&self) -> bool {
        self.failures().is_empty()
    }

    /// The arms that failed, as `(entity, error)` pairs.
    pub fn failures(&self) -> Vec<(&'static str, &str)> {
        [
            ("products", &self.products),
            ("routes", &self.routes),
            ("clients", &self.clients),
            ("images", &self.images),
            ("performance", &self.performance),
        ]
        .into_iter()
        .filter_map(|(name, err)| err.as_deref().map(|e| (name, e)))
        .collect()
    }
}

/// Warm every cache scope for `user_id`. Arms run concurrently; each one is
/// fail-open and reports into the returned [`PreloadReport`].
pub async fn preload<S, G>(cache: &EntityCache<S>, gateway: &G, user_id: &str) -> PreloadReport
where
    S: KeyValueStore,
    G: Gateway,
{
    let today = VisitDay::today();
    let date = Utc::now().format("%Y-%m-%d").to_string();

    let products = async {
        let scope = CacheScope::new(user_id, EntityKind::Products);
        cache
            .refresh_with(&scope, gateway.fetch_products(user_id))
            .await
    };
    let routes = async { preload_routes(cache, gateway, user_id).await };
    let clients = async {
        let items = gateway.fetch_clients(user_id).await?;
        let count = items.len();
        if let Err(e) = cache
            .write_day_partitioned(user_id, EntityKind::Clients, &items, |c| c.visit_day)
            .await
        {
            warn!(error = %e, "failed to persist client snapshots");
        }
        Ok::<usize, ApiError>(count)
    };
    let images = async {
        let scope = CacheScope::new(user_id, EntityKind::Images);
        cache
            .refresh_with(&scope, gateway.fetch_product_images(user_id))
            .await
    };
    let performance = async {
        let scope =
            CacheScope::with_partition(user_id, EntityKind::Performance, Partition::Day(today));
        cache
            .refresh_with(&scope, gateway.fetch_performance(today, &date))
            .await
    };

    let (products, routes, clients, images, performance) =
        tokio::join!(products, routes, clients, images, performance);

    let report = PreloadReport {
        products: products.err().map(|e| e.to_string()),
        routes: routes.err().map(|e| e.to_string()),
        clients: clients.err().map(|e| e.to_string()),
        images: images.err().map(|e| e.to_string()),
        performance: performance.err().map(|e| e.to_string()),
    };
    if report.is_complete() {
        info!(user_id, "preload complete");
    } else {
        warn!(user_id, failures = ?report.failures(), "preload finished with failures");
    }
    report
}

/// Refresh the route list, then fan out over every (route, day) pair to
/// warm the per-day visit sheets those routes will need offline.
async fn preload_routes<S, G>(
    cache: &EntityCache<S>,
    gateway: &G,
    user_id: &str,
) -> Result<usize, ApiError>
where
    S: KeyValueStore,
    G: Gateway,
{
    let routes = gateway.fetch_routes(user_id).await?;
    let scope = CacheScope::new(user_id, EntityKind::Routes);
    if let Err(e) = cache.write_all(&scope, &routes).await {
        warn!(error = %e, "failed to persist route snapshot");
    }

    let pairs: Vec<(String, VisitDay)> = routes
        .iter()
        .flat_map(|route: &Route| route.days.iter().map(|&day| (route.name.clone(), day)))
        .collect();

    let mut fetched = stream::iter(pairs)
        .map(|(route, day)| async move {
            let scope = CacheScope::with_partition(
                user_id,
                EntityKind::Visits,
                Partition::RouteDay {
                    route: route.clone(),
                    day,
                },
            );
            let result = cache
                .refresh_with(&scope, gateway.sheet_clients(&route, day))
                .await;
            if let Err(ref e) = result {
                warn!(route, %day, error = %e, "visit sheet warm-up failed");
            }
            result
        })
        .buffer_unordered(VISIT_FETCH_CONCURRENCY);

    // The route list itself made it into the cache; visit-sheet misses are
    // logged above and retried by the next sync.
    while fetched.next().await.is_some() {}
    Ok(routes.len())
}
