//! The facade the app talks to: login, connectivity observations, user
//! actions, and the sync passes they trigger.
//!
//! User actions are written to the local cache first. The remote write
//! happens inline when the link looks usable and is queued for replay when
//! it does not, so the app behaves the same on a good link, a flaky one,
//! and none at all.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use tracing::{info, warn};

use crate::api::{ApiError, Gateway, LoginRequest};
use crate::auth::{Session, SessionData};
use crate::cache::{CacheScope, EntityCache, EntityKind, Partition};
use crate::connectivity::{ConnectivityEdge, ConnectivityMonitor, ConnectivitySnapshot};
use crate::models::{SuggestedOrder, VisitDay, VisitRecord};
use crate::preload::{preload, PreloadReport};
use crate::queue::{MutationKind, PendingQueue, QueueScope};
use crate::storage::KeyValueStore;
use crate::sync::{SyncCoordinator, SyncReport, SyncTrigger};

/// Length of the per-login random device identifier.
const DEVICE_ID_LEN: usize = 16;

/// How a user action was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The remote accepted the write inline.
    Confirmed,
    /// Written locally and queued for replay.
    Queued,
    /// The cached state already matched; nothing was sent or queued.
    Unchanged,
}

#[derive(Debug)]
pub struct LoginOutcome {
    pub user_id: String,
    pub name: Option<String>,
    pub preload: PreloadReport,
    pub sync: Option<SyncReport>,
}

#[derive(Debug, Default)]
pub struct StartupOutcome {
    /// User restored from the previous run, if any.
    pub user_id: Option<String>,
    pub preload: Option<PreloadReport>,
    pub sync: Option<SyncReport>,
}

pub struct SyncEngine<S, G> {
    cache: EntityCache<S>,
    queue: PendingQueue<S>,
    gateway: G,
    coordinator: SyncCoordinator,
    session: tokio::sync::Mutex<Session<S>>,
    monitor: std::sync::Mutex<ConnectivityMonitor>,
}

impl<S, G> SyncEngine<S, G>
where
    S: KeyValueStore,
    G: Gateway,
{
    pub fn new(store: Arc<S>, gateway: G) -> Self {
        Self {
            cache: EntityCache::new(Arc::clone(&store)),
            queue: PendingQueue::new(Arc::clone(&store)),
            gateway,
            coordinator: SyncCoordinator::new(),
            session: tokio::sync::Mutex::new(Session::new(store)),
            monitor: std::sync::Mutex::new(ConnectivityMonitor::new()),
        }
    }

    pub fn cache(&self) -> &EntityCache<S> {
        &self.cache
    }

    pub fn queue(&self) -> &PendingQueue<S> {
        &self.queue
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub async fn current_user(&self) -> Option<String> {
        self.session.lock().await.user_id().map(str::to_string)
    }

    /// App launch: restore the previous session if one was persisted, then
    /// warm the cache and drain anything still queued. Both are fail-open,
    /// so a fully offline launch still comes up on cached data.
    pub async fn start(&self) -> StartupOutcome {
        let (user_id, token) = {
            let mut session = self.session.lock().await;
            match session.restore().await {
                Some(user_id) => (user_id, session.token().map(str::to_string)),
                None => return StartupOutcome::default(),
            }
        };
        self.gateway.set_auth_token(token);
        info!(user_id, "resuming previous session");

        let preload = preload(&self.cache, &self.gateway, &user_id).await;
        let sync = self.sync(SyncTrigger::AppStart).await;
        StartupOutcome {
            user_id: Some(user_id),
            preload: Some(preload),
            sync,
        }
    }

    pub async fn login(&self, login_id: &str, password: &str) -> Result<LoginOutcome> {
        let device_id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(DEVICE_ID_LEN)
            .map(char::from)
            .collect();
        let response = self
            .gateway
            .login(&LoginRequest {
                login_id: login_id.to_string(),
                password: password.to_string(),
                device_id,
            })
            .await?;
        if !response.success {
            return Err(ApiError::Unauthorized.into());
        }
        let profile = response
            .profile
            .ok_or_else(|| ApiError::InvalidResponse("login response without profile".into()))?;

        self.gateway.set_auth_token(response.token.clone());
        {
            let mut session = self.session.lock().await;
            session
                .establish(SessionData {
                    user_id: profile.user_id.clone(),
                    name: profile.name.clone(),
                    token: response.token,
                    logged_in_at: Utc::now(),
                })
                .await;
        }
        info!(user_id = %profile.user_id, "login complete");

        let preload = preload(&self.cache, &self.gateway, &profile.user_id).await;
        let sync = self.sync(SyncTrigger::LoginCompleted).await;
        Ok(LoginOutcome {
            user_id: profile.user_id,
            name: profile.name,
            preload,
            sync,
        })
    }

    /// Drop the session. Cached entities and pending queues stay on disk;
    /// they are keyed by user and pick up again on the next login.
    pub async fn logout(&self) {
        self.session.lock().await.clear().await;
        self.gateway.set_auth_token(None);
        info!("logged out");
    }

    /// Feed one connectivity observation in. An offline-to-online edge
    /// triggers a sync pass; every other observation just updates state.
    pub async fn on_connectivity(&self, snapshot: ConnectivitySnapshot) -> Option<SyncReport> {
        let edge = {
            let mut monitor = self.monitor.lock().unwrap_or_else(|p| p.into_inner());
            monitor.observe(snapshot)
        };
        match edge {
            Some(ConnectivityEdge::Reconnected) => {
                self.sync(SyncTrigger::ConnectivityRecovered).await
            }
            _ => None,
        }
    }

    /// Run one sync pass now. Returns `None` when nobody is logged in or a
    /// pass is already in flight.
    pub async fn sync(&self, trigger: SyncTrigger) -> Option<SyncReport> {
        let user_id = self.current_user().await?;
        self.coordinator
            .run(trigger, &user_id, &self.cache, &self.queue, &self.gateway)
            .await
    }

    /// Toggle one client's visited flag for a route/day. No-op when the
    /// cached record already has the requested state.
    pub async fn mark_visited(
        &self,
        route: &str,
        day: VisitDay,
        orden: u32,
        visited: bool,
    ) -> Result<WriteOutcome> {
        let user_id = self.require_user().await?;

        let scope = visit_scope(&user_id, route, day);
        if let Some(entry) = self.cache.read::<VisitRecord>(&scope).await? {
            let already = entry
                .items
                .iter()
                .any(|rec| rec.orden == orden && rec.visited == visited);
            if already {
                return Ok(WriteOutcome::Unchanged);
            }
            let mut items = entry.items;
            for rec in items.iter_mut().filter(|rec| rec.orden == orden) {
                rec.visited = visited;
            }
            if let Err(e) = self.cache.write_all(&scope, &items).await {
                warn!(error = %e, "optimistic visit write failed");
            }
        }

        self.settle(
            &user_id,
            MutationKind::MarkVisited {
                route: route.to_string(),
                day,
                orden,
                visited,
            },
        )
        .await
    }

    /// Reset every visited flag for a route/day.
    pub async fn clear_visits(&self, route: &str, day: VisitDay) -> Result<WriteOutcome> {
        let user_id = self.require_user().await?;

        let scope = visit_scope(&user_id, route, day);
        if let Some(entry) = self.cache.read::<VisitRecord>(&scope).await? {
            let mut items = entry.items;
            for rec in items.iter_mut() {
                rec.visited = false;
            }
            if let Err(e) = self.cache.write_all(&scope, &items).await {
                warn!(error = %e, "optimistic visit reset failed");
            }
        }

        self.settle(
            &user_id,
            MutationKind::ClearVisits {
                route: route.to_string(),
                day,
            },
        )
        .await
    }

    /// Submit a suggested restock order. A duplicate-for-day rejection is a
    /// hard error and is never queued; resubmitting later would only be
    /// rejected again.
    pub async fn submit_suggested(&self, order: SuggestedOrder) -> Result<WriteOutcome> {
        let user_id = self.require_user().await?;

        if self.looks_offline() {
            return self.enqueue(&user_id, MutationKind::SubmitSuggested { order }).await;
        }
        match self.gateway.submit_suggested_order(&user_id, &order).await {
            Ok(()) => Ok(WriteOutcome::Confirmed),
            Err(ApiError::DuplicateForDay) => Err(ApiError::DuplicateForDay.into()),
            Err(e) if e.is_transient() => {
                warn!(error = %e, "order submission failed, queueing for replay");
                self.enqueue(&user_id, MutationKind::SubmitSuggested { order }).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn require_user(&self) -> Result<String> {
        self.current_user()
            .await
            .ok_or_else(|| ApiError::Unauthorized.into())
    }

    /// True only when the last connectivity observation said offline; an
    /// unknown link is tried and queued on failure.
    fn looks_offline(&self) -> bool {
        let monitor = self.monitor.lock().unwrap_or_else(|p| p.into_inner());
        monitor.is_online() == Some(false)
    }

    /// Send a visit mutation inline when the link looks usable, otherwise
    /// queue it for the next sync pass.
    async fn settle(&self, user_id: &str, kind: MutationKind) -> Result<WriteOutcome> {
        if self.looks_offline() {
            return self.enqueue(user_id, kind).await;
        }
        let result = match &kind {
            MutationKind::MarkVisited {
                route,
                day,
                orden,
                visited,
            } => self.gateway.mark_visited(route, *day, *orden, *visited).await,
            MutationKind::ClearVisits { route, day } => {
                self.gateway.clear_visits(route, *day).await
            }
            MutationKind::SubmitSuggested { order } => {
                self.gateway.submit_suggested_order(user_id, order).await
            }
        };
        match result {
            Ok(()) => Ok(WriteOutcome::Confirmed),
            Err(e) if e.is_transient() => {
                warn!(target = kind.target(), error = %e, "remote write failed, queueing for replay");
                self.enqueue(user_id, kind).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn enqueue(&self, user_id: &str, kind: MutationKind) -> Result<WriteOutcome> {
        let scope = QueueScope::new(user_id, kind.queue_partition());
        self.queue.enqueue(&scope, kind).await?;
        Ok(WriteOutcome::Queued)
    }
}

fn visit_scope(user_id: &str, route: &str, day: VisitDay) -> CacheScope {
    CacheScope::with_partition(
        user_id,
        EntityKind::Visits,
        Partition::RouteDay {
            route: route.to_string(),
            day,
        },
    )
}
