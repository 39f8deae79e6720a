use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::api::{ApiError, Gateway};
use crate::cache::{CacheScope, EntityCache, EntityKind, Partition};
use crate::models::VisitDay;
use crate::queue::{MutationKind, PendingQueue, QueueScope, ReplayDisposition};
use crate::storage::KeyValueStore;

/// What prompted a sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    AppStart,
    LoginCompleted,
    ConnectivityRecovered,
}

/// What one sync pass accomplished.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Confirmed replays, counted per mutation kind.
    pub replayed: HashMap<&'static str, usize>,
    /// Mutations kept queued for the next trigger.
    pub requeued: usize,
    /// Mutations moved to a dead-letter list this pass.
    pub dead_lettered: usize,
    /// Visit snapshots re-fetched after their mutations were confirmed.
    pub refreshed: usize,
    pub errors: Vec<String>,
}

impl SyncReport {
    pub fn confirmed_total(&self) -> usize {
        self.replayed.values().sum()
    }
}

/// Resets the in-flight flag on every exit path of a pass.
struct FlagReset<'a>(&'a AtomicBool);

impl Drop for FlagReset<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Single-flight driver for sync passes.
#[derive(Default)]
pub struct SyncCoordinator {
    in_flight: AtomicBool,
}

impl SyncCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Run one sync pass for `user_id`. Returns `None` without doing any
    /// work when a pass is already in flight.
    pub async fn run<S, G>(
        &self,
        trigger: SyncTrigger,
        user_id: &str,
        cache: &EntityCache<S>,
        queue: &PendingQueue<S>,
        gateway: &G,
    ) -> Option<SyncReport>
    where
        S: KeyValueStore,
        G: Gateway,
    {
        // Claimed before the first await, so overlapping triggers from the
        // same task interleaving cannot both get in.
        if self.in_flight.swap(true, Ordering::SeqCst) {
            debug!(?trigger, "sync already in flight, dropping trigger");
            return None;
        }
        let _reset = FlagReset(&self.in_flight);

        info!(?trigger, user_id, "sync pass started");
        let mut report = SyncReport::default();

        let scopes = match queue.scopes_with_pending(user_id).await {
            Ok(scopes) => scopes,
            Err(e) => {
                warn!(error = %e, "could not enumerate pending scopes");
                report.errors.push(e.to_string());
                return Some(report);
            }
        };

        let mut touched: HashSet<(String, VisitDay)> = HashSet::new();
        for scope in &scopes {
            self.replay_scope(scope, user_id, queue, gateway, &mut report, &mut touched)
                .await;
        }

        for (route, day) in touched {
            let scope = CacheScope::with_partition(
                user_id,
                EntityKind::Visits,
                Partition::RouteDay {
                    route: route.clone(),
                    day,
                },
            );
            match cache
                .refresh_with(&scope, gateway.sheet_clients(&route, day))
                .await
            {
                Ok(_) => report.refreshed += 1,
                Err(e) => {
                    warn!(route, %day, error = %e, "post-replay refresh failed");
                    report.errors.push(e.to_string());
                }
            }
        }

        info!(
            ?trigger,
            confirmed = report.confirmed_total(),
            requeued = report.requeued,
            dead_lettered = report.dead_lettered,
            refreshed = report.refreshed,
            "sync pass finished"
        );
        Some(report)
    }

    /// Replay every mutation in one queue scope, item by item. A failing
    /// item never stops the rest of the batch.
    async fn replay_scope<S, G>(
        &self,
        scope: &QueueScope,
        user_id: &str,
        queue: &PendingQueue<S>,
        gateway: &G,
        report: &mut SyncReport,
        touched: &mut HashSet<(String, VisitDay)>,
    ) where
        S: KeyValueStore,
        G: Gateway,
    {
        let batch = match queue.pending(scope).await {
            Ok(batch) => batch,
            Err(e) => {
                warn!(key = scope.storage_key(), error = %e, "could not load pending batch");
                report.errors.push(e.to_string());
                return;
            }
        };
        if batch.is_empty() {
            return;
        }

        let mut outcomes = Vec::with_capacity(batch.len());
        for item in &batch {
            let disposition = match replay_one(&item.kind, user_id, gateway).await {
                Ok(()) => {
                    *report.replayed.entry(item.kind.name()).or_insert(0) += 1;
                    if let MutationKind::MarkVisited { route, day, .. }
                    | MutationKind::ClearVisits { route, day } = &item.kind
                    {
                        touched.insert((route.clone(), *day));
                    }
                    ReplayDisposition::Confirmed
                }
                Err(e) if e.is_transient() => {
                    debug!(target = item.kind.target(), error = %e, "replay hit transient failure");
                    report.errors.push(e.to_string());
                    ReplayDisposition::Retry
                }
                Err(e) => {
                    warn!(target = item.kind.target(), error = %e, "replay rejected by remote");
                    report.errors.push(e.to_string());
                    ReplayDisposition::DeadLetter
                }
            };
            outcomes.push((item.kind.target(), disposition));
        }

        match queue.apply_replay_results(scope, &outcomes).await {
            Ok(summary) => {
                report.requeued += summary.retained;
                report.dead_lettered += summary.dead_lettered;
            }
            Err(e) => {
                warn!(key = scope.storage_key(), error = %e, "could not apply replay results");
                report.errors.push(e.to_string());
            }
        }
    }
}

async fn replay_one<G: Gateway>(
    kind: &MutationKind,
    user_id: &str,
    gateway: &G,
) -> Result<(), ApiError> {
    match kind {
        MutationKind::MarkVisited {
            route,
            day,
            orden,
            visited,
        } => gateway.mark_visited(route, *day, *orden, *visited).await,
        MutationKind::ClearVisits { route, day } => gateway.clear_visits(route, *day).await,
        MutationKind::SubmitSuggested { order } => {
            match gateway.submit_suggested_order(user_id, order).await {
                // The remote already holds an order for that day; the queued
                // submission has nothing left to do.
                Err(ApiError::DuplicateForDay) => {
                    warn!(%order.day, order.date, "queued order already present remotely");
                    Ok(())
                }
                other => other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::api::mock::MockGateway;
    use crate::models::VisitRecord;
    use crate::storage::MemoryStore;

    fn fixture() -> (
        EntityCache<MemoryStore>,
        PendingQueue<MemoryStore>,
        MockGateway,
        SyncCoordinator,
    ) {
        let store = Arc::new(MemoryStore::new());
        (
            EntityCache::new(Arc::clone(&store)),
            PendingQueue::new(store),
            MockGateway::new(),
            SyncCoordinator::new(),
        )
    }

    fn visit_scope() -> QueueScope {
        QueueScope::new(
            "42",
            Partition::RouteDay {
                route: "norte".into(),
                day: VisitDay::Lunes,
            },
        )
    }

    fn mark(orden: u32) -> MutationKind {
        MutationKind::MarkVisited {
            route: "norte".into(),
            day: VisitDay::Lunes,
            orden,
            visited: true,
        }
    }

    #[tokio::test]
    async fn replays_drain_the_queue_and_refresh_touched_visits() {
        let (cache, queue, gateway, sync) = fixture();
        let scope = visit_scope();
        queue.enqueue(&scope, mark(1)).await.unwrap();
        queue.enqueue(&scope, mark(2)).await.unwrap();
        gateway.visits.lock().unwrap().insert(
            "norte:lunes".to_string(),
            vec![VisitRecord {
                orden: 1,
                client_name: "cliente 1".into(),
                address: None,
                visited: true,
            }],
        );

        let report = sync
            .run(SyncTrigger::ConnectivityRecovered, "42", &cache, &queue, &gateway)
            .await
            .unwrap();

        assert_eq!(report.confirmed_total(), 2);
        assert_eq!(report.replayed.get("mark_visited"), Some(&2));
        assert_eq!(report.refreshed, 1);
        assert!(queue.is_empty(&scope).await.unwrap());

        // Replays happen in creation order.
        let calls = gateway.recorded_calls();
        let first = calls.iter().position(|c| c == "mark_visited:norte:lunes:1:true");
        let second = calls.iter().position(|c| c == "mark_visited:norte:lunes:2:true");
        assert!(first.unwrap() < second.unwrap());

        let visits = cache
            .read::<VisitRecord>(&CacheScope::with_partition(
                "42",
                EntityKind::Visits,
                Partition::RouteDay {
                    route: "norte".into(),
                    day: VisitDay::Lunes,
                },
            ))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(visits.items.len(), 1);
        assert!(visits.items[0].visited);
    }

    #[tokio::test]
    async fn one_failing_item_does_not_stop_the_rest() {
        let (cache, queue, gateway, sync) = fixture();
        let scope = visit_scope();
        queue.enqueue(&scope, mark(1)).await.unwrap();
        queue.enqueue(&scope, mark(2)).await.unwrap();
        gateway.fail_call("mark_visited:norte:lunes:1:true");

        let report = sync
            .run(SyncTrigger::AppStart, "42", &cache, &queue, &gateway)
            .await
            .unwrap();

        assert_eq!(report.confirmed_total(), 1);
        assert_eq!(report.requeued, 1);

        let pending = queue.pending(&scope).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind.target(), "visit:norte:lunes:1");
        assert_eq!(pending[0].attempts, 1);
    }

    #[tokio::test]
    async fn permanent_rejection_dead_letters_the_item() {
        let (cache, queue, gateway, sync) = fixture();
        let scope = visit_scope();
        queue.enqueue(&scope, mark(1)).await.unwrap();
        gateway.reject_call("mark_visited:norte:lunes:1:true");

        let report = sync
            .run(SyncTrigger::AppStart, "42", &cache, &queue, &gateway)
            .await
            .unwrap();

        assert_eq!(report.dead_lettered, 1);
        assert!(queue.is_empty(&scope).await.unwrap());
        assert_eq!(queue.dead_letters(&scope).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn queued_duplicate_order_counts_as_confirmed() {
        let (cache, queue, gateway, sync) = fixture();
        let scope = QueueScope::new("42", Partition::Day(VisitDay::Lunes));
        queue
            .enqueue(
                &scope,
                MutationKind::SubmitSuggested {
                    order: crate::models::SuggestedOrder {
                        day: VisitDay::Lunes,
                        date: "2026-08-31".into(),
                        items: vec![],
                    },
                },
            )
            .await
            .unwrap();
        gateway.set_duplicate_order(true);

        let report = sync
            .run(SyncTrigger::AppStart, "42", &cache, &queue, &gateway)
            .await
            .unwrap();

        assert_eq!(report.replayed.get("submit_suggested"), Some(&1));
        assert_eq!(report.dead_lettered, 0);
        assert!(queue.is_empty(&scope).await.unwrap());
    }

    #[tokio::test]
    async fn only_one_pass_runs_at_a_time() {
        let (cache, queue, gateway, sync) = fixture();
        let scope = visit_scope();
        queue.enqueue(&scope, mark(1)).await.unwrap();
        gateway.set_call_delay_ms(20);

        let (first, second, third) = tokio::join!(
            sync.run(SyncTrigger::AppStart, "42", &cache, &queue, &gateway),
            sync.run(SyncTrigger::ConnectivityRecovered, "42", &cache, &queue, &gateway),
            sync.run(SyncTrigger::ConnectivityRecovered, "42", &cache, &queue, &gateway),
        );

        // Exactly one pass ran; the overlapping triggers were dropped.
        let reports = [first, second, third];
        assert_eq!(reports.iter().filter(|r| r.is_some()).count(), 1);
        let report = reports.into_iter().flatten().next().unwrap();
        assert_eq!(report.confirmed_total(), 1);
        assert_eq!(gateway.calls_matching("mark_visited:"), 1);
        assert!(!sync.is_running());
    }

    #[tokio::test]
    async fn pass_with_nothing_pending_is_a_quiet_no_op() {
        let (cache, queue, gateway, sync) = fixture();
        let report = sync
            .run(SyncTrigger::LoginCompleted, "42", &cache, &queue, &gateway)
            .await
            .unwrap();
        assert_eq!(report.confirmed_total(), 0);
        assert!(gateway.recorded_calls().is_empty());
    }
}
