//! Durable, ordered queue of pending mutations.
//!
//! Each queue scope (`pending_<userId>_<scope>`) holds the mutations for one
//! route/day or one order day, in creation order. An item leaves the queue
//! only when its replay is confirmed, when it fails a permanent remote
//! check, or when it exhausts the bounded retry budget - the last two move
//! it to a per-scope dead-letter list instead of requeueing forever.
//!
//! The store has no multi-key atomicity, so every read-modify-write here
//! runs under one async mutex; concurrent enqueues from interleaved tasks
//! cannot lose items.

pub mod mutation;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cache::scope::{sanitize_component, Partition};
use crate::storage::{KeyValueStore, StoreError};

pub use mutation::{MutationKind, PendingMutation};

/// Replays a mutation may attempt before it is dead-lettered.
const MAX_REPLAY_ATTEMPTS: u32 = 8;

/// One queue scope: a user plus the partition the mutations target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueScope {
    pub user_id: String,
    pub partition: Partition,
}

impl QueueScope {
    pub fn new(user_id: impl Into<String>, partition: Partition) -> Self {
        Self {
            user_id: user_id.into(),
            partition,
        }
    }

    pub fn storage_key(&self) -> String {
        format!(
            "pending_{}_{}",
            sanitize_component(&self.user_id),
            self.partition.key_fragment()
        )
    }

    pub fn dead_letter_key(&self) -> String {
        format!(
            "deadletter_{}_{}",
            sanitize_component(&self.user_id),
            self.partition.key_fragment()
        )
    }
}

fn index_key(user_id: &str) -> String {
    format!("pending_index_{}", sanitize_component(user_id))
}

/// What the sync pass decided about one replayed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayDisposition {
    /// Remote confirmed; remove from the queue.
    Confirmed,
    /// Transient failure; keep queued for the next trigger.
    Retry,
    /// Permanent failure; retrying would not help.
    DeadLetter,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueSummary {
    pub confirmed: usize,
    pub retained: usize,
    pub dead_lettered: usize,
}

pub struct PendingQueue<S> {
    store: Arc<S>,
    /// Serializes read-modify-write cycles on queue keys.
    guard: Mutex<()>,
}

impl<S: KeyValueStore> PendingQueue<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            guard: Mutex::new(()),
        }
    }

    /// Append a mutation. When one with the same logical target is already
    /// queued, its payload is replaced in place - the newest intent for a
    /// target wins, keeping the original queue position and `created_at`.
    /// Returns `true` when a new entry was appended.
    pub async fn enqueue(
        &self,
        scope: &QueueScope,
        kind: MutationKind,
    ) -> Result<bool, StoreError> {
        let _guard = self.guard.lock().await;
        let key = scope.storage_key();
        let mut list = self.load_list(&key).await?;

        let target = kind.target();
        if let Some(existing) = list.iter_mut().find(|m| m.kind.target() == target) {
            debug!(key, target, "target already pending, superseding its payload");
            existing.kind = kind;
            existing.attempts = 0;
            self.save_list(&key, &list).await?;
            return Ok(false);
        }

        list.push(PendingMutation::new(kind));
        self.save_list(&key, &list).await?;
        self.index_insert(scope).await?;
        debug!(key, target, queued = list.len(), "mutation queued");
        Ok(true)
    }

    /// All queued mutations for a scope, in creation order. The queue is
    /// not cleared here; items leave via [`apply_replay_results`].
    ///
    /// [`apply_replay_results`]: PendingQueue::apply_replay_results
    pub async fn pending(&self, scope: &QueueScope) -> Result<Vec<PendingMutation>, StoreError> {
        self.load_list(&scope.storage_key()).await
    }

    pub async fn is_empty(&self, scope: &QueueScope) -> Result<bool, StoreError> {
        Ok(self.pending(scope).await?.is_empty())
    }

    /// Scopes for this user that currently have queued mutations.
    pub async fn scopes_with_pending(&self, user_id: &str) -> Result<Vec<QueueScope>, StoreError> {
        let partitions = self.load_index(user_id).await?;
        Ok(partitions
            .into_iter()
            .map(|partition| QueueScope::new(user_id, partition))
            .collect())
    }

    /// Apply the outcome of one replay batch: confirmed items are removed,
    /// retries stay (with their attempt count bumped) until the retry
    /// budget runs out, permanent failures move to the dead-letter list.
    /// Items enqueued after the batch was taken are untouched.
    pub async fn apply_replay_results(
        &self,
        scope: &QueueScope,
        outcomes: &[(String, ReplayDisposition)],
    ) -> Result<QueueSummary, StoreError> {
        let _guard = self.guard.lock().await;
        let key = scope.storage_key();
        let list = self.load_list(&key).await?;

        let by_target: HashMap<&str, &ReplayDisposition> = outcomes
            .iter()
            .map(|(target, disposition)| (target.as_str(), disposition))
            .collect();

        let mut summary = QueueSummary::default();
        let mut retained: Vec<PendingMutation> = Vec::new();
        let mut dead: Vec<PendingMutation> = Vec::new();

        for mut item in list {
            match by_target.get(item.kind.target().as_str()) {
                Some(ReplayDisposition::Confirmed) => summary.confirmed += 1,
                Some(ReplayDisposition::Retry) => {
                    item.attempts += 1;
                    if item.attempts >= MAX_REPLAY_ATTEMPTS {
                        warn!(
                            key,
                            target = item.kind.target(),
                            attempts = item.attempts,
                            "retry budget exhausted, dead-lettering mutation"
                        );
                        dead.push(item);
                    } else {
                        retained.push(item);
                    }
                }
                Some(ReplayDisposition::DeadLetter) => {
                    warn!(
                        key,
                        target = item.kind.target(),
                        "permanent replay failure, dead-lettering mutation"
                    );
                    dead.push(item);
                }
                // Enqueued since the batch was drained; keep untouched.
                None => retained.push(item),
            }
        }

        summary.retained = retained.len();
        summary.dead_lettered = dead.len();

        if !dead.is_empty() {
            let dl_key = scope.dead_letter_key();
            let mut dl_list = self.load_list(&dl_key).await?;
            dl_list.append(&mut dead);
            self.save_list(&dl_key, &dl_list).await?;
        }

        if retained.is_empty() {
            self.store.remove(&key).await?;
            self.index_remove(scope).await?;
        } else {
            self.save_list(&key, &retained).await?;
        }
        Ok(summary)
    }

    /// Dead-lettered mutations for a scope, oldest first.
    pub async fn dead_letters(
        &self,
        scope: &QueueScope,
    ) -> Result<Vec<PendingMutation>, StoreError> {
        self.load_list(&scope.dead_letter_key()).await
    }

    async fn load_list(&self, key: &str) -> Result<Vec<PendingMutation>, StoreError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&raw) {
            Ok(list) => Ok(list),
            Err(e) => {
                warn!(key, error = %e, "corrupt pending list, treating as empty");
                Ok(Vec::new())
            }
        }
    }

    async fn save_list<T: Serialize>(&self, key: &str, list: &[T]) -> Result<(), StoreError> {
        let payload = serde_json::to_string(list)?;
        self.store.set(key, &payload).await
    }

    async fn load_index(&self, user_id: &str) -> Result<Vec<Partition>, StoreError> {
        let Some(raw) = self.store.get(&index_key(user_id)).await? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&raw) {
            Ok(partitions) => Ok(partitions),
            Err(e) => {
                warn!(error = %e, "corrupt pending index, treating as empty");
                Ok(Vec::new())
            }
        }
    }

    async fn index_insert(&self, scope: &QueueScope) -> Result<(), StoreError> {
        let mut partitions = self.load_index(&scope.user_id).await?;
        if !partitions.contains(&scope.partition) {
            partitions.push(scope.partition.clone());
            self.save_list(&index_key(&scope.user_id), &partitions).await?;
        }
        Ok(())
    }

    async fn index_remove(&self, scope: &QueueScope) -> Result<(), StoreError> {
        let mut partitions = self.load_index(&scope.user_id).await?;
        let before = partitions.len();
        partitions.retain(|p| p != &scope.partition);
        if partitions.len() != before {
            if partitions.is_empty() {
                self.store.remove(&index_key(&scope.user_id)).await?;
            } else {
                self.save_list(&index_key(&scope.user_id), &partitions).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VisitDay;
    use crate::storage::MemoryStore;

    fn queue() -> PendingQueue<MemoryStore> {
        PendingQueue::new(Arc::new(MemoryStore::new()))
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
        mark_as(orden, true)
    }

    fn mark_as(orden: u32, visited: bool) -> MutationKind {
        MutationKind::MarkVisited {
            route: "norte".into(),
            day: VisitDay::Lunes,
            orden,
            visited,
        }
    }

    #[tokio::test]
    async fn duplicate_target_is_not_enqueued_twice() {
        let queue = queue();
        let scope = visit_scope();

        assert!(queue.enqueue(&scope, mark(7)).await.unwrap());
        assert!(!queue.enqueue(&scope, mark(7)).await.unwrap());

        let pending = queue.pending(&scope).await.unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn newer_intent_for_a_target_supersedes_the_queued_payload() {
        let queue = queue();
        let scope = visit_scope();

        // Visited offline, then un-visited before any replay: the queue must
        // carry the un-visit, not the stale first payload.
        queue.enqueue(&scope, mark_as(1, true)).await.unwrap();
        queue.enqueue(&scope, mark(2)).await.unwrap();
        let first_created_at = queue.pending(&scope).await.unwrap()[0].created_at;
        assert!(!queue.enqueue(&scope, mark_as(1, false)).await.unwrap());

        let pending = queue.pending(&scope).await.unwrap();
        assert_eq!(pending.len(), 2);
        // Queue position and creation stamp survive the replacement.
        assert_eq!(pending[0].kind, mark_as(1, false));
        assert_eq!(pending[0].created_at, first_created_at);
        assert_eq!(pending[1].kind.target(), "visit:norte:lunes:2");
    }

    #[tokio::test]
    async fn creation_order_is_preserved() {
        let queue = queue();
        let scope = visit_scope();

        queue.enqueue(&scope, mark(1)).await.unwrap();
        queue.enqueue(&scope, mark(2)).await.unwrap();
        queue.enqueue(&scope, mark(3)).await.unwrap();

        let targets: Vec<String> = queue
            .pending(&scope)
            .await
            .unwrap()
            .iter()
            .map(|m| m.kind.target())
            .collect();
        assert_eq!(
            targets,
            vec![
                "visit:norte:lunes:1",
                "visit:norte:lunes:2",
                "visit:norte:lunes:3"
            ]
        );
    }

    #[tokio::test]
    async fn confirmed_items_leave_the_queue_and_the_index() {
        let queue = queue();
        let scope = visit_scope();
        queue.enqueue(&scope, mark(1)).await.unwrap();
        queue.enqueue(&scope, mark(2)).await.unwrap();
        assert_eq!(queue.scopes_with_pending("42").await.unwrap(), vec![scope.clone()]);

        let summary = queue
            .apply_replay_results(
                &scope,
                &[
                    (mark(1).target(), ReplayDisposition::Confirmed),
                    (mark(2).target(), ReplayDisposition::Confirmed),
                ],
            )
            .await
            .unwrap();

        assert_eq!(summary.confirmed, 2);
        assert!(queue.is_empty(&scope).await.unwrap());
        assert!(queue.scopes_with_pending("42").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn retried_items_stay_queued_with_bumped_attempts() {
        let queue = queue();
        let scope = visit_scope();
        queue.enqueue(&scope, mark(1)).await.unwrap();
        queue.enqueue(&scope, mark(2)).await.unwrap();

        let summary = queue
            .apply_replay_results(
                &scope,
                &[
                    (mark(1).target(), ReplayDisposition::Confirmed),
                    (mark(2).target(), ReplayDisposition::Retry),
                ],
            )
            .await
            .unwrap();

        assert_eq!(summary.confirmed, 1);
        assert_eq!(summary.retained, 1);

        let pending = queue.pending(&scope).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind.target(), "visit:norte:lunes:2");
        assert_eq!(pending[0].attempts, 1);
        // Still indexed - there is work left for the next trigger.
        assert_eq!(queue.scopes_with_pending("42").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn exhausted_retry_budget_dead_letters_the_item() {
        let queue = queue();
        let scope = visit_scope();
        queue.enqueue(&scope, mark(1)).await.unwrap();

        let outcome = vec![(mark(1).target(), ReplayDisposition::Retry)];
        for _ in 0..MAX_REPLAY_ATTEMPTS {
            queue.apply_replay_results(&scope, &outcome).await.unwrap();
        }

        assert!(queue.is_empty(&scope).await.unwrap());
        let dead = queue.dead_letters(&scope).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, MAX_REPLAY_ATTEMPTS);
    }

    #[tokio::test]
    async fn permanent_failure_dead_letters_immediately() {
        let queue = queue();
        let scope = visit_scope();
        queue.enqueue(&scope, mark(1)).await.unwrap();

        let summary = queue
            .apply_replay_results(&scope, &[(mark(1).target(), ReplayDisposition::DeadLetter)])
            .await
            .unwrap();

        assert_eq!(summary.dead_lettered, 1);
        assert!(queue.is_empty(&scope).await.unwrap());
        assert_eq!(queue.dead_letters(&scope).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn items_enqueued_after_the_batch_survive_untouched() {
        let queue = queue();
        let scope = visit_scope();
        queue.enqueue(&scope, mark(1)).await.unwrap();
        // Batch drained here; a new mutation arrives before results apply.
        queue.enqueue(&scope, mark(2)).await.unwrap();

        queue
            .apply_replay_results(&scope, &[(mark(1).target(), ReplayDisposition::Confirmed)])
            .await
            .unwrap();

        let pending = queue.pending(&scope).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind.target(), "visit:norte:lunes:2");
        assert_eq!(pending[0].attempts, 0);
    }

    #[tokio::test]
    async fn index_tracks_multiple_scopes_per_user() {
        let queue = queue();
        let visits = visit_scope();
        let orders = QueueScope::new("42", Partition::Day(VisitDay::Lunes));

        queue.enqueue(&visits, mark(1)).await.unwrap();
        queue
            .enqueue(
                &orders,
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

        let scopes = queue.scopes_with_pending("42").await.unwrap();
        assert_eq!(scopes.len(), 2);
        assert!(scopes.contains(&visits));
        assert!(scopes.contains(&orders));
    }
}
