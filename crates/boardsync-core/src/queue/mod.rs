//! Durable offline queue of board mutations.
//!
//! Operations are replayed strictly in enqueue order. A failing head blocks
//! everything behind it until it succeeds or runs out of retries.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::context::SyncContext;
use crate::db::{QueueRepository, SqliteQueueRepository};
use crate::error::Result;
use crate::models::{EntityType, OperationPayload, QueuedOperation};
use crate::services::DatabaseService;

const EVENT_CAPACITY: usize = 64;

/// Result of replaying one operation against the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Replay {
    Applied,
    /// A create went through and the remote assigned `remote_id`
    Created { remote_id: String },
}

/// Executes queued operations. Implemented by the hybrid facade.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    async fn replay(&self, op: &QueuedOperation) -> Result<Replay>;

    /// Called just before `op` is dropped without reaching the remote.
    async fn dropped(&self, _op: &QueuedOperation) {}
}

/// Notification about a change in the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    Enqueued { id: Uuid, entity_id: String },
    Completed { id: Uuid },
    Retrying { id: Uuid, retry_count: u32, delay: Duration },
    Dropped { id: Uuid, reason: String },
    Cleared,
}

/// Counters from one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub completed: usize,
    pub dropped: usize,
    pub remaining: usize,
}

struct QueueInner {
    owner_id: String,
    db: DatabaseService,
    ctx: SyncContext,
    ops: Mutex<Vec<QueuedOperation>>,
    draining: Mutex<()>,
    /// Set by a drain that found another one running
    rerun_requested: AtomicBool,
    /// Bumped by `clear()` so a running drain notices it should stop
    generation: AtomicU64,
    events: broadcast::Sender<QueueEvent>,
}

/// One owner's mutation log, kept in memory and persisted to `SQLite`.
#[derive(Clone)]
pub struct OfflineQueue {
    inner: Arc<QueueInner>,
}

impl std::fmt::Debug for OfflineQueue {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("OfflineQueue")
            .field("owner_id", &self.inner.owner_id)
            .finish_non_exhaustive()
    }
}

impl OfflineQueue {
    /// Load `owner_id`'s persisted log.
    pub async fn open(
        owner_id: impl Into<String>,
        db: DatabaseService,
        ctx: SyncContext,
    ) -> Result<Self> {
        let owner_id = owner_id.into();
        let ops = db
            .with_db(|db| SqliteQueueRepository::new(db.connection()).load(&owner_id))
            .await?;
        if !ops.is_empty() {
            tracing::info!(owner_id, pending = ops.len(), "Restored offline queue");
        }

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            inner: Arc::new(QueueInner {
                owner_id,
                db,
                ctx,
                ops: Mutex::new(ops),
                draining: Mutex::new(()),
                rerun_requested: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                events,
            }),
        })
    }

    pub fn owner_id(&self) -> &str {
        &self.inner.owner_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }

    fn emit(&self, event: QueueEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    /// Append an operation; an update to an entity that already has a queued
    /// update is merged into it instead. Returns the id of the queued entry.
    pub async fn enqueue(&self, op: QueuedOperation) -> Result<Uuid> {
        if let OperationPayload::UpdateBoard(patch) = &op.payload {
            let existing = self
                .get_pending_for_entity(op.entity_type, &op.entity_id)
                .await
                .into_iter()
                .find(|pending| matches!(pending.payload, OperationPayload::UpdateBoard(_)));
            if let Some(existing) = existing {
                if let OperationPayload::UpdateBoard(queued) = existing.payload {
                    let merged = queued.merge(patch.clone());
                    self.update_pending(existing.id, OperationPayload::UpdateBoard(merged))
                        .await?;
                    tracing::debug!(op_id = %existing.id, entity_id = %op.entity_id, "Coalesced queued update");
                    return Ok(existing.id);
                }
            }
        }

        let mut ops = self.inner.ops.lock().await;
        self.inner
            .db
            .with_db(|db| SqliteQueueRepository::new(db.connection()).append(&self.inner.owner_id, &op))
            .await?;
        tracing::debug!(op_id = %op.id, kind = %op.kind(), entity_id = %op.entity_id, "Queued operation");
        let id = op.id;
        self.emit(QueueEvent::Enqueued {
            id,
            entity_id: op.entity_id.clone(),
        });
        ops.push(op);
        Ok(id)
    }

    /// Queued operations targeting one entity, oldest first.
    pub async fn get_pending_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Vec<QueuedOperation> {
        self.inner
            .ops
            .lock()
            .await
            .iter()
            .filter(|op| op.targets(entity_type, entity_id))
            .cloned()
            .collect()
    }

    /// Replace the payload of a queued operation. Returns false if it is gone.
    pub async fn update_pending(&self, op_id: Uuid, payload: OperationPayload) -> Result<bool> {
        let mut ops = self.inner.ops.lock().await;
        let Some(op) = ops.iter_mut().find(|op| op.id == op_id) else {
            return Ok(false);
        };
        op.payload = payload;
        let op = op.clone();
        self.inner
            .db
            .with_db(|db| SqliteQueueRepository::new(db.connection()).update(&op))
            .await?;
        Ok(true)
    }

    /// Drop every queued operation for an entity; returns how many were removed.
    pub async fn discard_entity(&self, entity_type: EntityType, entity_id: &str) -> Result<usize> {
        let mut ops = self.inner.ops.lock().await;
        let doomed: Vec<Uuid> = ops
            .iter()
            .filter(|op| op.targets(entity_type, entity_id))
            .map(|op| op.id)
            .collect();
        self.inner
            .db
            .with_db(|db| {
                let repo = SqliteQueueRepository::new(db.connection());
                doomed.iter().try_for_each(|id| repo.remove(id))
            })
            .await?;
        ops.retain(|op| !doomed.contains(&op.id));
        for id in &doomed {
            self.emit(QueueEvent::Dropped {
                id: *id,
                reason: "entity discarded".to_string(),
            });
        }
        Ok(doomed.len())
    }

    pub async fn pending(&self) -> Vec<QueuedOperation> {
        self.inner.ops.lock().await.clone()
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.ops.lock().await.len()
    }

    /// Ids of every entity with at least one queued operation.
    pub async fn pending_entity_ids(&self) -> HashSet<String> {
        self.inner
            .ops
            .lock()
            .await
            .iter()
            .map(|op| op.entity_id.clone())
            .collect()
    }

    /// Wipe the log. A drain in progress stops at its next step.
    pub async fn clear(&self) -> Result<()> {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let mut ops = self.inner.ops.lock().await;
        self.inner
            .db
            .with_db(|db| SqliteQueueRepository::new(db.connection()).clear(&self.inner.owner_id))
            .await?;
        let cleared = ops.len();
        ops.clear();
        tracing::info!(owner_id = %self.inner.owner_id, cleared, "Cleared offline queue");
        self.emit(QueueEvent::Cleared);
        Ok(())
    }

    /// Replay the log in order through `handler`.
    ///
    /// Returns early when the connectivity probe reports offline or when the
    /// log is cleared. If another drain is already running this returns
    /// immediately and the running drain goes around once more before it
    /// finishes, so work enqueued near its end is not left behind.
    pub async fn process_queue(&self, handler: &dyn OperationHandler) -> Result<DrainReport> {
        let mut report = DrainReport::default();
        loop {
            self.inner.rerun_requested.store(true, Ordering::SeqCst);
            let Ok(draining) = self.inner.draining.try_lock() else {
                tracing::debug!("Queue drain already running");
                report.remaining = self.pending_count().await;
                return Ok(report);
            };
            self.inner.rerun_requested.store(false, Ordering::SeqCst);
            self.drain(handler, &mut report).await?;
            drop(draining);

            if !self.take_rerun_request() {
                break;
            }
            tracing::debug!("Drain requested while running; draining again");
        }

        report.remaining = self.pending_count().await;
        if report.completed > 0 || report.dropped > 0 {
            tracing::info!(
                completed = report.completed,
                dropped = report.dropped,
                remaining = report.remaining,
                "Queue drain finished"
            );
        }
        Ok(report)
    }

    fn take_rerun_request(&self) -> bool {
        self.inner.rerun_requested.swap(false, Ordering::SeqCst)
    }

    async fn drain(&self, handler: &dyn OperationHandler, report: &mut DrainReport) -> Result<()> {
        let generation = self.inner.generation.load(Ordering::SeqCst);
        loop {
            if self.inner.generation.load(Ordering::SeqCst) != generation {
                tracing::debug!("Queue cleared during drain");
                return Ok(());
            }
            if !self.inner.ctx.is_online() {
                tracing::debug!("Offline; pausing queue drain");
                return Ok(());
            }
            let Some(head) = self.inner.ops.lock().await.first().cloned() else {
                return Ok(());
            };

            let outcome = handler.replay(&head).await;
            if self.inner.generation.load(Ordering::SeqCst) != generation {
                return Ok(());
            }

            match outcome {
                Ok(replay) => {
                    self.complete(&head, replay).await?;
                    report.completed += 1;
                }
                Err(error) if !error.is_retryable() => {
                    tracing::error!(op_id = %head.id, kind = %head.kind(), entity_id = %head.entity_id, %error,
                        "Dropping queued operation rejected by remote");
                    handler.dropped(&head).await;
                    self.drop_head(&head, error.to_string()).await?;
                    report.dropped += 1;
                }
                Err(error) => {
                    let retry_count = head.retry_count + 1;
                    self.record_retry(&head, retry_count).await?;
                    let max_retries = self.inner.ctx.settings.max_retries;
                    if retry_count > max_retries {
                        tracing::error!(op_id = %head.id, kind = %head.kind(), entity_id = %head.entity_id, %error,
                            retries = max_retries, "Dropping queued operation after exhausting retries");
                        handler.dropped(&head).await;
                        self.drop_head(&head, error.to_string()).await?;
                        report.dropped += 1;
                        continue;
                    }

                    let delay = self.inner.ctx.settings.queue_backoff(retry_count);
                    tracing::warn!(op_id = %head.id, retry_count, delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        %error, "Queued operation failed; backing off");
                    self.emit(QueueEvent::Retrying {
                        id: head.id,
                        retry_count,
                        delay,
                    });
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn complete(&self, head: &QueuedOperation, replay: Replay) -> Result<()> {
        let mut ops = self.inner.ops.lock().await;
        let remap = match replay {
            Replay::Created { remote_id } if remote_id != head.entity_id => Some(remote_id),
            _ => None,
        };
        self.inner
            .db
            .with_db(|db| {
                let repo = SqliteQueueRepository::new(db.connection());
                repo.remove(&head.id)?;
                if let Some(remote_id) = &remap {
                    repo.rewrite_entity_id(
                        &self.inner.owner_id,
                        head.entity_type,
                        &head.entity_id,
                        remote_id,
                    )?;
                }
                Ok(())
            })
            .await?;

        ops.retain(|op| op.id != head.id);
        if let Some(remote_id) = remap {
            for op in ops
                .iter_mut()
                .filter(|op| op.targets(head.entity_type, &head.entity_id))
            {
                op.entity_id.clone_from(&remote_id);
            }
            tracing::debug!(old = %head.entity_id, new = %remote_id, "Retargeted queued operations");
        }
        self.emit(QueueEvent::Completed { id: head.id });
        Ok(())
    }

    async fn record_retry(&self, head: &QueuedOperation, retry_count: u32) -> Result<()> {
        let mut ops = self.inner.ops.lock().await;
        let Some(op) = ops.iter_mut().find(|op| op.id == head.id) else {
            return Ok(());
        };
        op.retry_count = retry_count;
        let op = op.clone();
        self.inner
            .db
            .with_db(|db| SqliteQueueRepository::new(db.connection()).update(&op))
            .await
    }

    async fn drop_head(&self, head: &QueuedOperation, reason: String) -> Result<()> {
        let mut ops = self.inner.ops.lock().await;
        self.inner
            .db
            .with_db(|db| SqliteQueueRepository::new(db.connection()).remove(&head.id))
            .await?;
        ops.retain(|op| op.id != head.id);
        self.emit(QueueEvent::Dropped {
            id: head.id,
            reason,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncSettings;
    use crate::connectivity::ManualConnectivity;
    use crate::error::Error;
    use crate::models::{BoardId, BoardPatch};
    use pretty_assertions::assert_eq;
    use tokio::time::Instant;

    type Script = Box<dyn Fn(&QueuedOperation, usize) -> Result<Replay> + Send + Sync>;

    /// Handler that records every replay and answers from a script.
    struct Scripted {
        calls: std::sync::Mutex<Vec<(QueuedOperation, Instant)>>,
        dropped: std::sync::Mutex<Vec<String>>,
        script: Script,
    }

    impl Scripted {
        fn new(script: impl Fn(&QueuedOperation, usize) -> Result<Replay> + Send + Sync + 'static) -> Self {
            Self {
                calls: std::sync::Mutex::new(Vec::new()),
                dropped: std::sync::Mutex::new(Vec::new()),
                script: Box::new(script),
            }
        }

        fn succeed() -> Self {
            Self::new(|_, _| Ok(Replay::Applied))
        }

        fn calls(&self) -> Vec<(QueuedOperation, Instant)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl OperationHandler for Scripted {
        async fn replay(&self, op: &QueuedOperation) -> Result<Replay> {
            let attempt = {
                let mut calls = self.calls.lock().unwrap();
                calls.push((op.clone(), Instant::now()));
                calls.len()
            };
            (self.script)(op, attempt)
        }

        async fn dropped(&self, op: &QueuedOperation) {
            self.dropped.lock().unwrap().push(op.entity_id.clone());
        }
    }

    fn online_ctx() -> (SyncContext, Arc<ManualConnectivity>) {
        let probe = Arc::new(ManualConnectivity::new(true));
        (SyncContext::new(SyncSettings::default(), probe.clone()), probe)
    }

    async fn queue_with(ctx: SyncContext) -> (OfflineQueue, DatabaseService) {
        let db = DatabaseService::open_in_memory().unwrap();
        let queue = OfflineQueue::open("user-1", db.clone(), ctx).await.unwrap();
        (queue, db)
    }

    fn board(id: &str) -> BoardId {
        BoardId::from(id)
    }

    #[tokio::test]
    async fn updates_to_same_entity_coalesce() {
        let (ctx, _) = online_ctx();
        let (queue, _) = queue_with(ctx).await;

        let first = queue
            .enqueue(QueuedOperation::update_board(&board("brd_1"), BoardPatch::rename("A")))
            .await
            .unwrap();
        let second = queue
            .enqueue(QueuedOperation::update_board(
                &board("brd_1"),
                BoardPatch::thumbnail("thumb"),
            ))
            .await
            .unwrap();

        assert_eq!(first, second);
        let pending = queue.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(
            pending[0].payload,
            OperationPayload::UpdateBoard(BoardPatch {
                name: Some("A".to_string()),
                thumbnail: Some("thumb".to_string()),
            })
        );
    }

    #[tokio::test]
    async fn replay_follows_enqueue_order() {
        let (ctx, _) = online_ctx();
        let (queue, _) = queue_with(ctx).await;
        let ids = ["brd_1", "brd_2", "brd_3", "brd_4"];
        for id in ids {
            queue
                .enqueue(QueuedOperation::update_board(&board(id), BoardPatch::rename(id)))
                .await
                .unwrap();
        }

        let handler = Scripted::succeed();
        let report = queue.process_queue(&handler).await.unwrap();

        let replayed: Vec<String> = handler.calls().into_iter().map(|(op, _)| op.entity_id).collect();
        assert_eq!(replayed, ids);
        assert_eq!(report, DrainReport { completed: 4, dropped: 0, remaining: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn failing_operation_retries_three_times_then_drops() {
        let (ctx, _) = online_ctx();
        let (queue, _) = queue_with(ctx).await;
        let mut events = queue.subscribe();
        queue
            .enqueue(QueuedOperation::delete_board(&board("brd_1")))
            .await
            .unwrap();
        queue
            .enqueue(QueuedOperation::delete_board(&board("brd_2")))
            .await
            .unwrap();

        let handler = Scripted::new(|op, _| {
            if op.entity_id == "brd_1" {
                Err(Error::Network("connection refused".to_string()))
            } else {
                Ok(Replay::Applied)
            }
        });
        let report = queue.process_queue(&handler).await.unwrap();

        let calls = handler.calls();
        let failing: Vec<Instant> = calls
            .iter()
            .filter(|(op, _)| op.entity_id == "brd_1")
            .map(|(_, at)| *at)
            .collect();
        assert_eq!(failing.len(), 4);
        let gaps: Vec<u64> = failing
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).as_secs())
            .collect();
        assert_eq!(gaps, vec![2, 4, 8]);
        assert_eq!(calls.last().unwrap().0.entity_id, "brd_2");
        assert_eq!(report, DrainReport { completed: 1, dropped: 1, remaining: 0 });

        let mut saw_drop = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, QueueEvent::Dropped { .. }) {
                saw_drop = true;
            }
        }
        assert!(saw_drop);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_rejection_drops_without_backoff() {
        let (ctx, _) = online_ctx();
        let (queue, _) = queue_with(ctx).await;
        queue
            .enqueue(QueuedOperation::delete_board(&board("brd_gone")))
            .await
            .unwrap();
        queue
            .enqueue(QueuedOperation::delete_board(&board("brd_2")))
            .await
            .unwrap();

        let started = Instant::now();
        let handler = Scripted::new(|op, _| {
            if op.entity_id == "brd_gone" {
                Err(Error::NotFound("brd_gone".to_string()))
            } else {
                Ok(Replay::Applied)
            }
        });
        let report = queue.process_queue(&handler).await.unwrap();

        assert_eq!(handler.calls().len(), 2);
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.completed, 1);
        assert_eq!(*handler.dropped.lock().unwrap(), vec!["brd_gone".to_string()]);
    }

    #[tokio::test]
    async fn offline_drain_leaves_queue_untouched() {
        let (ctx, probe) = online_ctx();
        probe.set_online(false);
        let (queue, _) = queue_with(ctx).await;
        queue
            .enqueue(QueuedOperation::create_board(&board("local_a"), "A"))
            .await
            .unwrap();

        let handler = Scripted::succeed();
        let report = queue.process_queue(&handler).await.unwrap();

        assert!(handler.calls().is_empty());
        assert_eq!(report.remaining, 1);
    }

    #[tokio::test]
    async fn created_id_retargets_later_operations() {
        let (ctx, probe) = online_ctx();
        let (queue, db) = queue_with(ctx.clone()).await;
        let temp = board("local_abc");
        queue
            .enqueue(QueuedOperation::create_board(&temp, "Sprint Plan"))
            .await
            .unwrap();
        queue
            .enqueue(QueuedOperation::update_board(&temp, BoardPatch::rename("Sprint Plan v2")))
            .await
            .unwrap();
        queue
            .enqueue(QueuedOperation::delete_board(&board("brd_other")))
            .await
            .unwrap();

        // Go offline right after the create so the rewritten update stays queued.
        let handler = Scripted::new(move |_, _| {
            probe.set_online(false);
            Ok(Replay::Created {
                remote_id: "brd_123".to_string(),
            })
        });
        let report = queue.process_queue(&handler).await.unwrap();
        assert_eq!(report.completed, 1);

        let reloaded = OfflineQueue::open("user-1", db, ctx).await.unwrap();
        let entity_ids: Vec<String> = reloaded
            .pending()
            .await
            .into_iter()
            .map(|op| op.entity_id)
            .collect();
        assert_eq!(entity_ids, vec!["brd_123", "brd_other"]);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_count_survives_reload() {
        let (ctx, probe) = online_ctx();
        let (queue, db) = queue_with(ctx.clone()).await;
        queue
            .enqueue(QueuedOperation::delete_board(&board("brd_1")))
            .await
            .unwrap();

        let handler = Scripted::new(move |_, _| {
            probe.set_online(false);
            Err(Error::Network("dropped".to_string()))
        });
        let report = queue.process_queue(&handler).await.unwrap();
        assert_eq!(report.remaining, 1);

        let reloaded = OfflineQueue::open("user-1", db, ctx).await.unwrap();
        assert_eq!(reloaded.pending().await[0].retry_count, 1);
    }

    #[tokio::test]
    async fn log_is_scoped_to_owner_and_survives_reopen() {
        let (ctx, _) = online_ctx();
        let db = DatabaseService::open_in_memory().unwrap();
        let alice = OfflineQueue::open("alice", db.clone(), ctx.clone()).await.unwrap();
        alice
            .enqueue(QueuedOperation::create_board(&board("local_1"), "Mine"))
            .await
            .unwrap();

        let bob = OfflineQueue::open("bob", db.clone(), ctx.clone()).await.unwrap();
        assert_eq!(bob.pending_count().await, 0);

        let alice_again = OfflineQueue::open("alice", db, ctx).await.unwrap();
        assert_eq!(alice_again.pending().await, alice.pending().await);
    }

    #[tokio::test]
    async fn clear_wipes_log_and_notifies() {
        let (ctx, _) = online_ctx();
        let (queue, db) = queue_with(ctx.clone()).await;
        let mut events = queue.subscribe();
        queue
            .enqueue(QueuedOperation::delete_board(&board("brd_1")))
            .await
            .unwrap();

        queue.clear().await.unwrap();

        assert_eq!(queue.pending_count().await, 0);
        assert!(matches!(events.recv().await, Ok(QueueEvent::Enqueued { .. })));
        assert_eq!(events.recv().await.unwrap(), QueueEvent::Cleared);
        let reloaded = OfflineQueue::open("user-1", db, ctx).await.unwrap();
        assert_eq!(reloaded.pending_count().await, 0);
    }

    #[tokio::test]
    async fn discard_entity_removes_only_its_operations() {
        let (ctx, _) = online_ctx();
        let (queue, _) = queue_with(ctx).await;
        let temp = board("local_a");
        queue
            .enqueue(QueuedOperation::create_board(&temp, "A"))
            .await
            .unwrap();
        queue
            .enqueue(QueuedOperation::update_board(&temp, BoardPatch::rename("B")))
            .await
            .unwrap();
        queue
            .enqueue(QueuedOperation::delete_board(&board("brd_9")))
            .await
            .unwrap();

        let removed = queue.discard_entity(EntityType::Board, "local_a").await.unwrap();

        assert_eq!(removed, 2);
        assert_eq!(
            queue.pending_entity_ids().await,
            HashSet::from(["brd_9".to_string()])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn only_one_drain_runs_at_a_time() {
        let (ctx, _) = online_ctx();
        let (queue, _) = queue_with(ctx).await;
        queue
            .enqueue(QueuedOperation::delete_board(&board("brd_1")))
            .await
            .unwrap();

        // The first attempt fails so the first drain is parked in its backoff sleep.
        let handler = Scripted::new(|_, attempt| {
            if attempt == 1 {
                Err(Error::Network("flaky".to_string()))
            } else {
                Ok(Replay::Applied)
            }
        });
        let (first, second) = tokio::join!(queue.process_queue(&handler), async {
            tokio::task::yield_now().await;
            queue.process_queue(&handler).await
        });

        assert_eq!(first.unwrap().completed, 1);
        assert_eq!(second.unwrap().completed, 0);
        assert_eq!(handler.calls().len(), 2);
    }

    #[tokio::test]
    async fn drain_requested_while_busy_is_left_for_the_running_drain() {
        let (ctx, _) = online_ctx();
        let (queue, _) = queue_with(ctx).await;
        let handler = Scripted::succeed();

        let running = queue.inner.draining.lock().await;
        queue
            .enqueue(QueuedOperation::delete_board(&board("brd_1")))
            .await
            .unwrap();
        let report = queue.process_queue(&handler).await.unwrap();

        assert_eq!(report, DrainReport { completed: 0, dropped: 0, remaining: 1 });
        assert!(handler.calls().is_empty());
        assert!(queue.take_rerun_request());
        assert!(!queue.take_rerun_request());
        drop(running);

        let report = queue.process_queue(&handler).await.unwrap();
        assert_eq!(report, DrainReport { completed: 1, dropped: 0, remaining: 0 });
        assert!(!queue.take_rerun_request());
    }
}
