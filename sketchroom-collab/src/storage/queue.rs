//! Asynchronous persistence queue.
//!
//! One worker task drains a bounded channel and runs every job on the
//! blocking pool, one at a time, so writes for a room land in the order the
//! gateway accepted them. Loads go through the same queue and therefore
//! observe every write enqueued before them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use sketchroom_core::shape::Shape;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;

use super::{PersistOp, RoomRepository, StoreError};

/// Outcome of a room load.
pub type LoadResult = Result<Option<Vec<Shape>>, StoreError>;

/// Persistence counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistStats {
    pub writes_ok: u64,
    pub writes_failed: u64,
    /// Writes discarded because the queue was full.
    pub writes_dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    ok: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

enum Job {
    Write { room_id: String, op: PersistOp },
    Load { room_id: String, reply: oneshot::Sender<LoadResult> },
    Flush { reply: oneshot::Sender<()> },
}

/// Handle to the persistence worker. Cheap to clone.
#[derive(Clone)]
pub struct PersistenceQueue {
    jobs: mpsc::Sender<Job>,
    counters: Arc<Counters>,
}

impl PersistenceQueue {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn(repo: Arc<dyn RoomRepository>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let counters = Arc::new(Counters::default());
        tokio::spawn(run_worker(repo, rx, counters.clone()));
        Self { jobs: tx, counters }
    }

    /// Enqueue a write without waiting. Returns `false` if it was dropped.
    pub fn enqueue(&self, room_id: &str, op: PersistOp) -> bool {
        let job = Job::Write {
            room_id: room_id.to_string(),
            op,
        };
        match self.jobs.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                if let Job::Write { room_id, op } = job {
                    log::error!("Persistence queue full, dropping {} for room {room_id}", op.name());
                }
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Closed(_)) => {
                log::error!("Persistence worker stopped, dropping write for room {room_id}");
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Request a room load. The receiver resolves once every write enqueued
    /// earlier has been applied.
    pub fn load(&self, room_id: &str) -> oneshot::Receiver<LoadResult> {
        let (reply, rx) = oneshot::channel();
        let job = Job::Load {
            room_id: room_id.to_string(),
            reply,
        };
        if let Err(e) = self.jobs.try_send(job) {
            let reason = match &e {
                TrySendError::Full(_) => "persistence queue full",
                TrySendError::Closed(_) => "persistence worker stopped",
            };
            if let Job::Load { reply, .. } = e.into_inner() {
                let _ = reply.send(Err(StoreError::Unavailable(reason.to_string())));
            }
        }
        rx
    }

    /// Wait until every job enqueued so far has finished.
    pub async fn flush(&self) {
        let (reply, rx) = oneshot::channel();
        if self.jobs.send(Job::Flush { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }

    pub fn stats(&self) -> PersistStats {
        PersistStats {
            writes_ok: self.counters.ok.load(Ordering::Relaxed),
            writes_failed: self.counters.failed.load(Ordering::Relaxed),
            writes_dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

async fn run_worker(
    repo: Arc<dyn RoomRepository>,
    mut jobs: mpsc::Receiver<Job>,
    counters: Arc<Counters>,
) {
    while let Some(job) = jobs.recv().await {
        match job {
            Job::Write { room_id, op } => {
                let name = op.name();
                let task_repo = repo.clone();
                let task_room = room_id.clone();
                let result =
                    tokio::task::spawn_blocking(move || task_repo.apply(&task_room, &op)).await;
                match result {
                    Ok(Ok(())) => {
                        counters.ok.fetch_add(1, Ordering::Relaxed);
                        log::debug!("Persisted {name} for room {room_id}");
                    }
                    Ok(Err(e)) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        log::error!("Failed to persist {name} for room {room_id}: {e}");
                    }
                    Err(e) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        log::error!("Persistence task for room {room_id} panicked: {e}");
                    }
                }
            }
            Job::Load { room_id, reply } => {
                let task_repo = repo.clone();
                let result = tokio::task::spawn_blocking(move || task_repo.load(&room_id))
                    .await
                    .unwrap_or_else(|e| Err(StoreError::Unavailable(e.to_string())));
                let _ = reply.send(result);
            }
            Job::Flush { reply } => {
                let _ = reply.send(());
            }
        }
    }
    log::debug!("Persistence worker stopped");
}
