use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::metrics::Metrics;
use crate::pipeline::job::{FailureKind, JobOutcome};
use crate::pipeline::queue::JobQueue;
use crate::pipeline::tracker::JobTracker;
use crate::worker::executor::{ConvertExecutor, ExecOutcome};

/// Availability of one worker slot, exposed for the health surface.
#[derive(Debug, Clone, Serialize)]
pub struct SlotState {
    pub worker_id: usize,
    pub busy: bool,
    pub current_job: Option<Uuid>,
}

impl SlotState {
    pub fn idle(worker_id: usize) -> Self {
        Self {
            worker_id,
            busy: false,
            current_job: None,
        }
    }
}

/// Fixed-size pool of dispatch loops, one per worker slot.
///
/// Each loop blocks on the queue, claims the job from the tracker, runs the
/// conversion in a child process, and reports the outcome. Concurrency is
/// bounded by construction: there are exactly `n` loops and each runs one
/// job at a time. A crashed converter process costs nothing but the job that
/// was in it; the loop itself survives and the next dispatch spawns a fresh
/// process, so the pool never shrinks below `n`.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn start(
        worker_count: usize,
        queue: Arc<JobQueue>,
        tracker: Arc<JobTracker>,
        executor: ConvertExecutor,
        slots: Arc<RwLock<Vec<SlotState>>>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let handles = (0..worker_count)
            .map(|worker_id| {
                let queue = Arc::clone(&queue);
                let tracker = Arc::clone(&tracker);
                let executor = executor.clone();
                let slots = Arc::clone(&slots);
                let metrics = Arc::clone(&metrics);
                tokio::spawn(async move {
                    worker_loop(worker_id, queue, tracker, executor, slots, metrics).await;
                })
            })
            .collect();
        tracing::info!(worker_count, "worker pool started");
        Self { handles }
    }

    /// Wait for every dispatch loop to exit. Loops stop on their own once the
    /// queue has shut down and their current job is finished. With a grace
    /// period, returns `false` if the loops did not finish in time; the
    /// caller is expected to kill in-flight jobs and let the detached loops
    /// unwind on their own.
    pub async fn join(self, grace: Option<Duration>) -> bool {
        let join_all = async {
            for handle in self.handles {
                let _ = handle.await;
            }
        };
        match grace {
            Some(grace) => tokio::time::timeout(grace, join_all).await.is_ok(),
            None => {
                join_all.await;
                true
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<JobQueue>,
    tracker: Arc<JobTracker>,
    executor: ConvertExecutor,
    slots: Arc<RwLock<Vec<SlotState>>>,
    metrics: Arc<Metrics>,
) {
    while let Some(job) = queue.dequeue().await {
        let job_id = job.id;
        let Some(cancel) = tracker.begin_dispatch(job_id).await else {
            // Reached a terminal state (deadline) while still queued
            tracing::debug!(job_id = %job_id, worker_id, "skipping job already terminal at dispatch");
            continue;
        };

        set_slot(&slots, worker_id, Some(job_id)).await;
        metrics.incr_busy_workers();
        tracker.mark_running(job_id).await;
        tracing::info!(
            job_id = %job_id,
            worker_id,
            filename = %job.request.filename,
            size = job.request.bytes.len(),
            "executing conversion"
        );

        let result = executor.execute(job_id, &job.request, &cancel).await;
        match result.outcome {
            ExecOutcome::Completed(output) => {
                tracker.complete(job_id, JobOutcome::Completed(output)).await;
            }
            ExecOutcome::ConversionFailed(message) => {
                tracing::warn!(job_id = %job_id, worker_id, error = %message, "conversion failed");
                tracker
                    .complete(
                        job_id,
                        JobOutcome::Failed {
                            kind: FailureKind::Conversion,
                            message,
                        },
                    )
                    .await;
            }
            ExecOutcome::Crashed(message) => {
                // The slot survives; the next dispatch spawns a fresh process.
                // Callers get a generic message, the detail stays in the log.
                tracing::warn!(job_id = %job_id, worker_id, error = %message, "converter process died");
                metrics.record_worker_crash();
                tracker
                    .complete(
                        job_id,
                        JobOutcome::Failed {
                            kind: FailureKind::Internal,
                            message: "internal conversion error".to_string(),
                        },
                    )
                    .await;
            }
            ExecOutcome::Terminated => {
                // The tracker already produced the terminal state that caused
                // the kill (timeout or shutdown); nothing to report.
            }
        }

        set_slot(&slots, worker_id, None).await;
        metrics.decr_busy_workers();
    }
    tracing::debug!(worker_id, "worker loop exited");
}

async fn set_slot(slots: &RwLock<Vec<SlotState>>, worker_id: usize, job: Option<Uuid>) {
    let mut slots = slots.write().await;
    if let Some(slot) = slots.get_mut(worker_id) {
        slot.busy = job.is_some();
        slot.current_job = job;
    }
}
