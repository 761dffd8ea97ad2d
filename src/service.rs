//! The service facade that wires admission, queue, tracker, and worker pool
//! together and exposes the external contract: submit a job, await a bounded
//! result, observe the pipeline, shut down.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::admission::AdmissionController;
use crate::config::ServiceConfig;
use crate::error::{ConvertError, RejectionReason, Result};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::pipeline::job::{ConvertRequest, FailureKind, JobHandle, JobOutcome, JobState};
use crate::pipeline::queue::{EnqueueResult, JobQueue};
use crate::pipeline::tracker::JobTracker;
use crate::worker::executor::ConvertExecutor;
use crate::worker::pool::{SlotState, WorkerPool};

/// One running conversion pipeline.
pub struct ConvertService {
    config: ServiceConfig,
    admission: AdmissionController,
    queue: Arc<JobQueue>,
    tracker: Arc<JobTracker>,
    metrics: Arc<Metrics>,
    slots: Arc<RwLock<Vec<SlotState>>>,
    pool: Mutex<Option<WorkerPool>>,
}

impl ConvertService {
    /// Validate the configuration, build every component, and start the
    /// worker pool. Must be called inside a tokio runtime.
    pub fn start(config: ServiceConfig) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(Metrics::default());
        let admission = AdmissionController::new(&config)?;
        let queue = Arc::new(JobQueue::new(config.queue_capacity, Arc::clone(&metrics)));
        let tracker = Arc::new(JobTracker::new(Arc::clone(&metrics)));
        let slots = Arc::new(RwLock::new(
            (0..config.worker_count).map(SlotState::idle).collect(),
        ));
        let executor = ConvertExecutor::new(config.converter.clone());
        let pool = WorkerPool::start(
            config.worker_count,
            Arc::clone(&queue),
            Arc::clone(&tracker),
            executor,
            Arc::clone(&slots),
            Arc::clone(&metrics),
        );

        tracing::info!(
            workers = config.worker_count,
            queue_capacity = config.queue_capacity,
            "conversion service started"
        );

        Ok(Self {
            config,
            admission,
            queue,
            tracker,
            metrics,
            slots,
            pool: Mutex::new(Some(pool)),
        })
    }

    /// Submit one conversion job on behalf of `client`. Never blocks: the
    /// job is either admitted and queued, or rejected immediately.
    pub async fn submit(&self, request: ConvertRequest, client: &str) -> Result<JobHandle> {
        if self.queue.is_shutting_down() {
            return Err(self.reject(RejectionReason::ServiceShuttingDown, client));
        }

        let job = self
            .admission
            .admit(request, client)
            .map_err(|reason| self.reject(reason, client))?;
        let id = job.id;
        let filename = job.request.filename.clone();

        let rx = self.tracker.register(&job).await;
        self.tracker.mark_queued(id).await;
        match self.queue.enqueue(job) {
            EnqueueResult::Accepted => {
                tracing::info!(job_id = %id, client, filename = %filename, "job admitted");
                Ok(JobHandle { id, rx })
            }
            EnqueueResult::Full => {
                self.tracker.discard(id).await;
                Err(self.reject(RejectionReason::QueueFull, client))
            }
            EnqueueResult::ShuttingDown => {
                self.tracker.discard(id).await;
                Err(self.reject(RejectionReason::ServiceShuttingDown, client))
            }
        }
    }

    fn reject(&self, reason: RejectionReason, client: &str) -> ConvertError {
        self.metrics.record_rejection(&reason);
        tracing::warn!(client, reason = %reason, "job rejected");
        ConvertError::Rejected(reason)
    }

    /// Wait for the job's terminal outcome, bounded by the caller's own
    /// timeout. The timeout here does not cancel the job; its deadline does.
    pub async fn await_result(
        &self,
        handle: JobHandle,
        caller_timeout: Duration,
    ) -> Result<JobOutcome> {
        match tokio::time::timeout(caller_timeout, handle.rx).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => Err(ConvertError::ResultChannelClosed),
            Err(_) => Err(ConvertError::AwaitTimeout),
        }
    }

    /// Current state of a job that has not yet reached a terminal state.
    pub async fn job_state(&self, id: Uuid) -> Option<JobState> {
        self.tracker.job_state(id).await
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Per-slot busy/idle view for the health surface.
    pub async fn worker_slots(&self) -> Vec<SlotState> {
        self.slots.read().await.clone()
    }

    /// Stop the pipeline. New submissions are rejected from this point on and
    /// still-queued jobs fail with a shutdown error. With `graceful`,
    /// in-flight conversions get `shutdown_grace` to finish before being
    /// killed; without it they are killed immediately. Idempotent.
    pub async fn shutdown(&self, graceful: bool) {
        self.queue.shutdown();

        // Jobs that never reached a worker are failed, not dropped
        self.fail_queued().await;

        if let Some(pool) = self.pool.lock().await.take() {
            if graceful {
                if !pool.join(Some(self.config.shutdown_grace)).await {
                    tracing::warn!(
                        grace_secs = self.config.shutdown_grace.as_secs_f64(),
                        "grace period elapsed, killing in-flight conversions"
                    );
                }
            } else {
                self.tracker.abort_active("service shutting down").await;
                pool.join(None).await;
            }
        }

        // A submit racing the shutdown flag can still slip a job into the
        // channel after the first drain; with the workers gone, sweep both
        // the channel and the tracker so nothing stays non-terminal.
        self.fail_queued().await;
        self.tracker.abort_active("service shutting down").await;

        tracing::info!("conversion service shut down");
    }

    async fn fail_queued(&self) {
        for job in self.queue.drain().await {
            self.tracker
                .complete(
                    job.id,
                    JobOutcome::Failed {
                        kind: FailureKind::ShuttingDown,
                        message: "service shutting down".to_string(),
                    },
                )
                .await;
        }
    }
}
