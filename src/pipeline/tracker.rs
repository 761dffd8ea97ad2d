//! Job lifecycle tracking: the single owner of every job's state machine.
//!
//! The tracker enforces the path
//! `Admitted -> Queued -> Dispatched -> Running -> {Completed, Failed, TimedOut}`,
//! runs one deadline timer per job, and delivers exactly one terminal outcome
//! to the submitting caller. Nothing else in the crate writes job state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::metrics::Metrics;
use crate::pipeline::job::{FailureKind, Job, JobOutcome, JobState};

struct JobEntry {
    state: JobState,
    filename: String,
    submitted_at: DateTime<Utc>,
    /// Cancelled to forcibly kill the conversion process for this job
    cancel: CancellationToken,
    result_tx: Option<oneshot::Sender<JobOutcome>>,
    timer: Option<JoinHandle<()>>,
}

/// Tracks every non-terminal job. Entries are removed when the terminal
/// outcome is delivered, so the map stays bounded by queue depth plus the
/// worker count.
pub struct JobTracker {
    jobs: RwLock<HashMap<Uuid, JobEntry>>,
    metrics: Arc<Metrics>,
}

impl JobTracker {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            metrics,
        }
    }

    /// Register an admitted job and start its deadline timer. Returns the
    /// receiver the caller awaits its terminal outcome on.
    pub async fn register(self: &Arc<Self>, job: &Job) -> oneshot::Receiver<JobOutcome> {
        let (tx, rx) = oneshot::channel();
        // The timer is spawned while the map lock is held: an
        // already-elapsed deadline must not run `expire` before the entry
        // is inserted.
        let mut jobs = self.jobs.write().await;
        let timer = {
            let tracker = Arc::clone(self);
            let id = job.id;
            let deadline = job.deadline;
            tokio::spawn(async move {
                tokio::time::sleep_until(deadline).await;
                tracker.expire(id).await;
            })
        };

        jobs.insert(
            job.id,
            JobEntry {
                state: JobState::Admitted,
                filename: job.request.filename.clone(),
                submitted_at: job.submitted_at,
                cancel: CancellationToken::new(),
                result_tx: Some(tx),
                timer: Some(timer),
            },
        );
        rx
    }

    /// Roll back a registration whose enqueue was rejected. The job is gone
    /// afterwards as if it had never been admitted.
    pub async fn discard(&self, id: Uuid) {
        if let Some(entry) = self.jobs.write().await.remove(&id) {
            if let Some(timer) = entry.timer {
                timer.abort();
            }
        }
    }

    /// Record that the job entered the queue.
    pub async fn mark_queued(&self, id: Uuid) {
        let mut jobs = self.jobs.write().await;
        if let Some(entry) = jobs.get_mut(&id) {
            advance(entry, JobState::Queued);
        }
    }

    /// Claim a dequeued job for a worker slot. Returns the job's kill token,
    /// or `None` if the job already reached a terminal state (deadline fired
    /// while it sat in the queue) and must be skipped.
    pub async fn begin_dispatch(&self, id: Uuid) -> Option<CancellationToken> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs.get_mut(&id)?;
        if !advance(entry, JobState::Dispatched) {
            return None;
        }
        Some(entry.cancel.clone())
    }

    /// Record that the conversion process is running.
    pub async fn mark_running(&self, id: Uuid) {
        let mut jobs = self.jobs.write().await;
        if let Some(entry) = jobs.get_mut(&id) {
            advance(entry, JobState::Running);
        }
    }

    /// Deliver a terminal outcome. No-op if the job is unknown or already
    /// terminal; the first terminal write wins.
    pub async fn complete(&self, id: Uuid, outcome: JobOutcome) {
        let entry = {
            let mut jobs = self.jobs.write().await;
            match jobs.remove(&id) {
                Some(entry) => entry,
                None => return,
            }
        };
        let target = match &outcome {
            JobOutcome::Completed(_) => JobState::Completed,
            JobOutcome::Failed { .. } => JobState::Failed,
            JobOutcome::TimedOut => JobState::TimedOut,
        };
        self.finish(id, entry, target, outcome);
    }

    /// Deadline timer callback: time the job out wherever it currently is and
    /// kill its conversion process if one is running.
    async fn expire(&self, id: Uuid) {
        let entry = {
            let mut jobs = self.jobs.write().await;
            match jobs.remove(&id) {
                Some(entry) => entry,
                None => return,
            }
        };
        tracing::warn!(job_id = %id, filename = %entry.filename, state = %entry.state, "job deadline elapsed");
        self.finish(id, entry, JobState::TimedOut, JobOutcome::TimedOut);
    }

    /// Fail every remaining job and kill in-flight conversions. Used by
    /// shutdown after the queue has been drained.
    pub async fn abort_active(&self, message: &str) {
        let entries: Vec<(Uuid, JobEntry)> = self.jobs.write().await.drain().collect();
        for (id, entry) in entries {
            tracing::warn!(job_id = %id, state = %entry.state, "aborting job: {message}");
            self.finish(
                id,
                entry,
                JobState::Failed,
                JobOutcome::Failed {
                    kind: FailureKind::ShuttingDown,
                    message: message.to_string(),
                },
            );
        }
    }

    /// Current state of a non-terminal job. Terminal jobs are no longer
    /// tracked; their outcome has already been delivered.
    pub async fn job_state(&self, id: Uuid) -> Option<JobState> {
        self.jobs.read().await.get(&id).map(|e| e.state)
    }

    pub async fn active_jobs(&self) -> usize {
        self.jobs.read().await.len()
    }

    fn finish(&self, id: Uuid, mut entry: JobEntry, state: JobState, outcome: JobOutcome) {
        if let Some(timer) = entry.timer.take() {
            timer.abort();
        }
        entry.cancel.cancel();
        match state {
            JobState::Completed => self.metrics.record_completed(),
            JobState::Failed => self.metrics.record_failed(),
            JobState::TimedOut => self.metrics.record_timed_out(),
            _ => {}
        }
        let elapsed_ms = (Utc::now() - entry.submitted_at).num_milliseconds();
        tracing::info!(job_id = %id, state = %state, elapsed_ms, "job reached terminal state");
        if let Some(tx) = entry.result_tx.take() {
            // The caller may have dropped its handle; the outcome is then lost
            // on purpose.
            let _ = tx.send(outcome);
        }
    }
}

/// Move an entry forward along the lifecycle. Backward moves and writes to
/// terminal entries are refused.
fn advance(entry: &mut JobEntry, to: JobState) -> bool {
    if entry.state.is_terminal() || to <= entry.state {
        return false;
    }
    entry.state = to;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::job::ConvertRequest;
    use std::time::Duration;
    use tokio::time::Instant;

    fn tracker() -> Arc<JobTracker> {
        Arc::new(JobTracker::new(Arc::new(Metrics::default())))
    }

    fn job_with_deadline(deadline: Duration) -> Job {
        Job::new(
            ConvertRequest::new("doc.pdf", b"data".to_vec()),
            Instant::now() + deadline,
        )
    }

    #[tokio::test]
    async fn transitions_are_monotonic() {
        let tracker = tracker();
        let job = job_with_deadline(Duration::from_secs(10));
        let _rx = tracker.register(&job).await;

        tracker.mark_queued(job.id).await;
        assert_eq!(tracker.job_state(job.id).await, Some(JobState::Queued));

        assert!(tracker.begin_dispatch(job.id).await.is_some());
        tracker.mark_running(job.id).await;
        assert_eq!(tracker.job_state(job.id).await, Some(JobState::Running));

        // Backward writes are refused
        tracker.mark_queued(job.id).await;
        assert_eq!(tracker.job_state(job.id).await, Some(JobState::Running));
    }

    #[tokio::test]
    async fn first_terminal_outcome_wins() {
        let tracker = tracker();
        let job = job_with_deadline(Duration::from_secs(10));
        let rx = tracker.register(&job).await;
        tracker.mark_queued(job.id).await;

        tracker
            .complete(
                job.id,
                JobOutcome::Failed {
                    kind: FailureKind::Conversion,
                    message: "bad input".to_string(),
                },
            )
            .await;
        // Second write hits a removed entry and is a no-op
        tracker.complete(job.id, JobOutcome::TimedOut).await;

        match rx.await.unwrap() {
            JobOutcome::Failed { kind, message } => {
                assert_eq!(kind, FailureKind::Conversion);
                assert_eq!(message, "bad input");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(tracker.metrics.snapshot().failed, 1);
        assert_eq!(tracker.metrics.snapshot().timed_out, 0);
    }

    #[tokio::test]
    async fn deadline_fires_while_queued() {
        let tracker = tracker();
        let job = job_with_deadline(Duration::from_millis(50));
        let id = job.id;
        let rx = tracker.register(&job).await;
        tracker.mark_queued(id).await;

        match rx.await.unwrap() {
            JobOutcome::TimedOut => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
        // A worker dequeuing it later must be told to skip
        assert!(tracker.begin_dispatch(id).await.is_none());
        assert_eq!(tracker.metrics.snapshot().timed_out, 1);
    }

    #[tokio::test]
    async fn deadline_in_the_past_still_delivers_a_timeout() {
        let tracker = tracker();
        let job = job_with_deadline(Duration::ZERO);
        let rx = tracker.register(&job).await;

        match rx.await.unwrap() {
            JobOutcome::TimedOut => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(tracker.active_jobs().await, 0);
    }

    #[tokio::test]
    async fn expire_cancels_the_kill_token() {
        let tracker = tracker();
        let job = job_with_deadline(Duration::from_millis(50));
        let id = job.id;
        let _rx = tracker.register(&job).await;
        tracker.mark_queued(id).await;
        let token = tracker.begin_dispatch(id).await.unwrap();
        tracker.mark_running(id).await;

        token.cancelled().await;
        assert_eq!(tracker.job_state(id).await, None);
    }

    #[tokio::test]
    async fn discard_rolls_back_registration() {
        let tracker = tracker();
        let job = job_with_deadline(Duration::from_secs(10));
        let id = job.id;
        let rx = tracker.register(&job).await;
        tracker.discard(id).await;

        assert_eq!(tracker.job_state(id).await, None);
        assert!(rx.await.is_err());
        assert_eq!(tracker.active_jobs().await, 0);
    }

    #[tokio::test]
    async fn abort_active_fails_everything() {
        let tracker = tracker();
        let a = job_with_deadline(Duration::from_secs(10));
        let b = job_with_deadline(Duration::from_secs(10));
        let rx_a = tracker.register(&a).await;
        let rx_b = tracker.register(&b).await;
        tracker.mark_queued(a.id).await;
        tracker.mark_queued(b.id).await;

        tracker.abort_active("service shutting down").await;

        for rx in [rx_a, rx_b] {
            match rx.await.unwrap() {
                JobOutcome::Failed { kind, .. } => assert_eq!(kind, FailureKind::ShuttingDown),
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert_eq!(tracker.active_jobs().await, 0);
    }
}
