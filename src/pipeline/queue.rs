use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::metrics::Metrics;
use crate::pipeline::job::Job;

/// Immediate decision for an enqueue attempt. Backpressure is reject-now,
/// never block-until-space.
#[derive(Debug, PartialEq, Eq)]
pub enum EnqueueResult {
    Accepted,
    Full,
    ShuttingDown,
}

/// Capacity-limited FIFO buffer between admission and the worker pool.
///
/// `enqueue` never blocks; `dequeue` is the only suspending operation and is
/// called solely by idle worker slots. Once [`JobQueue::shutdown`] runs,
/// enqueue rejects everything and blocked dequeuers wake up with `None`;
/// whatever is still buffered is handed back through [`JobQueue::drain`] so
/// no job is silently dropped.
pub struct JobQueue {
    tx: mpsc::Sender<Job>,
    rx: Mutex<mpsc::Receiver<Job>>,
    shutting_down: AtomicBool,
    shutdown: CancellationToken,
    metrics: Arc<Metrics>,
}

impl JobQueue {
    pub fn new(capacity: usize, metrics: Arc<Metrics>) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
            shutting_down: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            metrics,
        }
    }

    /// Offer a job to the queue without waiting for space.
    pub fn enqueue(&self, job: Job) -> EnqueueResult {
        if self.is_shutting_down() {
            return EnqueueResult::ShuttingDown;
        }
        match self.tx.try_send(job) {
            Ok(()) => {
                self.metrics.incr_queue_depth();
                // The flag can flip between the check above and the send; the
                // job then sits in a channel nobody will service, so report
                // the shutdown and leave it for the post-shutdown drain.
                if self.is_shutting_down() {
                    return EnqueueResult::ShuttingDown;
                }
                EnqueueResult::Accepted
            }
            Err(mpsc::error::TrySendError::Full(_)) => EnqueueResult::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => EnqueueResult::ShuttingDown,
        }
    }

    /// Wait for the next job in FIFO order. Returns `None` once shutdown has
    /// been initiated; remaining buffered jobs are left for [`Self::drain`].
    pub async fn dequeue(&self) -> Option<Job> {
        let mut rx = self.rx.lock().await;
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => None,
            job = rx.recv() => {
                let job = job?;
                self.metrics.decr_queue_depth();
                Some(job)
            }
        }
    }

    /// Stop accepting work and wake every blocked dequeuer. Idempotent.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Pull out everything still buffered. Used after shutdown to fail the
    /// remaining jobs rather than dropping them.
    pub async fn drain(&self) -> Vec<Job> {
        let mut rx = self.rx.lock().await;
        let mut drained = Vec::new();
        while let Ok(job) = rx.try_recv() {
            self.metrics.decr_queue_depth();
            drained.push(job);
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::job::ConvertRequest;
    use tokio::time::Instant;

    fn test_job(name: &str) -> Job {
        Job::new(
            ConvertRequest::new(name, b"data".to_vec()),
            Instant::now() + std::time::Duration::from_secs(5),
        )
    }

    fn test_queue(capacity: usize) -> JobQueue {
        JobQueue::new(capacity, Arc::new(Metrics::default()))
    }

    #[tokio::test]
    async fn enqueue_rejects_when_full_without_blocking() {
        let queue = test_queue(1);
        assert_eq!(queue.enqueue(test_job("a.pdf")), EnqueueResult::Accepted);
        assert_eq!(queue.enqueue(test_job("b.pdf")), EnqueueResult::Full);
        assert_eq!(queue.metrics.snapshot().queue_depth, 1);
    }

    #[tokio::test]
    async fn dequeue_preserves_fifo_order() {
        let queue = test_queue(4);
        let a = test_job("a.pdf");
        let b = test_job("b.pdf");
        let (id_a, id_b) = (a.id, b.id);
        queue.enqueue(a);
        queue.enqueue(b);

        assert_eq!(queue.dequeue().await.map(|j| j.id), Some(id_a));
        assert_eq!(queue.dequeue().await.map(|j| j.id), Some(id_b));
        assert_eq!(queue.metrics.snapshot().queue_depth, 0);
    }

    #[tokio::test]
    async fn shutdown_rejects_enqueue_and_wakes_dequeue() {
        let queue = Arc::new(test_queue(2));

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        queue.shutdown();
        assert!(waiter.await.unwrap().is_none());
        assert_eq!(queue.enqueue(test_job("a.pdf")), EnqueueResult::ShuttingDown);
    }

    #[tokio::test]
    async fn drain_returns_buffered_jobs_after_shutdown() {
        let queue = test_queue(4);
        queue.enqueue(test_job("a.pdf"));
        queue.enqueue(test_job("b.pdf"));
        queue.shutdown();

        assert!(queue.dequeue().await.is_none());
        let drained = queue.drain().await;
        assert_eq!(drained.len(), 2);
        assert_eq!(queue.metrics.snapshot().queue_depth, 0);
    }
}
