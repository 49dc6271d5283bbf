//! Background queue for best-effort side effects.
//!
//! Jobs (remote wishlist calls, notification emails) are dispatched without
//! waiting and run at most once, in dispatch order, on a single consumer task.
//! A failed job is logged and counted; it is never retried and never reported
//! back to the code that dispatched it. A full queue drops the job.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

/// Error type returned by jobs.
pub type JobError = Box<dyn std::error::Error + Send + Sync>;

type JobFuture = Pin<Box<dyn Future<Output = Result<(), JobError>> + Send>>;

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

struct Job {
    name: &'static str,
    future: JobFuture,
}

enum Envelope {
    Job(Job),
    Flush(oneshot::Sender<()>),
}

#[derive(Default)]
struct Counters {
    dispatched: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time queue statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct QueueStats {
    pub dispatched: u64,
    pub completed: u64,
    pub failed: u64,
    pub dropped: u64,
}

/// Handle to the background queue. Cheap to clone.
#[derive(Clone)]
pub struct TaskQueue {
    tx: mpsc::Sender<Envelope>,
    counters: Arc<Counters>,
}

impl TaskQueue {
    /// Start the consumer task. Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let counters = Arc::new(Counters::default());
        tokio::spawn(consume(rx, Arc::clone(&counters)));
        Self { tx, counters }
    }

    /// Enqueue a job without waiting for it.
    pub fn dispatch<F>(&self, name: &'static str, future: F)
    where
        F: Future<Output = Result<(), JobError>> + Send + 'static,
    {
        let job = Job {
            name,
            future: Box::pin(future),
        };
        match self.tx.try_send(Envelope::Job(job)) {
            Ok(()) => {
                self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                let reason = match e {
                    mpsc::error::TrySendError::Full(_) => "queue full",
                    mpsc::error::TrySendError::Closed(_) => "queue closed",
                };
                tracing::warn!(job = name, reason, "Dropped background job");
            }
        }
    }

    /// Wait until every job dispatched before this call has finished.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Envelope::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }

    #[must_use]
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

async fn consume(mut rx: mpsc::Receiver<Envelope>, counters: Arc<Counters>) {
    while let Some(envelope) = rx.recv().await {
        match envelope {
            Envelope::Job(job) => match job.future.await {
                Ok(()) => {
                    counters.completed.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(job = job.name, "Background job completed");
                }
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(job = job.name, error = %e, "Background job failed");
                }
            },
            Envelope::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("Task queue consumer stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[tokio::test]
    async fn test_jobs_run_in_dispatch_order() {
        let queue = TaskQueue::spawn(16);
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let seen = Arc::clone(&seen);
            queue.dispatch("record", async move {
                // Later jobs finish faster; ordering must still hold.
                tokio::time::sleep(std::time::Duration::from_millis(10 - i * 2)).await;
                seen.lock().unwrap().push(i);
                Ok(())
            });
        }
        queue.flush().await;

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(queue.stats().completed, 5);
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_propagated() {
        let queue = TaskQueue::spawn(16);
        queue.dispatch("fails", async { Err("remote unavailable".into()) });
        queue.dispatch("succeeds", async { Ok(()) });
        queue.flush().await;

        let stats = queue.stats();
        assert_eq!(stats.dispatched, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.completed, 1);
    }

    #[tokio::test]
    async fn test_full_queue_drops() {
        let queue = TaskQueue::spawn(1);
        let (release_tx, release_rx) = oneshot::channel::<()>();
        queue.dispatch("blocker", async move {
            let _ = release_rx.await;
            Ok(())
        });
        // Give the consumer time to pick up the blocker so the buffer is empty.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        queue.dispatch("fills", async { Ok(()) });
        queue.dispatch("overflows", async { Ok(()) });
        let _ = release_tx.send(());
        queue.flush().await;

        assert_eq!(queue.stats().dropped, 1);
    }
}
