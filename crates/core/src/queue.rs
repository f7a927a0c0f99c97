//! Job queue contract: the seam between the workflow engine and the
//! asynchronous worker infrastructure.
//!
//! Components accept an `Arc<dyn JobQueue>` and enqueue named work units
//! with a JSON payload. Delivery is at least once; enqueue order is not a
//! delivery-order guarantee.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::SendcraftResult;

/// Trait for scheduling asynchronous work units. Implementations route
/// payloads to the surrounding job infrastructure; retries and dead-letter
/// handling belong to that infrastructure, not the callers.
pub trait JobQueue: Send + Sync {
    fn enqueue(&self, job: &str, payload: serde_json::Value) -> SendcraftResult<()>;
}

/// No-op queue for modules that never continue asynchronously.
pub struct NoOpQueue;

impl JobQueue for NoOpQueue {
    fn enqueue(&self, _job: &str, _payload: serde_json::Value) -> SendcraftResult<()> {
        Ok(())
    }
}

/// A work unit held by the in-memory queue.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub job: String,
    pub payload: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
}

/// FIFO in-memory queue used by tests and the local worker pump.
#[derive(Default)]
pub struct InMemoryJobQueue {
    jobs: Mutex<VecDeque<QueuedJob>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(VecDeque::new()),
        }
    }

    pub fn pop(&self) -> Option<QueuedJob> {
        self.jobs.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}

impl JobQueue for InMemoryJobQueue {
    fn enqueue(&self, job: &str, payload: serde_json::Value) -> SendcraftResult<()> {
        self.jobs.lock().push_back(QueuedJob {
            job: job.to_string(),
            payload,
            enqueued_at: Utc::now(),
        });
        Ok(())
    }
}

/// Convenience: a no-op queue for modules that don't need one.
pub fn noop_queue() -> Arc<dyn JobQueue> {
    Arc::new(NoOpQueue)
}

/// Convenience: an in-memory queue for tests and local drains.
pub fn memory_queue() -> Arc<InMemoryJobQueue> {
    Arc::new(InMemoryJobQueue::new())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_queue_fifo() {
        let queue = memory_queue();
        assert!(queue.is_empty());

        queue
            .enqueue("automation.run_step", serde_json::json!({"n": 1}))
            .unwrap();
        queue
            .enqueue("automation.run_step", serde_json::json!({"n": 2}))
            .unwrap();

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().unwrap().payload["n"], 1);
        assert_eq!(queue.pop().unwrap().payload["n"], 2);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_noop_queue() {
        let queue = noop_queue();
        // Should not panic
        queue
            .enqueue("automation.run_step", serde_json::json!({}))
            .unwrap();
    }
}
