//! Local queue pump: drains an in-memory job queue through the
//! scheduler. Stand-in for the external worker pool in tests and
//! single-process deployments; failed jobs are surfaced, not retried,
//! since retry policy belongs to the real queue backend.

use std::sync::Arc;

use tracing::{debug, warn};

use sendcraft_core::config::QueueConfig;
use sendcraft_core::queue::InMemoryJobQueue;

use crate::scheduler::StepScheduler;
use crate::types::StepJob;

/// Counts from one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub processed: usize,
    pub failed: usize,
}

/// Pops step jobs until the queue is idle or the drain limit is hit.
pub struct AutomationWorker {
    queue: Arc<InMemoryJobQueue>,
    scheduler: Arc<StepScheduler>,
    drain_limit: usize,
}

impl AutomationWorker {
    pub fn new(queue: Arc<InMemoryJobQueue>, scheduler: Arc<StepScheduler>) -> Self {
        Self {
            queue,
            scheduler,
            drain_limit: QueueConfig::default().drain_limit,
        }
    }

    pub fn with_drain_limit(mut self, drain_limit: usize) -> Self {
        self.drain_limit = drain_limit;
        self
    }

    /// Process queued jobs until none remain. Steps enqueue their
    /// successors while draining, so one pass walks every contact to the
    /// end of its traversal.
    pub fn run_until_idle(&self) -> WorkerReport {
        let mut report = WorkerReport::default();

        while report.processed + report.failed < self.drain_limit {
            let Some(job) = self.queue.pop() else {
                break;
            };
            if job.job != self.scheduler.job_name() {
                warn!(job = %job.job, "Unknown job name, dropping");
                report.failed += 1;
                continue;
            }

            match serde_json::from_value::<StepJob>(job.payload) {
                Ok(step_job) => {
                    match self
                        .scheduler
                        .run_step(step_job.automation_step_id, step_job.contact_id)
                    {
                        Ok(outcome) => {
                            debug!(?outcome, step_id = %step_job.automation_step_id, "Step job done");
                            report.processed += 1;
                        }
                        Err(error) => {
                            warn!(
                                %error,
                                step_id = %step_job.automation_step_id,
                                contact_id = %step_job.contact_id,
                                "Step job failed; retry is the queue backend's concern"
                            );
                            report.failed += 1;
                        }
                    }
                }
                Err(error) => {
                    warn!(%error, "Malformed step job payload, dropping");
                    report.failed += 1;
                }
            }
        }

        if !self.queue.is_empty() {
            warn!(
                remaining = self.queue.len(),
                limit = self.drain_limit,
                "Drain limit reached with jobs left in queue"
            );
        }
        report
    }
}
