//! Worker pool worker.
//!
//! Each worker pulls tasks from the shared task queue, runs the operation
//! strategy and reports exactly one outcome per completed task. A task
//! interrupted by cancellation gets no outcome.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use tracing::{debug, error, info, warn};

use crate::operation::ObjectOperation;
use crate::recorder::OutcomeSender;
use crate::stage::Stage;
use crate::types::{ObjectTask, TaskOutcome, TransferStatistics};

pub struct ObjectWorker {
    worker_index: u16,
    base: Stage,
    operation: Arc<dyn ObjectOperation>,
    outcome_sender: OutcomeSender,
}

impl ObjectWorker {
    pub fn new(
        base: Stage,
        worker_index: u16,
        operation: Arc<dyn ObjectOperation>,
        outcome_sender: OutcomeSender,
    ) -> Self {
        Self {
            worker_index,
            base,
            operation,
            outcome_sender,
        }
    }

    pub async fn run(&self) -> Result<()> {
        debug!(
            worker_index = self.worker_index,
            operation = self.operation.name(),
            "worker started."
        );

        let receiver = self
            .base
            .receiver
            .as_ref()
            .ok_or_else(|| anyhow!("worker has no task channel."))?;

        loop {
            tokio::select! {
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(task) => self.process_task(task).await,
                        Err(_) if receiver.is_closed() => {
                            debug!(worker_index = self.worker_index, "worker has been completed.");
                            break;
                        }
                        Err(e) => {
                            error!(worker_index = self.worker_index, error = %e, "unexpected channel error.");
                            break;
                        }
                    }
                },
                _ = self.base.cancellation_token.cancelled() => {
                    info!(worker_index = self.worker_index, "worker has been cancelled.");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn process_task(&self, task: ObjectTask) {
        if !self.base.key_filter.is_match(&task.key) {
            warn!(
                worker_index = self.worker_index,
                key = task.key,
                "key does not match the filter."
            );
            self.report_failure(task.key).await;
            return;
        }

        let result = tokio::select! {
            result = self.operation.execute(&task) => result,
            _ = self.base.cancellation_token.cancelled() => {
                debug!(
                    worker_index = self.worker_index,
                    key = task.key,
                    "operation interrupted by cancellation."
                );
                return;
            }
        };

        match result {
            Ok(()) => self.report_success(task.key).await,
            Err(e) => {
                warn!(
                    worker_index = self.worker_index,
                    key = task.key,
                    version_id = task.version_id,
                    operation = self.operation.name(),
                    error = format!("{e:#}"),
                    "{} failed for key '{}'.",
                    self.operation.name(),
                    task.key,
                );
                self.report_failure(task.key).await;
            }
        }
    }

    async fn report_success(&self, key: String) {
        self.base.stats_report.increment_processed();
        self.base
            .send_stats(TransferStatistics::TaskComplete { key: key.clone() })
            .await;
        self.send_outcome(TaskOutcome::Success { key }).await;
    }

    async fn report_failure(&self, key: String) {
        self.base.stats_report.increment_failed();
        self.base.set_warning();
        self.base
            .send_stats(TransferStatistics::TaskFailed { key: key.clone() })
            .await;
        self.send_outcome(TaskOutcome::Failure { key }).await;
    }

    async fn send_outcome(&self, outcome: TaskOutcome) {
        if !self.outcome_sender.send(outcome).await {
            // Only possible if the recorder stopped early on an I/O error.
            warn!(
                worker_index = self.worker_index,
                "outcome queue closed, outcome dropped."
            );
        }
    }
}
