//! Transfer pipeline orchestrator.
//!
//! Connects the stages of a run:
//!
//! ```text
//! ObjectSource → task queue → ObjectWorker × N → outcome queues → OutcomeRecorder
//! ```
//!
//! Shutdown is three-phase and owned by [`PipelineState::finish`]: stop
//! intake, drain the workers, then drain the outcome queues. The `list`
//! operation bypasses this and runs the [`VersionListingWriter`] alone.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_channel::{Receiver, Sender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::listing::VersionListingWriter;
use crate::operation::build_operation;
use crate::recorder::{OutcomeRecorder, OutcomeSender, outcome_channel};
use crate::source::{ObjectSource, validate_source_mode};
use crate::stage::Stage;
use crate::storage::{self, Storage};
use crate::types::error::{MoveObjectError, is_cancelled_error};
use crate::types::token::PipelineCancellationToken;
use crate::types::{ObjectTask, Operation, TransferStatistics, TransferStats, TransferStatsReport};
use crate::worker::ObjectWorker;

type ErrorList = Arc<Mutex<VecDeque<anyhow::Error>>>;

fn lock_errors(errors: &ErrorList) -> MutexGuard<'_, VecDeque<anyhow::Error>> {
    errors.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Shared run state between the spawned stages and the orchestrator.
///
/// Lives from before the workers start until `finish()` returns. Counters
/// are final only after `finish()`.
pub struct PipelineState {
    task_sender: Sender<ObjectTask>,
    outcome_sender: OutcomeSender,
    stats_report: Arc<TransferStatsReport>,
    workers: Vec<JoinHandle<()>>,
    recorder: JoinHandle<()>,
    operation: Operation,
    dry_run: bool,
    grace_delay: Duration,
}

impl PipelineState {
    /// Close intake, wait for every worker, close the outcome queues, wait
    /// for the recorder and log the summary.
    pub async fn finish(self) -> TransferStats {
        // Gives a still-populating producer a chance to finish enqueuing.
        if !self.grace_delay.is_zero() {
            tokio::time::sleep(self.grace_delay).await;
        }

        self.task_sender.close();
        debug!("task queue closed.");

        for worker in self.workers {
            if let Err(e) = worker.await {
                error!("worker supervisor failed: {}", e);
            }
        }
        debug!("all workers have exited.");

        self.outcome_sender.close();
        if let Err(e) = self.recorder.await {
            error!("recorder supervisor failed: {}", e);
        }
        debug!("outcome queues drained.");

        let stats = self.stats_report.snapshot();
        if !self.dry_run {
            info!(
                operation = self.operation.as_str(),
                processed = stats.processed,
                failed = stats.failed,
                "{} {} objects, {} failures",
                self.operation.summary_verb(),
                stats.processed,
                stats.failed,
            );
        }
        stats
    }
}

/// The transfer pipeline.
///
/// ## Usage
///
/// ```no_run
/// # async fn example() {
/// # use moveobject_rs::{Config, TransferPipeline, create_pipeline_cancellation_token};
/// # let config: Config = todo!();
/// let cancellation_token = create_pipeline_cancellation_token();
/// let mut pipeline = TransferPipeline::new(config, cancellation_token).await;
/// pipeline.close_stats_sender();
/// pipeline.run().await;
/// if pipeline.has_error() {
///     eprintln!("{:?}", pipeline.get_errors_and_consume().unwrap()[0]);
/// }
/// # }
/// ```
pub struct TransferPipeline {
    config: Config,
    target: Storage,
    source: Storage,
    cancellation_token: PipelineCancellationToken,
    stats_sender: Sender<TransferStatistics>,
    stats_receiver: Receiver<TransferStatistics>,
    has_error: Arc<AtomicBool>,
    has_panic: Arc<AtomicBool>,
    has_warning: Arc<AtomicBool>,
    errors: ErrorList,
    ready: bool,
    stats_report: Arc<TransferStatsReport>,
}

impl TransferPipeline {
    /// Create a pipeline with S3 storages built from the client configurations.
    ///
    /// Migrate reads through the source client configuration when one is
    /// given; every other read and write goes through the target.
    pub async fn new(config: Config, cancellation_token: PipelineCancellationToken) -> Self {
        let target = storage::create_storage(
            config.target_client_config.clone(),
            config.rate_limit_objects,
            cancellation_token.clone(),
        )
        .await;

        let source = match (&config.operation, &config.source_client_config) {
            (Operation::Migrate, Some(source_client_config)) => {
                storage::create_storage(
                    Some(source_client_config.clone()),
                    config.rate_limit_objects,
                    cancellation_token.clone(),
                )
                .await
            }
            _ => dyn_clone::clone_box(&*target),
        };

        Self::with_storage(config, cancellation_token, target, source)
    }

    /// Create a pipeline over caller-supplied storages.
    pub fn with_storage(
        config: Config,
        cancellation_token: PipelineCancellationToken,
        target: Storage,
        source: Storage,
    ) -> Self {
        let (stats_sender, stats_receiver) = async_channel::unbounded();

        Self {
            config,
            target,
            source,
            cancellation_token,
            stats_sender,
            stats_receiver,
            has_error: Arc::new(AtomicBool::new(false)),
            has_panic: Arc::new(AtomicBool::new(false)),
            has_warning: Arc::new(AtomicBool::new(false)),
            errors: Arc::new(Mutex::new(VecDeque::new())),
            ready: true,
            stats_report: Arc::new(TransferStatsReport::new()),
        }
    }

    /// Run the pipeline to completion. May be called once.
    pub async fn run(&mut self) {
        if !self.ready {
            self.record_error(anyhow!(MoveObjectError::Pipeline(
                "TransferPipeline::run() called more than once".to_string()
            )));
            return;
        }
        self.ready = false;

        if self.config.operation == Operation::List {
            self.execute_listing().await;
        } else {
            self.execute_transfer().await;
        }

        if self.config.warn_as_error && self.has_warning() {
            self.record_error(anyhow!("warnings promoted to errors (--warn-as-error)"));
        }

        self.shutdown();
    }

    pub fn has_error(&self) -> bool {
        self.has_error.load(Ordering::SeqCst)
    }

    pub fn has_panic(&self) -> bool {
        self.has_panic.load(Ordering::SeqCst)
    }

    /// Whether any task failed or another non-fatal issue occurred.
    pub fn has_warning(&self) -> bool {
        self.has_warning.load(Ordering::SeqCst)
    }

    /// Consume and return all accumulated errors, or `None` if there were none.
    pub fn get_errors_and_consume(&self) -> Option<Vec<anyhow::Error>> {
        if !self.has_error() {
            return None;
        }
        Some(lock_errors(&self.errors).drain(..).collect())
    }

    pub fn get_error_messages(&self) -> Option<Vec<String>> {
        if !self.has_error() {
            return None;
        }
        Some(
            lock_errors(&self.errors)
                .iter()
                .map(|e| e.to_string())
                .collect(),
        )
    }

    pub fn get_stats_receiver(&self) -> Receiver<TransferStatistics> {
        self.stats_receiver.clone()
    }

    /// Close the stats channel. Call before `run()` when nothing consumes
    /// progress events.
    pub fn close_stats_sender(&self) {
        self.stats_sender.close();
    }

    pub fn get_transfer_stats(&self) -> TransferStats {
        self.stats_report.snapshot()
    }

    fn record_error(&self, error: anyhow::Error) {
        self.has_error.store(true, Ordering::SeqCst);
        lock_errors(&self.errors).push_back(error);
    }

    fn shutdown(&self) {
        self.close_stats_sender();
    }

    fn create_stage(
        &self,
        receiver: Option<Receiver<ObjectTask>>,
        sender: Option<Sender<ObjectTask>>,
    ) -> Stage {
        Stage::new(
            self.config.clone(),
            dyn_clone::clone_box(&*self.target),
            receiver,
            sender,
            self.cancellation_token.clone(),
            self.has_warning.clone(),
            self.stats_sender.clone(),
            self.stats_report.clone(),
        )
    }

    /// Spawn a stage behind a supervisor task that records its error or
    /// panic and cancels the run.
    fn spawn_stage<F>(&self, name: &'static str, stage: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let has_error = self.has_error.clone();
        let has_panic = self.has_panic.clone();
        let error_list = self.errors.clone();
        let cancellation_token = self.cancellation_token.clone();

        tokio::spawn(async move {
            let join_result = tokio::spawn(stage).await;

            match join_result {
                Ok(Ok(())) => {
                    debug!(stage = name, "stage completed successfully.");
                }
                Ok(Err(e)) if is_cancelled_error(&e) => {
                    info!(stage = name, "stage cancelled.");
                }
                Ok(Err(e)) => {
                    cancellation_token.cancel();
                    has_error.store(true, Ordering::SeqCst);
                    error!(stage = name, "{} failed: {:#}", name, e);
                    lock_errors(&error_list).push_back(e);
                }
                Err(e) => {
                    cancellation_token.cancel();
                    has_error.store(true, Ordering::SeqCst);
                    has_panic.store(true, Ordering::SeqCst);
                    error!(stage = name, "{} task panicked: {}", name, e);
                    lock_errors(&error_list).push_back(anyhow!("{} panicked: {}", name, e));
                }
            }
        })
    }

    async fn execute_listing(&self) {
        let writer = VersionListingWriter::new(self.create_stage(None, None));
        let handle = self.spawn_stage("version listing writer", async move {
            writer.write().await.map(|_| ())
        });
        if let Err(e) = handle.await {
            error!("version listing supervisor failed: {}", e);
        }
    }

    async fn execute_transfer(&self) {
        let prepared = validate_source_mode(
            self.config.operation,
            self.config.prefix_range.is_some(),
        )
        .and_then(|()| {
            build_operation(
                &self.config,
                dyn_clone::clone_box(&*self.target),
                dyn_clone::clone_box(&*self.source),
            )
        });
        let operation = match prepared {
            Ok(operation) => operation,
            Err(e) => {
                error!("{:#}", e);
                self.record_error(e);
                return;
            }
        };

        let (outcome_sender, outcome_receiver) = outcome_channel(self.config.outcome_queue_size);
        let recorder = match OutcomeRecorder::open(&self.config, outcome_receiver).await {
            Ok(recorder) => recorder,
            Err(e) => {
                error!("{:#}", e);
                self.record_error(e);
                return;
            }
        };
        // Started before the workers so outcome queues are always draining.
        let recorder = self.spawn_stage("outcome recorder", async move {
            recorder.record().await.map(|_| ())
        });

        let (task_sender, task_receiver) =
            async_channel::bounded::<ObjectTask>(self.config.task_queue_size as usize);

        let workers = (0..self.config.worker_size)
            .map(|worker_index| {
                let worker = ObjectWorker::new(
                    self.create_stage(Some(task_receiver.clone()), None),
                    worker_index,
                    operation.clone(),
                    outcome_sender.clone(),
                );
                self.spawn_stage("worker", async move { worker.run().await })
            })
            .collect();
        drop(task_receiver);

        let state = PipelineState {
            task_sender: task_sender.clone(),
            outcome_sender: outcome_sender.clone(),
            stats_report: self.stats_report.clone(),
            workers,
            recorder,
            operation: self.config.operation,
            dry_run: self.config.dry_run,
            grace_delay: Duration::from_millis(self.config.finish_grace_delay_milliseconds),
        };

        let source = ObjectSource::new(self.create_stage(None, Some(task_sender)), outcome_sender);
        let source = self.spawn_stage("object source", async move { source.run().await });
        if let Err(e) = source.await {
            error!("object source supervisor failed: {}", e);
        }

        state.finish().await;
    }
}
