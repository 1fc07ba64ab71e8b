use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, anyhow};
use async_channel::{Receiver, Sender};

use crate::config::Config;
use crate::filters::KeyFilter;
use crate::storage::Storage;
use crate::types::token::PipelineCancellationToken;
use crate::types::{ObjectTask, TransferStatistics, TransferStatsReport};

/// Result of sending a task to the next stage.
#[derive(Debug, Clone, PartialEq)]
pub enum SendResult {
    Success,
    Closed,
}

/// Shared context passed to each pipeline stage.
///
/// Channels connect stages: each stage reads tasks from `receiver` and
/// writes tasks to `sender`. The object source has no `receiver` (it is
/// the pipeline entry point) and the workers have no `sender` (their output
/// goes to the outcome queues).
pub struct Stage {
    pub config: Config,
    pub target: Storage,
    pub receiver: Option<Receiver<ObjectTask>>,
    pub sender: Option<Sender<ObjectTask>>,
    pub cancellation_token: PipelineCancellationToken,
    pub has_warning: Arc<AtomicBool>,
    pub stats_sender: Sender<TransferStatistics>,
    pub stats_report: Arc<TransferStatsReport>,
    pub key_filter: KeyFilter,
}

impl Stage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        target: Storage,
        receiver: Option<Receiver<ObjectTask>>,
        sender: Option<Sender<ObjectTask>>,
        cancellation_token: PipelineCancellationToken,
        has_warning: Arc<AtomicBool>,
        stats_sender: Sender<TransferStatistics>,
        stats_report: Arc<TransferStatsReport>,
    ) -> Self {
        let key_filter = KeyFilter::new(&config.filter_config);
        Self {
            config,
            target,
            receiver,
            sender,
            cancellation_token,
            has_warning,
            stats_sender,
            stats_report,
            key_filter,
        }
    }

    /// Send a task to the next stage.
    ///
    /// Returns `SendResult::Closed` if the downstream channel has been closed
    /// or the run was cancelled while waiting for queue capacity.
    pub async fn send(&self, task: ObjectTask) -> Result<SendResult> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| anyhow!("stage has no downstream channel."))?;

        let result = tokio::select! {
            result = sender.send(task) => result,
            _ = self.cancellation_token.cancelled() => return Ok(SendResult::Closed),
        };

        if let Err(e) = result.context("async_channel::Sender::send() failed.") {
            return if !sender.is_closed() {
                Err(anyhow!(e))
            } else {
                Ok(SendResult::Closed)
            };
        }

        Ok(SendResult::Success)
    }

    /// Check if the sender channel has been closed by the receiver.
    pub fn is_channel_closed(&self) -> bool {
        self.sender
            .as_ref()
            .is_none_or(|sender| sender.is_closed())
    }

    /// Publish a progress event. Dropped silently once the stats channel is closed.
    pub async fn send_stats(&self, stats: TransferStatistics) {
        let _ = self.stats_sender.send(stats).await;
    }

    /// Set the warning flag to indicate a non-fatal issue occurred.
    pub fn set_warning(&self) {
        self.has_warning.store(true, Ordering::SeqCst);
    }
}
