//! Outcome recorder.
//!
//! Workers hand each finished task to a pair of bounded outcome queues. A
//! single recorder drains both queues until both are closed and appends one
//! key per line to the success and failure logs. Disk I/O therefore never
//! blocks a remote call.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_channel::{Receiver, Sender};
use chrono::{DateTime, Local};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

use crate::config::Config;
use crate::types::TaskOutcome;
use crate::types::error::MoveObjectError;

const LOG_FILE_TIMESTAMP_FORMAT: &str = "%m-%d-%Y-%H-%M-%S";
const LOG_FILE_MODE: u32 = 0o600;

/// Worker-side handle to the two outcome queues.
#[derive(Debug, Clone)]
pub struct OutcomeSender {
    success: Sender<TaskOutcome>,
    failure: Sender<TaskOutcome>,
}

impl OutcomeSender {
    /// Route the outcome to its queue. Returns `false` once the queue is closed.
    pub async fn send(&self, outcome: TaskOutcome) -> bool {
        let sender = if outcome.is_success() {
            &self.success
        } else {
            &self.failure
        };
        sender.send(outcome).await.is_ok()
    }

    pub fn close(&self) {
        self.success.close();
        self.failure.close();
    }

    pub fn is_closed(&self) -> bool {
        self.success.is_closed() && self.failure.is_closed()
    }
}

/// Recorder-side handle to the two outcome queues.
#[derive(Debug)]
pub struct OutcomeReceiver {
    success: Receiver<TaskOutcome>,
    failure: Receiver<TaskOutcome>,
}

#[cfg(test)]
impl OutcomeReceiver {
    pub(crate) fn drain_success_keys(&self) -> Vec<String> {
        drain_keys(&self.success)
    }

    pub(crate) fn drain_failure_keys(&self) -> Vec<String> {
        drain_keys(&self.failure)
    }
}

#[cfg(test)]
fn drain_keys(receiver: &Receiver<TaskOutcome>) -> Vec<String> {
    let mut keys = Vec::new();
    while let Ok(outcome) = receiver.try_recv() {
        keys.push(outcome.key().to_string());
    }
    keys
}

pub fn outcome_channel(queue_size: u32) -> (OutcomeSender, OutcomeReceiver) {
    let (success_sender, success_receiver) = async_channel::bounded(queue_size as usize);
    let (failure_sender, failure_receiver) = async_channel::bounded(queue_size as usize);
    (
        OutcomeSender {
            success: success_sender,
            failure: failure_sender,
        },
        OutcomeReceiver {
            success: success_receiver,
            failure: failure_receiver,
        },
    )
}

/// Number of lines written to each log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordedCounts {
    pub success: u64,
    pub failure: u64,
}

/// File names of the success and failure logs for this run.
pub fn log_file_names(config: &Config, now: DateTime<Local>) -> (String, String) {
    let stem = config.operation.log_file_stem();
    let suffix = if config.timestamped_log_files {
        format!(".{}", now.format(LOG_FILE_TIMESTAMP_FORMAT))
    } else {
        String::new()
    };
    (
        format!("{stem}_success.txt{suffix}"),
        format!("{stem}_fails.txt{suffix}"),
    )
}

/// Create (or truncate) an owner-only log file.
pub(crate) async fn create_log_file(path: &Path) -> Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(LOG_FILE_MODE);

    options.open(path).await.with_context(|| {
        MoveObjectError::Io(format!("failed to create log file {}", path.display()))
    })
}

struct LogWriter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl LogWriter {
    async fn create(path: PathBuf) -> Result<Self> {
        let file = create_log_file(&path).await?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    async fn write_key(&mut self, key: &str) -> Result<()> {
        self.writer
            .write_all(format!("{key}\n").as_bytes())
            .await
            .with_context(|| format!("failed to write to {}", self.path.display()))
    }

    async fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .await
            .with_context(|| format!("failed to flush {}", self.path.display()))
    }
}

/// Drains the outcome queues into the success and failure logs.
///
/// In dry-run mode no files are created and outcomes are only counted.
pub struct OutcomeRecorder {
    receiver: OutcomeReceiver,
    success_log: Option<LogWriter>,
    failure_log: Option<LogWriter>,
}

impl OutcomeRecorder {
    /// Open both log files in `config.data_dir`.
    ///
    /// Failing to create a log file is fatal for the run.
    pub async fn open(config: &Config, receiver: OutcomeReceiver) -> Result<Self> {
        if config.dry_run {
            debug!("dry-run: outcome logs are not written.");
            return Ok(Self {
                receiver,
                success_log: None,
                failure_log: None,
            });
        }

        let (success_name, failure_name) = log_file_names(config, Local::now());
        let success_log = LogWriter::create(config.data_dir().join(success_name)).await?;
        let failure_log = LogWriter::create(config.data_dir().join(failure_name)).await?;

        info!(
            success_log = %success_log.path.display(),
            failure_log = %failure_log.path.display(),
            "outcome logs opened."
        );

        Ok(Self {
            receiver,
            success_log: Some(success_log),
            failure_log: Some(failure_log),
        })
    }

    pub fn success_log_path(&self) -> Option<&Path> {
        self.success_log.as_ref().map(|log| log.path.as_path())
    }

    pub fn failure_log_path(&self) -> Option<&Path> {
        self.failure_log.as_ref().map(|log| log.path.as_path())
    }

    /// Record outcomes until both queues are closed and empty, then flush.
    pub async fn record(mut self) -> Result<RecordedCounts> {
        debug!("outcome recorder started.");

        let mut counts = RecordedCounts::default();
        let mut success_open = true;
        let mut failure_open = true;

        loop {
            tokio::select! {
                result = self.receiver.success.recv(), if success_open => match result {
                    Ok(outcome) => {
                        if let Some(log) = self.success_log.as_mut() {
                            log.write_key(outcome.key()).await?;
                        }
                        counts.success += 1;
                    }
                    Err(_) => success_open = false,
                },
                result = self.receiver.failure.recv(), if failure_open => match result {
                    Ok(outcome) => {
                        if let Some(log) = self.failure_log.as_mut() {
                            log.write_key(outcome.key()).await?;
                        }
                        counts.failure += 1;
                    }
                    Err(_) => failure_open = false,
                },
                else => break,
            }
        }

        for log in [self.success_log.as_mut(), self.failure_log.as_mut()]
            .into_iter()
            .flatten()
        {
            log.flush().await?;
        }

        debug!(
            success = counts.success,
            failure = counts.failure,
            "outcome recorder has been completed."
        );

        Ok(counts)
    }
}
