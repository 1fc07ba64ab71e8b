//! Object entry source.
//!
//! The pipeline entry point. Tasks come either from a listing file in the
//! data directory or from versioned listings of numeric key prefixes. Both
//! modes write to the task queue through the stage sender and never close it;
//! closing belongs to `PipelineState::finish`.

use std::future::Future;

use anyhow::{Context, Result, anyhow};
use async_channel::{Receiver, Sender};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::filters::KeyFilter;
use crate::recorder::OutcomeSender;
use crate::stage::{SendResult, Stage};
use crate::types::error::MoveObjectError;
use crate::types::{ObjectEntry, ObjectTask, Operation, TaskOutcome, TransferStatistics};

/// Whether a listed entry becomes a task: the latest version, not a delete
/// marker, and accepted by the key filter.
pub fn is_listable(entry: &ObjectEntry, key_filter: &KeyFilter) -> bool {
    entry.is_latest() && !entry.is_delete_marker() && key_filter.is_match(entry.key())
}

/// Listing prefixes for a run: each `"{n}/"` of the prefix range, or the
/// whole bucket.
pub fn listing_prefixes(config: &Config) -> Box<dyn Iterator<Item = String> + Send> {
    match config.prefix_range {
        Some(range) => Box::new(range.prefixes()),
        None => Box::new(std::iter::once(String::new())),
    }
}

/// Versioned listing of one prefix, streamed through a channel bounded by
/// `max_keys`.
pub(crate) struct PrefixListing<'a> {
    base: &'a Stage,
    prefix: String,
    entry_sender: Sender<ObjectEntry>,
    entry_receiver: Receiver<ObjectEntry>,
}

impl<'a> PrefixListing<'a> {
    pub fn new(base: &'a Stage, prefix: String) -> Self {
        let (entry_sender, entry_receiver) = async_channel::bounded(base.config.max_keys as usize);
        Self {
            base,
            prefix,
            entry_sender,
            entry_receiver,
        }
    }

    pub fn entries(&self) -> &Receiver<ObjectEntry> {
        &self.entry_receiver
    }

    /// Run the listing alongside `consumer`, which reads [`Self::entries`].
    ///
    /// The channel is closed from both ends when either side stops, so a
    /// consumer that fails or stops early never leaves the listing blocked.
    /// A consumer error takes precedence over a listing error.
    pub async fn run_with<T>(&self, consumer: impl Future<Output = Result<T>>) -> Result<T> {
        let bucket = self.base.config.bucket.as_str();
        debug!(bucket = bucket, prefix = self.prefix, "listing object versions.");

        let listing = async {
            let result = self
                .base
                .target
                .list_object_versions(
                    bucket,
                    &self.prefix,
                    &self.entry_sender,
                    self.base.config.max_keys,
                )
                .await;
            self.entry_sender.close();
            result
        };
        let consuming = async {
            let result = consumer.await;
            self.entry_receiver.close();
            result
        };

        let (listing_result, consumed) = tokio::join!(listing, consuming);
        let value = consumed?;
        listing_result.with_context(|| {
            MoveObjectError::Listing(format!("s3://{bucket}/{}", self.prefix))
        })?;
        Ok(value)
    }
}

pub struct ObjectSource {
    base: Stage,
    outcome_sender: OutcomeSender,
}

impl ObjectSource {
    pub fn new(base: Stage, outcome_sender: OutcomeSender) -> Self {
        Self {
            base,
            outcome_sender,
        }
    }

    /// Listing-driven when a prefix range is given, file-driven otherwise.
    pub fn is_listing_driven(&self) -> bool {
        self.base.config.prefix_range.is_some()
    }

    pub async fn run(&self) -> Result<()> {
        if self.is_listing_driven() {
            self.read_from_listing().await
        } else {
            self.read_from_file().await
        }
    }

    async fn read_from_file(&self) -> Result<()> {
        let path = self.base.config.object_listing_path();
        debug!(path = %path.display(), skip = self.base.config.skip, "reading object listing file.");

        let file = File::open(&path).await.with_context(|| {
            MoveObjectError::Io(format!("failed to open {}", path.display()))
        })?;
        let mut lines = BufReader::new(file).lines();
        let require_version = self.base.config.operation.requires_version();

        let mut line_number: u64 = 0;
        while let Some(line) = lines
            .next_line()
            .await
            .with_context(|| MoveObjectError::Io(format!("failed to read {}", path.display())))?
        {
            line_number += 1;
            if line_number <= self.base.config.skip {
                trace!(line_number = line_number, "line skipped.");
                continue;
            }

            let task = ObjectTask::parse_line(&line, require_version)
                .with_context(|| format!("{}:{line_number}", path.display()))?;

            if !self.base.key_filter.is_match(&task.key) {
                self.reject(task).await;
                continue;
            }

            if self.enqueue(task).await? == SendResult::Closed {
                return Ok(());
            }
        }

        debug!(lines = line_number, "object listing file has been read.");
        Ok(())
    }

    async fn read_from_listing(&self) -> Result<()> {
        for prefix in listing_prefixes(&self.base.config) {
            if self.base.cancellation_token.is_cancelled() {
                info!("object listing has been cancelled.");
                return Ok(());
            }

            let listing = PrefixListing::new(&self.base, prefix);
            let result = listing
                .run_with(self.enqueue_entries(listing.entries()))
                .await?;
            if result == SendResult::Closed {
                return Ok(());
            }
        }

        Ok(())
    }

    async fn enqueue_entries(&self, entries: &Receiver<ObjectEntry>) -> Result<SendResult> {
        while let Ok(entry) = entries.recv().await {
            if !is_listable(&entry, &self.base.key_filter) {
                trace!(key = entry.key(), "listing entry skipped.");
                continue;
            }
            if self.enqueue(entry.to_task()).await? == SendResult::Closed {
                return Ok(SendResult::Closed);
            }
        }
        Ok(SendResult::Success)
    }

    async fn enqueue(&self, task: ObjectTask) -> Result<SendResult> {
        let result = self.base.send(task).await?;
        if result == SendResult::Success {
            self.base.stats_report.increment_enqueued();
        }
        Ok(result)
    }

    /// A key rejected by the filter is recorded as a failure without
    /// reaching a worker.
    async fn reject(&self, task: ObjectTask) {
        warn!(key = task.key, "key does not match the filter.");
        self.base.stats_report.increment_failed();
        self.base.set_warning();
        self.base
            .send_stats(TransferStatistics::TaskFailed {
                key: task.key.clone(),
            })
            .await;
        if !self
            .outcome_sender
            .send(TaskOutcome::Failure { key: task.key })
            .await
        {
            warn!("outcome queue closed, outcome dropped.");
        }
    }
}

/// Reject configurations the source cannot serve.
pub fn validate_source_mode(operation: Operation, listing_driven: bool) -> Result<()> {
    if operation == Operation::Migrate && listing_driven {
        return Err(anyhow!(MoveObjectError::InvalidConfig(
            "migrate reads its input from the object listing file".to_string()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    use aws_sdk_s3::types::{DeleteMarkerEntry, ObjectVersion};

    use crate::config::{FilterConfig, PrefixRange};
    use crate::recorder::{OutcomeReceiver, outcome_channel};
    use crate::test_utils::{
        MockStorage, init_dummy_tracing_subscriber, make_test_config, write_object_listing,
    };
    use crate::types::TransferStatsReport;
    use crate::types::token::create_pipeline_cancellation_token;

    struct Harness {
        source: ObjectSource,
        tasks: Receiver<ObjectTask>,
        outcomes: OutcomeReceiver,
        stats_report: Arc<TransferStatsReport>,
    }

    fn harness(config: Config, storage: &MockStorage, queue_size: usize) -> Harness {
        let (task_sender, task_receiver) = async_channel::bounded(queue_size);
        let (stats_sender, _) = async_channel::unbounded();
        let (outcome_sender, outcome_receiver) = outcome_channel(16);
        let stats_report = Arc::new(TransferStatsReport::new());

        let stage = Stage::new(
            config,
            Box::new(storage.clone()),
            None,
            Some(task_sender),
            create_pipeline_cancellation_token(),
            Arc::new(AtomicBool::new(false)),
            stats_sender,
            stats_report.clone(),
        );

        Harness {
            source: ObjectSource::new(stage, outcome_sender),
            tasks: task_receiver,
            outcomes: outcome_receiver,
            stats_report,
        }
    }

    fn drain(receiver: &Receiver<ObjectTask>) -> Vec<ObjectTask> {
        let mut tasks = Vec::new();
        while let Ok(task) = receiver.try_recv() {
            tasks.push(task);
        }
        tasks
    }

    #[tokio::test]
    async fn reads_bare_and_versioned_lines() {
        init_dummy_tracing_subscriber();

        let dir = tempfile::tempdir().unwrap();
        write_object_listing(dir.path(), "v1,0/a.txt\n0/b.txt\n");
        let h = harness(
            make_test_config(Operation::Copy, dir.path()),
            &MockStorage::new(),
            16,
        );

        h.source.run().await.unwrap();

        assert_eq!(
            drain(&h.tasks),
            vec![
                ObjectTask::with_version("0/a.txt", "v1"),
                ObjectTask::new("0/b.txt")
            ]
        );
        assert_eq!(h.stats_report.snapshot().enqueued, 2);
    }

    #[tokio::test]
    async fn skip_discards_leading_lines() {
        init_dummy_tracing_subscriber();

        let dir = tempfile::tempdir().unwrap();
        write_object_listing(dir.path(), "0/a\n0/b\n0/c\n0/d\n");
        let mut config = make_test_config(Operation::Delete, dir.path());
        config.skip = 3;
        let h = harness(config, &MockStorage::new(), 16);

        h.source.run().await.unwrap();

        assert_eq!(drain(&h.tasks), vec![ObjectTask::new("0/d")]);
        assert_eq!(h.stats_report.snapshot().enqueued, 1);
    }

    #[tokio::test]
    async fn skip_beyond_end_enqueues_nothing() {
        init_dummy_tracing_subscriber();

        let dir = tempfile::tempdir().unwrap();
        write_object_listing(dir.path(), "0/a\n0/b\n");
        let mut config = make_test_config(Operation::Delete, dir.path());
        config.skip = 10;
        let h = harness(config, &MockStorage::new(), 16);

        h.source.run().await.unwrap();
        assert!(drain(&h.tasks).is_empty());
    }

    #[tokio::test]
    async fn move_requires_versioned_lines() {
        init_dummy_tracing_subscriber();

        let dir = tempfile::tempdir().unwrap();
        write_object_listing(dir.path(), "v1,0/a\n0/b\n");
        let h = harness(
            make_test_config(Operation::Move, dir.path()),
            &MockStorage::new(),
            16,
        );

        let error = h.source.run().await.unwrap_err();
        assert!(format!("{error:#}").contains("object_listing.txt:2"));
        assert_eq!(drain(&h.tasks), vec![ObjectTask::with_version("0/a", "v1")]);
    }

    #[tokio::test]
    async fn missing_listing_file_is_fatal() {
        init_dummy_tracing_subscriber();

        let dir = tempfile::tempdir().unwrap();
        let h = harness(
            make_test_config(Operation::Copy, dir.path()),
            &MockStorage::new(),
            16,
        );

        let error = h.source.run().await.unwrap_err();
        assert!(error.downcast_ref::<MoveObjectError>().is_some());
    }

    #[tokio::test]
    async fn filtered_keys_become_failures() {
        init_dummy_tracing_subscriber();

        let dir = tempfile::tempdir().unwrap();
        write_object_listing(dir.path(), "0/a.txt\n0/b.log\n");
        let mut config = make_test_config(Operation::Copy, dir.path());
        config.filter_config = FilterConfig {
            include_regex: Some(fancy_regex::Regex::new(r"\.txt$").unwrap()),
            exclude_regex: None,
        };
        let h = harness(config, &MockStorage::new(), 16);

        h.source.run().await.unwrap();

        assert_eq!(drain(&h.tasks), vec![ObjectTask::new("0/a.txt")]);
        assert_eq!(h.outcomes.drain_failure_keys(), vec!["0/b.log"]);
        let stats = h.stats_report.snapshot();
        assert_eq!(stats.enqueued, 1);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn closed_queue_stops_reading() {
        init_dummy_tracing_subscriber();

        let dir = tempfile::tempdir().unwrap();
        write_object_listing(dir.path(), "0/a\n0/b\n");
        let h = harness(
            make_test_config(Operation::Copy, dir.path()),
            &MockStorage::new(),
            16,
        );
        h.tasks.close();

        h.source.run().await.unwrap();
        assert_eq!(h.stats_report.snapshot().enqueued, 0);
    }

    #[tokio::test]
    async fn closed_queue_stops_prefix_listing() {
        init_dummy_tracing_subscriber();

        let storage = MockStorage::new();
        for n in 0..50 {
            storage.insert("test-bucket", &format!("0/{n}.txt"), b"x");
        }

        let dir = tempfile::tempdir().unwrap();
        let mut config = make_test_config(Operation::Delete, dir.path());
        config.prefix_range = Some(PrefixRange { start: 0, end: 9 });
        let h = harness(config, &storage, 1);
        h.tasks.close();

        tokio::time::timeout(std::time::Duration::from_secs(5), h.source.run())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(h.stats_report.snapshot().enqueued, 0);
    }

    #[tokio::test]
    async fn listing_keeps_latest_non_marker_matching_entries() {
        init_dummy_tracing_subscriber();

        let storage = MockStorage::new();
        storage.insert("test-bucket", "0/a.txt", b"a");
        storage.insert("test-bucket", "1/b.txt", b"b");
        storage.insert("test-bucket", "2/out-of-range.txt", b"c");
        storage.insert("test-bucket", "1/skip.log", b"d");
        storage.add_listing_entry(ObjectEntry::Version(
            ObjectVersion::builder()
                .key("0/old.txt")
                .version_id("old")
                .is_latest(false)
                .build(),
        ));
        storage.add_listing_entry(ObjectEntry::DeleteMarker(
            DeleteMarkerEntry::builder()
                .key("1/deleted.txt")
                .version_id("dm")
                .is_latest(true)
                .build(),
        ));

        let dir = tempfile::tempdir().unwrap();
        let mut config = make_test_config(Operation::Move, dir.path());
        config.prefix_range = Some(PrefixRange { start: 0, end: 1 });
        config.filter_config = FilterConfig {
            include_regex: None,
            exclude_regex: Some(fancy_regex::Regex::new(r"\.log$").unwrap()),
        };
        let h = harness(config, &storage, 16);

        h.source.run().await.unwrap();

        let keys: Vec<String> = drain(&h.tasks).into_iter().map(|t| t.key).collect();
        assert_eq!(keys, vec!["0/a.txt", "1/b.txt"]);
        assert!(h.outcomes.drain_failure_keys().is_empty());
    }

    #[tokio::test]
    async fn listing_tasks_carry_versions() {
        init_dummy_tracing_subscriber();

        let storage = MockStorage::new();
        let version_id = storage.insert("test-bucket", "5/a.txt", b"a");

        let dir = tempfile::tempdir().unwrap();
        let mut config = make_test_config(Operation::Move, dir.path());
        config.prefix_range = Some(PrefixRange { start: 5, end: 5 });
        let h = harness(config, &storage, 16);

        h.source.run().await.unwrap();
        assert_eq!(
            drain(&h.tasks),
            vec![ObjectTask::with_version("5/a.txt", version_id)]
        );
    }

    #[tokio::test]
    async fn listing_error_is_fatal() {
        init_dummy_tracing_subscriber();

        let storage = MockStorage::new();
        storage.insert("test-bucket", "0/a.txt", b"a");
        storage.fail_listing();

        let dir = tempfile::tempdir().unwrap();
        let mut config = make_test_config(Operation::Delete, dir.path());
        config.prefix_range = Some(PrefixRange { start: 0, end: 3 });
        let h = harness(config, &storage, 16);

        let error = h.source.run().await.unwrap_err();
        assert!(matches!(
            error.downcast_ref::<MoveObjectError>(),
            Some(MoveObjectError::Listing(_))
        ));
    }

    #[test]
    fn prefixes_for_whole_bucket_and_range() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = make_test_config(Operation::List, dir.path());
        assert_eq!(listing_prefixes(&config).collect::<Vec<_>>(), vec![""]);

        config.prefix_range = Some(PrefixRange { start: 7, end: 9 });
        assert_eq!(
            listing_prefixes(&config).collect::<Vec<_>>(),
            vec!["7/", "8/", "9/"]
        );
    }

    #[test]
    fn migrate_cannot_be_listing_driven() {
        assert!(validate_source_mode(Operation::Migrate, true).is_err());
        assert!(validate_source_mode(Operation::Migrate, false).is_ok());
        assert!(validate_source_mode(Operation::Move, true).is_ok());
    }
}
