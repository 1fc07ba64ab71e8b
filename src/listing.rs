//! Version listing writer for the `list` operation.
//!
//! Produces `<data-dir>/version_listing.txt`, one `versionID,key` line per
//! latest, non-deleted, filter-accepted object. The file is valid move input.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_channel::Receiver;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::info;

use crate::recorder::create_log_file;
use crate::source::{PrefixListing, is_listable, listing_prefixes};
use crate::stage::Stage;
use crate::types::error::MoveObjectError;
use crate::types::{ObjectEntry, TransferStatistics};

pub const VERSION_LISTING_FILE: &str = "version_listing.txt";

pub struct VersionListingWriter {
    base: Stage,
}

impl VersionListingWriter {
    pub fn new(base: Stage) -> Self {
        Self { base }
    }

    pub fn output_path(&self) -> PathBuf {
        self.base.config.data_dir().join(VERSION_LISTING_FILE)
    }

    /// List every configured prefix and write the result. Returns the number
    /// of lines written.
    pub async fn write(&self) -> Result<u64> {
        let path = self.output_path();
        let file = create_log_file(&path).await?;
        let mut writer = BufWriter::new(file);
        let mut written = 0;

        for prefix in listing_prefixes(&self.base.config) {
            if self.base.cancellation_token.is_cancelled() {
                info!("version listing has been cancelled.");
                break;
            }

            let listing = PrefixListing::new(&self.base, prefix);
            written += listing
                .run_with(self.write_entries(listing.entries(), &mut writer))
                .await?;
        }

        writer
            .flush()
            .await
            .with_context(|| MoveObjectError::Io(format!("failed to flush {}", path.display())))?;

        info!(
            path = %path.display(),
            objects = written,
            "version listing has been written."
        );
        Ok(written)
    }

    async fn write_entries(
        &self,
        entries: &Receiver<ObjectEntry>,
        writer: &mut BufWriter<tokio::fs::File>,
    ) -> Result<u64> {
        let mut written = 0;
        while let Ok(entry) = entries.recv().await {
            if !is_listable(&entry, &self.base.key_filter) {
                continue;
            }

            let task = entry.to_task();
            writer
                .write_all(format!("{}\n", task.to_line()).as_bytes())
                .await
                .with_context(|| MoveObjectError::Io("failed to write version listing".to_string()))?;

            self.base.stats_report.increment_processed();
            self.base
                .send_stats(TransferStatistics::TaskComplete { key: task.key })
                .await;
            written += 1;
        }
        Ok(written)
    }
}
