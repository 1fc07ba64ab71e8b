use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::Config;
use crate::config::rewrite::KeyRewriter;
use crate::operation::{ObjectOperation, ensure_distinct_destination};
use crate::storage::Storage;
use crate::types::ObjectTask;

const OPERATION_NAME: &str = "move";

/// Copy the current version to the rewritten key, then remove exactly that
/// version from the original key.
///
/// The two steps are not atomic. An interruption between them leaves both
/// keys present; re-running with the same input converges.
pub struct MoveOperation {
    target: Storage,
    bucket: String,
    key_rewriter: KeyRewriter,
    dry_run: bool,
}

impl MoveOperation {
    pub fn new(config: &Config, target: Storage) -> Self {
        Self {
            target,
            bucket: config.bucket.clone(),
            key_rewriter: config.key_rewriter.clone(),
            dry_run: config.dry_run,
        }
    }
}

#[async_trait]
impl ObjectOperation for MoveOperation {
    fn name(&self) -> &'static str {
        OPERATION_NAME
    }

    async fn execute(&self, task: &ObjectTask) -> Result<()> {
        let destination_key = self.key_rewriter.rewrite(&task.key);
        ensure_distinct_destination(&task.key, &destination_key)?;

        if self.dry_run {
            info!(
                key = task.key,
                version_id = task.version_id,
                destination_key = destination_key,
                "[dry-run] object would be moved."
            );
            return Ok(());
        }

        debug!(
            key = task.key,
            version_id = task.version_id,
            destination_key = destination_key,
            "sending CopyObject request."
        );
        let copied = self
            .target
            .copy_object(
                &self.bucket,
                &task.key,
                task.version_id.clone(),
                &self.bucket,
                &destination_key,
            )
            .await?;

        // Without an explicit version, remove the one that was actually copied.
        let version_id = task
            .version_id
            .clone()
            .or_else(|| copied.copy_source_version_id().map(str::to_string));

        debug!(
            key = task.key,
            version_id = version_id,
            "sending DeleteObject request."
        );
        self.target
            .delete_object(&self.bucket, &task.key, version_id.clone())
            .await?;

        info!(
            key = task.key,
            version_id = version_id,
            destination_key = destination_key,
            "object moved."
        );

        Ok(())
    }
}
