use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::Config;
use crate::config::rewrite::KeyRewriter;
use crate::operation::{ObjectOperation, ensure_distinct_destination};
use crate::storage::Storage;
use crate::types::ObjectTask;

const OPERATION_NAME: &str = "copy";

/// Server-side copy to the rewritten key. Safe to re-run.
pub struct CopyOperation {
    target: Storage,
    bucket: String,
    key_rewriter: KeyRewriter,
    dry_run: bool,
}

impl CopyOperation {
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
impl ObjectOperation for CopyOperation {
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
                "[dry-run] object would be copied."
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

        debug!(
            key = task.key,
            destination_key = destination_key,
            destination_version_id = copied.version_id(),
            "CopyObject succeeded."
        );

        Ok(())
    }
}
