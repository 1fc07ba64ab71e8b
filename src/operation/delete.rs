use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::Config;
use crate::operation::ObjectOperation;
use crate::storage::Storage;
use crate::types::ObjectTask;

const OPERATION_NAME: &str = "delete";

/// Resolve the current version with a HeadObject, then remove exactly that
/// version.
///
/// The version recorded in the task is ignored; the object may have been
/// overwritten since the listing was taken. A failed HeadObject (object
/// already gone) is a failure, not a no-op. In an unversioned bucket the
/// HeadObject carries no version and the plain key is removed.
pub struct DeleteOperation {
    target: Storage,
    bucket: String,
    dry_run: bool,
}

impl DeleteOperation {
    pub fn new(config: &Config, target: Storage) -> Self {
        Self {
            target,
            bucket: config.bucket.clone(),
            dry_run: config.dry_run,
        }
    }
}

#[async_trait]
impl ObjectOperation for DeleteOperation {
    fn name(&self) -> &'static str {
        OPERATION_NAME
    }

    async fn execute(&self, task: &ObjectTask) -> Result<()> {
        if self.dry_run {
            info!(key = task.key, "[dry-run] object would be deleted.");
            return Ok(());
        }

        debug!(key = task.key, "sending HeadObject request.");
        let head = self.target.head_object(&self.bucket, &task.key, None).await?;
        // Unversioned buckets report no version; the delete then removes the
        // only (null) version.
        let version_id = head.version_id().map(str::to_string);

        debug!(
            key = task.key,
            version_id = version_id,
            "sending DeleteObject request."
        );
        self.target
            .delete_object(&self.bucket, &task.key, version_id.clone())
            .await?;

        info!(key = task.key, version_id = version_id, "object deleted.");

        Ok(())
    }
}
