//! Migrate: read an object from the source endpoint and write it to the
//! destination endpoint, choosing the destination bucket directly or through
//! the bucket-routing table.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::config::rewrite::KeyRewriter;
use crate::config::routing::BucketRoutingTable;
use crate::operation::ObjectOperation;
use crate::storage::Storage;
use crate::types::ObjectTask;

const OPERATION_NAME: &str = "migrate";

#[derive(Debug, Clone)]
pub enum Destination {
    Bucket(String),
    Routed(BucketRoutingTable),
}

impl Destination {
    pub fn resolve(&self, key: &str) -> Result<&str> {
        match self {
            Destination::Bucket(bucket) => Ok(bucket),
            Destination::Routed(table) => table.route(key),
        }
    }
}

pub struct MigrateOperation {
    source: Storage,
    target: Storage,
    source_bucket: String,
    destination: Destination,
    key_rewriter: KeyRewriter,
    dry_run: bool,
    stat_failure_as_success: bool,
}

impl MigrateOperation {
    pub fn new(config: &Config, source: Storage, target: Storage) -> Self {
        let destination = match &config.bucket_routing {
            Some(table) => Destination::Routed(table.clone()),
            None => Destination::Bucket(config.bucket.clone()),
        };

        Self {
            source,
            target,
            source_bucket: config.read_bucket().to_string(),
            destination,
            key_rewriter: config.key_rewriter.clone(),
            dry_run: config.dry_run,
            stat_failure_as_success: config.migrate_stat_failure_as_success,
        }
    }
}

impl MigrateOperation {
    /// Apply the stat failure policy: log the intended destination, then
    /// succeed unless stat failures are configured as failures.
    fn stat_failed(
        &self,
        task: &ObjectTask,
        destination_bucket: &str,
        destination_key: &str,
        error: anyhow::Error,
    ) -> Result<()> {
        warn!(
            key = task.key,
            source_bucket = self.source_bucket,
            destination_bucket = destination_bucket,
            destination_key = destination_key,
            error = format!("{error:#}"),
            "unable to stat source object, s3://{}/{} was not written.",
            destination_bucket,
            destination_key,
        );

        if self.stat_failure_as_success {
            Ok(())
        } else {
            Err(error.context(format!("unable to stat source object {}", task.key)))
        }
    }
}

#[async_trait]
impl ObjectOperation for MigrateOperation {
    fn name(&self) -> &'static str {
        OPERATION_NAME
    }

    async fn execute(&self, task: &ObjectTask) -> Result<()> {
        let destination_bucket = self.destination.resolve(&task.key)?;
        let destination_key = self.key_rewriter.rewrite(&task.key);

        if self.dry_run {
            info!(
                key = task.key,
                source_bucket = self.source_bucket,
                destination_bucket = destination_bucket,
                destination_key = destination_key,
                "[dry-run] object would be migrated."
            );
            return Ok(());
        }

        // The fetch is the stat: a missing or unreadable source object
        // surfaces here and falls under the stat failure policy.
        let object = match self.source.get_object(&self.source_bucket, &task.key).await {
            Ok(object) => object,
            Err(e) => return self.stat_failed(task, destination_bucket, &destination_key, e),
        };

        let Some(content_length) = object.content_length().filter(|size| *size >= 0) else {
            return self.stat_failed(
                task,
                destination_bucket,
                &destination_key,
                anyhow!("GetObject returned no content length"),
            );
        };

        debug!(
            key = task.key,
            destination_bucket = destination_bucket,
            destination_key = destination_key,
            content_length = content_length,
            "sending PutObject request."
        );

        self.target
            .put_object(
                destination_bucket,
                &destination_key,
                object.body,
                content_length,
            )
            .await?;

        info!(
            key = task.key,
            destination_bucket = destination_bucket,
            destination_key = destination_key,
            size = content_length,
            "object migrated."
        );

        Ok(())
    }
}
