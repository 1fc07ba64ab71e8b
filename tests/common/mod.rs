//! Shared E2E test infrastructure for moveobject-rs.
//!
//! `TestHelper` manages buckets and objects against a real S3-compatible
//! endpoint and runs `TransferPipeline` with a per-test data directory. All
//! helpers use the `moveobject-e2e-test` AWS profile.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::types::{
    BucketLocationConstraint, BucketVersioningStatus, CreateBucketConfiguration, Delete,
    ObjectIdentifier, VersioningConfiguration,
};
use moveobject_rs::config::args::build_config_from_args;
use moveobject_rs::{Config, TransferPipeline, TransferStats, create_pipeline_cancellation_token};
use uuid::Uuid;

const AWS_PROFILE: &str = "moveobject-e2e-test";

const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug)]
pub struct PipelineResult {
    pub stats: TransferStats,
    pub has_error: bool,
    pub has_panic: bool,
    pub has_warning: bool,
    pub errors: Vec<String>,
}

/// Deletes every version and the bucket itself when dropped, unless
/// [`BucketGuard::cleanup`] already ran.
pub struct BucketGuard {
    helper: Arc<TestHelper>,
    bucket: String,
    cleaned: bool,
}

impl BucketGuard {
    pub async fn cleanup(mut self) {
        self.helper.delete_bucket_cascade(&self.bucket).await;
        self.cleaned = true;
    }
}

impl Drop for BucketGuard {
    fn drop(&mut self) {
        if self.cleaned {
            return;
        }

        // A panicking test still owns the runtime, so clean up on a fresh one.
        let helper = self.helper.clone();
        let bucket = self.bucket.clone();
        let _ = std::thread::spawn(move || {
            if let Ok(runtime) = tokio::runtime::Runtime::new() {
                runtime.block_on(helper.delete_bucket_cascade(&bucket));
            }
        })
        .join();
    }
}

pub struct TestHelper {
    client: Client,
    region: String,
}

impl TestHelper {
    pub async fn new() -> Arc<Self> {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .profile_name(AWS_PROFILE)
            .load()
            .await;

        let region = sdk_config
            .region()
            .map(|r| r.to_string())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let client = Client::new(&sdk_config);

        Arc::new(Self { client, region })
    }

    pub fn bucket_guard(self: &Arc<Self>, bucket: &str) -> BucketGuard {
        BucketGuard {
            helper: Arc::clone(self),
            bucket: bucket.to_string(),
            cleaned: false,
        }
    }

    pub fn generate_bucket_name(&self) -> String {
        format!("moveobject-e2e-{}", Uuid::new_v4())
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    // -----------------------------------------------------------------------
    // Bucket management
    // -----------------------------------------------------------------------

    pub async fn create_bucket(&self, bucket: &str) {
        let mut builder = self.client.create_bucket().bucket(bucket);

        // us-east-1 must not specify a location constraint
        if self.region != "us-east-1" {
            let constraint = BucketLocationConstraint::from(self.region.as_str());
            let config = CreateBucketConfiguration::builder()
                .location_constraint(constraint)
                .build();
            builder = builder.create_bucket_configuration(config);
        }

        builder
            .send()
            .await
            .unwrap_or_else(|e| panic!("Failed to create bucket {bucket}: {e}"));
    }

    pub async fn create_versioned_bucket(&self, bucket: &str) {
        self.create_bucket(bucket).await;

        let versioning_config = VersioningConfiguration::builder()
            .status(BucketVersioningStatus::Enabled)
            .build();

        self.client
            .put_bucket_versioning()
            .bucket(bucket)
            .versioning_configuration(versioning_config)
            .send()
            .await
            .unwrap_or_else(|e| panic!("Failed to enable versioning on {bucket}: {e}"));
    }

    pub async fn delete_bucket_cascade(&self, bucket: &str) {
        let mut key_marker: Option<String> = None;
        let mut version_id_marker: Option<String> = None;

        loop {
            let resp = match self
                .client
                .list_object_versions()
                .bucket(bucket)
                .set_key_marker(key_marker.clone())
                .set_version_id_marker(version_id_marker.clone())
                .send()
                .await
            {
                Ok(r) => r,
                Err(_) => break,
            };

            let mut identifiers: Vec<ObjectIdentifier> = Vec::new();
            let versions = resp
                .versions()
                .iter()
                .map(|v| (v.key(), v.version_id()));
            let markers = resp
                .delete_markers()
                .iter()
                .map(|m| (m.key(), m.version_id()));
            for (key, version_id) in versions.chain(markers) {
                if let Some(key) = key {
                    identifiers.push(
                        ObjectIdentifier::builder()
                            .key(key)
                            .set_version_id(version_id.map(str::to_string))
                            .build()
                            .unwrap(),
                    );
                }
            }

            for chunk in identifiers.chunks(1000) {
                let delete = Delete::builder()
                    .set_objects(Some(chunk.to_vec()))
                    .quiet(true)
                    .build()
                    .unwrap();
                let _ = self
                    .client
                    .delete_objects()
                    .bucket(bucket)
                    .delete(delete)
                    .send()
                    .await;
            }

            if resp.is_truncated() == Some(true) {
                key_marker = resp.next_key_marker().map(|s| s.to_string());
                version_id_marker = resp.next_version_id_marker().map(|s| s.to_string());
            } else {
                break;
            }
        }

        let _ = self.client.delete_bucket().bucket(bucket).send().await;
    }

    // -----------------------------------------------------------------------
    // Object operations
    // -----------------------------------------------------------------------

    /// Upload an object and return its version ID, if the bucket is versioned.
    pub async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Option<String> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body.into())
            .send()
            .await
            .unwrap_or_else(|e| panic!("Failed to put object {key} in {bucket}: {e}"))
            .version_id()
            .map(str::to_string)
    }

    pub async fn get_object_body(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .ok()?;
        Some(output.body.collect().await.ok()?.into_bytes().to_vec())
    }

    pub async fn list_objects(&self, bucket: &str, prefix: &str) -> Vec<String> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(continuation_token.clone())
                .send()
                .await
                .unwrap_or_else(|e| panic!("Failed to list objects in {bucket}/{prefix}: {e}"));

            keys.extend(
                resp.contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(str::to_string)),
            );

            if resp.is_truncated() == Some(true) {
                continuation_token = resp.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }

        keys.sort();
        keys
    }

    // -----------------------------------------------------------------------
    // Data directory helpers
    // -----------------------------------------------------------------------

    pub fn write_object_listing(data_dir: &Path, lines: &[String]) {
        let mut content = lines.join("\n");
        content.push('\n');
        std::fs::write(data_dir.join("object_listing.txt"), content).unwrap();
    }

    pub fn read_lines(path: &Path) -> Vec<String> {
        let mut lines: Vec<String> = std::fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect();
        lines.sort();
        lines
    }

    // -----------------------------------------------------------------------
    // Pipeline helpers
    // -----------------------------------------------------------------------

    /// Build a `Config` from CLI-style arguments.
    ///
    /// Prepends the binary name, points `--data-dir` at `data_dir`, asks for
    /// fixed log file names and adds the e2e profile unless credentials are
    /// given explicitly.
    pub fn build_config(args: Vec<&str>, data_dir: &Path) -> Config {
        let mut full_args: Vec<String> = vec!["moveobject".to_string()];
        full_args.extend(args.iter().map(|s| s.to_string()));
        full_args.push("--data-dir".to_string());
        full_args.push(data_dir.display().to_string());
        full_args.push("--fixed-log-file-names".to_string());
        full_args.push("--finish-grace-delay-milliseconds".to_string());
        full_args.push("0".to_string());

        let has_profile = full_args.iter().any(|a| a.starts_with("--target-profile"));
        let has_access_key = full_args
            .iter()
            .any(|a| a.starts_with("--target-access-key"));
        if !has_profile && !has_access_key {
            full_args.push("--target-profile".to_string());
            full_args.push(AWS_PROFILE.to_string());
        }

        build_config_from_args(full_args)
            .unwrap_or_else(|e| panic!("Failed to build config from args: {e}"))
    }

    pub async fn run_pipeline(config: Config) -> PipelineResult {
        let token = create_pipeline_cancellation_token();
        let mut pipeline = TransferPipeline::new(config, token).await;

        pipeline.close_stats_sender();
        pipeline.run().await;

        let has_error = pipeline.has_error();
        PipelineResult {
            stats: pipeline.get_transfer_stats(),
            has_error,
            has_panic: pipeline.has_panic(),
            has_warning: pipeline.has_warning(),
            errors: pipeline.get_error_messages().unwrap_or_default(),
        }
    }
}

/// Default timeout for E2E tests.
pub const E2E_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(300);

#[macro_export]
macro_rules! e2e_timeout {
    ($body:expr) => {
        tokio::time::timeout(common::E2E_TIMEOUT, $body)
            .await
            .expect("E2E test timed out")
    };
}
