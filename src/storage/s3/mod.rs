pub mod client_builder;

use anyhow::{Context, Result, anyhow};
use async_channel::Sender;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::copy_object::CopyObjectOutput;
use aws_sdk_s3::operation::delete_object::DeleteObjectOutput;
use aws_sdk_s3::operation::get_object::GetObjectOutput;
use aws_sdk_s3::operation::head_object::HeadObjectOutput;
use aws_sdk_s3::operation::put_object::PutObjectOutput;
use aws_sdk_s3::primitives::ByteStream;
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use leaky_bucket::RateLimiter;
use std::sync::Arc;

use crate::config::ClientConfig;
use crate::storage::{Storage, StorageTrait};
use crate::types::ObjectEntry;
use crate::types::error::MoveObjectError;
use crate::types::token::PipelineCancellationToken;

/// Extracts the S3 error code and message from an AWS SDK error.
///
/// For service errors (S3 API responses), returns the S3 error code
/// (e.g. "NoSuchKey", "AccessDenied") and the error message from the
/// response. For other error types (network, timeout, construction
/// failure), returns "N/A" as the code and the full error description.
fn extract_sdk_error_details<E: std::fmt::Display + ProvideErrorMetadata>(
    e: &SdkError<E>,
) -> (String, String) {
    if let Some(service_err) = e.as_service_error() {
        (
            service_err.code().unwrap_or("unknown").to_string(),
            service_err.message().unwrap_or("no message").to_string(),
        )
    } else {
        ("N/A".to_string(), e.to_string())
    }
}

/// S3 storage for one endpoint.
///
/// Listing failures are logged at `error` level because they abort the run.
/// Per-object call failures are logged at `warn` level because the worker
/// turns them into failure outcomes.
#[derive(Clone)]
pub(crate) struct S3Storage {
    cancellation_token: PipelineCancellationToken,
    client: Option<Arc<Client>>,
    rate_limit_objects_per_sec: Option<Arc<RateLimiter>>,
}

impl S3Storage {
    pub(crate) async fn boxed(
        client_config: Option<ClientConfig>,
        rate_limit_objects_per_sec: Option<Arc<RateLimiter>>,
        cancellation_token: PipelineCancellationToken,
    ) -> Storage {
        let client = if let Some(ref client_config) = client_config {
            Some(Arc::new(client_config.create_client().await))
        } else {
            None
        };

        Box::new(S3Storage {
            cancellation_token,
            client,
            rate_limit_objects_per_sec,
        })
    }

    fn client(&self) -> Result<&Client> {
        self.client.as_deref().ok_or_else(|| {
            anyhow!(MoveObjectError::InvalidConfig(
                "no S3 client configured for this endpoint".to_string()
            ))
        })
    }

    /// Apply rate limiting for objects per second if configured.
    async fn exec_rate_limit_objects_per_sec(&self) {
        if let Some(ref rate_limiter) = self.rate_limit_objects_per_sec {
            rate_limiter.acquire_one().await;
        }
    }
}

#[async_trait]
impl StorageTrait for S3Storage {
    async fn list_object_versions(
        &self,
        bucket: &str,
        prefix: &str,
        sender: &Sender<ObjectEntry>,
        max_keys: i32,
    ) -> Result<()> {
        let client = self.client()?;
        let mut key_marker: Option<String> = None;
        let mut version_id_marker: Option<String> = None;

        loop {
            if self.cancellation_token.is_cancelled() {
                tracing::info!(bucket = bucket, prefix = prefix, "Version listing cancelled");
                break;
            }

            self.exec_rate_limit_objects_per_sec().await;

            let output = client
                .list_object_versions()
                .bucket(bucket)
                .prefix(prefix)
                .set_key_marker(key_marker.clone())
                .set_version_id_marker(version_id_marker.clone())
                .max_keys(max_keys)
                .send()
                .await
                .map_err(|e| {
                    let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                    tracing::error!(
                        bucket = bucket,
                        prefix = prefix,
                        s3_error_code = s3_error_code,
                        s3_error_message = s3_error_message,
                        "S3 ListObjectVersions API call failed for s3://{}/{}: {} ({}).",
                        bucket,
                        prefix,
                        s3_error_code,
                        s3_error_message,
                    );
                    anyhow!(e).context("aws_sdk_s3::client::list_object_versions() failed.")
                })?;

            let versions = output
                .versions()
                .iter()
                .cloned()
                .map(ObjectEntry::Version);
            let delete_markers = output
                .delete_markers()
                .iter()
                .cloned()
                .map(ObjectEntry::DeleteMarker);

            for entry in versions.chain(delete_markers) {
                if self.cancellation_token.is_cancelled() {
                    return Ok(());
                }

                if let Err(e) = sender
                    .send(entry)
                    .await
                    .context("async_channel::Sender::send() failed.")
                {
                    return if !sender.is_closed() { Err(e) } else { Ok(()) };
                }
            }

            if output.is_truncated() == Some(true) {
                key_marker = output.next_key_marker().map(String::from);
                version_id_marker = output.next_version_id_marker().map(String::from);
            } else {
                break;
            }
        }

        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<GetObjectOutput> {
        self.exec_rate_limit_objects_per_sec().await;

        self.client()?
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::warn!(
                    bucket = bucket,
                    key = key,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 GetObject API call failed for s3://{}/{}: {} ({}).",
                    bucket,
                    key,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow!(e).context("aws_sdk_s3::client::get_object() failed.")
            })
    }

    async fn head_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<String>,
    ) -> Result<HeadObjectOutput> {
        self.exec_rate_limit_objects_per_sec().await;

        self.client()?
            .head_object()
            .bucket(bucket)
            .key(key)
            .set_version_id(version_id.clone())
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::warn!(
                    bucket = bucket,
                    key = key,
                    version_id = version_id,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 HeadObject API call failed for s3://{}/{}: {} ({}).",
                    bucket,
                    key,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow!(e).context("aws_sdk_s3::client::head_object() failed.")
            })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: ByteStream,
        content_length: i64,
    ) -> Result<PutObjectOutput> {
        self.exec_rate_limit_objects_per_sec().await;

        self.client()?
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .content_length(content_length)
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::warn!(
                    bucket = bucket,
                    key = key,
                    content_length = content_length,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 PutObject API call failed for s3://{}/{}: {} ({}).",
                    bucket,
                    key,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow!(e).context("aws_sdk_s3::client::put_object() failed.")
            })
    }

    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        source_version_id: Option<String>,
        bucket: &str,
        key: &str,
    ) -> Result<CopyObjectOutput> {
        self.exec_rate_limit_objects_per_sec().await;

        let copy_source = build_copy_source(source_bucket, source_key, source_version_id.as_deref());
        self.client()?
            .copy_object()
            .copy_source(&copy_source)
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::warn!(
                    source_bucket = source_bucket,
                    source_key = source_key,
                    source_version_id = source_version_id,
                    bucket = bucket,
                    key = key,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 CopyObject API call failed for s3://{}/{} -> s3://{}/{}: {} ({}).",
                    source_bucket,
                    source_key,
                    bucket,
                    key,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow!(e).context("aws_sdk_s3::client::copy_object() failed.")
            })
    }

    async fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<String>,
    ) -> Result<DeleteObjectOutput> {
        self.exec_rate_limit_objects_per_sec().await;

        self.client()?
            .delete_object()
            .bucket(bucket)
            .key(key)
            .set_version_id(version_id.clone())
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::warn!(
                    bucket = bucket,
                    key = key,
                    version_id = version_id,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 DeleteObject API call failed for s3://{}/{}: {} ({}).",
                    bucket,
                    key,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow!(e).context("aws_sdk_s3::client::delete_object() failed.")
            })
    }

    fn get_client(&self) -> Option<Arc<Client>> {
        self.client.clone()
    }
}

/// `x-amz-copy-source` value: `bucket/url-encoded-key[?versionId=...]`.
fn build_copy_source(bucket: &str, key: &str, version_id: Option<&str>) -> String {
    let encoded_key = urlencoding::encode(key);
    match version_id {
        Some(version_id) => format!(
            "{bucket}/{encoded_key}?versionId={}",
            urlencoding::encode(version_id)
        ),
        None => format!("{bucket}/{encoded_key}"),
    }
}
