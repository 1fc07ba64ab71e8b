use anyhow::Result;
use async_channel::Sender;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::operation::copy_object::CopyObjectOutput;
use aws_sdk_s3::operation::delete_object::DeleteObjectOutput;
use aws_sdk_s3::operation::get_object::GetObjectOutput;
use aws_sdk_s3::operation::head_object::HeadObjectOutput;
use aws_sdk_s3::operation::put_object::PutObjectOutput;
use aws_sdk_s3::primitives::ByteStream;
use dyn_clone::DynClone;
use leaky_bucket::RateLimiter;
use std::sync::Arc;

use crate::config::ClientConfig;
use crate::types::ObjectEntry;
use crate::types::token::PipelineCancellationToken;

pub mod s3;

/// Type alias for a boxed Storage trait object.
pub type Storage = Box<dyn StorageTrait + Send + Sync>;

/// Remote object-storage calls used by the transfer pipeline.
///
/// Every method takes the bucket explicitly so one storage instance serves
/// both a fixed bucket and routed destination buckets on the same endpoint.
/// Expected remote conditions (missing object, access denied) are ordinary
/// `Err` returns.
#[async_trait]
pub trait StorageTrait: DynClone {
    /// Recursively list every version and delete marker under `prefix`,
    /// sending each entry to `sender`.
    ///
    /// Listing failures are treated as unrecoverable errors.
    async fn list_object_versions(
        &self,
        bucket: &str,
        prefix: &str,
        sender: &Sender<ObjectEntry>,
        max_keys: i32,
    ) -> Result<()>;

    async fn get_object(&self, bucket: &str, key: &str) -> Result<GetObjectOutput>;

    async fn head_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<String>,
    ) -> Result<HeadObjectOutput>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: ByteStream,
        content_length: i64,
    ) -> Result<PutObjectOutput>;

    /// Server-side copy, within a bucket or across buckets of one endpoint.
    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        source_version_id: Option<String>,
        bucket: &str,
        key: &str,
    ) -> Result<CopyObjectOutput>;

    async fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<String>,
    ) -> Result<DeleteObjectOutput>;

    /// Get the underlying AWS S3 Client for direct API access.
    fn get_client(&self) -> Option<Arc<Client>>;
}

dyn_clone::clone_trait_object!(StorageTrait);

// Default refill interval 100ms
const REFILL_PER_INTERVAL_DIVIDER: usize = 10;

/// Create an S3 storage instance for one endpoint.
///
/// Without a client configuration the storage has no client and every remote
/// call fails.
pub async fn create_storage(
    client_config: Option<ClientConfig>,
    rate_limit_objects: Option<u32>,
    cancellation_token: PipelineCancellationToken,
) -> Storage {
    let rate_limit_objects_per_sec = rate_limit_objects.map(|rate_limit_value| {
        let refill = if (rate_limit_value as usize) <= REFILL_PER_INTERVAL_DIVIDER {
            1
        } else {
            rate_limit_value as usize / REFILL_PER_INTERVAL_DIVIDER
        };
        Arc::new(
            RateLimiter::builder()
                .max(rate_limit_value as usize)
                .initial(rate_limit_value as usize)
                .refill(refill)
                .fair(true)
                .build(),
        )
    });

    s3::S3Storage::boxed(client_config, rate_limit_objects_per_sec, cancellation_token).await
}
