//! Shared test utilities for the moveobject library crate.
//!
//! Provides the canonical tracing initialiser, a test `Config` builder and an
//! in-memory [`MockStorage`] that behaves like a small versioned bucket, or an
//! unversioned one.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_channel::Sender;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::operation::copy_object::CopyObjectOutput;
use aws_sdk_s3::operation::delete_object::DeleteObjectOutput;
use aws_sdk_s3::operation::get_object::GetObjectOutput;
use aws_sdk_s3::operation::head_object::HeadObjectOutput;
use aws_sdk_s3::operation::put_object::PutObjectOutput;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectVersion;

use crate::config::Config;
use crate::storage::StorageTrait;
use crate::types::{ObjectEntry, Operation};

/// Initialise a dummy tracing subscriber for tests.
///
/// Uses `try_init` so that only the first call in a process actually
/// installs the subscriber; subsequent calls are silently ignored.
pub(crate) fn init_dummy_tracing_subscriber() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("dummy=trace")
        .try_init();
}

/// Create a [`Config`] suitable for most unit tests.
///
/// Key defaults: `worker_size=4`, bucket=`"test-bucket"`, fixed log file
/// names and no grace delay.
pub(crate) fn make_test_config(operation: Operation, data_dir: &Path) -> Config {
    Config {
        worker_size: 4,
        task_queue_size: 16,
        outcome_queue_size: 16,
        timestamped_log_files: false,
        finish_grace_delay_milliseconds: 0,
        show_no_progress: true,
        ..Config::for_operation(operation, "test-bucket", data_dir)
    }
}

pub(crate) fn write_object_listing(data_dir: &Path, content: &str) -> PathBuf {
    let path = data_dir.join("object_listing.txt");
    std::fs::write(&path, content).unwrap();
    path
}

/// Lines of a file, sorted so assertions do not depend on completion order.
pub(crate) fn read_sorted_lines(path: &Path) -> Vec<String> {
    let mut lines: Vec<String> = std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    lines.sort();
    lines
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StoredObject {
    pub version_id: String,
    pub body: Vec<u8>,
}

/// One mutating remote call recorded by [`MockStorage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MutatingCall {
    Put { bucket: String, key: String },
    Copy { source_key: String, bucket: String, key: String },
    Delete { bucket: String, key: String, version_id: Option<String> },
}

/// In-memory versioned object store.
///
/// Each (bucket, key) holds only its current version. Copying a specific
/// version that is no longer current fails, which is how S3 behaves once
/// that version has been removed.
///
/// Built with [`MockStorage::unversioned`] it answers like a bucket without
/// versioning: responses carry no version id, listings report `null`, and
/// `null` addresses the current object.
#[derive(Clone, Default)]
pub(crate) struct MockStorage {
    objects: Arc<Mutex<BTreeMap<(String, String), StoredObject>>>,
    next_version: Arc<AtomicU64>,
    mutating_calls: Arc<Mutex<Vec<MutatingCall>>>,
    /// Every call touching one of these keys fails.
    fail_keys: Arc<Mutex<HashSet<String>>>,
    /// GetObject returns no content length for these keys.
    unknown_size_keys: Arc<Mutex<HashSet<String>>>,
    /// Sent after the stored objects by every listing.
    extra_listing_entries: Arc<Mutex<Vec<ObjectEntry>>>,
    listing_error: Arc<AtomicBool>,
    delay: Arc<Mutex<Option<Duration>>>,
    unversioned: bool,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unversioned() -> Self {
        Self {
            unversioned: true,
            ..Self::default()
        }
    }

    /// Store an object and return its new version id.
    pub fn insert(&self, bucket: &str, key: &str, body: &[u8]) -> String {
        let version_id = self.new_version_id();
        self.objects.lock().unwrap().insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                version_id: version_id.clone(),
                body: body.to_vec(),
            },
        );
        version_id
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    pub fn mutating_calls(&self) -> Vec<MutatingCall> {
        self.mutating_calls.lock().unwrap().clone()
    }

    pub fn fail_key(&self, key: &str) {
        self.fail_keys.lock().unwrap().insert(key.to_string());
    }

    pub fn unknown_size_key(&self, key: &str) {
        self.unknown_size_keys.lock().unwrap().insert(key.to_string());
    }

    pub fn add_listing_entry(&self, entry: ObjectEntry) {
        self.extra_listing_entries.lock().unwrap().push(entry);
    }

    pub fn fail_listing(&self) {
        self.listing_error.store(true, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    fn new_version_id(&self) -> String {
        format!("v{}", self.next_version.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn simulate_call(&self, key: &str) -> Result<()> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_keys.lock().unwrap().contains(key) {
            return Err(anyhow!("injected failure for {key}"));
        }
        Ok(())
    }

    fn record(&self, call: MutatingCall) {
        self.mutating_calls.lock().unwrap().push(call);
    }

    /// Version id as the remote would report it.
    fn reported_version(&self, object: &StoredObject) -> Option<String> {
        (!self.unversioned).then(|| object.version_id.clone())
    }

    fn addresses_current(&self, requested: &Option<String>, object: &StoredObject) -> bool {
        match requested.as_deref() {
            None => true,
            Some("null") if self.unversioned => true,
            Some(version_id) => version_id == object.version_id,
        }
    }
}

#[async_trait]
impl StorageTrait for MockStorage {
    async fn list_object_versions(
        &self,
        bucket: &str,
        prefix: &str,
        sender: &Sender<ObjectEntry>,
        _max_keys: i32,
    ) -> Result<()> {
        let mut entries: Vec<ObjectEntry> = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((b, k), _)| b == bucket && k.starts_with(prefix))
            .map(|((_, k), object)| {
                ObjectEntry::Version(
                    ObjectVersion::builder()
                        .key(k)
                        .version_id(
                            self.reported_version(object)
                                .unwrap_or_else(|| "null".to_string()),
                        )
                        .is_latest(true)
                        .size(object.body.len() as i64)
                        .build(),
                )
            })
            .collect();
        entries.extend(
            self.extra_listing_entries
                .lock()
                .unwrap()
                .iter()
                .filter(|entry| entry.key().starts_with(prefix))
                .cloned(),
        );

        for entry in entries {
            if sender.send(entry).await.is_err() {
                return Ok(());
            }
        }

        if self.listing_error.load(Ordering::SeqCst) {
            return Err(anyhow!("ListObjectVersions failed for {bucket}/{prefix}"));
        }
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<GetObjectOutput> {
        self.simulate_call(key).await?;
        let object = self
            .get(bucket, key)
            .ok_or_else(|| anyhow!("NoSuchKey: {bucket}/{key}"))?;

        let content_length = if self.unknown_size_keys.lock().unwrap().contains(key) {
            None
        } else {
            Some(object.body.len() as i64)
        };

        let version_id = self.reported_version(&object);
        Ok(GetObjectOutput::builder()
            .body(ByteStream::from(object.body))
            .set_content_length(content_length)
            .set_version_id(version_id)
            .build())
    }

    async fn head_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<String>,
    ) -> Result<HeadObjectOutput> {
        self.simulate_call(key).await?;
        let object = self
            .get(bucket, key)
            .ok_or_else(|| anyhow!("NotFound: {bucket}/{key}"))?;
        if !self.addresses_current(&version_id, &object) {
            return Err(anyhow!("NoSuchVersion: {bucket}/{key}"));
        }

        Ok(HeadObjectOutput::builder()
            .set_version_id(self.reported_version(&object))
            .content_length(object.body.len() as i64)
            .build())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: ByteStream,
        content_length: i64,
    ) -> Result<PutObjectOutput> {
        self.simulate_call(key).await?;
        let body = body.collect().await?.into_bytes().to_vec();
        if body.len() as i64 != content_length {
            return Err(anyhow!("content length mismatch for {bucket}/{key}"));
        }

        self.record(MutatingCall::Put {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
        self.insert(bucket, key, &body);
        let stored = self.get(bucket, key).ok_or_else(|| anyhow!("lost {bucket}/{key}"))?;
        Ok(PutObjectOutput::builder()
            .set_version_id(self.reported_version(&stored))
            .build())
    }

    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        source_version_id: Option<String>,
        bucket: &str,
        key: &str,
    ) -> Result<CopyObjectOutput> {
        self.simulate_call(source_key).await?;
        let source = self
            .get(source_bucket, source_key)
            .ok_or_else(|| anyhow!("NoSuchKey: {source_bucket}/{source_key}"))?;
        if !self.addresses_current(&source_version_id, &source) {
            return Err(anyhow!("NoSuchVersion: {source_bucket}/{source_key}"));
        }

        self.record(MutatingCall::Copy {
            source_key: source_key.to_string(),
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
        self.insert(bucket, key, &source.body);
        let copied = self.get(bucket, key).ok_or_else(|| anyhow!("lost {bucket}/{key}"))?;
        Ok(CopyObjectOutput::builder()
            .set_version_id(self.reported_version(&copied))
            .set_copy_source_version_id(self.reported_version(&source))
            .build())
    }

    async fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<String>,
    ) -> Result<DeleteObjectOutput> {
        self.simulate_call(key).await?;
        let mut objects = self.objects.lock().unwrap();
        let id = (bucket.to_string(), key.to_string());
        let current = objects
            .get(&id)
            .ok_or_else(|| anyhow!("NoSuchKey: {bucket}/{key}"))?;
        if !self.addresses_current(&version_id, current) {
            return Err(anyhow!("NoSuchVersion: {bucket}/{key}"));
        }
        objects.remove(&id);
        drop(objects);

        self.record(MutatingCall::Delete {
            bucket: bucket.to_string(),
            key: key.to_string(),
            version_id: version_id.clone(),
        });
        Ok(DeleteObjectOutput::builder()
            .set_version_id(version_id)
            .build())
    }

    fn get_client(&self) -> Option<Arc<Client>> {
        None
    }
}
