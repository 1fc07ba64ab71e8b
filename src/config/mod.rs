pub mod args;
pub mod rewrite;
pub mod routing;

use std::path::{Path, PathBuf};

use fancy_regex::Regex;

use crate::config::rewrite::KeyRewriter;
use crate::config::routing::BucketRoutingTable;
use crate::types::{Operation, S3Credentials};

const MIN_DEFAULT_WORKER_SIZE: usize = 100;
const DEFAULT_OBJECT_LISTING_FILE: &str = "object_listing.txt";
const DEFAULT_REGION: &str = "us-east-1";

/// Main configuration for a moveobject-rs run.
///
/// Holds everything a [`TransferPipeline`](crate::TransferPipeline) needs: the
/// operation, the working directory holding the input listing and outcome
/// logs, bucket names or the routing table, the key-rewrite policy, worker
/// and queue sizing, and the remote client settings. The value is immutable
/// once the pipeline is built and is threaded through every stage.
///
/// # Quick Start
///
/// ```
/// use moveobject_rs::Config;
/// use moveobject_rs::types::Operation;
///
/// let config = Config::for_operation(Operation::Copy, "my-bucket", "/tmp/run");
/// assert_eq!(config.bucket, "my-bucket");
/// assert!(config.worker_size >= 100);
/// assert!(config.timestamped_log_files);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub operation: Operation,
    pub data_dir: PathBuf,
    pub object_listing_file: PathBuf,
    pub bucket: String,
    pub source_bucket: Option<String>,
    pub bucket_routing: Option<BucketRoutingTable>,
    pub key_rewriter: KeyRewriter,
    pub filter_config: FilterConfig,
    pub prefix_range: Option<PrefixRange>,
    pub skip: u64,
    pub dry_run: bool,
    pub worker_size: u16,
    pub task_queue_size: u32,
    pub outcome_queue_size: u32,
    pub timestamped_log_files: bool,
    pub migrate_stat_failure_as_success: bool,
    pub finish_grace_delay_milliseconds: u64,
    pub show_no_progress: bool,
    pub target_client_config: Option<ClientConfig>,
    pub source_client_config: Option<ClientConfig>,
    pub tracing_config: Option<TracingConfig>,
    pub rate_limit_objects: Option<u32>,
    pub max_keys: i32,
    pub warn_as_error: bool,
    pub auto_complete_shell: Option<clap_complete::shells::Shell>,
}

impl Config {
    /// Create a `Config` with CLI defaults for `operation` on `bucket`.
    pub fn for_operation(
        operation: Operation,
        bucket: &str,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Config {
            operation,
            bucket: bucket.to_string(),
            data_dir: data_dir.into(),
            ..Config::default()
        }
    }

    /// Input listing path, resolved against `data_dir` when relative.
    pub fn object_listing_path(&self) -> PathBuf {
        self.data_dir.join(&self.object_listing_file)
    }

    /// Bucket objects are read from. Only migrate reads from a separate bucket.
    pub fn read_bucket(&self) -> &str {
        match self.operation {
            Operation::Migrate => self.source_bucket.as_deref().unwrap_or(&self.bucket),
            _ => &self.bucket,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            operation: Operation::Copy,
            data_dir: PathBuf::from("."),
            object_listing_file: PathBuf::from(DEFAULT_OBJECT_LISTING_FILE),
            bucket: String::new(),
            source_bucket: None,
            bucket_routing: None,
            key_rewriter: KeyRewriter::identity(),
            filter_config: FilterConfig::default(),
            prefix_range: None,
            skip: 0,
            dry_run: false,
            worker_size: default_worker_size(),
            task_queue_size: 10_000,
            outcome_queue_size: 10_000,
            timestamped_log_files: true,
            migrate_stat_failure_as_success: true,
            finish_grace_delay_milliseconds: 100,
            show_no_progress: false,
            target_client_config: None,
            source_client_config: None,
            tracing_config: None,
            rate_limit_objects: None,
            max_keys: 1000,
            warn_as_error: false,
            auto_complete_shell: None,
        }
    }
}

/// `max(100, available parallelism)`, clamped to `u16`.
pub fn default_worker_size() -> u16 {
    let parallelism = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    u16::try_from(parallelism.max(MIN_DEFAULT_WORKER_SIZE)).unwrap_or(u16::MAX)
}

/// AWS S3 client configuration for one endpoint.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub credential: S3Credentials,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub retry_config: RetryConfig,
    pub cli_timeout_config: CLITimeoutConfig,
}

impl ClientConfig {
    pub fn region_or_default(&self) -> String {
        self.region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            credential: S3Credentials::FromEnvironment,
            region: None,
            endpoint_url: None,
            force_path_style: false,
            retry_config: RetryConfig::default(),
            cli_timeout_config: CLITimeoutConfig::default(),
        }
    }
}

/// Retry configuration for AWS SDK operations.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub aws_max_attempts: u32,
    pub initial_backoff_milliseconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            aws_max_attempts: 10,
            initial_backoff_milliseconds: 100,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CLITimeoutConfig {
    pub operation_timeout_milliseconds: Option<u64>,
    pub operation_attempt_timeout_milliseconds: Option<u64>,
    pub connect_timeout_milliseconds: Option<u64>,
    pub read_timeout_milliseconds: Option<u64>,
}

/// Tracing (logging) configuration.
#[derive(Debug, Clone, Copy)]
pub struct TracingConfig {
    pub tracing_level: log::Level,
    pub json_tracing: bool,
    pub aws_sdk_tracing: bool,
    pub span_events_tracing: bool,
    pub disable_color_tracing: bool,
}

/// Key pattern filter configuration.
#[derive(Debug, Clone, Default)]
pub struct FilterConfig {
    pub include_regex: Option<Regex>,
    pub exclude_regex: Option<Regex>,
}

/// Inclusive numeric prefix range used by listing-driven runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixRange {
    pub start: u64,
    pub end: u64,
}

impl PrefixRange {
    /// Listing prefixes `"{n}/"` for every `n` in the range, produced lazily.
    pub fn prefixes(&self) -> impl Iterator<Item = String> + Send + 'static {
        (self.start..=self.end).map(|n| format!("{n}/"))
    }
}

impl std::str::FromStr for PrefixRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| format!("prefix range must be 'start-end': {s}"))?;
        let start = start
            .trim()
            .parse::<u64>()
            .map_err(|e| format!("invalid prefix range start '{start}': {e}"))?;
        let end = end
            .trim()
            .parse::<u64>()
            .map_err(|e| format!("invalid prefix range end '{end}': {e}"))?;
        if start > end {
            return Err(format!("prefix range start {start} is after end {end}"));
        }
        Ok(PrefixRange { start, end })
    }
}
