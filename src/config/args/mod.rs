use crate::config::rewrite::KeyRewriter;
use crate::config::routing::BucketRoutingTable;
use crate::config::{
    CLITimeoutConfig, ClientConfig, Config, FilterConfig, PrefixRange, RetryConfig, TracingConfig,
    default_worker_size,
};
use crate::types::{AccessKeys, Operation, S3Credentials};
use clap::Parser;
use clap::builder::NonEmptyStringValueParser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use fancy_regex::Regex;
use std::ffi::OsString;
use std::path::PathBuf;


// ---------------------------------------------------------------------------
// Default constants
// ---------------------------------------------------------------------------

const DEFAULT_DATA_DIR: &str = ".";
const DEFAULT_OBJECT_LISTING_FILE: &str = "object_listing.txt";
const DEFAULT_SKIP: u64 = 0;
const DEFAULT_DRY_RUN: bool = false;
const DEFAULT_SHOW_NO_PROGRESS: bool = false;
const DEFAULT_REWRITE_STRIP_SEGMENTS: usize = 0;
const DEFAULT_FIXED_LOG_FILE_NAMES: bool = false;
const DEFAULT_MIGRATE_STAT_FAILURE_AS_FAILURE: bool = false;
const DEFAULT_FINISH_GRACE_DELAY_MILLISECONDS: u64 = 100;
const DEFAULT_TASK_QUEUE_SIZE: u32 = 10_000;
const DEFAULT_OUTCOME_QUEUE_SIZE: u32 = 10_000;
const DEFAULT_AWS_MAX_ATTEMPTS: u32 = 10;
const DEFAULT_INITIAL_BACKOFF_MILLISECONDS: u64 = 100;
const DEFAULT_JSON_TRACING: bool = false;
const DEFAULT_AWS_SDK_TRACING: bool = false;
const DEFAULT_SPAN_EVENTS_TRACING: bool = false;
const DEFAULT_DISABLE_COLOR_TRACING: bool = false;
const DEFAULT_WARN_AS_ERROR: bool = false;
const DEFAULT_FORCE_PATH_STYLE: bool = false;
const DEFAULT_MAX_KEYS: i32 = 1000;

// ---------------------------------------------------------------------------
// Error messages
// ---------------------------------------------------------------------------

const ERROR_MESSAGE_BUCKET_REQUIRED: &str =
    "A bucket is required. Set --bucket or the MINIO_BUCKET environment variable.";
const ERROR_MESSAGE_INVALID_REGEX: &str = "Invalid regular expression pattern";
const ERROR_MESSAGE_WORKER_SIZE_ZERO: &str = "Worker size must be at least 1.";
const ERROR_MESSAGE_TASK_QUEUE_SIZE_ZERO: &str = "Task queue size must be at least 1.";
const ERROR_MESSAGE_OUTCOME_QUEUE_SIZE_ZERO: &str = "Outcome queue size must be at least 1.";
const ERROR_MESSAGE_MAX_KEYS_OUT_OF_RANGE: &str = "Max keys must be between 1 and 1000.";
const ERROR_MESSAGE_BUCKET_ROUTING_MIGRATE_ONLY: &str =
    "--bucket-routing can only be used with the migrate operation.";
const ERROR_MESSAGE_SOURCE_ONLY_FOR_MIGRATE: &str =
    "--source-bucket and --source-* endpoint options can only be used with the migrate operation.";
const ERROR_MESSAGE_PREFIX_RANGE_NOT_FOR_MIGRATE: &str =
    "--prefix-range cannot be used with the migrate operation.";
const ERROR_MESSAGE_DATA_DIR_NOT_FOUND: &str = "Data directory does not exist";

// ---------------------------------------------------------------------------
// Value parser helpers
// ---------------------------------------------------------------------------

fn check_prefix_range(s: &str) -> Result<String, String> {
    s.parse::<PrefixRange>()?;
    Ok(s.to_string())
}

fn check_bucket_routing(s: &str) -> Result<String, String> {
    BucketRoutingTable::parse(s).map_err(|e| e.to_string())?;
    Ok(s.to_string())
}

// ---------------------------------------------------------------------------
// CLIArgs (clap-derived argument struct)
// ---------------------------------------------------------------------------

/// moveobject - Bulk migrate, move, copy and delete objects in S3-compatible storage.
///
/// Objects are read from a key listing (`key` or `versionID,key` per line) in
/// the data directory, or from a versioned listing of the bucket.
///
/// Example:
///   moveobject list --bucket photos --data-dir ./run
///   moveobject move --bucket photos --data-dir ./run --object-listing-file version_listing.txt --rewrite-strip-segments 1
///   moveobject migrate --bucket-routing "0-249=b1,250-499=b2,500-749=b3,750-999=b4" --source-bucket photos
///   moveobject delete --bucket photos --skip 5000 --dry-run
#[derive(Parser, Clone, Debug)]
#[command(name = "moveobject", version, about, long_about = None)]
pub struct CLIArgs {
    /// Operation to run.
    #[arg(
        value_enum,
        default_value_if("auto_complete_shell", clap::builder::ArgPredicate::IsPresent, "list"),
        required = false,
    )]
    pub operation: Operation,

    // -----------------------------------------------------------------------
    // General options
    // -----------------------------------------------------------------------
    /// Directory holding the object listing and the outcome logs.
    #[arg(long, env, default_value = DEFAULT_DATA_DIR, help_heading = "General")]
    pub data_dir: PathBuf,

    /// Object listing file name, relative to the data directory.
    #[arg(long, env, default_value = DEFAULT_OBJECT_LISTING_FILE, help_heading = "General")]
    pub object_listing_file: PathBuf,

    /// Skip the first N lines of the object listing.
    #[arg(short = 's', long, env, default_value_t = DEFAULT_SKIP, help_heading = "General")]
    pub skip: u64,

    /// Simulation mode. Logs the intended effect without touching remote objects or outcome logs.
    #[arg(short = 'd', long, visible_alias = "fake", env, default_value_t = DEFAULT_DRY_RUN, help_heading = "General")]
    pub dry_run: bool,

    /// Don't show the progress bar.
    #[arg(long, env, default_value_t = DEFAULT_SHOW_NO_PROGRESS, help_heading = "General")]
    pub show_no_progress: bool,

    // -----------------------------------------------------------------------
    // Bucket options
    // -----------------------------------------------------------------------
    /// Bucket operated on. For migrate, the destination bucket.
    #[arg(long, env = "MINIO_BUCKET", value_parser = NonEmptyStringValueParser::new(), help_heading = "Bucket")]
    pub bucket: Option<String>,

    /// Bucket migrate reads from. Defaults to --bucket.
    #[arg(long, env = "MINIO_SOURCE_BUCKET", value_parser = NonEmptyStringValueParser::new(), help_heading = "Bucket")]
    pub source_bucket: Option<String>,

    #[arg(
        long,
        env,
        value_parser = check_bucket_routing,
        help_heading = "Bucket",
        long_help = r#"Route migrated objects to destination buckets by the numeric
prefix before the first '/' of their key. Ranges must be contiguous.

Example: "0-249=bucket1,250-499=bucket2,500-749=bucket3,750-999=bucket4""#
    )]
    pub bucket_routing: Option<String>,

    // -----------------------------------------------------------------------
    // Key rewrite options
    // -----------------------------------------------------------------------
    /// Drop the first N path segments of the key to build the destination key.
    #[arg(long, env, default_value_t = DEFAULT_REWRITE_STRIP_SEGMENTS, help_heading = "Rewrite")]
    pub rewrite_strip_segments: usize,

    /// Prepend this prefix to the destination key.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "Rewrite")]
    pub rewrite_prefix: Option<String>,

    // -----------------------------------------------------------------------
    // Listing options
    // -----------------------------------------------------------------------
    #[arg(
        long,
        env,
        value_parser = check_prefix_range,
        help_heading = "Listing",
        long_help = r#"List the bucket once per numeric prefix "{n}/" in the inclusive range
instead of reading the object listing file.

Example: "0-999""#
    )]
    pub prefix_range: Option<String>,

    // -----------------------------------------------------------------------
    // Outcome log options
    // -----------------------------------------------------------------------
    /// Write <operation>_success.txt and <operation>_fails.txt without a timestamp suffix.
    #[arg(long, env, default_value_t = DEFAULT_FIXED_LOG_FILE_NAMES, help_heading = "Outcome")]
    pub fixed_log_file_names: bool,

    /// Count an unreadable source object as a failure during migrate.
    #[arg(long, env, default_value_t = DEFAULT_MIGRATE_STAT_FAILURE_AS_FAILURE, help_heading = "Outcome")]
    pub migrate_stat_failure_as_failure: bool,

    /// Delay before closing the task queue once input is exhausted.
    #[arg(long, env, default_value_t = DEFAULT_FINISH_GRACE_DELAY_MILLISECONDS, help_heading = "Outcome")]
    pub finish_grace_delay_milliseconds: u64,

    // -----------------------------------------------------------------------
    // Filter options
    // -----------------------------------------------------------------------
    /// Process only objects whose key matches this regex pattern.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "Filter")]
    pub filter_include_regex: Option<String>,

    /// Do not process objects whose key matches this regex pattern.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "Filter")]
    pub filter_exclude_regex: Option<String>,

    // -----------------------------------------------------------------------
    // Performance options
    // -----------------------------------------------------------------------
    /// Number of concurrent workers. Default: max(100, available parallelism).
    #[arg(long, env, help_heading = "Performance")]
    pub worker_size: Option<u16>,

    /// Task queue capacity between the object source and the workers.
    #[arg(long, env, default_value_t = DEFAULT_TASK_QUEUE_SIZE, help_heading = "Performance")]
    pub task_queue_size: u32,

    /// Capacity of each outcome queue.
    #[arg(long, env, default_value_t = DEFAULT_OUTCOME_QUEUE_SIZE, help_heading = "Performance")]
    pub outcome_queue_size: u32,

    /// Maximum objects per second for rate limiting.
    #[arg(long, env, help_heading = "Performance")]
    pub rate_limit_objects: Option<u32>,

    // -----------------------------------------------------------------------
    // Logging options
    // -----------------------------------------------------------------------
    /// Verbosity level. -q (quiet), default (normal), -v, -vv, -vvv.
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Output logs in JSON format.
    #[arg(long, env, default_value_t = DEFAULT_JSON_TRACING, help_heading = "Logging")]
    pub json_tracing: bool,

    /// Enable AWS SDK tracing.
    #[arg(long, env, default_value_t = DEFAULT_AWS_SDK_TRACING, help_heading = "Logging")]
    pub aws_sdk_tracing: bool,

    /// Enable tracing span events.
    #[arg(long, env, default_value_t = DEFAULT_SPAN_EVENTS_TRACING, help_heading = "Logging")]
    pub span_events_tracing: bool,

    /// Disable colored output in logs.
    #[arg(long, env, default_value_t = DEFAULT_DISABLE_COLOR_TRACING, help_heading = "Logging")]
    pub disable_color_tracing: bool,

    // -----------------------------------------------------------------------
    // Retry options
    // -----------------------------------------------------------------------
    /// Maximum retry attempts for AWS SDK operations. Default: 10.
    #[arg(long, env, default_value_t = DEFAULT_AWS_MAX_ATTEMPTS, help_heading = "Retry")]
    pub aws_max_attempts: u32,

    /// Initial backoff in milliseconds for retries. Default: 100.
    #[arg(long, env, default_value_t = DEFAULT_INITIAL_BACKOFF_MILLISECONDS, help_heading = "Retry")]
    pub initial_backoff_milliseconds: u64,

    // -----------------------------------------------------------------------
    // Timeout options
    // -----------------------------------------------------------------------
    /// Overall operation timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub operation_timeout_milliseconds: Option<u64>,

    /// Per-attempt operation timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub operation_attempt_timeout_milliseconds: Option<u64>,

    /// Connection timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub connect_timeout_milliseconds: Option<u64>,

    /// Read timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub read_timeout_milliseconds: Option<u64>,

    // -----------------------------------------------------------------------
    // Target endpoint
    // -----------------------------------------------------------------------
    /// AWS profile for the target endpoint.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "Target")]
    pub target_profile: Option<String>,

    /// Access key for the target endpoint.
    #[arg(long, env = "MINIO_ACCESS_KEY", value_parser = NonEmptyStringValueParser::new(), help_heading = "Target")]
    pub target_access_key: Option<String>,

    /// Secret key for the target endpoint.
    #[arg(long, env = "MINIO_SECRET_KEY", value_parser = NonEmptyStringValueParser::new(), help_heading = "Target")]
    pub target_secret_key: Option<String>,

    /// Session token for the target endpoint.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "Target")]
    pub target_session_token: Option<String>,

    /// Region for the target endpoint. Default: us-east-1.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "Target")]
    pub target_region: Option<String>,

    /// S3-compatible endpoint URL (e.g. MinIO).
    #[arg(long, env = "MINIO_ENDPOINT", value_parser = NonEmptyStringValueParser::new(), help_heading = "Target")]
    pub target_endpoint_url: Option<String>,

    /// Force path-style access.
    #[arg(long, env, default_value_t = DEFAULT_FORCE_PATH_STYLE, help_heading = "Target")]
    pub target_force_path_style: bool,

    // -----------------------------------------------------------------------
    // Source endpoint (migrate)
    // -----------------------------------------------------------------------
    /// AWS profile for the source endpoint.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "Source")]
    pub source_profile: Option<String>,

    /// Access key for the source endpoint.
    #[arg(long, env = "MINIO_SOURCE_ACCESS_KEY", value_parser = NonEmptyStringValueParser::new(), help_heading = "Source")]
    pub source_access_key: Option<String>,

    /// Secret key for the source endpoint.
    #[arg(long, env = "MINIO_SOURCE_SECRET_KEY", value_parser = NonEmptyStringValueParser::new(), help_heading = "Source")]
    pub source_secret_key: Option<String>,

    /// Session token for the source endpoint.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "Source")]
    pub source_session_token: Option<String>,

    /// Region for the source endpoint. Default: us-east-1.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "Source")]
    pub source_region: Option<String>,

    /// S3-compatible endpoint URL objects are migrated from.
    #[arg(long, env = "MINIO_SOURCE_ENDPOINT", value_parser = NonEmptyStringValueParser::new(), help_heading = "Source")]
    pub source_endpoint_url: Option<String>,

    /// Force path-style access on the source endpoint.
    #[arg(long, env, default_value_t = DEFAULT_FORCE_PATH_STYLE, help_heading = "Source")]
    pub source_force_path_style: bool,

    // -----------------------------------------------------------------------
    // Advanced options
    // -----------------------------------------------------------------------
    /// Treat warnings as errors (exit code 1 instead of 3).
    #[arg(long, env, default_value_t = DEFAULT_WARN_AS_ERROR, help_heading = "Advanced")]
    pub warn_as_error: bool,

    /// Max keys per listing request. Default: 1000.
    #[arg(long, env, default_value_t = DEFAULT_MAX_KEYS, help_heading = "Advanced")]
    pub max_keys: i32,

    /// Generate shell completions.
    #[arg(long, env, help_heading = "Advanced")]
    pub auto_complete_shell: Option<clap_complete::shells::Shell>,
}

// ---------------------------------------------------------------------------
// parse_from_args (public API)
// ---------------------------------------------------------------------------

/// Parse command-line arguments into a `CLIArgs` struct.
///
/// # Example
///
/// ```
/// use moveobject_rs::config::args::parse_from_args;
///
/// let args = vec!["moveobject", "copy", "--bucket", "my-bucket", "--dry-run"];
/// let cli_args = parse_from_args(args).unwrap();
/// assert!(cli_args.dry_run);
/// ```
pub fn parse_from_args<I, T>(args: I) -> Result<CLIArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    CLIArgs::try_parse_from(args)
}

/// Parse arguments and build a Config in one step.
pub fn build_config_from_args<I, T>(args: I) -> Result<Config, String>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli_args = CLIArgs::try_parse_from(args).map_err(|e| e.to_string())?;
    Config::try_from(cli_args)
}

// ---------------------------------------------------------------------------
// Validation and Config conversion
// ---------------------------------------------------------------------------

impl CLIArgs {
    fn validate(&self) -> Result<(), String> {
        if self.auto_complete_shell.is_some() {
            return Ok(());
        }

        if self.bucket.is_none() {
            return Err(ERROR_MESSAGE_BUCKET_REQUIRED.to_string());
        }
        if self.worker_size == Some(0) {
            return Err(ERROR_MESSAGE_WORKER_SIZE_ZERO.to_string());
        }
        if self.task_queue_size == 0 {
            return Err(ERROR_MESSAGE_TASK_QUEUE_SIZE_ZERO.to_string());
        }
        if self.outcome_queue_size == 0 {
            return Err(ERROR_MESSAGE_OUTCOME_QUEUE_SIZE_ZERO.to_string());
        }
        if !(1..=1000).contains(&self.max_keys) {
            return Err(ERROR_MESSAGE_MAX_KEYS_OUT_OF_RANGE.to_string());
        }

        let is_migrate = self.operation == Operation::Migrate;
        if self.bucket_routing.is_some() && !is_migrate {
            return Err(ERROR_MESSAGE_BUCKET_ROUTING_MIGRATE_ONLY.to_string());
        }
        if self.has_source_options() && !is_migrate {
            return Err(ERROR_MESSAGE_SOURCE_ONLY_FOR_MIGRATE.to_string());
        }
        if self.prefix_range.is_some() && is_migrate {
            return Err(ERROR_MESSAGE_PREFIX_RANGE_NOT_FOR_MIGRATE.to_string());
        }

        if !self.data_dir.is_dir() {
            return Err(format!(
                "{ERROR_MESSAGE_DATA_DIR_NOT_FOUND}: {}",
                self.data_dir.display()
            ));
        }

        Ok(())
    }

    fn has_source_options(&self) -> bool {
        self.source_bucket.is_some()
            || self.source_profile.is_some()
            || self.source_access_key.is_some()
            || self.source_endpoint_url.is_some()
            || self.source_region.is_some()
    }

    fn build_filter_config(&self) -> Result<FilterConfig, String> {
        let compile_regex =
            |pattern: &Option<String>, name: &str| -> Result<Option<Regex>, String> {
                match pattern {
                    Some(p) => Regex::new(p)
                        .map(Some)
                        .map_err(|e| format!("{ERROR_MESSAGE_INVALID_REGEX} for {name}: {e}")),
                    None => Ok(None),
                }
            };

        Ok(FilterConfig {
            include_regex: compile_regex(&self.filter_include_regex, "filter-include-regex")?,
            exclude_regex: compile_regex(&self.filter_exclude_regex, "filter-exclude-regex")?,
        })
    }

    fn build_target_client_config(&self) -> ClientConfig {
        ClientConfig {
            credential: build_credential(
                &self.target_profile,
                &self.target_access_key,
                &self.target_secret_key,
                &self.target_session_token,
            ),
            region: self.target_region.clone(),
            endpoint_url: self.target_endpoint_url.clone(),
            force_path_style: self.target_force_path_style,
            retry_config: self.build_retry_config(),
            cli_timeout_config: self.build_timeout_config(),
        }
    }

    fn build_source_client_config(&self) -> Option<ClientConfig> {
        let has_endpoint_options = self.source_profile.is_some()
            || self.source_access_key.is_some()
            || self.source_endpoint_url.is_some()
            || self.source_region.is_some();
        if !has_endpoint_options {
            return None;
        }

        Some(ClientConfig {
            credential: build_credential(
                &self.source_profile,
                &self.source_access_key,
                &self.source_secret_key,
                &self.source_session_token,
            ),
            region: self.source_region.clone(),
            endpoint_url: self.source_endpoint_url.clone(),
            force_path_style: self.source_force_path_style,
            retry_config: self.build_retry_config(),
            cli_timeout_config: self.build_timeout_config(),
        })
    }

    fn build_retry_config(&self) -> RetryConfig {
        RetryConfig {
            aws_max_attempts: self.aws_max_attempts,
            initial_backoff_milliseconds: self.initial_backoff_milliseconds,
        }
    }

    fn build_timeout_config(&self) -> CLITimeoutConfig {
        CLITimeoutConfig {
            operation_timeout_milliseconds: self.operation_timeout_milliseconds,
            operation_attempt_timeout_milliseconds: self.operation_attempt_timeout_milliseconds,
            connect_timeout_milliseconds: self.connect_timeout_milliseconds,
            read_timeout_milliseconds: self.read_timeout_milliseconds,
        }
    }

    fn build_tracing_config(&self) -> Option<TracingConfig> {
        let log_level = self.verbosity.log_level()?;

        Some(TracingConfig {
            tracing_level: log_level,
            json_tracing: self.json_tracing,
            aws_sdk_tracing: self.aws_sdk_tracing,
            span_events_tracing: self.span_events_tracing,
            disable_color_tracing: self.disable_color_tracing,
        })
    }

    fn build_bucket_routing(&self) -> Result<Option<BucketRoutingTable>, String> {
        self.bucket_routing
            .as_deref()
            .map(|routing| BucketRoutingTable::parse(routing).map_err(|e| e.to_string()))
            .transpose()
    }

    fn build_prefix_range(&self) -> Result<Option<PrefixRange>, String> {
        self.prefix_range
            .as_deref()
            .map(str::parse::<PrefixRange>)
            .transpose()
    }
}

fn build_credential(
    profile: &Option<String>,
    access_key: &Option<String>,
    secret_key: &Option<String>,
    session_token: &Option<String>,
) -> S3Credentials {
    if let Some(profile) = profile {
        S3Credentials::Profile(profile.clone())
    } else if let Some(access_key) = access_key {
        S3Credentials::Credentials {
            access_keys: AccessKeys {
                access_key: access_key.clone(),
                secret_access_key: secret_key.clone().unwrap_or_default(),
                session_token: session_token.clone(),
            },
        }
    } else {
        S3Credentials::FromEnvironment
    }
}

impl TryFrom<CLIArgs> for Config {
    type Error = String;

    fn try_from(args: CLIArgs) -> Result<Self, Self::Error> {
        args.validate()?;

        let filter_config = args.build_filter_config()?;
        let bucket_routing = args.build_bucket_routing()?;
        let prefix_range = args.build_prefix_range()?;
        let target_client_config = Some(args.build_target_client_config());
        let source_client_config = args.build_source_client_config();
        let tracing_config = args.build_tracing_config();
        let key_rewriter =
            KeyRewriter::from_rules(args.rewrite_strip_segments, args.rewrite_prefix.clone());

        Ok(Config {
            operation: args.operation,
            data_dir: args.data_dir,
            object_listing_file: args.object_listing_file,
            bucket: args.bucket.unwrap_or_default(),
            source_bucket: args.source_bucket,
            bucket_routing,
            key_rewriter,
            filter_config,
            prefix_range,
            skip: args.skip,
            dry_run: args.dry_run,
            worker_size: args.worker_size.unwrap_or_else(default_worker_size),
            task_queue_size: args.task_queue_size,
            outcome_queue_size: args.outcome_queue_size,
            timestamped_log_files: !args.fixed_log_file_names,
            migrate_stat_failure_as_success: !args.migrate_stat_failure_as_failure,
            finish_grace_delay_milliseconds: args.finish_grace_delay_milliseconds,
            show_no_progress: args.show_no_progress,
            target_client_config,
            source_client_config,
            tracing_config,
            rate_limit_objects: args.rate_limit_objects,
            max_keys: args.max_keys,
            warn_as_error: args.warn_as_error,
            auto_complete_shell: args.auto_complete_shell,
        })
    }
}
