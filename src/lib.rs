/*!
# Overview
moveobject-rs performs bulk object operations against S3-compatible storage,
driven by a key listing file or by versioned listings of numeric key prefixes.

## Operations
- **migrate**: read each object from a source endpoint and write it to a
  destination bucket, chosen directly or through a numeric-prefix routing table
- **move**: copy the current version to a rewritten key, then remove that version
- **copy**: copy to a rewritten key in the same bucket
- **delete**: remove the current version of each object
- **list**: write a `versionID,key` listing usable as move input

Every finished object is recorded in a success or failure log, so an
interrupted run can be resumed with `--skip`.

## As a Library
The moveobject CLI is a thin wrapper over this library.

```no_run
use moveobject_rs::config::args::parse_from_args;
use moveobject_rs::{Config, TransferPipeline, create_pipeline_cancellation_token};

#[tokio::main]
async fn main() {
    let args = vec!["moveobject", "copy", "--bucket", "my-bucket", "--rewrite-prefix", "backup/"];

    let config = Config::try_from(parse_from_args(args).unwrap()).unwrap();
    let cancellation_token = create_pipeline_cancellation_token();
    let mut pipeline = TransferPipeline::new(config, cancellation_token).await;
    pipeline.close_stats_sender();
    pipeline.run().await;

    if pipeline.has_error() {
        eprintln!("{:?}", pipeline.get_errors_and_consume().unwrap()[0]);
    }
}
```
*/

#![allow(clippy::collapsible_if)]

pub mod config;
pub mod filters;
pub mod listing;
pub mod operation;
pub mod pipeline;
pub mod recorder;
pub mod source;
pub mod stage;
pub mod storage;
pub mod types;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::Config;
pub use config::args::{CLIArgs, build_config_from_args, parse_from_args};
pub use config::rewrite::KeyRewriter;
pub use config::routing::BucketRoutingTable;
pub use operation::ObjectOperation;
pub use pipeline::{PipelineState, TransferPipeline};
pub use types::error::{MoveObjectError, exit_code_from_error, is_cancelled_error};
pub use types::token::{PipelineCancellationToken, create_pipeline_cancellation_token};
pub use types::{ObjectTask, Operation, TaskOutcome, TransferStatistics, TransferStats};
