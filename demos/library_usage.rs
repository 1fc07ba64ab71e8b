//! Example: using moveobject-rs as a library.
//!
//! Builds a [`Config`] from CLI-style arguments, runs the [`TransferPipeline`]
//! while printing progress events, then reports the outcome counts.
//!
//! Run with:
//! ```sh
//! cargo run --example library_usage -- copy --bucket my-bucket --data-dir ./run --rewrite-prefix backup/ --dry-run
//! ```

use anyhow::Result;
use moveobject_rs::{
    Config, TransferPipeline, TransferStatistics, build_config_from_args,
    create_pipeline_cancellation_token,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Same parser as the moveobject binary.
    let config: Config =
        build_config_from_args(std::env::args_os()).map_err(|e| anyhow::anyhow!(e))?;

    let token = create_pipeline_cancellation_token();
    let mut pipeline = TransferPipeline::new(config, token).await;

    let stats_receiver = pipeline.get_stats_receiver();
    let printer = tokio::spawn(async move {
        while let Ok(event) = stats_receiver.recv().await {
            match event {
                TransferStatistics::TaskComplete { key } => println!("  done:   {key}"),
                TransferStatistics::TaskFailed { key } => eprintln!("  FAILED: {key}"),
            }
        }
    });

    pipeline.run().await;
    printer.await?;

    if let Some(messages) = pipeline.get_error_messages() {
        for message in messages {
            eprintln!("Pipeline error: {message}");
        }
    }

    let stats = pipeline.get_transfer_stats();
    println!(
        "Summary: {} enqueued, {} processed, {} failed",
        stats.enqueued, stats.processed, stats.failed,
    );

    Ok(())
}
