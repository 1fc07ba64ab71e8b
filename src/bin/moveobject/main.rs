use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use tracing::{debug, error, trace};

use moveobject_rs::config::Config;
use moveobject_rs::{
    CLIArgs, TransferPipeline, create_pipeline_cancellation_token, is_cancelled_error,
};

mod ctrl_c_handler;
pub mod indicator;
mod tracing_init;
pub mod ui_config;

const EXIT_CODE_WARNING: i32 = 3;

/// moveobject - bulk migrate, move, copy and delete objects on S3-compatible storage.
///
/// This binary is a thin wrapper over the moveobject-rs library.
#[cfg_attr(coverage_nightly, coverage(off))]
#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config_exit_if_err();

    if let Some(shell) = config.auto_complete_shell {
        generate(
            shell,
            &mut CLIArgs::command(),
            "moveobject",
            &mut std::io::stdout(),
        );

        return Ok(());
    }

    start_tracing_if_necessary(&config);

    trace!("config = {:?}", config);

    run(config).await
}

#[cfg_attr(coverage_nightly, coverage(off))]
fn load_config_exit_if_err() -> Config {
    match Config::try_from(CLIArgs::parse()) {
        Ok(config) => config,
        Err(error_message) => {
            clap::Error::raw(clap::error::ErrorKind::ValueValidation, error_message).exit()
        }
    }
}

fn start_tracing_if_necessary(config: &Config) -> bool {
    let Some(tracing_config) = config.tracing_config.as_ref() else {
        return false;
    };

    tracing_init::init_tracing(tracing_config);
    true
}

async fn run(config: Config) -> Result<()> {
    let cancellation_token = create_pipeline_cancellation_token();
    ctrl_c_handler::spawn_ctrl_c_handler(cancellation_token.clone());

    let start_time = tokio::time::Instant::now();
    debug!(operation = config.operation.as_str(), "transfer pipeline start.");

    let mut pipeline = TransferPipeline::new(config.clone(), cancellation_token).await;
    let indicator_join_handle = indicator::show_indicator(
        pipeline.get_stats_receiver(),
        ui_config::is_progress_indicator_needed(&config),
        ui_config::is_show_result_needed(&config),
        config.operation,
        config.dry_run,
    );

    pipeline.run().await;
    indicator_join_handle.await?;

    let duration_sec = format!("{:.3}", start_time.elapsed().as_secs_f32());

    if let Some(errors) = pipeline.get_errors_and_consume() {
        for err in &errors {
            if is_cancelled_error(err) {
                debug!("transfer cancelled by user.");
                return Ok(());
            }
            error!("{:#}", err);
        }
        error!(duration_sec = duration_sec, "moveobject failed.");
        return Err(anyhow::anyhow!("moveobject failed."));
    }

    debug!(duration_sec = duration_sec, "moveobject has been completed.");

    if pipeline.has_warning() {
        std::process::exit(EXIT_CODE_WARNING);
    }

    Ok(())
}
