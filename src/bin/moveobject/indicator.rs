// Progress indicator.
//
// Reads TransferStatistics from the stats channel and keeps a one-line
// progress display with a moving-average rate.

use std::io;
use std::io::Write;

use async_channel::Receiver;
use indicatif::{HumanCount, HumanDuration, ProgressBar, ProgressStyle};
use moveobject_rs::{Operation, TransferStatistics};
use simple_moving_average::{SMA, SumTreeSMA};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::info;

/// Totals seen by [`show_indicator`] once the stats channel closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorSummary {
    pub total_complete_count: u64,
    pub total_failed_count: u64,
}

/// Moving average window in samples, one sample per refresh.
const MOVING_AVERAGE_PERIOD_SECS: usize = 10;

const REFRESH_INTERVAL: f32 = 1.0;

/// Log the structured transfer summary. Suppressed in dry-run. Returns
/// whether it was logged.
fn log_transfer_summary(
    operation: Operation,
    completed_objects: u64,
    completed_objects_per_sec: u64,
    failed: u64,
    duration_sec: f64,
    dry_run: bool,
) -> bool {
    if dry_run {
        return false;
    }

    info!(
        message = "transfer summary",
        operation = operation.as_str(),
        completed_objects = completed_objects,
        completed_objects_per_sec = completed_objects_per_sec,
        failed = failed,
        duration_sec = duration_sec,
    );
    true
}

/// Spawn the indicator task. It runs until `stats_receiver` is closed.
pub fn show_indicator(
    stats_receiver: Receiver<TransferStatistics>,
    show_progress: bool,
    show_result: bool,
    operation: Operation,
    dry_run: bool,
) -> JoinHandle<IndicatorSummary> {
    let progress_text = ProgressBar::new(0);
    if let Ok(progress_style) = ProgressStyle::with_template("{wide_msg}") {
        progress_text.set_style(progress_style);
    }

    tokio::spawn(async move {
        let start_time = Instant::now();

        let mut ma_complete_count = SumTreeSMA::<_, u64, MOVING_AVERAGE_PERIOD_SECS>::new();

        let mut total_complete_count: u64 = 0;
        let mut total_failed_count: u64 = 0;

        loop {
            let mut period_count: u64 = 0;

            let period = Instant::now();
            loop {
                while let Ok(stats) = stats_receiver.try_recv() {
                    match stats {
                        TransferStatistics::TaskComplete { .. } => {
                            period_count += 1;
                            total_complete_count += 1;
                        }
                        TransferStatistics::TaskFailed { .. } => {
                            total_failed_count += 1;
                        }
                    }
                }

                if REFRESH_INTERVAL < period.elapsed().as_secs_f32() {
                    break;
                }

                if stats_receiver.is_closed() && stats_receiver.is_empty() {
                    let elapsed = start_time.elapsed();
                    let elapsed_secs_f64 = elapsed.as_secs_f64();

                    let mut objects_per_sec =
                        (total_complete_count as f64 / elapsed_secs_f64) as u64;
                    if elapsed_secs_f64 < REFRESH_INTERVAL as f64 {
                        objects_per_sec = total_complete_count;
                    }
                    if dry_run {
                        objects_per_sec = 0;
                    }

                    log_transfer_summary(
                        operation,
                        total_complete_count,
                        objects_per_sec,
                        total_failed_count,
                        elapsed_secs_f64,
                        dry_run,
                    );

                    if show_result {
                        if let Ok(result_style) = ProgressStyle::with_template("{msg}") {
                            progress_text.set_style(result_style);
                        }

                        progress_text.finish_with_message(format!(
                            "{} {:>3} objects | {:>3} objects/sec,  failed {} objects,  duration {}",
                            operation.as_str(),
                            total_complete_count,
                            HumanCount(objects_per_sec),
                            total_failed_count,
                            HumanDuration(elapsed),
                        ));

                        println!();
                        let _ = io::stdout().flush();
                    }

                    return IndicatorSummary {
                        total_complete_count,
                        total_failed_count,
                    };
                }

                tokio::time::sleep(std::time::Duration::from_secs_f32(0.05)).await;
            }

            if !dry_run {
                ma_complete_count.add_sample(period_count);
            }

            if show_progress {
                progress_text.set_message(format!(
                    "{} {:>3} objects | {:>3} objects/sec,  failed {} objects",
                    operation.as_str(),
                    total_complete_count,
                    HumanCount(ma_complete_count.get_average()),
                    total_failed_count,
                ));
            }
        }
    })
}
