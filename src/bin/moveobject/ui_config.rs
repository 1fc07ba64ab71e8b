// Decides whether the progress line and the result line are shown.

use moveobject_rs::config::Config;

/// Whether to show the live progress line.
///
/// Off in quiet mode, above warn verbosity (tracing owns the terminal) and
/// with JSON tracing.
pub fn is_progress_indicator_needed(config: &Config) -> bool {
    if config.show_no_progress {
        return false;
    }

    match config.tracing_config.as_ref() {
        None => true,
        Some(tracing_config) => {
            tracing_config.tracing_level <= log::Level::Warn && !tracing_config.json_tracing
        }
    }
}

/// Whether to show the final result line.
pub fn is_show_result_needed(config: &Config) -> bool {
    if config.show_no_progress {
        return false;
    }

    config
        .tracing_config
        .as_ref()
        .is_none_or(|tracing_config| !tracing_config.json_tracing)
}
