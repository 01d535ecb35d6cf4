// file: src/utils/logging.rs
// description: Tracing subscriber initialization with optional ANSI coloring and file output

use crate::config::LoggingConfig;
use crate::error::{PipelineError, Result};
use colored::*;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Keeps the file writer alive. Dropping it at shutdown flushes pending lines.
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

pub fn init_logger(config: &LoggingConfig, colored_output: bool, verbose: bool) -> Result<LogGuard> {
    let level = if verbose { "debug" } else { config.level.as_str() };
    let filter = EnvFilter::try_new(level)
        .map_err(|e| PipelineError::Config(format!("invalid log level '{}': {}", level, e)))?;

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(true)
        .with_line_number(true)
        .compact()
        .with_ansi(colored_output);

    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            std::fs::create_dir_all(directory)?;
            let file_name = path
                .file_name()
                .ok_or_else(|| {
                    PipelineError::Config(format!("log file has no name: {}", path.display()))
                })?;

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_names(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| PipelineError::Config(format!("logger already initialized: {}", e)))?;

    Ok(LogGuard { _file: guard })
}

pub fn format_success(msg: &str) -> String {
    format!("{} {}", "✓".green().bold(), msg.green())
}

pub fn format_error(msg: &str) -> String {
    format!("{} {}", "✗".red().bold(), msg.red())
}

pub fn format_warning(msg: &str) -> String {
    format!("{} {}", "⚠".yellow().bold(), msg.yellow())
}

pub fn format_info(msg: &str) -> String {
    format!("{} {}", "ℹ".blue().bold(), msg)
}

pub fn format_step(step: usize, total: usize, msg: &str) -> String {
    format!("{} {}", format!("[{}/{}]", step, total).cyan().bold(), msg)
}
