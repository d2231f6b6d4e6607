use crate::error::{IoContext, Result};
use std::{fs, io, path::Path};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub const RUN_LOG_FILE_NAME: &str = "Forge_Log.txt";

/// Keeps the run log writer alive; dropping it flushes the log.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Logs to stdout and to `Forge_Log.txt` in `output_dir`, truncating the previous run's log.
///
/// The level defaults to `info` and can be changed with `RUST_LOG`.
pub fn init_logging(output_dir: &Path) -> Result<LoggingGuard> {
    fs::create_dir_all(output_dir).at(output_dir)?;

    let log_path = output_dir.join(RUN_LOG_FILE_NAME);

    fs::write(&log_path, "").at(&log_path)?;

    let (file_writer, file_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(output_dir, RUN_LOG_FILE_NAME));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false);

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_target(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
