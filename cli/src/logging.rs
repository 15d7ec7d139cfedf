use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use ghostgate_core::api::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` wins over `logging.level`.
/// With `logging.file` set, output goes to that file through a non-blocking
/// writer whose guard must be held until exit.
pub fn init_logging(cfg: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.level))
        .with_context(|| format!("invalid log level {:?}", cfg.level))?;

    match cfg.file.as_deref() {
        Some(file) => {
            let path = PathBuf::from(file);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("log file {file:?} has no file name"))?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;

            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .try_init()
                .map_err(|e| anyhow!(e))?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|e| anyhow!(e))?;
            Ok(None)
        }
    }
}
