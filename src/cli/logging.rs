use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LogFormat;

const DEFAULT_FILTER: &str = "git_plugin_updater=info";

/// Initialize logging to `log_path`, mirrored to stderr when `verbose`
///
/// `RUST_LOG` overrides the default filter. The returned guard flushes the
/// file writer on drop and must be held for the life of the program.
pub fn init(log_path: &Path, format: LogFormat, verbose: bool) -> anyhow::Result<WorkerGuard> {
    let log_dir = log_path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(log_dir)?;
    let file_name = log_path
        .file_name()
        .map_or_else(|| "git-plugin-updater.log".into(), |n| n.to_os_string());

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let (text_layer, json_layer) = match format {
        LogFormat::Text => (
            Some(fmt::layer().with_writer(non_blocking).with_ansi(false)),
            None,
        ),
        LogFormat::Json => (None, Some(fmt::layer().with_writer(non_blocking).json())),
    };
    let stderr_layer = verbose.then(|| fmt::layer().with_writer(std::io::stderr).with_target(false));

    tracing_subscriber::registry()
        .with(filter)
        .with(text_layer)
        .with(json_layer)
        .with(stderr_layer)
        .try_init()?;

    Ok(guard)
}
