//! Tracing setup: env-filtered stderr logs, or a non-blocking file appender.

use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Initialize the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise only this crate logs at info. The
/// returned guard must be held for the process lifetime when logging to a
/// file, or buffered lines are lost on exit.
pub fn init(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("shelfctl=info"));

  if let Some(path) = log_file {
    let directory = path.parent().filter(|p| !p.as_os_str().is_empty());
    let file_name = path
      .file_name()
      .ok_or_else(|| eyre!("log file path has no file name: {}", path.display()))?;

    let appender =
      tracing_appender::rolling::never(directory.unwrap_or_else(|| Path::new(".")), file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
      .with_env_filter(filter)
      .with_writer(writer)
      .with_ansi(false)
      .init();
    Ok(Some(guard))
  } else {
    tracing_subscriber::fmt()
      .with_env_filter(filter)
      .with_writer(std::io::stderr)
      .init();
    Ok(None)
  }
}
