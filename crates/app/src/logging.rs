//! Logging setup shared by the binaries: stderr plus a non-blocking file
//! layer under the state directory. Level defaults to `info`; `RUST_LOG`
//! overrides per the usual EnvFilter syntax.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn log_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("sotto")
}

pub fn log_file(binary: &str) -> PathBuf {
    log_dir().join(format!("{binary}.log"))
}

pub fn init(binary: &str) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    let dir = log_dir();
    match std::fs::create_dir_all(&dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::never(&dir, format!("{binary}.log"));
            let (file_writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer().with_writer(file_writer).with_ansi(false);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();
            Some(guard)
        }
        Err(e) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .init();
            tracing::warn!("file logging disabled, cannot create {}: {}", dir.display(), e);
            None
        }
    }
}
