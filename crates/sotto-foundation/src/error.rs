use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("No input device found: {wanted:?}")]
    DeviceNotFound { wanted: Option<String> },

    #[error("Build stream error: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("Play stream error: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("Format not supported: {0}")]
    FormatNotSupported(String),

    #[error("Fatal audio error: {0}")]
    Fatal(String),
}

#[derive(Debug, Error)]
pub enum SttError {
    #[error("Model not found: {path}")]
    ModelNotFound { path: PathBuf },

    #[error("Model load failed: {0}")]
    LoadFailed(String),

    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),
}

#[derive(Debug, Error)]
pub enum InjectionError {
    #[error("Injector exited with {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    #[error("Injector timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to launch injector: {0}")]
    Launch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum WmError {
    #[error("Dispatcher exited with {code}: {stderr}")]
    DispatchFailed { code: i32, stderr: String },

    #[error("Dispatcher timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to launch dispatcher: {0}")]
    Launch(String),

    #[error("Malformed client list: {0}")]
    BadClientList(#[from] serde_json::Error),

    #[error("No active window")]
    NoActiveWindow,
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
