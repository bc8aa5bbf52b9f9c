use thiserror::Error;

/// Error taxonomy for the pipeline. Variants map onto the daemon's error
/// classes: `InitError` is fatal at startup, `CaptureError`/`PipelineError`/
/// `InferenceError` are logged and leave the session running, `ProtocolError`
/// closes one connection, `Shutdown` is not counted as an error at all.
#[derive(Debug, Error)]
pub enum SttError {
    #[error("invalid configuration: {0}")]
    InitError(String),

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("capture error: {0}")]
    CaptureError(String),

    #[error("pipeline error: {0}")]
    PipelineError(String),

    #[error("inference error: {0}")]
    InferenceError(String),

    #[error("model file not found: {path}")]
    ModelNotFound { path: std::path::PathBuf },

    #[error("invalid model file: {0}")]
    InvalidModelFile(String),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("session is already running")]
    AlreadyRunning,

    #[error("session is not running")]
    NotRunning,

    #[error("shutting down")]
    Shutdown,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SttError {
    /// Whether this error should be counted in `ServerStats.error_count`.
    /// `Shutdown` is explicitly excluded per the error-handling policy.
    pub fn is_countable(&self) -> bool {
        !matches!(self, SttError::Shutdown)
    }
}

pub type Result<T> = std::result::Result<T, SttError>;
