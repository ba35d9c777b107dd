use thiserror::Error;

/// Rejections raised before any work reaches the worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unknown speech engine")]
    UnknownEngine,
    #[error("unknown encoder format")]
    UnknownEncoder,
    #[error("invalid engine")]
    InvalidEngine,
    #[error("malformed request: {0}")]
    MalformedBody(String),
}

/// Failures inside a synthesis job. Each one ends up as the `description`
/// of a failed job result.
#[derive(Debug, Error)]
pub enum SynthError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    Parameter(String),
    #[error("{0}")]
    Synthesis(String),
    #[error("{0}")]
    Encoding(String),
    #[error("synthesis timed out")]
    Timeout,
    #[error("worker failed: {0}")]
    Worker(String),
    /// Shows only the error kind; the source may name cache paths.
    #[error("cache i/o error: {}", .0.kind())]
    Io(#[from] std::io::Error),
}

impl SynthError {
    pub fn invalid(property: &str) -> Self {
        SynthError::Parameter(format!("invalid {}", property))
    }
}

/// Errors from the artifact delivery path. None of them carry a filesystem path.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("range not satisfiable")]
    RangeNotSatisfiable { size: u64 },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("metrics store error: {0}")]
    Store(#[from] sled::Error),
    #[error("metrics encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Fatal errors while bringing the server up.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("required speech engine \"{name}\" is unavailable: {reason}")]
    RequiredEngineUnavailable { name: String, reason: String },
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Metrics(#[from] MetricsError),
}
