use std::path::PathBuf;

/// Result type used across the crate, defaulting to [`WackyError`].
pub type Result<T, E = WackyError> = std::result::Result<T, E>;

/// Errors raised while building or reading the corpus artifacts.
#[derive(Debug, thiserror::Error)]
pub enum WackyError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Npy(#[from] ndarray_npy::WriteNpyError),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    #[error(transparent)]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// A configuration value is missing or has the wrong type.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// A stage was asked to run before the artifacts it depends on exist.
    #[error("missing precondition: {0}")]
    MissingPrecondition(String),

    /// A word looked up by the user is not in the dictionary.
    #[error("{0} is not in the dictionary")]
    UnknownWord(String),

    /// A persisted artifact could not be parsed.
    #[error("invalid format in {}, line {line}: {msg}", path.display())]
    InvalidFormat {
        path: PathBuf,
        line: usize,
        msg: String,
    },
}

impl WackyError {
    pub(crate) fn invalid_format(path: &std::path::Path, line: usize, msg: impl Into<String>) -> Self {
        Self::InvalidFormat {
            path: path.to_path_buf(),
            line,
            msg: msg.into(),
        }
    }

    pub(crate) fn missing(msg: impl Into<String>) -> Self {
        Self::MissingPrecondition(msg.into())
    }
}
