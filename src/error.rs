use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures of the video job lifecycle and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Network or HTTP failure reaching Wikipedia, an LLM or a media URL.
    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    /// The provider rejected the job or the request could not be built.
    #[error("submission failed: {0}")]
    Submission(String),

    /// The provider finished the operation with an `error` payload.
    #[error("operation {operation} failed: {detail}")]
    OperationFailed { operation: String, detail: String },

    /// Transport failure while checking job status.
    #[error("polling {operation} failed: {detail}")]
    PollFailure { operation: String, detail: String },

    #[error("operation {operation} still pending after {attempts} status checks")]
    Timeout { operation: String, attempts: u32 },

    #[error("expected {expected} episodes, found {found}")]
    SplitMismatch { expected: usize, found: usize },

    #[error("failed to persist {}: {detail}", path.display())]
    Persist { path: PathBuf, detail: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn persist(path: impl Into<PathBuf>, detail: impl ToString) -> Self {
        Error::Persist {
            path: path.into(),
            detail: detail.to_string(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Fetch(err.to_string())
    }
}
