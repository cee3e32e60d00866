use http::StatusCode;

/// Failures raised by collaborators of the handler: the patient store, the upload signer, and
/// startup configuration.
#[derive(Debug, thiserror::Error)]
pub enum PatientError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{context}: {message}")]
    Backend {
        context: &'static str,
        message: String,
    },
    #[error("stored patient record is malformed: {0}")]
    MalformedRecord(String),
    #[error("failed to create patient directory: {0}")]
    PatientDirCreation(std::io::Error),
    #[error("failed to write patient file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to read patient file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to remove patient file: {0}")]
    FileRemove(std::io::Error),
    #[error("failed to serialize patient: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize patient: {0}")]
    Deserialization(serde_json::Error),
    #[error("blocking store task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl PatientError {
    /// Wraps an error message reported by a remote backend (store or object storage).
    pub fn backend(context: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Backend {
            context,
            message: err.to_string(),
        }
    }
}

pub type PatientResult<T> = std::result::Result<T, PatientError>;

/// Outcome classification for a single request.
///
/// Every variant maps to exactly one HTTP status code via [`ApiError::status_code`], and its
/// `Display` output is the message placed in the `{"error": ...}` response body.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("Forbidden")]
    Forbidden,
    #[error("Patient not found")]
    NotFound,
    #[error("Unsupported route")]
    UnsupportedRoute,
    #[error("Unsupported method \"{0}\"")]
    UnsupportedMethod(String),
    #[error("{0}")]
    Internal(#[from] PatientError),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::UnsupportedRoute => StatusCode::BAD_REQUEST,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::UnsupportedMethod(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
