use reqwest::StatusCode;

// --- ERROR HANDLING ---

#[derive(Debug, thiserror::Error)]
pub enum IgiturError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("{context}: {status}, {body}")]
    Remote {
        context: String,
        status: StatusCode,
        body: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Filesystem error: {0}")]
    Filesystem(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl IgiturError {
    pub fn remote(context: impl Into<String>, status: StatusCode, body: impl Into<String>) -> Self {
        IgiturError::Remote {
            context: context.into(),
            status,
            body: body.into(),
        }
    }

    /// HTTP status of a `Remote` error.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            IgiturError::Remote { status, .. } => Some(*status),
            IgiturError::Network(e) => e.status(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, IgiturError>;
