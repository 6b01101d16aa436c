use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApifyError>;

#[derive(Debug, Error)]
pub enum ApifyError {
    #[error("Apify request failed: {0}")]
    Network(String),

    #[error("Apify returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Failed to decode dataset items: {0}")]
    Decode(String),

    #[error("Actor run exceeded {secs}s")]
    Timeout { secs: u64 },
}

impl ApifyError {
    /// HTTP status behind the error, when there was a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApifyError::Api { status, .. } => Some(*status),
            ApifyError::Timeout { .. } => Some(408),
            ApifyError::Network(_) | ApifyError::Decode(_) => None,
        }
    }
}

impl From<reqwest::Error> for ApifyError {
    fn from(err: reqwest::Error) -> Self {
        ApifyError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ApifyError {
    fn from(err: serde_json::Error) -> Self {
        ApifyError::Decode(err.to_string())
    }
}
