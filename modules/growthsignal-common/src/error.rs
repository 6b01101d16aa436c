use thiserror::Error;

pub type Result<T> = std::result::Result<T, ListenerError>;

#[derive(Error, Debug)]
pub enum ListenerError {
    /// A mandatory integration has no usable key. Fatal for that platform only.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Credentials error: {0}")]
    Credentials(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for ListenerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ListenerError::Parse(err.to_string())
        } else {
            ListenerError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ListenerError {
    fn from(err: serde_json::Error) -> Self {
        ListenerError::Parse(err.to_string())
    }
}
