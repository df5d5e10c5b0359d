use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortError {
    #[error("request to Port failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Port authentication failed: {0}")]
    Auth(String),

    #[error("Port did not acknowledge {what}: {body}")]
    NotAcknowledged { what: String, body: String },

    #[error("invalid response from Port: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("not authenticated with Port")]
    NotAuthenticated,
}

pub type Result<T> = std::result::Result<T, PortError>;
