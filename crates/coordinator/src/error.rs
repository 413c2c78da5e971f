use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Split planning failed: {0}")]
    Planning(#[from] ringscan_common::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed JSON input: {0}")]
    Json(#[from] serde_json::Error),
}
