/// Failures outside of a comparison: configuration, setup, I/O.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("config error: {0}")]
    Config(String),
    #[error("setup failed: {0}")]
    Setup(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
