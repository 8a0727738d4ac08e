pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("missing requestId")]
    MissingRequestId,

    #[error("missing method or url")]
    MissingMethodOrUrl,

    #[error("invalid load test config: {0}")]
    InvalidConfig(#[from] serde_json::Error),

    #[error("a load test with requestId `{0}` is already running")]
    DuplicateRequestId(String),
}
