use thiserror::Error;

#[derive(Error, Debug)]
pub enum LagscopeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Setup failed: {0}")]
    Setup(String),

    #[error("Scope aggregation failed: {0}")]
    Scope(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("HTTP server error: {0}")]
    Http(String),

    #[error("Export error: {0}")]
    Export(String),
}

pub type Result<T> = std::result::Result<T, LagscopeError>;
