use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum SaveError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Integrity check failed: {0}")]
    Integrity(String),

    #[error("Format error: {0}")]
    Format(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Lock error: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, SaveError>;

impl From<std::io::Error> for SaveError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for SaveError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}
