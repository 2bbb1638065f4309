use thiserror::Error;

/// Errors that can occur while building searches or scanning files.
#[derive(Debug, Error)]
pub enum SearchError {
    /// A search pattern failed to compile.
    #[error("invalid search pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// An invalid search definition (e.g. a sequence with no start).
    #[error("invalid search definition: {0}")]
    InvalidDefinition(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SearchError>;
