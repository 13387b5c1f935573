use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaggingError {
    /// Rule set rejected by the compiler. Every problem is listed.
    #[error("rule validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("tag catalog error: {0}")]
    Catalog(String),

    #[error("tagger state lock poisoned")]
    LockPoisoned,
}

impl TaggingError {
    /// Validation messages, if this is a validation failure.
    pub fn validation_errors(&self) -> Option<&[String]> {
        match self {
            TaggingError::Validation(errs) => Some(errs),
            _ => None,
        }
    }
}
