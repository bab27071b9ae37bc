use crate::exports::LexError;
use crate::transform::TransformError;
use thiserror::Error;

/// Core error type for hotweb operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{path} not found")]
    NotFound { path: String },

    #[error("failed to build {dst} from {src}: {source}")]
    Transform {
        dst: String,
        src: String,
        #[source]
        source: TransformError,
    },

    #[error("failed to scan exports: {0}")]
    Lex(#[from] LexError),

    #[error("{0}")]
    Other(String),
}

impl Error {
    #[must_use]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Map an IO error for `path`, promoting `NotFound` to [`Error::NotFound`].
    #[must_use]
    pub fn from_io(path: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound {
                path: path.to_string(),
            }
        } else {
            Self::Io(err)
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
