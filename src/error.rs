use std::fmt::{self, Debug};

use thiserror::Error;

#[derive(Error)]
pub enum Error {
    #[error("battery state unavailable - {0}")]
    Unavailable(String),

    #[error("operation not implemented - `{0}`")]
    NotImplemented(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid byte at {position:#x} (expected {expected}, got {actual})")]
    Parse { expected: &'static str, position: usize, actual: u8 },

    #[error("invalid frame length (expected {expected}, got {actual})")]
    Length { expected: usize, actual: usize },
}

impl Error {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Error::Unavailable(reason.into())
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
