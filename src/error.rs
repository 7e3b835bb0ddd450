//! Error type shared by the library and the `pta` binary.
//!
//! Every fallible operation returns `Result<T, AppError>`. The error carries a
//! coarse [`ErrorKind`] (what went wrong), a process exit code (how the CLI
//! reports it) and a human-readable message.

use thiserror::Error;

/// Error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// File could not be opened, read or written.
    Io,
    /// Invalid or missing domain parameters / CLI values.
    Config,
    /// Malformed model container, catalog or ASCII sample file.
    Format,
    /// Shape mismatch, non-finite field values, broken references.
    Validation,
    /// Not enough data for the requested operation.
    Value,
}

impl ErrorKind {
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::Io | ErrorKind::Config => 2,
            ErrorKind::Format => 3,
            ErrorKind::Validation => 4,
            ErrorKind::Value => 5,
        }
    }
}

#[derive(Clone, Error)]
#[error("{message}")]
pub struct AppError {
    kind: ErrorKind,
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            exit_code: kind.exit_code(),
            message: message.into(),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn format(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Format, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn value(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Value, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("kind", &self.kind)
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_determines_exit_code() {
        assert_eq!(AppError::config("x").exit_code(), 2);
        assert_eq!(AppError::format("x").exit_code(), 3);
        assert_eq!(AppError::validation("x").exit_code(), 4);
        assert_eq!(AppError::value("x").kind(), ErrorKind::Value);
        assert_eq!(AppError::io("boom").to_string(), "boom");
    }
}
