// Error codes used across the annbench crates. Every module-level error enum
// maps onto one of these so the binary can report a stable error kind.
use std::error::Error;

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum ErrorCodes {
    // INVALID_ARGUMENT indicates malformed CLI, JSON or configuration input.
    InvalidArgument = 1,
    // ENGINE indicates the ANN engine rejected the backend or failed to build/query.
    Engine = 2,
    // DATA indicates a dataset or ground-truth file is missing or malformed.
    Data = 3,
    // DEADLINE_EXCEEDED means a bounded operation did not finish in time.
    DeadlineExceeded = 4,
    // IO indicates the result sink could not be written.
    Io = 5,
    // INTERNAL errors are failures of the harness itself (e.g. a background task died).
    Internal = 6,
}

impl ErrorCodes {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCodes::InvalidArgument => "ConfigurationError",
            ErrorCodes::Engine => "EngineError",
            ErrorCodes::Data => "DataError",
            ErrorCodes::DeadlineExceeded => "TimeoutError",
            ErrorCodes::Io => "IoError",
            ErrorCodes::Internal => "InternalError",
        }
    }
}

impl std::fmt::Display for ErrorCodes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

pub trait BenchError: Error + Send + Sync {
    fn code(&self) -> ErrorCodes;
    fn boxed(self) -> Box<dyn BenchError>
    where
        Self: Sized + 'static,
    {
        Box::new(self)
    }
}

impl Error for Box<dyn BenchError> {}

impl BenchError for Box<dyn BenchError> {
    fn code(&self) -> ErrorCodes {
        self.as_ref().code()
    }
}

impl BenchError for std::io::Error {
    fn code(&self) -> ErrorCodes {
        match self.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::InvalidData => ErrorCodes::Data,
            _ => ErrorCodes::Io,
        }
    }
}

/// A message-only error tagged with a code, for call sites that have no
/// richer error type to report.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct CodedError {
    code: ErrorCodes,
    message: String,
}

impl CodedError {
    pub fn new(code: ErrorCodes, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl BenchError for CodedError {
    fn code(&self) -> ErrorCodes {
        self.code
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boxed_error_keeps_code() {
        let err = CodedError::new(ErrorCodes::Engine, "unsupported backend").boxed();
        assert_eq!(err.code(), ErrorCodes::Engine);
        assert_eq!(err.code().name(), "EngineError");
        assert_eq!(err.to_string(), "unsupported backend");
    }

    #[test]
    fn test_io_error_codes() {
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(missing.code(), ErrorCodes::Data);
        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(denied.code(), ErrorCodes::Io);
    }
}
