use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Error code shared by every layer of the stack.
///
/// The discriminant is stable and small so it can travel as a plain integer
/// (see [`FsErrorKind::code`]).
#[derive(Error, Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
#[non_exhaustive]
pub enum FsErrorKind {
    /// The requested file or directory could not be found
    #[error("entity not found")]
    NotFound = 1,
    /// The path is malformed or escapes its root
    #[error("invalid path")]
    InvalidPath = 2,
    /// Invalid data was found in a file or directory entry
    #[error("invalid data")]
    InvalidData = 3,
    /// The backend does not provide this capability
    #[error("operation not supported")]
    Unsupported = 4,
    /// An allocation failed
    #[error("out of memory")]
    NoMemory = 5,
    /// Something failed when doing IO. These errors can generally not be handled.
    #[error("io error")]
    Io = 6,
    /// An argument was out of range or inconsistent
    #[error("invalid input")]
    InvalidInput = 7,
    /// Expected a directory but found something else
    #[error("not a directory")]
    NotADirectory = 8,
    /// Expected a file but found a directory
    #[error("is a directory")]
    IsADirectory = 9,
}

impl FsErrorKind {
    /// The integer error code.
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => Self::NotFound,
            2 => Self::InvalidPath,
            3 => Self::InvalidData,
            4 => Self::Unsupported,
            5 => Self::NoMemory,
            6 => Self::Io,
            7 => Self::InvalidInput,
            8 => Self::NotADirectory,
            9 => Self::IsADirectory,
            _ => return None,
        })
    }

    /// Stable name for logging.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::InvalidPath => "invalid_path",
            Self::InvalidData => "invalid_data",
            Self::Unsupported => "unsupported",
            Self::NoMemory => "no_memory",
            Self::Io => "io",
            Self::InvalidInput => "invalid_input",
            Self::NotADirectory => "not_a_directory",
            Self::IsADirectory => "is_a_directory",
        }
    }

    /// Errors that mean "try the next candidate" during mount resolution.
    pub const fn is_soft(self) -> bool {
        matches!(self, Self::NotFound | Self::Unsupported)
    }
}

impl From<io::ErrorKind> for FsErrorKind {
    fn from(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::NotFound => FsErrorKind::NotFound,
            io::ErrorKind::InvalidData => FsErrorKind::InvalidData,
            io::ErrorKind::InvalidInput => FsErrorKind::InvalidInput,
            io::ErrorKind::Unsupported => FsErrorKind::Unsupported,
            io::ErrorKind::OutOfMemory => FsErrorKind::NoMemory,
            io::ErrorKind::NotADirectory => FsErrorKind::NotADirectory,
            io::ErrorKind::IsADirectory => FsErrorKind::IsADirectory,
            _ => FsErrorKind::Io,
        }
    }
}

/// An error kind plus the operation that produced it.
#[derive(Error, Clone, Debug)]
#[error("{context}: {kind}")]
pub struct FsError {
    kind: FsErrorKind,
    context: &'static str,
    #[source]
    source: Option<Arc<io::Error>>,
}

impl FsError {
    pub fn new(kind: FsErrorKind, context: &'static str) -> Self {
        Self {
            kind,
            context,
            source: None,
        }
    }

    pub fn with_source(kind: FsErrorKind, context: &'static str, source: io::Error) -> Self {
        Self {
            kind,
            context,
            source: Some(Arc::new(source)),
        }
    }

    /// Wraps an OS error, deriving the kind from [`io::ErrorKind`].
    pub fn io(context: &'static str, source: io::Error) -> Self {
        Self::with_source(source.kind().into(), context, source)
    }

    pub fn not_found(context: &'static str) -> Self {
        Self::new(FsErrorKind::NotFound, context)
    }

    pub fn unsupported(context: &'static str) -> Self {
        Self::new(FsErrorKind::Unsupported, context)
    }

    pub fn kind(&self) -> FsErrorKind {
        self.kind
    }

    pub fn context(&self) -> &'static str {
        self.context
    }

    pub fn code(&self) -> u8 {
        self.kind.code()
    }
}

impl From<FsError> for io::Error {
    fn from(err: FsError) -> Self {
        let kind = match err.kind {
            FsErrorKind::NotFound => io::ErrorKind::NotFound,
            FsErrorKind::InvalidData => io::ErrorKind::InvalidData,
            FsErrorKind::InvalidInput | FsErrorKind::InvalidPath => io::ErrorKind::InvalidInput,
            FsErrorKind::Unsupported => io::ErrorKind::Unsupported,
            FsErrorKind::NoMemory => io::ErrorKind::OutOfMemory,
            FsErrorKind::NotADirectory => io::ErrorKind::NotADirectory,
            FsErrorKind::IsADirectory => io::ErrorKind::IsADirectory,
            FsErrorKind::Io => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

pub type FsResult<T> = Result<T, FsError>;

pub(crate) fn io_result<T>(context: &'static str, result: io::Result<T>) -> FsResult<T> {
    result.map_err(|err| FsError::io(context, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_integers() {
        for code in 0..=u8::MAX {
            if let Some(kind) = FsErrorKind::from_code(code) {
                assert_eq!(kind.code(), code);
            }
        }
        assert_eq!(FsErrorKind::from_code(0), None);
        assert_eq!(FsErrorKind::NotFound.code(), 1);
    }

    #[test]
    fn io_errors_keep_their_kind() {
        let err = FsError::io(
            "test.open",
            io::Error::new(io::ErrorKind::NotFound, "missing"),
        );
        assert_eq!(err.kind(), FsErrorKind::NotFound);
        assert_eq!(err.context(), "test.open");
        assert_eq!(err.to_string(), "test.open: entity not found");

        let back: io::Error = err.into();
        assert_eq!(back.kind(), io::ErrorKind::NotFound);
    }
}
