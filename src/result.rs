//! Error types and the related `Result<T>`s

use camino::Utf8PathBuf;
use thiserror::Error;

pub type ZipResult<T> = Result<T, ZipError>;

/// Errors from decoding the archive stream
#[derive(Debug, Error)]
pub enum ZipError {
    /// An error from the underlying stream
    #[error("I/O Error")]
    Io(#[from] std::io::Error),

    /// The ZIP archive contained invalid data per the spec.
    #[error("Invalid Zip archive: {0}")]
    InvalidArchive(&'static str),

    /// Decoding a UTF-8 name failed
    #[error("Invalid UTF-8")]
    Encoding(#[from] std::str::Utf8Error),

    /// The ZIP archive uses an unsupported feature
    #[error("Unsupported Zip archive: {0}")]
    UnsupportedArchive(String),

    /// The stream ended before the central directory was reached.
    #[error("Zip archive ended unexpectedly")]
    Truncated,
}

impl ZipError {
    /// Maps an `UnexpectedEof` from the source to [`ZipError::Truncated`]
    /// and unwraps decoding errors that had to travel through `io::Read`,
    /// keeping every other I/O error as-is.
    pub(crate) fn from_read(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            return ZipError::Truncated;
        }
        if !e.get_ref().is_some_and(|inner| inner.is::<ZipError>()) {
            return ZipError::Io(e);
        }
        match e.into_inner().map(|inner| inner.downcast::<ZipError>()) {
            Some(Ok(zip)) => *zip,
            _ => ZipError::InvalidArchive("Unreadable entry data"),
        }
    }
}

pub type ExtractResult<T> = Result<T, ExtractError>;

/// Errors that fail an extraction run
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The input stream broke off or carried malformed data.
    #[error("Couldn't read archive stream")]
    Stream(#[from] ZipError),

    /// Creating or writing something under the destination failed.
    #[error("Couldn't write {path}")]
    Filesystem {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    /// An entry's path would land outside the destination
    /// or on a name the platform reserves.
    #[error("Refusing to extract {path}: {reason}")]
    PathAnomaly { path: String, reason: String },

    /// `run()` was called on a run that already started.
    #[error("Extraction run already started")]
    AlreadyStarted,
}

impl ExtractError {
    pub(crate) fn filesystem<P: Into<Utf8PathBuf>>(path: P, source: std::io::Error) -> Self {
        ExtractError::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn anomaly<P: Into<String>, R: Into<String>>(path: P, reason: R) -> Self {
        ExtractError::PathAnomaly {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
