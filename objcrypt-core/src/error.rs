//! objcrypt errors.

use core::fmt;

/// The kind of failure reported by an object store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// The object (or its instruction file) does not exist.
    NotFound,
    /// The requested byte range starts beyond the stored object.
    RangeNotSatisfiable,
    /// Any other transport failure.
    Other,
}

/// A failure reported by the object store, propagated as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageError {
    /// What went wrong.
    pub kind: StorageErrorKind,
    /// Details from the transport.
    pub message: String,
}

impl StorageError {
    /// Create a new [`StorageError`].
    pub fn new(kind: StorageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            StorageErrorKind::NotFound => "not found",
            StorageErrorKind::RangeNotSatisfiable => "range not satisfiable",
            StorageErrorKind::Other => "transport error",
        };
        write!(f, "{kind}: {}", self.message)
    }
}

/// An objcrypt error.
#[derive(Debug)]
pub enum Error {
    /// The request or the stored object needs a mode that is not enabled, or the configuration
    /// itself is invalid.
    ConfigurationRejected(String),
    /// The response describes a stored layout that cannot be decrypted in a single pass.
    UnsupportedLayout(String),
    /// The content metadata is missing or malformed.
    Metadata(String),
    /// The materials manager could not provide decryption materials.
    Materials(String),
    /// The object store failed.
    Storage(StorageError),
    /// The authentication tag did not verify.
    Authentication,
    /// Opaque symmetric decryption error (bad key/IV length, bad padding, truncated ciphertext).
    Symmetric(String),
    /// Serde JSON error.
    Json(serde_json::Error),
    /// Opaque asynchronous IO error from the futures crate.
    FuturesIO(futures::io::Error),
    /// The plaintext stream was cancelled before completion.
    Cancelled,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigurationRejected(s) => write!(f, "configuration rejected: {s}"),
            Self::UnsupportedLayout(s) => write!(f, "unsupported object layout: {s}"),
            Self::Metadata(s) => write!(f, "content metadata error: {s}"),
            Self::Materials(s) => write!(f, "materials error: {s}"),
            Self::Storage(e) => write!(f, "storage error: {e}"),
            Self::Authentication => write!(f, "authentication tag mismatch"),
            Self::Symmetric(s) => write!(f, "symmetric decryption error: {s}"),
            Self::Json(e) => write!(f, "JSON error: {e}"),
            Self::FuturesIO(e) => write!(f, "futures IO error: {e}"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Json(e) => Some(e),
            Self::FuturesIO(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<futures::io::Error> for Error {
    fn from(e: futures::io::Error) -> Self {
        Self::FuturesIO(e)
    }
}

impl From<base64ct::Error> for Error {
    fn from(e: base64ct::Error) -> Self {
        Self::Metadata(format!("invalid base64: {e}"))
    }
}

impl From<aead::Error> for Error {
    fn from(_: aead::Error) -> Self {
        Self::Authentication
    }
}

impl From<aes::cipher::InvalidLength> for Error {
    fn from(_: aes::cipher::InvalidLength) -> Self {
        Self::Symmetric("invalid key or IV length".to_string())
    }
}
