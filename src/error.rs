//! Error types for reading MusicXML.
//!
//! Missing elements are never errors; the mapper fills in defaults. What
//! does surface here is a document that cannot be parsed at all, a strict
//! field whose text cannot be converted, or a failure while loading the
//! bytes (file, UTF-8, MXL archive).

use std::path::PathBuf;

use thiserror::Error;

/// Result type for MusicXML reading operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading or mapping a MusicXML document
#[derive(Debug, Error)]
pub enum Error {
    /// The XML layer could not produce a tree
    #[error("Malformed MusicXML document: {0}")]
    MalformedDocument(#[from] roxmltree::Error),

    /// A strict field contains text that is not a valid value of its type
    #[error("Invalid value {value:?} in <{element}>: {reason}")]
    Conversion {
        element: &'static str,
        value: String,
        reason: String,
    },

    /// The file could not be read
    #[error("Failed to read file '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Uncompressed MusicXML bytes that are not UTF-8
    #[error("Invalid UTF-8 in MusicXML file: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// The MXL container could not be opened or read
    #[error("MXL archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// The MXL container has no usable MusicXML root file
    #[error("No MusicXML root file in archive: {0}")]
    MissingRootFile(String),
}

impl Error {
    pub(crate) fn conversion(
        element: &'static str,
        value: &str,
        reason: impl ToString,
    ) -> Self {
        Error::Conversion {
            element,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error came from a strict field conversion.
    pub fn is_conversion(&self) -> bool {
        matches!(self, Error::Conversion { .. })
    }
}
