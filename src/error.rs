//! Error Type Definition Module
//!
//! This module defines the error types that may be encountered while ingesting
//! a book. All errors are uniformly wrapped in the `IngestError` enumeration.
//!
//! Three kinds of errors reach the caller of the pipeline: an unreadable
//! package ([IngestError::CorruptArchive]), missing required input
//! ([IngestError::EmptyInput]) and an input file that cannot be opened or read
//! ([IngestError::IOError]). [IngestError::is_fatal] is true for exactly these.
//! Every other variant is produced by an individual stage and replaced by a
//! fallback value before the next stage runs.

use thiserror::Error;

/// Types of errors that can occur during book ingestion
#[derive(Debug, Error)]
pub enum IngestError {
    /// The package could not be opened or one of its entries could not be read
    ///
    /// This is the only fatal error produced by the package pipeline.
    #[error(
        "Corrupt archive: {source}. Please try a different file or provide the text as plain text instead."
    )]
    CorruptArchive { source: zip::result::ZipError },

    /// Data Decoding Error - Null data
    ///
    /// This error occurs when trying to decode an empty stream.
    #[error("Decode error: The data is empty.")]
    EmptyDataError,

    /// Required input is missing
    ///
    /// Raised before the pipeline runs when the book title or text is empty.
    #[error("Empty input: The book {field} must not be empty.")]
    EmptyInput { field: String },

    /// The requested entry does not exist in the package
    #[error("Entry not found: Unable to find \"{path}\" in the package.")]
    EntryNotFound { path: String },

    /// XML parsing failure error
    ///
    /// The event stream ended without ever closing a root element.
    #[error(
        "Failed parsing XML error: Unknown problems occurred during XML parsing, causing parsing failure."
    )]
    FailedParsingXml,

    /// An input file could not be opened or read
    #[error("IO error: {source}")]
    IOError { source: std::io::Error },

    /// No package manifest document could be used
    #[error("Missing metadata: {reason}")]
    MissingMetadata { reason: String },

    /// No navigation document or legacy table of contents could be used
    #[error("Missing navigation: {reason}")]
    MissingNavigation { reason: String },

    /// QuickXml error
    ///
    /// This error occurs when parsing XML data using the QuickXml library.
    #[error("QuickXml error: {source}")]
    QuickXmlError { source: quick_xml::Error },

    /// A spine reference does not name any manifest item
    #[error("Unresolved spine item: There is no manifest item with id \"{idref}\".")]
    UnresolvedSpineItem { idref: String },

    /// UTF-8 decoding error
    #[error("Decode error: {source}")]
    Utf8DecodeError { source: std::string::FromUtf8Error },

    /// UTF-16 decoding error
    #[error("Decode error: {source}")]
    Utf16DecodeError { source: std::string::FromUtf16Error },
}

impl IngestError {
    /// Whether this error must abort the whole ingestion
    ///
    /// Non-fatal errors are swallowed by the stage that produced them and
    /// replaced by a fallback value.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IngestError::CorruptArchive { .. }
                | IngestError::EmptyInput { .. }
                | IngestError::IOError { .. }
        )
    }
}

impl From<zip::result::ZipError> for IngestError {
    fn from(value: zip::result::ZipError) -> Self {
        match value {
            zip::result::ZipError::Io(source) => IngestError::IOError { source },
            source => IngestError::CorruptArchive { source },
        }
    }
}

impl From<quick_xml::Error> for IngestError {
    fn from(value: quick_xml::Error) -> Self {
        IngestError::QuickXmlError { source: value }
    }
}

impl From<std::io::Error> for IngestError {
    fn from(value: std::io::Error) -> Self {
        IngestError::IOError { source: value }
    }
}

impl From<std::string::FromUtf8Error> for IngestError {
    fn from(value: std::string::FromUtf8Error) -> Self {
        IngestError::Utf8DecodeError { source: value }
    }
}

impl From<std::string::FromUtf16Error> for IngestError {
    fn from(value: std::string::FromUtf16Error) -> Self {
        IngestError::Utf16DecodeError { source: value }
    }
}

#[cfg(test)]
impl PartialEq for IngestError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::EmptyInput { field: l_field }, Self::EmptyInput { field: r_field }) => {
                l_field == r_field
            }
            (Self::EntryNotFound { path: l_path }, Self::EntryNotFound { path: r_path }) => {
                l_path == r_path
            }
            (
                Self::UnresolvedSpineItem { idref: l_idref },
                Self::UnresolvedSpineItem { idref: r_idref },
            ) => l_idref == r_idref,
            (
                Self::Utf8DecodeError { source: l_source },
                Self::Utf8DecodeError { source: r_source },
            ) => l_source == r_source,

            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::IngestError;

    #[test]
    fn test_fatal_errors() {
        assert!(
            IngestError::EmptyInput {
                field: "title".to_string()
            }
            .is_fatal()
        );
        assert!(IngestError::from(zip::result::ZipError::InvalidArchive("bad".into())).is_fatal());
        assert!(IngestError::from(std::io::Error::other("unreadable")).is_fatal());

        assert!(
            !IngestError::MissingNavigation {
                reason: "none".to_string()
            }
            .is_fatal()
        );
        assert!(
            !IngestError::UnresolvedSpineItem {
                idref: "c1".to_string()
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_corrupt_archive_suggests_plain_text() {
        let err = IngestError::from(zip::result::ZipError::InvalidArchive("bad".into()));
        assert!(err.to_string().contains("plain text"));
    }
}
