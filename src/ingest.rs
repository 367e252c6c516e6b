//! Ingestion pipeline
//!
//! Chains the stages of the crate: package reading, metadata and navigation
//! resolution, content extraction, chapter marker injection, normalization and
//! segmentation. Stage failures that have a sensible fallback are logged and
//! replaced by that fallback; only an unreadable package, missing required
//! input or an input file that cannot be read reach the caller.
//!
//! ## Usage
//!
//! ```rust, no_run
//! # use lib_booksync::ingest::Ingestor;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ingestor = Ingestor::default();
//! let book = ingestor.ingest_file("path/to/book.epub")?;
//!
//! for sentence in &book.unit.sentences {
//!     println!("{:>7.1}s {}", sentence.start, sentence.text);
//! }
//! # Ok(())
//! # }
//! ```

use std::{
    fs,
    io::{Read, Seek},
    path::Path,
    sync::LazyLock,
};

use log::{debug, info, warn};
use regex::Regex;

use crate::{
    config::IngestConfig,
    content::{content_files, extract_sections, inject_chapter_markers},
    epub::{resolve_metadata, resolve_navigation},
    error::IngestError,
    package::Package,
    segment::Segmenter,
    text::normalize,
    types::{Book, BookDraft, NavEntry, PackageMetadata},
    utils::DecodeBytes,
};

/// Author of a book that names none
pub const DEFAULT_AUTHOR: &str = "Unknown Author";

/// Local file header signature of a zip container
const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";

static TITLE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^title:\s*").expect("valid title line pattern"));

static AUTHOR_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(author|by):\s*").expect("valid author line pattern"));

static BY_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^by\s+").expect("valid by line pattern"));

/// Derives a book title from a file name
///
/// The extension is removed and dashes and underscores become spaces.
pub fn title_from_file_name(file_name: &str) -> String {
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());

    stem.replace(['-', '_'], " ").trim().to_string()
}

/// Looks for `Title:`, `Author:`, `By:` and `by <name>` lines at the top of a text
///
/// Only the first `max_lines` non-empty lines are inspected; a later match
/// overrides an earlier one.
fn scan_text_metadata(text: &str, max_lines: usize) -> (Option<String>, Option<String>) {
    let mut title = None;
    let mut author = None;

    let lines = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(max_lines);

    for line in lines {
        let value = |pattern: &Regex| {
            let value = pattern.replace(line, "").trim().to_string();
            (!value.is_empty()).then_some(value)
        };

        if TITLE_LINE.is_match(line) {
            title = value(&TITLE_LINE).or(title);
        } else if AUTHOR_LINE.is_match(line) {
            author = value(&AUTHOR_LINE).or(author);
        } else if BY_LINE.is_match(line) {
            author = value(&BY_LINE).or(author);
        }
    }

    (title, author)
}

/// Turns packages and plain text into books
///
/// An `Ingestor` holds nothing but its configuration, so one instance can be
/// shared between threads and used for any number of independent requests.
#[derive(Debug, Clone, Default)]
pub struct Ingestor {
    config: IngestConfig,
}

impl Ingestor {
    pub fn new(config: IngestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Ingests a package held in memory
    ///
    /// # Parameters
    /// - `bytes`: The package data
    /// - `file_name`: The name of the uploaded file, used for the title fallback
    ///
    /// # Return
    /// - `Ok(BookDraft)`: Title, author and the chapter-annotated text of the package
    /// - `Err(IngestError::CorruptArchive)`: The data is not a readable package
    pub fn ingest_package_bytes(
        &self,
        bytes: impl Into<Vec<u8>>,
        file_name: &str,
    ) -> Result<BookDraft, IngestError> {
        let package = Package::from_bytes(bytes)?;
        self.ingest_package(package, file_name)
    }

    /// Ingests an opened package
    ///
    /// A package without a usable package document is read in sorted file
    /// order without a title; a package without navigation takes its chapter
    /// titles from the headings of its content files.
    pub fn ingest_package<R: Read + Seek>(
        &self,
        mut package: Package<R>,
        file_name: &str,
    ) -> Result<BookDraft, IngestError> {
        let metadata = self.metadata_stage(&mut package)?;
        let nav = self.navigation_stage(&mut package)?;

        let spine = metadata
            .as_ref()
            .and_then(|metadata| metadata.spine_order.as_ref());
        let files = content_files(spine, package.entries());
        debug!("Processing {} content files", files.len());

        let sections = extract_sections(&mut package, &files, &nav, &self.config)?;
        let text = inject_chapter_markers(&sections);

        let (title, author) = metadata
            .map(|metadata| (metadata.title, metadata.author))
            .unwrap_or_default();

        Ok(BookDraft {
            title: title.unwrap_or_else(|| title_from_file_name(file_name)),
            author,
            text,
        })
    }

    fn metadata_stage<R: Read + Seek>(
        &self,
        package: &mut Package<R>,
    ) -> Result<Option<PackageMetadata>, IngestError> {
        match resolve_metadata(package) {
            Ok(metadata) => Ok(Some(metadata)),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                warn!("{}", err);
                Ok(None)
            }
        }
    }

    fn navigation_stage<R: Read + Seek>(
        &self,
        package: &mut Package<R>,
    ) -> Result<Vec<NavEntry>, IngestError> {
        match resolve_navigation(package) {
            Ok(nav) => Ok(nav),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                warn!("{}", err);
                Ok(Vec::new())
            }
        }
    }

    /// Prepares plain text for building
    ///
    /// Title and author are taken from `Title:`/`Author:`/`By` lines at the top
    /// of the text when present; the title otherwise falls back to the file name.
    pub fn draft_from_text(&self, text: &str, file_name: &str) -> BookDraft {
        let (title, author) = scan_text_metadata(text, self.config.metadata_scan_lines);

        BookDraft {
            title: title.unwrap_or_else(|| title_from_file_name(file_name)),
            author,
            text: text.to_string(),
        }
    }

    /// Reads a file into a draft
    ///
    /// Files with an `.epub` extension or a zip signature are read as packages,
    /// anything else as plain text.
    pub fn draft_file<P: AsRef<Path>>(&self, path: P) -> Result<BookDraft, IngestError> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let is_epub = path
            .extension()
            .is_some_and(|extension| extension.eq_ignore_ascii_case("epub"));
        if is_epub {
            return self.ingest_package(Package::open(path)?, &file_name);
        }

        let bytes = fs::read(path)?;
        if bytes.starts_with(ZIP_SIGNATURE) {
            return self.ingest_package_bytes(bytes, &file_name);
        }

        let text = match bytes.decode() {
            Ok(text) => {
                if text.contains('\u{FFFD}') {
                    warn!("\"{}\" is not valid UTF-8, invalid data was replaced.", file_name);
                }
                text
            }
            Err(IngestError::EmptyDataError) => String::new(),
            Err(err) => {
                warn!("Failed to decode \"{}\" ({}), replacing invalid data.", file_name, err);
                String::from_utf8_lossy(&bytes).into_owned()
            }
        };

        Ok(self.draft_from_text(&text, &file_name))
    }

    /// Reads and builds a book from a file
    pub fn ingest_file<P: AsRef<Path>>(&self, path: P) -> Result<Book, IngestError> {
        let draft = self.draft_file(path)?;
        self.build(draft)
    }

    /// Ingests plain text in one step
    pub fn ingest_text(&self, text: &str, file_name: &str) -> Result<Book, IngestError> {
        self.build(self.draft_from_text(text, file_name))
    }

    /// Normalizes and segments a draft into a book
    ///
    /// # Return
    /// - `Ok(Book)`: The segmented book, the author defaults to [DEFAULT_AUTHOR]
    /// - `Err(IngestError::EmptyInput)`: The title or the text is empty
    pub fn build(&self, draft: BookDraft) -> Result<Book, IngestError> {
        let title = draft.title.trim();
        if title.is_empty() {
            return Err(IngestError::EmptyInput {
                field: "title".to_string(),
            });
        }

        let text = normalize(&draft.text);
        if text.is_empty() {
            return Err(IngestError::EmptyInput {
                field: "text".to_string(),
            });
        }

        let unit = Segmenter::new(self.config.segmenter).segment(&text);
        info!(
            "Ingested \"{}\": {} sentences, {} chapters",
            title,
            unit.sentences.len(),
            unit.chapters.as_ref().map_or(0, Vec::len)
        );

        Ok(Book {
            title: title.to_string(),
            author: draft
                .author
                .map(|author| author.trim().to_string())
                .filter(|author| !author.is_empty())
                .unwrap_or_else(|| DEFAULT_AUTHOR.to_string()),
            unit,
        })
    }
}
