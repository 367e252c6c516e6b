//! Booksync library
//!
//! A Rust library that turns a book, supplied either as an EPUB-style zip
//! package or as plain text, into a reading unit: an ordered list of sentences,
//! an optional list of chapters and a synthetic timeline that gives every
//! sentence the same fixed slot.
//!
//! ## Features
//!
//! - Tolerant package reading: books without a package document, a spine or a
//!   navigation document are still read, falling back to sorted content files
//!   and in-file headings.
//! - Chapter titles from the navigation document, the legacy NCX table of
//!   contents or the headings of each content file.
//! - Chapter detection in plain text from `[[CHAPTER:<title>]]` sentinel lines or
//!   heading-style lines such as `Chapter 3: The Storm`.
//!
//! ## Quick Start
//!
//! ### Ingest a book file
//!
//! ```rust, no_run
//! # use lib_booksync::Ingestor;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let book = Ingestor::default().ingest_file("path/to/book.epub")?;
//!
//! println!("{} by {}", book.title, book.author);
//! for chapter in book.unit.chapters.iter().flatten() {
//!     println!("{:>3} {} (from {:.1}s)", chapter.id, chapter.title, chapter.start_time);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Segment text
//!
//! ```rust
//! # use lib_booksync::segment::segment;
//! let unit = segment("[[CHAPTER:One]]\nIt begins. It ends.");
//!
//! assert_eq!(unit.sentences.len(), 2);
//! assert_eq!(unit.sentences[1].start, 3.5);
//! ```
//!
//! ## Feature flags
//!
//! - `serde`: Derives `Serialize` and `Deserialize` for the output types.
//! - `cli`: Builds the `booksync` command line tool, which prints an ingested
//!   book as JSON. Enabling this feature turns on the `serde` feature.

pub(crate) mod utils;

pub mod config;
pub mod content;
pub mod epub;
pub mod error;
pub mod ingest;
pub mod package;
pub mod segment;
pub mod text;
pub mod types;

#[cfg(test)]
mod test_support;

pub use config::{IngestConfig, SegmenterConfig};
pub use error::IngestError;
pub use ingest::Ingestor;
pub use package::Package;
pub use types::{Book, BookDraft, Chapter, ReadingUnit, Sentence};
pub use utils::DecodeBytes;
