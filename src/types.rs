use indexmap::IndexMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Mapping from manifest item id to the href declared for it
///
/// Declaration order is preserved so that the table reads like the package
/// document it was built from.
pub type ManifestTable = IndexMap<String, String>;

/// Ordered list of content paths, relative to the package root
pub type SpineOrder = Vec<String>;

/// Information recovered from the package manifest document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackageMetadata {
    /// The path of the manifest document inside the package
    pub manifest_path: String,

    /// Text of the first title element, whitespace collapsed
    pub title: Option<String>,

    /// Text of the first creator element, whitespace collapsed
    pub author: Option<String>,

    pub manifest: ManifestTable,

    /// The declared reading order, resolved to existing entries
    ///
    /// `None` when the package has no spine or when none of its items
    /// resolve to a real entry.
    pub spine_order: Option<SpineOrder>,
}

/// The kind of document chapter titles are read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavKind {
    /// An EPUB 3 navigation document (`*nav.xhtml`, `*nav.html`)
    Navigation,

    /// An EPUB 2 NCX table of contents (`*.ncx`)
    Legacy,
}

/// The single navigation source chosen for a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavSource {
    pub kind: NavKind,
    pub path: String,
}

/// A chapter title and the content document it points to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavEntry {
    /// Href with the fragment and leading `./`, `/` removed
    pub content_path: String,
    pub title: String,
}

impl NavEntry {
    /// The path component after the last separator
    pub fn file_name(&self) -> &str {
        file_name(&self.content_path)
    }

    /// Whether this entry points at the content file `path`
    ///
    /// Entries match by exact path or by file name, never by prefix.
    pub fn matches(&self, path: &str) -> bool {
        self.content_path == path || self.file_name() == file_name(path)
    }
}

/// One processed content file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSection {
    pub path: String,

    /// The chapter title for this file, resolved or generic
    pub title: Option<String>,

    /// Plain text of the file
    pub text: String,
}

/// A chapter of a reading unit
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Chapter {
    /// Chapter ids start at 1 and increase in first-seen order
    pub id: usize,
    pub title: String,

    /// Id of the first sentence that belongs to this chapter
    pub start_sentence_id: usize,

    /// Synthetic start time in seconds
    pub start_time: f64,
}

/// A sentence of a reading unit
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Sentence {
    /// Sentence ids are contiguous and start at 1
    pub id: usize,

    /// Trimmed, never empty
    pub text: String,

    pub start: f64,
    pub end: f64,

    /// Id of the chapter this sentence belongs to
    pub chapter: Option<usize>,
}

/// The structured output of the pipeline
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReadingUnit {
    pub sentences: Vec<Sentence>,

    /// `None` exactly when no chapter boundary was detected
    pub chapters: Option<Vec<Chapter>>,
}

impl ReadingUnit {
    /// Returns the chapter with the given id
    pub fn chapter(&self, id: usize) -> Option<&Chapter> {
        self.chapters
            .as_ref()
            .and_then(|chapters| chapters.iter().find(|chapter| chapter.id == id))
    }

    /// Returns the chapter a sentence belongs to
    pub fn chapter_of(&self, sentence: &Sentence) -> Option<&Chapter> {
        sentence.chapter.and_then(|id| self.chapter(id))
    }

    /// Returns the sentence whose `[start, end)` range contains `seconds`
    pub fn sentence_at(&self, seconds: f64) -> Option<&Sentence> {
        self.sentences
            .iter()
            .find(|sentence| seconds >= sentence.start && seconds < sentence.end)
    }

    /// Total length of the synthetic timeline in seconds
    pub fn duration(&self) -> f64 {
        self.sentences.last().map_or(0.0, |sentence| sentence.end)
    }

    /// Whether the unit has no chapter structure
    pub fn is_flat(&self) -> bool {
        self.chapters.is_none()
    }
}

/// Title, author and text collected for a book before segmentation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookDraft {
    pub title: String,
    pub author: Option<String>,

    /// The text to segment, possibly containing chapter sentinel lines
    pub text: String,
}

/// A fully ingested book
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Book {
    pub title: String,
    pub author: String,

    #[cfg_attr(feature = "serde", serde(flatten))]
    pub unit: ReadingUnit,
}

/// The path component after the last `/`
pub(crate) fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
