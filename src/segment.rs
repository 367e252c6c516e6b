//! Sentence and chapter segmentation
//!
//! A line-oriented state machine over normalized text. Chapter boundaries come
//! from sentinel lines (`[[CHAPTER:<title>]]`) or, in documents without any
//! sentinel, from heading-style lines such as `Chapter 3: The Storm`. Every
//! other line is accumulated and split into sentences on terminal punctuation
//! whenever a boundary is reached.
//!
//! Sentences are placed on a synthetic timeline where each one occupies the same
//! fixed slot. The split is a plain punctuation heuristic, so abbreviations such
//! as "Mr." end a sentence.

use std::sync::LazyLock;

use log::debug;
use regex::Regex;

use crate::{
    config::SegmenterConfig,
    types::{Chapter, ReadingUnit, Sentence},
    utils::NormalizeWhitespace,
};

static SENTINEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*\[\[CHAPTER:(.+?)\]\]\s*$").expect("valid sentinel pattern")
});

static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(chapter|ch\.?|section|part|prologue|epilogue|introduction|preface)(?:\s*(\d+)|\s+([ivxlcdm]+))?(?:\s*:\s*|\s+|$)(.*)$",
    )
    .expect("valid heading pattern")
});

static SENTENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^.!?]+[.!?]+").expect("valid sentence pattern"));

/// Formats the sentinel line marking the start of a chapter
pub fn chapter_sentinel(title: &str) -> String {
    format!("[[CHAPTER:{}]]", title.normalize_whitespace())
}

/// Returns the chapter title of a sentinel line
///
/// The title is everything between the delimiters, surrounding spaces included.
pub fn parse_sentinel(line: &str) -> Option<String> {
    SENTINEL
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|title| title.as_str().to_string())
}

/// Returns the chapter title of a heading-style line
///
/// The line must be shorter than `max_len` characters and start with a chapter
/// keyword that is followed by a numeral, whitespace, a colon or nothing at all.
/// The title joins the keyword, the numeral and any trailing text with single spaces.
pub fn parse_heading(line: &str, max_len: usize) -> Option<String> {
    let line = line.trim();
    if line.chars().count() >= max_len {
        return None;
    }

    let caps = HEADING.captures(line)?;
    let title = [1, 2, 3, 4]
        .iter()
        .filter_map(|&group| caps.get(group))
        .map(|part| part.as_str().trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    Some(title)
}

/// Splits text into sentences on runs of terminal punctuation
///
/// Text after the last terminal punctuation mark is dropped.
pub fn split_sentences(text: &str) -> impl Iterator<Item = &str> {
    SENTENCE
        .find_iter(text)
        .map(|candidate| candidate.as_str().trim())
        .filter(|candidate| !candidate.is_empty())
}

/// Running state of one segmentation
struct SegmentState {
    sentence_duration: f64,
    sentences: Vec<Sentence>,
    chapters: Vec<Chapter>,
    current_chapter: Option<usize>,
    pending: String,
    clock: f64,
}

impl SegmentState {
    fn new(sentence_duration: f64) -> Self {
        Self {
            sentence_duration,
            sentences: Vec::new(),
            chapters: Vec::new(),
            current_chapter: None,
            pending: String::new(),
            clock: 0.0,
        }
    }

    fn next_sentence_id(&self) -> usize {
        self.sentences.len() + 1
    }

    /// Turns the accumulated text into sentences
    fn flush(&mut self) {
        let pending = std::mem::take(&mut self.pending);

        for text in split_sentences(&pending) {
            let start = self.clock;
            let end = start + self.sentence_duration;

            self.sentences.push(Sentence {
                id: self.next_sentence_id(),
                text: text.to_string(),
                start,
                end,
                chapter: self.current_chapter,
            });
            self.clock = end;
        }
    }

    fn open_chapter(&mut self, title: String) {
        self.flush();

        let id = self.chapters.len() + 1;
        self.chapters.push(Chapter {
            id,
            title,
            start_sentence_id: self.next_sentence_id(),
            start_time: self.clock,
        });
        self.current_chapter = Some(id);
    }

    fn push_line(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }

        self.pending.push_str(line);
        self.pending.push(' ');
    }

    fn finish(mut self) -> ReadingUnit {
        self.flush();

        ReadingUnit {
            sentences: self.sentences,
            chapters: (!self.chapters.is_empty()).then_some(self.chapters),
        }
    }
}

/// Splits normalized text into a [ReadingUnit]
#[derive(Debug, Clone, Copy, Default)]
pub struct Segmenter {
    config: SegmenterConfig,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Segments text into sentences and chapters
    ///
    /// Heading-style lines are only recognised when the text contains no
    /// sentinel line, so injected boundaries are never doubled by the headings
    /// that follow them.
    pub fn segment(&self, text: &str) -> ReadingUnit {
        let headings = !text.lines().any(|line| SENTINEL.is_match(line));
        let mut state = SegmentState::new(self.config.sentence_duration);

        for line in text.lines().map(str::trim) {
            if let Some(title) = parse_sentinel(line) {
                state.open_chapter(title);
                continue;
            }

            if headings {
                if let Some(title) = parse_heading(line, self.config.heading_max_len) {
                    state.open_chapter(title);
                    continue;
                }
            }

            state.push_line(line);
        }

        let unit = state.finish();
        debug!(
            "Segmented {} sentences in {} chapters",
            unit.sentences.len(),
            unit.chapters.as_ref().map_or(0, Vec::len)
        );

        unit
    }
}

/// Segments text with the default settings
pub fn segment(text: &str) -> ReadingUnit {
    Segmenter::default().segment(text)
}
