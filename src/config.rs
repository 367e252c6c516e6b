//! Ingestion settings
//!
//! Every knob has a default matching the behaviour readers of the produced
//! reading units expect, so `IngestConfig::default()` is what most callers want.

/// Length of one synthetic sentence slot in seconds
pub const DEFAULT_SENTENCE_DURATION: f64 = 3.5;

/// Heading-style lines must be shorter than this many characters
pub const DEFAULT_HEADING_MAX_LEN: usize = 100;

/// In-file chapter titles must be shorter than this many characters
pub const DEFAULT_TITLE_MAX_LEN: usize = 200;

/// Number of non-empty lines inspected for `Title:`/`Author:` lines in plain text
pub const DEFAULT_METADATA_SCAN_LINES: usize = 10;

/// Settings of the sentence and chapter segmenter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmenterConfig {
    pub sentence_duration: f64,
    pub heading_max_len: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            sentence_duration: DEFAULT_SENTENCE_DURATION,
            heading_max_len: DEFAULT_HEADING_MAX_LEN,
        }
    }
}

impl SegmenterConfig {
    pub fn with_sentence_duration(mut self, seconds: f64) -> Self {
        self.sentence_duration = seconds;
        self
    }

    pub fn with_heading_max_len(mut self, len: usize) -> Self {
        self.heading_max_len = len;
        self
    }
}

/// Settings of the whole ingestion pipeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IngestConfig {
    pub segmenter: SegmenterConfig,
    pub title_max_len: usize,
    pub metadata_scan_lines: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            segmenter: SegmenterConfig::default(),
            title_max_len: DEFAULT_TITLE_MAX_LEN,
            metadata_scan_lines: DEFAULT_METADATA_SCAN_LINES,
        }
    }
}

impl IngestConfig {
    pub fn with_segmenter(mut self, segmenter: SegmenterConfig) -> Self {
        self.segmenter = segmenter;
        self
    }

    pub fn with_title_max_len(mut self, len: usize) -> Self {
        self.title_max_len = len;
        self
    }

    pub fn with_metadata_scan_lines(mut self, lines: usize) -> Self {
        self.metadata_scan_lines = lines;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IngestConfig::default();

        assert_eq!(config.segmenter.sentence_duration, 3.5);
        assert_eq!(config.segmenter.heading_max_len, 100);
        assert_eq!(config.title_max_len, 200);
        assert_eq!(config.metadata_scan_lines, 10);
    }

    #[test]
    fn test_builder_methods() {
        let config = IngestConfig::default()
            .with_segmenter(
                SegmenterConfig::default()
                    .with_sentence_duration(2.0)
                    .with_heading_max_len(60),
            )
            .with_title_max_len(80)
            .with_metadata_scan_lines(3);

        assert_eq!(config.segmenter.sentence_duration, 2.0);
        assert_eq!(config.segmenter.heading_max_len, 60);
        assert_eq!(config.title_max_len, 80);
        assert_eq!(config.metadata_scan_lines, 3);
    }
}
