//! Content extraction and chapter marker injection
//!
//! Turns the content documents of a package into plain-text sections, each with
//! an optional chapter title, and concatenates them into one text stream where
//! every chapter boundary is a sentinel line the segmenter understands.

use std::{
    collections::BTreeSet,
    io::{Read, Seek},
    sync::LazyLock,
};

use log::{debug, warn};
use regex::Regex;

use crate::{
    config::IngestConfig,
    error::IngestError,
    package::Package,
    segment::chapter_sentinel,
    text::{decode_html_entities, strip_tags},
    types::{ContentSection, NavEntry, SpineOrder},
    utils::{NormalizeWhitespace, XmlElement, XmlReader},
};

const CONTENT_EXTENSIONS: [&str; 3] = [".html", ".xhtml", ".htm"];

/// Path tokens of navigation and table-of-contents documents
const EXCLUDED_TOKENS: [&str; 2] = ["nav.", "toc."];

/// In-file chapter title candidates, in priority order
const TITLE_SELECTORS: [Selector<'static>; 3] = [
    Selector::Tag("h1"),
    Selector::Tag("h2"),
    Selector::AttributeContains {
        attributes: &["class", "id"],
        needles: &["chapter", "title"],
    },
];

static START_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<([a-z][a-z0-9]*)\b([^>]*)>").expect("valid start tag pattern")
});

static SKIPPED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(head|script|style)\b[^>]*>.*?</(head|script|style)\s*>")
        .expect("valid skipped block pattern")
});

static LINE_BREAK_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(/?(p|div|h[1-6]|li|section|blockquote|tr)|br)\b[^>]*>")
        .expect("valid line break pattern")
});

/// A structural query against a markup document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector<'a> {
    /// Elements with the given tag name
    Tag(&'a str),

    /// Elements where one of `attributes` contains one of `needles`
    AttributeContains {
        attributes: &'a [&'a str],
        needles: &'a [&'a str],
    },
}

impl Selector<'_> {
    fn matches(&self, element: &XmlElement) -> bool {
        match self {
            Selector::Tag(tag) => element.name.eq_ignore_ascii_case(tag),
            Selector::AttributeContains {
                attributes,
                needles,
            } => attributes.iter().any(|attribute| {
                element
                    .get_attr(attribute)
                    .is_some_and(|value| needles.iter().any(|needle| value.contains(needle)))
            }),
        }
    }
}

/// Read access to the structure of a content document
///
/// The content extractor only needs to find the first element matching a
/// selector and read its text, so any markup engine can stand behind it.
pub trait DocumentQuery {
    /// Returns the text of the first element matching `selector`, in document order
    fn first_element_matching(&self, selector: &Selector) -> Option<String>;
}

impl DocumentQuery for XmlElement {
    fn first_element_matching(&self, selector: &Selector) -> Option<String> {
        self.descendants()
            .find(|element| selector.matches(element))
            .map(|element| element.text())
    }
}

/// A regex scan over raw markup
///
/// Used for documents the tree reader cannot parse at all.
pub struct MarkupScan<'a> {
    source: &'a str,
}

impl<'a> MarkupScan<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { source }
    }

    /// The readable text of the markup
    pub fn text(&self) -> String {
        let text = SKIPPED_BLOCK.replace_all(self.source, "");
        let text = LINE_BREAK_TAG.replace_all(&text, "\n");

        decode_html_entities(&strip_tags(&text)).trim().to_string()
    }

    /// Returns the markup between the end of a start tag and its closing tag
    fn element_content(&self, tag: &str, content_start: usize) -> &'a str {
        let rest = &self.source[content_start..];
        let end = Regex::new(&format!(r"(?i)</{}\s*>", regex::escape(tag)))
            .ok()
            .and_then(|close| close.find(rest))
            .map_or(rest.len(), |close| close.start());

        &rest[..end]
    }
}

impl DocumentQuery for MarkupScan<'_> {
    fn first_element_matching(&self, selector: &Selector) -> Option<String> {
        let (tag, content_start) = START_TAG.captures_iter(self.source).find_map(|caps| {
            let tag = caps.get(1)?;
            let attributes = caps.get(2).map_or("", |attributes| attributes.as_str());

            let matched = match selector {
                Selector::Tag(name) => tag.as_str().eq_ignore_ascii_case(name),
                Selector::AttributeContains {
                    attributes: names,
                    needles,
                } => names.iter().any(|name| {
                    attribute_value(attributes, name)
                        .is_some_and(|value| needles.iter().any(|needle| value.contains(needle)))
                }),
            };

            matched.then(|| (tag.as_str(), caps.get(0).map_or(0, |all| all.end())))
        })?;

        let content = self.element_content(tag, content_start);
        Some(decode_html_entities(&strip_tags(content)).trim().to_string())
    }
}

/// Reads the value of attribute `name` from the attribute part of a start tag
fn attribute_value(attributes: &str, name: &str) -> Option<String> {
    let pattern = format!(
        r#"(?i)(?:^|\s){}\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#,
        regex::escape(name)
    );
    let caps = Regex::new(&pattern).ok()?.captures(attributes)?;

    (1..=3)
        .find_map(|group| caps.get(group))
        .map(|value| value.as_str().to_string())
}

/// Whether `path` looks like a content document
fn is_content_file(path: &str) -> bool {
    let path = path.to_ascii_lowercase();

    CONTENT_EXTENSIONS
        .iter()
        .any(|extension| path.ends_with(extension))
        && !EXCLUDED_TOKENS.iter().any(|token| path.contains(token))
}

/// Determines the ordered list of content files to process
///
/// The reading order is used when there is one, skipping paths that are not
/// entries. Otherwise every HTML-like entry that is not a navigation or
/// table-of-contents document is used, in lexicographic order.
pub fn content_files(spine: Option<&SpineOrder>, entries: &BTreeSet<String>) -> Vec<String> {
    if let Some(spine) = spine {
        let files = spine
            .iter()
            .filter(|path| entries.contains(*path))
            .cloned()
            .collect::<Vec<_>>();

        if !files.is_empty() {
            return files;
        }
        warn!("No spine item is an entry of the package, falling back to sorted content files.");
    }

    entries
        .iter()
        .filter(|path| is_content_file(path))
        .cloned()
        .collect()
}

/// Determines the chapter title of one content file
///
/// A navigation entry pointing at the file wins. Otherwise the first `h1`, the
/// first `h2`, then the first element whose `class` or `id` mentions "chapter"
/// or "title" is tried; a candidate is accepted when its collapsed text is
/// non-empty and shorter than `title_max_len` characters.
pub fn resolve_chapter_title(
    path: &str,
    nav: &[NavEntry],
    document: &dyn DocumentQuery,
    title_max_len: usize,
) -> Option<String> {
    if let Some(entry) = nav.iter().find(|entry| entry.matches(path)) {
        return Some(entry.title.clone());
    }

    TITLE_SELECTORS.iter().find_map(|selector| {
        document
            .first_element_matching(selector)
            .map(|text| text.normalize_whitespace())
            .filter(|text| {
                let len = text.chars().count();
                len > 0 && len < title_max_len
            })
    })
}

/// Extracts the plain text and the chapter title of one content document
fn extract_document(
    path: &str,
    source: &str,
    nav: &[NavEntry],
    title_max_len: usize,
) -> (String, Option<String>) {
    if source.trim().is_empty() {
        return (String::new(), None);
    }

    match XmlReader::parse_html(source) {
        Ok(document) => {
            let body = document
                .find_elements_by_name("body")
                .next()
                .unwrap_or(&document);
            let title = resolve_chapter_title(path, nav, &document, title_max_len);

            (body.text_content(), title)
        }
        Err(err) => {
            warn!("Failed to parse \"{}\" ({}), scanning the raw markup instead.", path, err);

            let scan = MarkupScan::new(source);
            let title = resolve_chapter_title(path, nav, &scan, title_max_len);

            (scan.text(), title)
        }
    }
}

/// Reads every content file in order and turns it into a section
///
/// Files that are not entries or cannot be decoded are skipped, as are files
/// without any text. When more than one file is processed, a file without a
/// resolvable title is named `Chapter {n}`, n counting the titled sections so far.
///
/// # Return
/// - `Ok(Vec<ContentSection>)`: The sections in processing order
/// - `Err(IngestError)`: A content file could not be read from the archive
pub fn extract_sections<R: Read + Seek>(
    package: &mut Package<R>,
    files: &[String],
    nav: &[NavEntry],
    config: &IngestConfig,
) -> Result<Vec<ContentSection>, IngestError> {
    let multiple = files.len() > 1;
    let mut sections = Vec::with_capacity(files.len());
    let mut titled = 0;

    for path in files {
        let source = match package.read_text(path) {
            Ok(source) => source,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                warn!("Skipping content file \"{}\": {}", path, err);
                continue;
            }
        };

        let (text, title) = extract_document(path, &source, nav, config.title_max_len);
        if text.trim().is_empty() {
            debug!("Content file \"{}\" has no text.", path);
            continue;
        }

        let title = title.or_else(|| multiple.then(|| format!("Chapter {}", titled + 1)));
        if title.is_some() {
            titled += 1;
        }

        sections.push(ContentSection {
            path: path.clone(),
            title,
            text,
        });
    }

    debug!("Extracted {} sections, {} titled", sections.len(), titled);
    Ok(sections)
}

/// Concatenates sections into one text stream with chapter sentinel lines
///
/// Every titled section is preceded by its sentinel line; untitled sections
/// continue the running text without a boundary.
pub fn inject_chapter_markers(sections: &[ContentSection]) -> String {
    let mut output = String::new();

    for section in sections {
        if let Some(title) = &section.title {
            output.push_str(&chapter_sentinel(title));
            output.push_str("\n\n");
        }

        output.push_str(&section.text);
        output.push_str("\n\n");
    }

    output
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::test_support::{build_package, xhtml};

    /// A document with a fixed answer per selector
    struct StubDocument {
        h1: Option<String>,
        h2: Option<String>,
        attribute: Option<String>,
    }

    fn stub(h1: Option<&str>, h2: Option<&str>, attribute: Option<&str>) -> StubDocument {
        StubDocument {
            h1: h1.map(str::to_string),
            h2: h2.map(str::to_string),
            attribute: attribute.map(str::to_string),
        }
    }

    impl DocumentQuery for StubDocument {
        fn first_element_matching(&self, selector: &Selector) -> Option<String> {
            match selector {
                Selector::Tag("h1") => self.h1.clone(),
                Selector::Tag("h2") => self.h2.clone(),
                Selector::Tag(_) => None,
                Selector::AttributeContains { .. } => self.attribute.clone(),
            }
        }
    }

    fn nav(path: &str, title: &str) -> NavEntry {
        NavEntry {
            content_path: path.to_string(),
            title: title.to_string(),
        }
    }

    fn entries(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|path| path.to_string()).collect()
    }

    #[test]
    fn test_content_files_from_spine() {
        let entries = entries(&["a.xhtml", "b.xhtml", "c.xhtml"]);
        let spine = vec![
            "c.xhtml".to_string(),
            "missing.xhtml".to_string(),
            "a.xhtml".to_string(),
        ];

        assert_eq!(content_files(Some(&spine), &entries), vec!["c.xhtml", "a.xhtml"]);
    }

    #[test]
    fn test_content_files_sorted_fallback() {
        let entries = entries(&[
            "OEBPS/ch2.xhtml",
            "OEBPS/ch1.HTML",
            "OEBPS/nav.xhtml",
            "OEBPS/toc.xhtml",
            "OEBPS/style.css",
            "OEBPS/intro.htm",
        ]);

        assert_eq!(
            content_files(None, &entries),
            vec!["OEBPS/ch1.HTML", "OEBPS/ch2.xhtml", "OEBPS/intro.htm"]
        );

        let unusable = vec!["gone.xhtml".to_string()];
        assert_eq!(content_files(Some(&unusable), &entries).len(), 3);
    }

    #[test]
    fn test_navigation_title_wins_over_heading() {
        let document = stub(Some("Heading Title"), None, None);
        let nav = vec![nav("Text/other.xhtml", "Other"), nav("ch1.xhtml", "Nav Title")];

        assert_eq!(
            resolve_chapter_title("OEBPS/Text/ch1.xhtml", &nav, &document, 200).as_deref(),
            Some("Nav Title")
        );
        assert_eq!(
            resolve_chapter_title("OEBPS/Text/ch10.xhtml", &nav, &document, 200).as_deref(),
            Some("Heading Title")
        );
    }

    #[test]
    fn test_heading_priority_and_length_guard() {
        let long = "x".repeat(200);
        let document = stub(Some(&long), Some("  Second\n   level "), Some("Attribute"));
        assert_eq!(
            resolve_chapter_title("a.xhtml", &[], &document, 200).as_deref(),
            Some("Second level")
        );

        let document = stub(Some("   "), None, Some("Attribute"));
        assert_eq!(
            resolve_chapter_title("a.xhtml", &[], &document, 200).as_deref(),
            Some("Attribute")
        );

        let document = stub(None, None, None);
        assert!(resolve_chapter_title("a.xhtml", &[], &document, 200).is_none());

        let just_fits = "y".repeat(199);
        let document = stub(Some(&just_fits), None, None);
        assert_eq!(
            resolve_chapter_title("a.xhtml", &[], &document, 200).map(|title| title.len()),
            Some(199)
        );
    }

    #[test]
    fn test_tree_document_query() {
        let document = XmlReader::parse_html(&xhtml(
            r#"<div class="chapter-head"><span>Opening</span></div><h2>Sub</h2><h1>Main <em>Title</em></h1>"#,
        ))
        .unwrap();

        assert_eq!(
            document.first_element_matching(&Selector::Tag("h1")).as_deref(),
            Some("Main Title")
        );
        assert_eq!(resolve_chapter_title("a.xhtml", &[], &document, 200).as_deref(), Some("Main Title"));
        assert_eq!(
            document
                .first_element_matching(&TITLE_SELECTORS[2])
                .as_deref(),
            Some("Opening")
        );
    }

    #[test]
    fn test_markup_scan_query() {
        let source = r#"<html><head><title>Head</title></head><body>
<p id='chapter-3' class=x>Chapter &amp; Verse</p>
<H2 class="big">Second</H2>
<p>Plain text.<br>Next line.</p></body></html>"#;
        let scan = MarkupScan::new(source);

        assert_eq!(
            scan.first_element_matching(&Selector::Tag("h2")).as_deref(),
            Some("Second")
        );
        assert!(scan.first_element_matching(&Selector::Tag("h1")).is_none());
        assert_eq!(
            scan.first_element_matching(&TITLE_SELECTORS[2]).as_deref(),
            Some("Chapter & Verse")
        );
        assert_eq!(
            scan.text().lines().map(str::trim).filter(|l| !l.is_empty()).collect::<Vec<_>>(),
            vec!["Chapter & Verse", "Second", "Plain text.", "Next line."]
        );
    }

    #[test]
    fn test_markup_scan_decodes_named_references() {
        let scan = MarkupScan::new("<h1>Caf&eacute; M&uuml;ller</h1><p>Na&iuml;ve &amp; &bogus;.</p>");

        assert_eq!(
            scan.first_element_matching(&Selector::Tag("h1")).as_deref(),
            Some("Caf\u{e9} M\u{fc}ller")
        );
        assert!(scan.text().ends_with("Na\u{ef}ve & &bogus;."));
    }

    #[test]
    fn test_extract_sections_generic_titles() {
        let bytes = build_package(&[
            ("ch1.xhtml", &xhtml("<h1>The Start</h1><p>First words.</p>")),
            ("ch2.xhtml", &xhtml("<p>No heading here.</p>")),
            ("empty.xhtml", &xhtml("")),
            ("ch3.xhtml", &xhtml("<p>Still nothing.</p>")),
        ]);
        let mut package = Package::from_bytes(bytes).unwrap();
        let files = vec![
            "ch1.xhtml".to_string(),
            "ch2.xhtml".to_string(),
            "empty.xhtml".to_string(),
            "missing.xhtml".to_string(),
            "ch3.xhtml".to_string(),
        ];

        let sections =
            extract_sections(&mut package, &files, &[], &IngestConfig::default()).unwrap();
        let titles = sections
            .iter()
            .map(|section| section.title.as_deref())
            .collect::<Vec<_>>();
        assert_eq!(titles, vec![Some("The Start"), Some("Chapter 2"), Some("Chapter 3")]);
        assert_eq!(sections[0].text, "The Start\nFirst words.");
        assert_eq!(sections[1].path, "ch2.xhtml");
    }

    #[test]
    fn test_extract_single_untitled_file() {
        let bytes = build_package(&[("only.xhtml", &xhtml("<p>Just text.</p>"))]);
        let mut package = Package::from_bytes(bytes).unwrap();

        let sections = extract_sections(
            &mut package,
            &["only.xhtml".to_string()],
            &[],
            &IngestConfig::default(),
        )
        .unwrap();
        assert_eq!(sections.len(), 1);
        assert!(sections[0].title.is_none());
        assert_eq!(sections[0].text, "Just text.");
    }

    #[test]
    fn test_extract_falls_back_to_markup_scan() {
        let bytes = build_package(&[(
            "broken.xhtml",
            "<body><h1>Broken & Proud</h1><p>Text <a href=\"x\">here.</p></body",
        )]);
        let mut package = Package::from_bytes(bytes).unwrap();

        let sections = extract_sections(
            &mut package,
            &["broken.xhtml".to_string()],
            &[],
            &IngestConfig::default(),
        )
        .unwrap();
        assert_eq!(sections.len(), 1);
        assert!(sections[0].text.contains("Text here."));
    }

    #[test]
    fn test_inject_chapter_markers() {
        let sections = vec![
            ContentSection {
                path: "a.xhtml".to_string(),
                title: Some("One".to_string()),
                text: "First.".to_string(),
            },
            ContentSection {
                path: "b.xhtml".to_string(),
                title: None,
                text: "Continued.".to_string(),
            },
        ];

        assert_eq!(
            inject_chapter_markers(&sections),
            "[[CHAPTER:One]]\n\nFirst.\n\nContinued.\n\n"
        );
    }
}
