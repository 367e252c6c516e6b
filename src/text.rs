//! Text normalization
//!
//! Cleans up the concatenated text of a package, or raw text supplied by the
//! user, before segmentation. Line breaks carry meaning for the segmenter
//! (chapter sentinels and heading lines are recognised per line), so only
//! horizontal whitespace is collapsed.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::utils::resolve_entity;

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag pattern"));

static NAMED_ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(nbsp|amp|lt|gt|quot|apos|#39);").expect("valid entity pattern")
});

static CHARACTER_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[A-Za-z][A-Za-z0-9]*);")
        .expect("valid character reference pattern")
});

static HORIZONTAL_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("valid whitespace pattern"));

static EXCESS_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n\s*\n+").expect("valid blank line pattern"));

/// Removes every `<...>` tag from the text
pub fn strip_tags(text: &str) -> String {
    TAG.replace_all(text, "").into_owned()
}

/// Decodes `&nbsp;`, `&amp;`, `&lt;`, `&gt;`, `&quot;`, `&#39;` and `&apos;`
///
/// Decoding happens in a single pass, so `&amp;lt;` becomes `&lt;` and not `<`.
/// A non-breaking space becomes a plain space.
pub fn decode_entities(text: &str) -> String {
    NAMED_ENTITY
        .replace_all(text, |caps: &Captures| {
            resolve_entity(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Decodes every character reference of HTML markup this crate knows
///
/// Used on markup, where `&eacute;` and friends are common. Numeric references
/// are decoded too, unknown names are kept as they are. Single pass, like
/// [`decode_entities`].
pub fn decode_html_entities(text: &str) -> String {
    CHARACTER_REFERENCE
        .replace_all(text, |caps: &Captures| {
            resolve_entity(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Normalizes text for segmentation
///
/// Strips leftover markup, decodes entities, converts CRLF to LF, collapses
/// runs of spaces and tabs, reduces three or more consecutive line breaks to
/// one blank line and trims the result.
pub fn normalize(text: &str) -> String {
    let text = strip_tags(text);
    let text = decode_entities(&text);
    let text = text.replace("\r\n", "\n");
    let text = HORIZONTAL_WHITESPACE.replace_all(&text, " ");
    let text = EXCESS_BLANK_LINES.replace_all(&text, "\n\n");

    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("<p class=\"a\">Hello <b>you</b></p>"), "Hello you");
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(
            decode_entities("Tom&nbsp;&amp;&nbsp;Jerry &lt;3 &quot;x&quot; it&#39;s &apos;y&apos;"),
            "Tom & Jerry <3 \"x\" it's 'y'"
        );
        assert_eq!(decode_entities("&amp;lt;"), "&lt;");
        assert_eq!(decode_entities("&copy; stays"), "&copy; stays");
    }

    #[test]
    fn test_decode_html_entities() {
        assert_eq!(
            decode_html_entities("Caf&eacute; &Uuml;ber &#233;t&#xE9; &euro;5 &amp;eacute;"),
            "Caf\u{e9} \u{dc}ber \u{e9}t\u{e9} \u{20ac}5 &eacute;"
        );
        assert_eq!(decode_html_entities("&madeup; & stays"), "&madeup; & stays");
    }

    #[test]
    fn test_normalize_line_endings_and_spaces() {
        assert_eq!(normalize("One  \t two.\r\nThree."), "One two.\nThree.");
    }

    #[test]
    fn test_normalize_keeps_sentinel_lines() {
        let text = "[[CHAPTER:One]]\n\n\n\n  First   line.\n \n\t\nSecond line.  ";
        assert_eq!(normalize(text), "[[CHAPTER:One]]\n\n First line.\n\nSecond line.");
    }

    #[test]
    fn test_normalize_keeps_single_blank_line() {
        assert_eq!(normalize("  a.\n\nb.\n"), "a.\n\nb.");
    }

    #[test]
    fn test_normalize_strips_markup_before_decoding() {
        assert_eq!(normalize("<p>a &lt;b&gt; c</p>"), "a <b> c");
    }
}
