use std::{
    collections::HashMap,
    io::{Read, Seek},
};

use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};
use zip::{ZipArchive, result::ZipError};

use crate::error::IngestError;

/// Elements that never have content in HTML and are never closed
const VOID_ELEMENTS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements rendered on their own line when extracting plain text
const BLOCK_ELEMENTS: [&str; 32] = [
    "address",
    "article",
    "aside",
    "blockquote",
    "body",
    "br",
    "dd",
    "div",
    "dl",
    "dt",
    "figcaption",
    "figure",
    "footer",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hr",
    "html",
    "li",
    "nav",
    "ol",
    "p",
    "pre",
    "section",
    "table",
    "td",
    "tr",
    "ul",
];

/// Elements whose text never belongs to the readable content
const SKIPPED_ELEMENTS: [&str; 4] = ["head", "script", "style", "template"];

/// Reads the raw bytes of one entry of a zip container
///
/// ## Parameters
/// - `zip_file`: The opened container
/// - `file_name`: The entry path, relative to the container root
///
/// ## Return
/// - `Ok(Vec<u8>)`: The raw bytes of the entry
/// - `Err(IngestError::EntryNotFound)`: The archive has no such entry
/// - `Err(IngestError::CorruptArchive)`: The entry exists but could not be read
pub fn get_file_in_zip_archive<R: Read + Seek>(
    zip_file: &mut ZipArchive<R>,
    file_name: &str,
) -> Result<Vec<u8>, IngestError> {
    let mut buffer = Vec::<u8>::new();
    match zip_file.by_name(file_name) {
        Ok(mut file) => {
            file.read_to_end(&mut buffer)
                .map_err(|err| IngestError::CorruptArchive {
                    source: ZipError::Io(err),
                })?;
            Ok(buffer)
        }
        Err(ZipError::FileNotFound) => Err(IngestError::EntryNotFound {
            path: file_name.to_string(),
        }),
        Err(err) => Err(IngestError::CorruptArchive { source: err }),
    }
}

/// Names of the Latin-1 character references, indexed by code point minus 160
const LATIN1_ENTITIES: [&str; 96] = [
    "nbsp", "iexcl", "cent", "pound", "curren", "yen", "brvbar", "sect", "uml", "copy", "ordf", "laquo", "not", "shy", "reg", "macr",
    "deg", "plusmn", "sup2", "sup3", "acute", "micro", "para", "middot", "cedil", "sup1", "ordm", "raquo", "frac14", "frac12", "frac34", "iquest",
    "Agrave", "Aacute", "Acirc", "Atilde", "Auml", "Aring", "AElig", "Ccedil", "Egrave", "Eacute", "Ecirc", "Euml", "Igrave", "Iacute", "Icirc", "Iuml",
    "ETH", "Ntilde", "Ograve", "Oacute", "Ocirc", "Otilde", "Ouml", "times", "Oslash", "Ugrave", "Uacute", "Ucirc", "Uuml", "Yacute", "THORN", "szlig",
    "agrave", "aacute", "acirc", "atilde", "auml", "aring", "aelig", "ccedil", "egrave", "eacute", "ecirc", "euml", "igrave", "iacute", "icirc", "iuml",
    "eth", "ntilde", "ograve", "oacute", "ocirc", "otilde", "ouml", "divide", "oslash", "ugrave", "uacute", "ucirc", "uuml", "yacute", "thorn", "yuml",
];

/// Resolves the name of a character reference (`amp`, `eacute`, `#39`, `#x27`, ...)
///
/// Knows the XML references, the Latin-1 set of HTML and the common typographic
/// ones. Returns `None` for any other name.
pub fn resolve_entity(name: &str) -> Option<String> {
    let resolved = match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" | "ensp" | "emsp" | "thinsp" => " ",
        "ndash" => "\u{2013}",
        "mdash" => "\u{2014}",
        "hellip" => "\u{2026}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "sbquo" => "\u{201A}",
        "ldquo" => "\u{201C}",
        "rdquo" => "\u{201D}",
        "bdquo" => "\u{201E}",
        "lsaquo" => "\u{2039}",
        "rsaquo" => "\u{203A}",
        "bull" => "\u{2022}",
        "dagger" => "\u{2020}",
        "Dagger" => "\u{2021}",
        "permil" => "\u{2030}",
        "prime" => "\u{2032}",
        "Prime" => "\u{2033}",
        "euro" => "\u{20AC}",
        "trade" => "\u{2122}",
        "OElig" => "\u{0152}",
        "oelig" => "\u{0153}",
        "Scaron" => "\u{0160}",
        "scaron" => "\u{0161}",
        "Yuml" => "\u{0178}",
        "fnof" => "\u{0192}",
        "circ" => "\u{02C6}",
        "tilde" => "\u{02DC}",
        _ => {
            if let Some(index) = LATIN1_ENTITIES.iter().position(|entity| *entity == name) {
                return char::from_u32(160 + index as u32).map(|c| c.to_string());
            }

            let number = name.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse::<u32>().ok()?,
            };
            let c = char::from_u32(code)?;
            return Some(if c == '\u{A0}' { ' ' } else { c }.to_string());
        }
    };

    Some(resolved.to_string())
}

/// Decodes entry data or uploaded files to text
///
/// A byte order mark selects UTF-8, UTF-16 BE or UTF-16 LE. Without one the data
/// is decoded as UTF-8, replacing invalid sequences, so only empty data and
/// invalid data behind a BOM are errors.
pub trait DecodeBytes {
    fn decode(&self) -> Result<String, IngestError>;
}

impl DecodeBytes for [u8] {
    fn decode(&self) -> Result<String, IngestError> {
        match self {
            [] => Err(IngestError::EmptyDataError),

            // Check UTF-8 BOM (0xEF, 0xBB, 0xBF)
            [0xEF, 0xBB, 0xBF, rest @ ..] => {
                String::from_utf8(rest.to_vec()).map_err(IngestError::from)
            }

            // Check UTF-16 BE BOM (0xFE, 0xFF)
            [0xFE, 0xFF, rest @ ..] => {
                let utf16_units: Vec<u16> = rest
                    .chunks_exact(2)
                    .map(|b| u16::from_be_bytes([b[0], b[1]]))
                    .collect();

                String::from_utf16(&utf16_units).map_err(IngestError::from)
            }

            // Check UTF-16 LE BOM (0xFF, 0xFE)
            [0xFF, 0xFE, rest @ ..] => {
                let utf16_units: Vec<u16> = rest
                    .chunks_exact(2)
                    .map(|b| u16::from_le_bytes([b[0], b[1]]))
                    .collect();

                String::from_utf16(&utf16_units).map_err(IngestError::from)
            }

            // Without a BOM the data is UTF-8, invalid sequences become U+FFFD
            _ => Ok(String::from_utf8_lossy(self).into_owned()),
        }
    }
}

impl DecodeBytes for Vec<u8> {
    fn decode(&self) -> Result<String, IngestError> {
        self.as_slice().decode()
    }
}

/// Collapses every run of whitespace, line breaks included, into one space and trims the ends
pub trait NormalizeWhitespace {
    fn normalize_whitespace(&self) -> String;
}

impl NormalizeWhitespace for &str {
    fn normalize_whitespace(&self) -> String {
        self.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl NormalizeWhitespace for String {
    fn normalize_whitespace(&self) -> String {
        self.as_str().normalize_whitespace()
    }
}

/// A node of an XML document, in document order
#[derive(Debug)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// An element of a parsed package document, navigation document or content document
#[derive(Debug)]
pub struct XmlElement {
    /// Local name, without any prefix
    pub name: String,

    /// Prefix as written in the source (`dc` in `dc:title`)
    pub prefix: Option<String>,

    /// Attributes keyed by their name as written, prefix included
    pub attributes: HashMap<String, String>,

    /// Child elements and text, in document order
    pub nodes: Vec<XmlNode>,
}

impl XmlElement {
    /// Create a new element
    pub fn new(name: String) -> Self {
        Self {
            name,
            prefix: None,
            attributes: HashMap::new(),
            nodes: Vec::new(),
        }
    }

    /// The qualified name, `prefix:name` or just `name`
    pub fn tag_name(&self) -> String {
        if let Some(prefix) = &self.prefix {
            format!("{}:{}", prefix, self.name)
        } else {
            self.name.clone()
        }
    }

    /// Gets the text content of the element and all its descendants
    ///
    /// Text is concatenated in document order, leading and trailing whitespace removed.
    pub fn text(&self) -> String {
        let mut result = String::new();
        self.collect_text(&mut result);

        result.trim().to_string()
    }

    fn collect_text(&self, result: &mut String) {
        for node in &self.nodes {
            match node {
                XmlNode::Text(text) => result.push_str(text),
                XmlNode::Element(child) => child.collect_text(result),
            }
        }
    }

    /// Gets the readable text of the element
    ///
    /// Unlike [XmlElement::text], block elements are placed on their own lines and
    /// the content of `head`, `script` and `style` is skipped.
    pub fn text_content(&self) -> String {
        let mut result = String::new();
        self.collect_text_content(&mut result);

        result.trim().to_string()
    }

    fn collect_text_content(&self, result: &mut String) {
        for node in &self.nodes {
            match node {
                XmlNode::Text(text) => result.push_str(text),
                XmlNode::Element(child) => {
                    let name = child.name.to_ascii_lowercase();
                    if SKIPPED_ELEMENTS.contains(&name.as_str()) {
                        continue;
                    }

                    let block = BLOCK_ELEMENTS.contains(&name.as_str());
                    if block && !result.is_empty() && !result.ends_with('\n') {
                        result.push('\n');
                    }
                    child.collect_text_content(result);
                    if block && !result.ends_with('\n') {
                        result.push('\n');
                    }
                }
            }
        }
    }

    /// Appends text, merging it with a preceding text node
    fn push_text(&mut self, text: &str) {
        if let Some(XmlNode::Text(last)) = self.nodes.last_mut() {
            last.push_str(text);
        } else {
            self.nodes.push(XmlNode::Text(text.to_string()));
        }
    }

    /// The value of attribute `name`, looked up by its name as written
    pub fn get_attr(&self, name: &str) -> Option<String> {
        self.attributes.get(name).cloned()
    }

    /// Iterates over this element and all its descendant elements in document order
    pub fn descendants(&self) -> impl Iterator<Item = &XmlElement> {
        DescendantsIter::new(self)
    }

    /// Descendants (and this element) whose local name is `name`, ignoring ASCII case
    pub fn find_elements_by_name(&self, name: &str) -> impl Iterator<Item = &XmlElement> {
        self.descendants()
            .filter(move |element| element.name.eq_ignore_ascii_case(name))
    }

    /// Direct child elements whose local name is `name`, ignoring ASCII case
    pub fn find_children_by_name(&self, name: &str) -> impl Iterator<Item = &XmlElement> {
        self.children()
            .filter(move |child| child.name.eq_ignore_ascii_case(name))
    }

    /// Get children elements
    pub fn children(&self) -> impl Iterator<Item = &XmlElement> {
        self.nodes.iter().filter_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            XmlNode::Text(_) => None,
        })
    }
}

struct DescendantsIter<'a> {
    stack: Vec<&'a XmlElement>,
}

impl<'a> DescendantsIter<'a> {
    fn new(root: &'a XmlElement) -> Self {
        Self { stack: vec![root] }
    }
}

impl<'a> Iterator for DescendantsIter<'a> {
    type Item = &'a XmlElement;

    fn next(&mut self) -> Option<Self::Item> {
        let element = self.stack.pop()?;

        // Children are pushed in reverse so the first child is visited next.
        let children = element.children().collect::<Vec<_>>();
        self.stack.extend(children.into_iter().rev());

        Some(element)
    }
}

/// Builds [XmlElement] trees from markup
pub struct XmlReader {}

impl XmlReader {
    /// Parses a well-formed XML document (package documents, NCX) from string
    ///
    /// ## Return
    /// - `Ok(XmlElement)`: The root element of the XML element tree
    /// - `Err(IngestError)`: An error occurred during parsing
    pub fn parse(content: &str) -> Result<XmlElement, IngestError> {
        Self::parse_with(content, false)
    }

    /// Parses an (X)HTML document tolerantly
    ///
    /// End tags do not have to match, void elements such as `<br>` do not need
    /// to be closed, attributes may be unquoted and unclosed elements are closed
    /// at the end of input. The returned element is a synthetic `#document`
    /// element holding every top-level node.
    pub fn parse_html(content: &str) -> Result<XmlElement, IngestError> {
        Self::parse_with(content, true)
    }

    fn parse_with(content: &str, html: bool) -> Result<XmlElement, IngestError> {
        if content.is_empty() {
            return Err(IngestError::EmptyDataError);
        }

        let mut reader = Reader::from_str(content);
        reader.config_mut().check_end_names = !html;

        let mut stack = Vec::<XmlElement>::new();
        let mut root = None;

        if html {
            stack.push(XmlElement::new("#document".to_string()));
        }

        // Read XML events
        loop {
            match reader.read_event() {
                Ok(Event::Eof) => break,

                // Start of an element
                Ok(Event::Start(e)) => {
                    let element = Self::build_element(&e, html);

                    if html && VOID_ELEMENTS.contains(&element.name.to_ascii_lowercase().as_str())
                    {
                        Self::attach(&mut stack, &mut root, element);
                    } else {
                        stack.push(element);
                    }
                }

                // End of an element
                Ok(Event::End(e)) => {
                    if html {
                        let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                        Self::close_html_element(&mut stack, &name);
                    } else if let Some(element) = stack.pop() {
                        Self::attach(&mut stack, &mut root, element);
                    }
                }

                // Self-closing element
                Ok(Event::Empty(e)) => {
                    let element = Self::build_element(&e, html);
                    Self::attach(&mut stack, &mut root, element);
                }

                // Text node
                Ok(Event::Text(e)) => {
                    if let Some(element) = stack.last_mut() {
                        element.push_text(&String::from_utf8_lossy(e.as_ref()));
                    }
                }

                // Character and entity references
                Ok(Event::GeneralRef(e)) => {
                    if let Some(element) = stack.last_mut() {
                        let name = String::from_utf8_lossy(e.as_ref()).to_string();
                        match resolve_entity(&name) {
                            Some(text) => element.push_text(&text),
                            None => element.push_text(&format!("&{};", name)),
                        }
                    }
                }

                // CDATA node
                Ok(Event::CData(e)) => {
                    if let Some(element) = stack.last_mut() {
                        element.push_text(&String::from_utf8_lossy(e.as_ref()));
                    }
                }

                Err(err) => return Err(err.into()),

                // Comments, processing instructions, declarations and doctypes carry no content.
                _ => continue,
            }
        }

        if html {
            // Close everything left open, the synthetic document is the last one.
            while stack.len() > 1 {
                if let Some(element) = stack.pop() {
                    Self::attach(&mut stack, &mut root, element);
                }
            }
            return stack.pop().ok_or(IngestError::FailedParsingXml);
        }

        root.ok_or(IngestError::FailedParsingXml)
    }

    fn build_element(e: &BytesStart, html: bool) -> XmlElement {
        let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
        let mut element = XmlElement::new(name);

        if let Some(prefix) = e.name().prefix() {
            element.prefix = Some(String::from_utf8_lossy(prefix.as_ref()).to_string());
        }

        let attributes = if html {
            e.html_attributes()
        } else {
            e.attributes()
        };

        for attr in attributes.flatten() {
            let attr_key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            if attr_key == "xmlns" || attr_key.starts_with("xmlns:") {
                continue;
            }

            let attr_value = String::from_utf8_lossy(&attr.value).to_string();
            element
                .attributes
                .insert(attr_key, crate::text::decode_html_entities(&attr_value));
        }

        element
    }

    /// Attaches a finished element to its parent, or makes it the root
    fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
        match stack.last_mut() {
            Some(parent) => parent.nodes.push(XmlNode::Element(element)),
            None => {
                if root.is_none() {
                    *root = Some(element);
                }
            }
        }
    }

    /// Closes the innermost open element named `name` and everything opened inside it
    ///
    /// Stray end tags without a matching open element are ignored.
    fn close_html_element(stack: &mut Vec<XmlElement>, name: &str) {
        let Some(position) = stack
            .iter()
            .skip(1)
            .rposition(|element| element.name.eq_ignore_ascii_case(name))
        else {
            return;
        };

        // `rposition` counted from the second element.
        let position = position + 1;
        while stack.len() > position {
            if let Some(element) = stack.pop() {
                if let Some(parent) = stack.last_mut() {
                    parent.nodes.push(XmlNode::Element(element));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        error::IngestError,
        utils::{DecodeBytes, NormalizeWhitespace, XmlReader, resolve_entity},
    };

    /// Test with empty data
    #[test]
    fn test_decode_empty_data() {
        let data: Vec<u8> = vec![];
        let result = data.decode();
        assert!(result.is_err());
        assert_eq!(result.unwrap_err(), IngestError::EmptyDataError);
    }

    /// Short data has no room for a BOM and is decoded as is
    #[test]
    fn test_decode_short_data() {
        let data = b"Hi".to_vec();
        assert_eq!(data.decode().unwrap(), "Hi");
    }

    #[test]
    fn test_decode_utf8_with_bom() {
        let data: Vec<u8> = vec![0xEF, 0xBB, 0xBF, b'H', b'e', b'l', b'l', b'o'];
        let result = data.decode();
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), "Hello");
    }

    #[test]
    fn test_decode_utf16_be_with_bom() {
        let data = vec![
            0xFE, 0xFF, // BOM
            0x00, b'H', // H
            0x00, b'e', // e
            0x00, b'l', // l
            0x00, b'l', // l
            0x00, b'o', // o
        ];
        assert_eq!(data.decode().unwrap(), "Hello");
    }

    #[test]
    fn test_decode_utf16_le_with_bom() {
        let data = vec![
            0xFF, 0xFE, // BOM
            b'H', 0x00, // H
            b'e', 0x00, // e
            b'l', 0x00, // l
            b'l', 0x00, // l
            b'o', 0x00, // o
        ];
        assert_eq!(data.decode().unwrap(), "Hello");
    }

    #[test]
    fn test_decode_invalid_utf8_without_bom() {
        let data = b"It was a caf\xe9. Then rain fell. ".to_vec();
        assert_eq!(data.decode().unwrap(), "It was a caf\u{FFFD}. Then rain fell. ");

        // Even-length data stays UTF-8 and is never reinterpreted as UTF-16.
        let data = b"Na\xefve text.".to_vec();
        assert_eq!(data.len() % 2, 0);
        assert_eq!(data.decode().unwrap(), "Na\u{FFFD}ve text.");
    }

    #[test]
    fn test_decode_plain_utf8() {
        let data = "Hello, Wörld!".as_bytes().to_vec();
        assert_eq!(data.decode().unwrap(), "Hello, Wörld!");
    }

    #[test]
    fn test_normalize_whitespace_trait() {
        let text = "  Hello,\tWorld!\n\nRust  ";
        assert_eq!(text.normalize_whitespace(), "Hello, World! Rust");

        let text_string = String::from("  Hello,\tWorld!\n\nRust  ");
        assert_eq!(text_string.normalize_whitespace(), "Hello, World! Rust");
    }

    #[test]
    fn test_resolve_entity() {
        assert_eq!(resolve_entity("amp").as_deref(), Some("&"));
        assert_eq!(resolve_entity("#39").as_deref(), Some("'"));
        assert_eq!(resolve_entity("#x27").as_deref(), Some("'"));
        assert_eq!(resolve_entity("nbsp").as_deref(), Some(" "));
        assert_eq!(resolve_entity("#160").as_deref(), Some(" "));
        assert_eq!(resolve_entity("eacute").as_deref(), Some("\u{e9}"));
        assert_eq!(resolve_entity("Eacute").as_deref(), Some("\u{c9}"));
        assert_eq!(resolve_entity("uuml").as_deref(), Some("\u{fc}"));
        assert_eq!(resolve_entity("iexcl").as_deref(), Some("\u{a1}"));
        assert_eq!(resolve_entity("yuml").as_deref(), Some("\u{ff}"));
        assert_eq!(resolve_entity("euro").as_deref(), Some("\u{20ac}"));
        assert!(resolve_entity("EACUTE").is_none());
        assert!(resolve_entity("unknown").is_none());
        assert!(resolve_entity("#xZZ").is_none());
    }

    #[test]
    fn test_parse_xml_keeps_document_order() {
        let root = XmlReader::parse(
            r#"<package xmlns:dc="http://purl.org/dc/elements/1.1/"><metadata><dc:title>A &amp; B</dc:title></metadata></package>"#,
        )
        .unwrap();

        let title = root.find_elements_by_name("title").next().unwrap();
        assert_eq!(title.tag_name(), "dc:title");
        assert_eq!(title.text(), "A & B");
        assert!(root.get_attr("xmlns:dc").is_none());
    }

    #[test]
    fn test_parse_xml_without_root() {
        let result = XmlReader::parse("just text");
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_html_tolerates_sloppy_markup() {
        let doc = XmlReader::parse_html(
            "<html><body><p class=intro>Hello <b>big</b> world<br>again</p><div>Next &nbsp;one</div></span></body></html>",
        )
        .unwrap();

        assert_eq!(doc.name, "#document");
        let p = doc.find_elements_by_name("p").next().unwrap();
        assert_eq!(p.get_attr("class").as_deref(), Some("intro"));
        assert_eq!(p.text(), "Hello big worldagain");

        let body = doc.find_elements_by_name("body").next().unwrap();
        assert_eq!(body.text_content(), "Hello big world\nagain\nNext  one");
    }

    #[test]
    fn test_parse_html_decodes_named_references() {
        let doc = XmlReader::parse_html(
            "<p title=\"Caf&eacute;\">Caf&eacute; &uuml;ber &AElig;sop &unknown;</p>",
        )
        .unwrap();

        let p = doc.find_elements_by_name("p").next().unwrap();
        assert_eq!(p.get_attr("title").as_deref(), Some("Caf\u{e9}"));
        assert_eq!(p.text(), "Caf\u{e9} \u{fc}ber \u{c6}sop &unknown;");
    }

    #[test]
    fn test_parse_html_closes_unclosed_elements() {
        let doc = XmlReader::parse_html("<div><p>First<p>Second</div><p>Third").unwrap();

        let texts = doc
            .find_elements_by_name("p")
            .map(|p| p.text())
            .collect::<Vec<_>>();
        assert_eq!(texts, vec!["FirstSecond", "Second", "Third"]);
    }

    #[test]
    fn test_text_content_skips_head_and_scripts() {
        let doc = XmlReader::parse_html(
            "<html><head><title>Skip me</title></head><body><script>var x = 1;</script><h1>Title</h1><p>Body.</p></body></html>",
        )
        .unwrap();

        assert_eq!(doc.text_content(), "Title\nBody.");
    }
}
