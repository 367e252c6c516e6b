//! Metadata and navigation resolver
//!
//! Recovers the book title, author, manifest and reading order from the package
//! document, and chapter titles from either the navigation document or the
//! legacy NCX table of contents. Packages in the wild are often incomplete, so
//! every function here reports problems through `Result`/`Option` and leaves
//! the decision to fall back to the caller.

use std::{
    collections::BTreeSet,
    io::{Read, Seek},
};

use log::{debug, warn};

use crate::{
    error::IngestError,
    package::Package,
    types::{ManifestTable, NavEntry, NavKind, NavSource, PackageMetadata, SpineOrder},
    utils::{NormalizeWhitespace, XmlElement, XmlReader},
};

/// Selects the package manifest document of a package
///
/// Candidates are the entries with an `.opf` extension; the first one in
/// lexicographic entry order is used.
///
/// # Return
/// - `Some(String)`: The path of the manifest document
/// - `None`: The package has no `.opf` entry
pub fn find_manifest_document<R: Read + Seek>(package: &Package<R>) -> Option<String> {
    let mut candidates = package
        .entries()
        .iter()
        .filter(|entry| entry.to_ascii_lowercase().ends_with(".opf"));

    let first = candidates.next()?.clone();
    let skipped = candidates.count();
    if skipped > 0 {
        debug!("Found {} package documents, using \"{}\"", skipped + 1, first);
    }

    Some(first)
}

/// Parses the package manifest document
///
/// # Parameters
/// - `text`: The content of the manifest document
/// - `manifest_path`: The path of the manifest document, spine hrefs are rebased on its directory
/// - `entries`: The entries of the package, spine items that are not entries are dropped
///
/// # Return
/// - `Ok(PackageMetadata)`: Title, author, manifest and the resolved reading order
/// - `Err(IngestError)`: The document is not well-formed XML
pub fn parse_manifest(
    text: &str,
    manifest_path: &str,
    entries: &BTreeSet<String>,
) -> Result<PackageMetadata, IngestError> {
    let package = XmlReader::parse(text)?;

    let title = first_metadata_value(&package, "title");
    let author = first_metadata_value(&package, "creator");
    let manifest = parse_manifest_table(&package);
    let spine_order = resolve_spine(&package, &manifest, manifest_path, entries);

    Ok(PackageMetadata {
        manifest_path: manifest_path.to_string(),
        title,
        author,
        manifest,
        spine_order,
    })
}

/// Reads the first `<dc:{name}>` value, falling back to `<meta name="dc:{name}" content="..."/>`
fn first_metadata_value(package: &XmlElement, name: &str) -> Option<String> {
    let meta_name = format!("dc:{}", name);

    package
        .find_elements_by_name(name)
        .map(|element| element.text().normalize_whitespace())
        .find(|value| !value.is_empty())
        .or_else(|| {
            package
                .find_elements_by_name("meta")
                .filter(|meta| meta.get_attr("name").as_deref() == Some(meta_name.as_str()))
                .filter_map(|meta| meta.get_attr("content"))
                .map(|value| value.normalize_whitespace())
                .find(|value| !value.is_empty())
        })
}

/// Builds the id -> href table from `manifest > item`
///
/// Items lacking an `id` or an `href` are skipped.
fn parse_manifest_table(package: &XmlElement) -> ManifestTable {
    let mut manifest = ManifestTable::new();

    let Some(manifest_element) = package.find_elements_by_name("manifest").next() else {
        warn!("The package document has no manifest element.");
        return manifest;
    };

    for item in manifest_element.find_children_by_name("item") {
        match (item.get_attr("id"), item.get_attr("href")) {
            (Some(id), Some(href)) if !id.is_empty() && !href.is_empty() => {
                manifest.entry(id).or_insert(href);
            }
            _ => debug!("Skipping manifest item without id or href."),
        }
    }

    manifest
}

/// Resolves `spine > itemref` through the manifest into entry paths
///
/// Hrefs are rebased on the directory of the manifest document by concatenation;
/// leading `./` and `/` are stripped but `../` is not resolved. Items that do
/// not resolve to an entry are dropped.
fn resolve_spine(
    package: &XmlElement,
    manifest: &ManifestTable,
    manifest_path: &str,
    entries: &BTreeSet<String>,
) -> Option<SpineOrder> {
    let spine = package.find_elements_by_name("spine").next()?;
    let base = match manifest_path.rfind('/') {
        Some(index) => &manifest_path[..=index],
        None => "",
    };

    let mut order = SpineOrder::new();
    for itemref in spine.find_children_by_name("itemref") {
        let Some(idref) = itemref.get_attr("idref") else {
            continue;
        };

        let Some(href) = manifest.get(&idref) else {
            let err = IngestError::UnresolvedSpineItem { idref };
            warn!("{}", err);
            continue;
        };

        let href = href.trim_start_matches("./").trim_start_matches('/');
        let path = format!("{}{}", base, href);
        let stripped = path.trim_start_matches(['.', '/', '\\']).to_string();

        match [path, stripped]
            .into_iter()
            .find(|candidate| entries.contains(candidate))
        {
            Some(path) => order.push(path),
            None => warn!("Spine item \"{}\" is not an entry of the package, dropped.", href),
        }
    }

    (!order.is_empty()).then_some(order)
}

/// Recovers title, author, manifest and reading order of a package
///
/// # Return
/// - `Ok(PackageMetadata)`: The parsed package document
/// - `Err(IngestError)`: There is no usable package document; callers fall back to
///   an untitled book read in sorted file order
pub fn resolve_metadata<R: Read + Seek>(
    package: &mut Package<R>,
) -> Result<PackageMetadata, IngestError> {
    let manifest_path =
        find_manifest_document(package).ok_or_else(|| IngestError::MissingMetadata {
            reason: "the package has no package document (.opf)".to_string(),
        })?;

    let text = package.read_text(&manifest_path)?;
    parse_manifest(&text, &manifest_path, package.entries())
}

/// Chooses the navigation source of a package
///
/// A navigation document (`*nav.xhtml`, `*nav.html`) is preferred over a legacy
/// table of contents (`*.ncx`). At most one source is ever chosen.
pub fn find_navigation<R: Read + Seek>(package: &Package<R>) -> Option<NavSource> {
    let find = |suffixes: &[&str]| {
        package.entries().iter().find(|entry| {
            let entry = entry.to_ascii_lowercase();
            suffixes.iter().any(|suffix| entry.ends_with(suffix))
        })
    };

    if let Some(path) = find(&["nav.xhtml", "nav.html"]) {
        return Some(NavSource {
            kind: NavKind::Navigation,
            path: path.clone(),
        });
    }

    find(&[".ncx"]).map(|path| NavSource {
        kind: NavKind::Legacy,
        path: path.clone(),
    })
}

/// Parses chapter titles out of a navigation source
///
/// For a navigation document, every anchor of the table-of-contents `nav` (or of
/// the first `nav` when none is marked as such) becomes an entry. For a legacy
/// table of contents, every `navPoint`, nested ones included, becomes an entry
/// in document order.
///
/// Fragments are removed from hrefs; entries with an empty href or label are dropped.
pub fn parse_nav(kind: NavKind, text: &str) -> Result<Vec<NavEntry>, IngestError> {
    let document = XmlReader::parse_html(text)?;

    let entries = match kind {
        NavKind::Navigation => parse_navigation_document(&document),
        NavKind::Legacy => parse_nav_points(&document),
    };

    Ok(entries)
}

fn parse_navigation_document(document: &XmlElement) -> Vec<NavEntry> {
    let is_toc = |nav: &&XmlElement| {
        nav.get_attr("epub:type")
            .is_some_and(|value| value.split_whitespace().any(|token| token == "toc"))
            || nav.get_attr("role").as_deref() == Some("doc-toc")
    };

    let Some(nav) = document
        .find_elements_by_name("nav")
        .find(is_toc)
        .or_else(|| document.find_elements_by_name("nav").next())
    else {
        warn!("The navigation document has no nav element.");
        return vec![];
    };

    nav.find_elements_by_name("a")
        .filter_map(|anchor| nav_entry(&anchor.get_attr("href")?, &anchor.text()))
        .collect()
}

fn parse_nav_points(document: &XmlElement) -> Vec<NavEntry> {
    document
        .find_elements_by_name("navPoint")
        .filter_map(|nav_point| {
            let label = nav_point
                .find_children_by_name("navLabel")
                .next()
                .map(|label| match label.find_children_by_name("text").next() {
                    Some(text) => text.text(),
                    None => label.text(),
                })?;
            let src = nav_point
                .find_children_by_name("content")
                .next()
                .and_then(|content| content.get_attr("src"))?;

            nav_entry(&src, &label)
        })
        .collect()
}

fn nav_entry(href: &str, label: &str) -> Option<NavEntry> {
    let content_path = normalize_href(href);
    let title = label.normalize_whitespace();

    if content_path.is_empty() || title.is_empty() {
        return None;
    }

    Some(NavEntry {
        content_path,
        title,
    })
}

/// Drops the fragment and any leading `.`, `/` or `\` characters of an href
pub fn normalize_href(href: &str) -> String {
    href.split('#')
        .next()
        .unwrap_or_default()
        .trim_start_matches(['.', '/', '\\'])
        .to_string()
}

/// Recovers the chapter titles of a package
///
/// # Return
/// - `Ok(Vec<NavEntry>)`: At least one entry from the chosen navigation source
/// - `Err(IngestError)`: No navigation source exists, or it yields no entries
pub fn resolve_navigation<R: Read + Seek>(
    package: &mut Package<R>,
) -> Result<Vec<NavEntry>, IngestError> {
    let source = find_navigation(package).ok_or_else(|| IngestError::MissingNavigation {
        reason: "the package has neither a navigation document nor an NCX file".to_string(),
    })?;

    let text = package.read_text(&source.path)?;
    let entries = parse_nav(source.kind, &text)?;

    if entries.is_empty() {
        return Err(IngestError::MissingNavigation {
            reason: format!("\"{}\" contains no usable entries", source.path),
        });
    }

    debug!("Read {} navigation entries from \"{}\"", entries.len(), source.path);
    Ok(entries)
}
