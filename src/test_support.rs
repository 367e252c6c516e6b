//! Helpers building in-memory packages for unit tests

use std::io::{Cursor, Write};

use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

/// Builds a zip container holding the given `(path, content)` entries
pub fn build_package(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    for (path, content) in files {
        writer.start_file(*path, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }

    writer.finish().unwrap().into_inner()
}

/// A minimal XHTML content document
pub fn xhtml(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head><title>Ignored head title</title></head>
<body>
{body}
</body>
</html>"#
    )
}

/// A package document with the given manifest items `(id, href)` and spine idrefs
pub fn opf(title: &str, author: &str, items: &[(&str, &str)], spine: &[&str]) -> String {
    let items = items
        .iter()
        .map(|(id, href)| {
            format!(r#"    <item id="{id}" href="{href}" media-type="application/xhtml+xml"/>"#)
        })
        .collect::<Vec<_>>()
        .join("\n");
    let spine = spine
        .iter()
        .map(|idref| format!(r#"    <itemref idref="{idref}"/>"#))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="uid">urn:uuid:1234</dc:identifier>
    <dc:title>{title}</dc:title>
    <dc:creator>{author}</dc:creator>
  </metadata>
  <manifest>
{items}
  </manifest>
  <spine>
{spine}
  </spine>
</package>"#
    )
}
