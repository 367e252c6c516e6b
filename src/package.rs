//! Package reader
//!
//! A [Package] is a read-only view over the entries of a zip container. It owns
//! the archive for the duration of one ingestion and caches every entry it has
//! decoded to text.

use std::{
    collections::{BTreeSet, HashMap},
    fs::File,
    io::{BufReader, Cursor, Read, Seek},
    path::Path,
};

use log::debug;
use zip::ZipArchive;

use crate::{
    error::IngestError,
    utils::{DecodeBytes, get_file_in_zip_archive},
};

/// An opened book package
pub struct Package<R: Read + Seek> {
    /// The structure of the package file that actually holds it
    archive: ZipArchive<R>,

    /// Every file entry, sorted lexicographically
    entries: BTreeSet<String>,

    /// Entries already decoded to text
    cache: HashMap<String, String>,
}

impl<R: Read + Seek> Package<R> {
    /// Opens a package from a reader
    ///
    /// # Return
    /// - `Ok(Package<R>)`: The opened package
    /// - `Err(IngestError::CorruptArchive)`: The data is not a readable zip container
    pub fn from_reader(reader: R) -> Result<Self, IngestError> {
        let archive =
            ZipArchive::new(reader).map_err(|source| IngestError::CorruptArchive { source })?;

        let entries = archive
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .map(str::to_string)
            .collect::<BTreeSet<_>>();

        debug!("Opened package with {} entries", entries.len());

        Ok(Self {
            archive,
            entries,
            cache: HashMap::new(),
        })
    }

    /// Every file entry of the package, in lexicographic order
    pub fn entries(&self) -> &BTreeSet<String> {
        &self.entries
    }

    /// Whether the package contains the file entry `path`
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains(path)
    }

    /// Reads an entry and decodes it to text
    ///
    /// # Return
    /// - `Ok(String)`: The decoded text, empty for an empty entry
    /// - `Err(IngestError::EntryNotFound)`: There is no such entry
    /// - `Err(IngestError::CorruptArchive)`: The entry could not be decompressed
    pub fn read_text(&mut self, path: &str) -> Result<String, IngestError> {
        if let Some(text) = self.cache.get(path) {
            return Ok(text.clone());
        }

        let text = match get_file_in_zip_archive(&mut self.archive, path)?.decode() {
            Ok(text) => text,
            Err(IngestError::EmptyDataError) => String::new(),
            Err(err) => return Err(err),
        };

        self.cache.insert(path.to_string(), text.clone());
        Ok(text)
    }
}

impl Package<Cursor<Vec<u8>>> {
    /// Opens a package held in memory
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self, IngestError> {
        Self::from_reader(Cursor::new(bytes.into()))
    }
}

impl Package<BufReader<File>> {
    /// Opens a package file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, IngestError> {
        let file = File::open(path).map_err(IngestError::from)?;

        Self::from_reader(BufReader::new(file))
    }
}
