//! Lookup of directory entries by logical path

use bytes::Bytes;
use indexmap::{map::Entry, IndexMap};
use tracing::warn;

use crate::error::FormatError;
use crate::types::ArchiveIndex;

/// Structure representing a VPK directory entry.
#[derive(Debug, Clone, PartialEq)]
pub struct VpkEntry {
    /// Logical path as stored in the directory, e.g. `models/foo.mdl`
    pub path: Box<str>,
    /// CRC32 checksum of the complete data
    pub crc32: u32,
    /// Number of bytes stored inline in the directory tree
    pub preload_length: u16,
    /// The file holding the rest of the data
    pub archive_index: ArchiveIndex,
    /// Offset of the data within the owning file
    pub data_offset: u32,
    /// Number of bytes stored in the owning file
    pub data_length: u32,
    /// Inline bytes, read once while decoding the tree
    pub preload: Bytes,
}

impl VpkEntry {
    /// Size of the entry once extracted, preload included
    pub fn len(&self) -> u64 {
        self.preload_length as u64 + self.data_length as u64
    }

    /// Whether the entry contains no data at all
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the entry is served entirely from the preload cache
    pub fn is_preload_only(&self) -> bool {
        self.data_length == 0
    }

    /// The extension without leading dot, empty if there is none
    pub fn extension(&self) -> &str {
        let name = self.file_name();
        match name.rfind('.') {
            Some(i) => &name[i + 1..],
            None => "",
        }
    }

    /// The final component of the path
    pub fn file_name(&self) -> &str {
        match self.path.rfind('/') {
            Some(i) => &self.path[i + 1..],
            None => &self.path,
        }
    }

    /// The directory containing the entry, empty for the archive root
    pub fn directory(&self) -> &str {
        match self.path.rfind('/') {
            Some(i) => &self.path[..i],
            None => "",
        }
    }
}

/// Normalizes a logical path into the key used by [`VpkEntries`]
///
/// Separators become forward slashes, surrounding separators are trimmed and ASCII letters are
/// lowercased.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
        .trim_matches('/')
        .to_ascii_lowercase()
}

/// Case-insensitive mapping of logical paths to entries, in directory order
#[derive(Debug, Default, Clone)]
pub struct VpkEntries {
    files: IndexMap<Box<str>, VpkEntry>,
}

impl VpkEntries {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            files: IndexMap::with_capacity(capacity),
        }
    }

    pub(crate) fn insert(
        &mut self,
        entry: VpkEntry,
        allow_duplicates: bool,
    ) -> Result<(), FormatError> {
        match self.files.entry(normalize_path(&entry.path).into()) {
            Entry::Occupied(mut existing) => {
                if !allow_duplicates {
                    return Err(FormatError::DuplicateEntry(entry.path.into()));
                }
                warn!("replacing duplicate entry {}", entry.path);
                existing.insert(entry);
            }
            Entry::Vacant(slot) => {
                slot.insert(entry);
            }
        }
        Ok(())
    }

    /// Find an entry by logical path, ignoring case
    ///
    /// Only ASCII letters are folded, `Ä` and `ä` name different entries.
    pub fn get(&self, path: &str) -> Option<&VpkEntry> {
        self.files.get(normalize_path(path).as_str())
    }

    /// Whether an entry exists for the logical path, ignoring case
    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(normalize_path(path).as_str())
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether there are no entries
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Logical paths of every entry as stored in the directory
    pub fn paths(&self) -> impl Iterator<Item = &str> + Clone + '_ {
        self.files.values().map(|e| e.path.as_ref())
    }

    /// Every entry in directory order
    pub fn iter(&self) -> impl Iterator<Item = &VpkEntry> + Clone + '_ {
        self.files.values()
    }

    /// Entries whose path starts with `prefix`, ignoring case
    ///
    /// ```no_run
    /// # fn doit(archive: &usrc_vpk::VpkArchive) {
    /// for entry in archive.entries().with_prefix("models/blackmesa/") {
    ///     println!("{}", entry.path);
    /// }
    /// # }
    /// ```
    pub fn with_prefix<'a>(&'a self, prefix: &str) -> impl Iterator<Item = &'a VpkEntry> + 'a {
        let prefix = prefix.replace('\\', "/").trim_start_matches('/').to_ascii_lowercase();
        self.files
            .iter()
            .filter(move |(key, _)| key.starts_with(prefix.as_str()))
            .map(|(_, entry)| entry)
    }

    /// Entries with the given extension, ignoring case and a leading dot
    pub fn with_extension<'a>(&'a self, extension: &str) -> impl Iterator<Item = &'a VpkEntry> + 'a {
        let extension = extension.trim_start_matches('.').to_owned();
        self.files
            .values()
            .filter(move |entry| entry.extension().eq_ignore_ascii_case(&extension))
    }
}
