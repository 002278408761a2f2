//! Discovery of the numbered data files of a multi-part archive
//!
//! A multi-part archive is made of `<base>_dir.<ext>` holding the directory tree and any number of
//! `<base>_NNN.<ext>` files holding entry data, `NNN` being the zero padded archive index.

use std::{
    ffi::OsStr,
    fs::File,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

use crate::{error::Result, types::ArchiveIndex};

/// Marker ending the file stem of the file that holds the directory tree
pub const DIRECTORY_MARKER: &str = "_dir";

/// One physical file contributing entry data
#[derive(Debug)]
pub struct ArchivePart<R> {
    index: ArchiveIndex,
    path: Option<PathBuf>,
    reader: R,
}

impl<R> ArchivePart<R> {
    /// Wrap a reader as the part registered under `index`
    pub fn new(index: ArchiveIndex, path: Option<PathBuf>, reader: R) -> Self {
        Self {
            index,
            path,
            reader,
        }
    }

    /// The archive index entries use to refer to this part
    pub fn index(&self) -> ArchiveIndex {
        self.index
    }

    /// Location on disk, if the part was opened from a file
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub(crate) fn reader_mut(&mut self) -> &mut R {
        &mut self.reader
    }
}

/// Base name and extension of a directory file, `pak01_dir.vpk` gives `("pak01", "vpk")`
///
/// Returns [`None`] when the stem does not end with [`DIRECTORY_MARKER`], meaning the archive is
/// a single file.
pub fn split_directory_name(path: &Path) -> Option<(String, String)> {
    let stem = path.file_stem()?.to_str()?;
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();

    let split = stem.len().checked_sub(DIRECTORY_MARKER.len())?;
    let marker = stem.get(split..)?;
    if split == 0 || !marker.eq_ignore_ascii_case(DIRECTORY_MARKER) {
        return None;
    }

    Some((stem[..split].to_owned(), extension.to_owned()))
}

/// Archive index encoded in `file_name` if it names a part of the archive `base`.`extension`
pub fn part_index(file_name: &str, base: &str, extension: &str) -> Option<u16> {
    let prefix = file_name.get(..base.len())?;
    if !prefix.eq_ignore_ascii_case(base) {
        return None;
    }

    let rest = file_name[base.len()..].strip_prefix('_')?;
    let (digits, rest_extension) = match rest.split_once('.') {
        Some((digits, ext)) => (digits, ext),
        None => (rest, ""),
    };

    if digits.len() != 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !rest_extension.eq_ignore_ascii_case(extension) {
        return None;
    }

    digits.parse().ok()
}

/// Find the part files sitting next to the directory file, in ascending index order
#[instrument(err)]
pub fn discover_parts(directory_file: &Path) -> Result<Vec<(u16, PathBuf)>> {
    let Some((base, extension)) = split_directory_name(directory_file) else {
        debug!("no {DIRECTORY_MARKER} marker, treating as a single file archive");
        return Ok(Vec::new());
    };

    let folder = match directory_file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut found = std::fs::read_dir(folder)?
        // Filter out all those directory entries which couldn't be read
        .filter_map(|res| res.ok())
        .map(|dir_entry| dir_entry.path())
        .filter(|path| path.is_file())
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?;
            part_index(name, &base, &extension).map(|index| (index, path.clone()))
        })
        .collect::<Vec<_>>();

    // Exact-case names win over names that only match ignoring case
    let exact_name = |index: u16| {
        if extension.is_empty() {
            format!("{base}_{index:03}")
        } else {
            format!("{base}_{index:03}.{extension}")
        }
    };
    found.sort_by_cached_key(|(index, path)| {
        let exact = path.file_name() == Some(OsStr::new(&exact_name(*index)));
        (*index, !exact, path.clone())
    });
    found.dedup_by(|later, kept| {
        if later.0 != kept.0 {
            return false;
        }
        warn!(
            "ignoring {}, part {:03} is already provided by {}",
            later.1.display(),
            later.0,
            kept.1.display()
        );
        true
    });
    debug!("found {} parts for {base}", found.len());

    Ok(found)
}

/// Like [`discover_parts`] but a folder that cannot be listed leaves the archive without parts
pub(crate) fn discover_parts_lossy(directory_file: &Path) -> Vec<(u16, PathBuf)> {
    discover_parts(directory_file).unwrap_or_else(|e| {
        warn!(
            "unable to look for parts of {}: {e}",
            directory_file.display()
        );
        Vec::new()
    })
}

/// Open every discovered part
///
/// Parts failing to open are skipped, reading an entry stored in them reports
/// [`crate::error::Error::MissingPart`].
pub(crate) fn open_parts(found: Vec<(u16, PathBuf)>) -> Vec<ArchivePart<File>> {
    found
        .into_iter()
        .filter_map(|(index, path)| match File::open(&path) {
            Ok(file) => Some(ArchivePart::new(ArchiveIndex::Part(index), Some(path), file)),
            Err(e) => {
                warn!("unable to open {}: {e}", path.display());
                None
            }
        })
        .collect()
}
