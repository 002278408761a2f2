//! Types for reading VPK archives
//!

use bon::Builder;
use bytes::Bytes;
use indexmap::IndexMap;
use md5::{Digest, Md5};
use std::{
    fmt::{self, Debug},
    fs::File,
    io::{self, Cursor, Read, Seek, SeekFrom},
    path::Path,
};
use tracing::{debug, instrument};

use crate::{
    entries::{VpkEntries, VpkEntry},
    error::{Error, Result},
    parts::{self, ArchivePart},
    tree::{decode_tree, read_tree_bytes},
    types::{ArchiveIndex, VpkHeader},
};

const CRC32: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);

/// Size of the block holding the tree, table and file MD5 digests in version 2 archives
const OTHER_MD5_SIZE: usize = 48;

/// Options for how a VPK archive is loaded and read
#[derive(Debug, Clone, Copy, Builder)]
pub struct VpkOptions {
    /// Look for `<base>_NNN.<ext>` files next to a `<base>_dir.<ext>` file
    #[builder(default = true)]
    pub discover_parts: bool,

    /// Check the CRC32 of every entry read through [`VpkArchive::get_bytes`]
    #[builder(default)]
    pub verify_crc: bool,

    /// Let a later directory record replace an earlier one with the same path instead of failing
    #[builder(default)]
    pub allow_duplicate_paths: bool,
}

impl Default for VpkOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A struct for streaming an entry out of a VPK archive
///
/// The preload bytes are yielded first, then the data stored in the owning file. Running out of
/// data before [`VpkFile::size`] bytes have been produced is reported as
/// [`io::ErrorKind::UnexpectedEof`].
pub struct VpkFile<'a, R: Read + Seek> {
    entry: &'a VpkEntry,
    preload: Cursor<Bytes>,
    data: Option<io::Take<&'a mut R>>,
    remaining: u64,
}

impl<R: Read + Seek> Debug for VpkFile<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "VpkFile({:#?})", self.entry)
    }
}

/// Methods for retrieving information on VPK entries
impl<R: Read + Seek> VpkFile<'_, R> {
    /// Get the logical path of the entry
    ///
    /// # Warnings
    ///
    /// It is dangerous to use this name directly when extracting an archive.
    /// It may contain an absolute path or break out of the current directory (`../cfg`).
    pub fn name(&self) -> &str {
        &self.entry.path
    }

    /// Get the size of the entry, preload included
    pub fn size(&self) -> u64 {
        self.entry.len()
    }

    /// Get the CRC32 stored for the entry
    pub fn crc32(&self) -> u32 {
        self.entry.crc32
    }

    /// Get the file holding the entry data
    pub fn archive_index(&self) -> ArchiveIndex {
        self.entry.archive_index
    }
}

impl<R: Read + Seek> Read for VpkFile<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.preload.read(buf)?;
        if read > 0 || buf.is_empty() {
            return Ok(read);
        }

        let Some(data) = self.data.as_mut() else {
            return Ok(0);
        };
        if self.remaining == 0 {
            return Ok(0);
        }

        let read = data.read(buf)?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{} ended {} bytes early", self.entry.path, self.remaining),
            ));
        }
        self.remaining -= read as u64;
        Ok(read)
    }
}

/// VPK archive reader
///
/// The archive owns every file it reads from. They are released by [`VpkArchive::close`] or when
/// the archive is dropped.
///
/// ```no_run
/// fn dump_models(path: &str) -> usrc_vpk::error::Result<()> {
///     let mut vpk = usrc_vpk::VpkArchive::open(path)?;
///
///     let models = vpk
///         .entries()
///         .with_extension("mdl")
///         .map(|e| e.path.to_string())
///         .collect::<Vec<_>>();
///
///     for model in models {
///         let data = vpk.get_bytes(&model)?;
///         println!("{model}: {} bytes", data.len());
///     }
///
///     vpk.close();
///     Ok(())
/// }
/// ```
pub struct VpkArchive<R = File> {
    header: VpkHeader,
    entries: VpkEntries,
    parts: IndexMap<ArchiveIndex, ArchivePart<R>>,
    options: VpkOptions,
    tree_md5: Option<[u8; 16]>,
    closed: bool,
}

impl<R> Debug for VpkArchive<R> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("VpkArchive")
            .field("header", &self.header)
            .field("entries", &self.entries.len())
            .field("parts", &self.parts.keys().collect::<Vec<_>>())
            .field("closed", &self.closed)
            .finish()
    }
}

impl VpkArchive<File> {
    /// Open a VPK archive with default [`VpkOptions`]
    ///
    /// When `path` names a `<base>_dir.<ext>` file the numbered parts next to it are opened as
    /// well.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, VpkOptions::default())
    }

    /// Open a VPK archive
    ///
    /// Every handle opened before a failure is released before the error is returned.
    #[instrument(skip_all, fields(path = %path.as_ref().display()), err)]
    pub fn open_with(path: impl AsRef<Path>, options: VpkOptions) -> Result<Self> {
        let path = path.as_ref();

        let mut main = File::open(path)?;
        let header = VpkHeader::parse(&mut main)?;

        let found = if options.discover_parts {
            parts::discover_parts_lossy(path)
        } else {
            Vec::new()
        };

        let mut part_map = IndexMap::with_capacity(found.len() + 1);
        part_map.insert(
            ArchiveIndex::Main,
            ArchivePart::new(ArchiveIndex::Main, Some(path.to_path_buf()), main),
        );
        for part in parts::open_parts(found) {
            part_map.insert(part.index(), part);
        }

        Self::load(header, part_map, options)
    }
}

impl<R> VpkArchive<R> {
    /// Total size of the entries in the archive, preload included
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(VpkEntry::len).sum()
    }

    /// Number of entries contained in this archive
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether this archive contains no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The parsed header
    pub fn header(&self) -> &VpkHeader {
        &self.header
    }

    /// Format version, 1 or 2
    pub fn version(&self) -> u32 {
        self.header.version
    }

    /// Number of bytes taken by the header
    pub fn header_size(&self) -> u32 {
        self.header.size()
    }

    /// Number of bytes taken by the directory tree
    pub fn tree_size(&self) -> u32 {
        self.header.tree_size
    }

    /// Options the archive was opened with
    pub fn options(&self) -> &VpkOptions {
        &self.options
    }

    /// The entry store
    pub fn entries(&self) -> &VpkEntries {
        &self.entries
    }

    /// Find an entry by logical path, ignoring ASCII case
    pub fn entry(&self, path: &str) -> Option<&VpkEntry> {
        self.entries.get(path)
    }

    /// Whether the archive has an entry for the logical path, ignoring case
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains(path)
    }

    /// Returns an iterator over all the logical paths in this archive.
    ///
    /// Calling it again starts over from the first entry.
    pub fn list_paths(&self) -> impl Iterator<Item = &str> + Clone + '_ {
        self.entries.paths()
    }

    /// Whether data is spread over numbered parts
    pub fn is_multi_part(&self) -> bool {
        self.parts.len() > 1
    }

    /// Indices of the currently open parts, the directory file included
    pub fn part_indices(&self) -> impl Iterator<Item = ArchiveIndex> + '_ {
        self.parts.keys().copied()
    }

    /// The part registered under `index`, if it is open
    pub fn part(&self, index: ArchiveIndex) -> Option<&ArchivePart<R>> {
        self.parts.get(&index)
    }

    /// Whether [`VpkArchive::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Release every file handle
    ///
    /// Reads fail with [`Error::Closed`] afterwards. Calling it more than once does nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }

        let released = self.parts.len();
        self.parts.clear();
        self.closed = true;
        debug!("closed archive, released {released} parts");
    }
}

impl<R: Read + Seek> VpkArchive<R> {
    /// Read a single file archive from any reader
    pub fn from_reader(main: R, options: VpkOptions) -> Result<Self> {
        Self::from_parts(main, Vec::new(), options)
    }

    /// Read an archive whose numbered parts are already open
    ///
    /// `parts` pairs each reader with the archive index entries use to refer to it. The indices
    /// `0x7FFF` and `0xFFFF` stand for the directory file and are rejected.
    pub fn from_parts(
        mut main: R,
        parts: impl IntoIterator<Item = (u16, R)>,
        options: VpkOptions,
    ) -> Result<Self> {
        main.seek(SeekFrom::Start(0))?;
        let header = VpkHeader::parse(&mut main)?;

        let mut part_map = IndexMap::new();
        part_map.insert(
            ArchiveIndex::Main,
            ArchivePart::new(ArchiveIndex::Main, None, main),
        );
        for (raw, reader) in parts {
            let index = ArchiveIndex::from(raw);
            if index == ArchiveIndex::Main {
                return Err(Error::Unsupported(format!(
                    "archive index {raw:#06x} is reserved for the directory file"
                )));
            }
            part_map.insert(index, ArchivePart::new(index, None, reader));
        }

        Self::load(header, part_map, options)
    }

    fn load(
        header: VpkHeader,
        mut parts: IndexMap<ArchiveIndex, ArchivePart<R>>,
        options: VpkOptions,
    ) -> Result<Self> {
        let main = parts
            .get_mut(&ArchiveIndex::Main)
            .map(ArchivePart::reader_mut)
            .ok_or(Error::MissingPart {
                index: ArchiveIndex::Main,
                path: "directory tree".into(),
            })?;

        main.seek(SeekFrom::Start(header.size() as u64))?;
        let tree = read_tree_bytes(main, header.tree_size)?;
        let entries = decode_tree(&tree, options.allow_duplicate_paths)?;

        let tree_md5 = header.sections.map(|_| {
            let mut digest = [0u8; 16];
            digest.copy_from_slice(&Md5::digest(&tree));
            digest
        });

        debug!(
            "loaded version {} archive with {} entries in {} files",
            header.version,
            entries.len(),
            parts.len()
        );

        Ok(VpkArchive {
            header,
            entries,
            parts,
            options,
            tree_md5,
            closed: false,
        })
    }

    /// Read the complete data of an entry
    ///
    /// The preload bytes come first, followed by the data stored in the owning file. Fails with
    /// [`Error::ShortRead`] rather than returning less than the directory declares.
    pub fn get_bytes(&mut self, path: &str) -> Result<Bytes> {
        let verify = self.options.verify_crc;
        self.read_entry(path, verify)
    }

    /// Like [`VpkArchive::get_bytes`] but always checks the CRC32 of the data
    pub fn get_bytes_verified(&mut self, path: &str) -> Result<Bytes> {
        self.read_entry(path, true)
    }

    /// Like [`VpkArchive::get_bytes`] but any failure results in [`None`]
    pub fn try_get_bytes(&mut self, path: &str) -> Option<Bytes> {
        match self.get_bytes(path) {
            Ok(data) => Some(data),
            Err(e) => {
                debug!("unable to read {path}: {e}");
                None
            }
        }
    }

    /// Stream an entry instead of reading it at once
    pub fn open_entry(&mut self, path: &str) -> Result<VpkFile<'_, R>> {
        if self.closed {
            return Err(Error::Closed);
        }

        let main_data_start = self.header.data_start();
        let entry = self
            .entries
            .get(path)
            .ok_or_else(|| Error::EntryNotFound(path.to_owned()))?;

        let data = if entry.is_preload_only() {
            None
        } else {
            let part = self
                .parts
                .get_mut(&entry.archive_index)
                .ok_or_else(|| Error::MissingPart {
                    index: entry.archive_index,
                    path: entry.path.to_string(),
                })?;
            let offset = data_offset(entry, main_data_start);
            let reader = part.reader_mut();
            reader
                .seek(SeekFrom::Start(offset))
                .map_err(|source| Error::PartIo {
                    index: entry.archive_index,
                    offset,
                    source,
                })?;
            Some(reader.take(entry.data_length as u64))
        };

        Ok(VpkFile {
            entry,
            preload: Cursor::new(entry.preload.clone()),
            data,
            remaining: entry.data_length as u64,
        })
    }

    #[instrument(skip(self), err)]
    fn read_entry(&mut self, path: &str, verify: bool) -> Result<Bytes> {
        if self.closed {
            return Err(Error::Closed);
        }

        let main_data_start = self.header.data_start();
        let entry = self
            .entries
            .get(path)
            .ok_or_else(|| Error::EntryNotFound(path.to_owned()))?;

        let data = if entry.is_preload_only() {
            entry.preload.clone()
        } else {
            let part = self
                .parts
                .get_mut(&entry.archive_index)
                .ok_or_else(|| Error::MissingPart {
                    index: entry.archive_index,
                    path: entry.path.to_string(),
                })?;

            let mut buffer = entry.preload.to_vec();
            read_span(
                part.reader_mut(),
                entry.archive_index,
                data_offset(entry, main_data_start),
                entry.data_length as u64,
                &entry.path,
                &mut buffer,
            )?;
            Bytes::from(buffer)
        };

        if verify {
            let actual = CRC32.checksum(&data);
            if actual != entry.crc32 {
                return Err(Error::ChecksumMismatch {
                    subject: entry.path.to_string(),
                    expected: format!("{:08x}", entry.crc32),
                    actual: format!("{actual:08x}"),
                });
            }
        }

        Ok(data)
    }

    /// Check the MD5 digests a version 2 archive stores for its directory tree and part table
    #[instrument(skip(self), err)]
    pub fn verify_checksums(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }

        let (Some(sections), Some(tree_md5)) = (self.header.sections, self.tree_md5) else {
            return Err(Error::Unsupported(format!(
                "version {} archives carry no checksums",
                self.header.version
            )));
        };
        if (sections.other_md5 as usize) < OTHER_MD5_SIZE {
            return Err(Error::Unsupported(
                "archive was written without checksums".into(),
            ));
        }

        let main = self
            .parts
            .get_mut(&ArchiveIndex::Main)
            .ok_or(Error::MissingPart {
                index: ArchiveIndex::Main,
                path: "checksums".into(),
            })?;

        let table_start = self.header.data_start() + sections.file_data as u64;
        let mut table = Vec::new();
        read_span(
            main.reader_mut(),
            ArchiveIndex::Main,
            table_start,
            sections.archive_md5 as u64,
            "archive md5 table",
            &mut table,
        )?;

        let mut other = Vec::with_capacity(OTHER_MD5_SIZE);
        read_span(
            main.reader_mut(),
            ArchiveIndex::Main,
            table_start + sections.archive_md5 as u64,
            OTHER_MD5_SIZE as u64,
            "checksum block",
            &mut other,
        )?;

        compare_md5("directory tree", &other[..16], &tree_md5)?;
        compare_md5("archive md5 table", &other[16..32], &Md5::digest(&table))?;

        debug!("checksums match");
        Ok(())
    }
}

fn data_offset(entry: &VpkEntry, main_data_start: u64) -> u64 {
    match entry.archive_index {
        ArchiveIndex::Main => main_data_start + entry.data_offset as u64,
        ArchiveIndex::Part(_) => entry.data_offset as u64,
    }
}

/// Append exactly `length` bytes found at `offset` to `buffer`
fn read_span<R: Read + Seek>(
    reader: &mut R,
    index: ArchiveIndex,
    offset: u64,
    length: u64,
    path: &str,
    buffer: &mut Vec<u8>,
) -> Result<()> {
    let part_io = |source: io::Error| Error::PartIo {
        index,
        offset,
        source,
    };

    reader.seek(SeekFrom::Start(offset)).map_err(part_io)?;
    let read = reader
        .by_ref()
        .take(length)
        .read_to_end(buffer)
        .map_err(part_io)? as u64;

    if read < length {
        return Err(Error::ShortRead {
            path: path.to_owned(),
            expected: length,
            actual: read,
        });
    }
    Ok(())
}

fn compare_md5(subject: &str, expected: &[u8], actual: &[u8]) -> Result<()> {
    if expected == actual {
        return Ok(());
    }

    let hex = |digest: &[u8]| digest.iter().map(|b| format!("{b:02x}")).collect::<String>();
    Err(Error::ChecksumMismatch {
        subject: subject.to_owned(),
        expected: hex(expected),
        actual: hex(actual),
    })
}
