//! Base types for structure of VPK file.

use binrw::{BinRead, BinWrite};
use std::fmt;
use std::io::{Read, Seek};

use crate::error::{Error, FormatError, Result};

/// Signature every VPK directory file starts with
pub const VPK_SIGNATURE: u32 = 0x55AA_1234;

/// Value following every entry record in the directory tree
pub const ENTRY_TERMINATOR: u16 = 0xFFFF;

/// Raw archive index routing an entry to the directory file itself
pub const MAIN_ARCHIVE_INDEX: u16 = 0xFFFF;

/// Raw archive index Valve's own packer writes for data stored in the directory file
pub const MAIN_ARCHIVE_INDEX_VALVE: u16 = 0x7FFF;

/// Size of the header shared by all versions
pub const HEADER_V1_SIZE: u32 = 12;

/// Size of the version 2 header including the section sizes
pub const HEADER_V2_SIZE: u32 = HEADER_V1_SIZE + 16;

/// Identifies the physical file that holds the data of an entry
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArchiveIndex {
    /// The directory file, data follows the directory tree
    Main,

    /// A numbered `<base>_NNN.<ext>` part
    Part(u16),
}

impl From<u16> for ArchiveIndex {
    fn from(value: u16) -> Self {
        match value {
            MAIN_ARCHIVE_INDEX | MAIN_ARCHIVE_INDEX_VALVE => ArchiveIndex::Main,
            n => ArchiveIndex::Part(n),
        }
    }
}

impl From<ArchiveIndex> for u16 {
    fn from(value: ArchiveIndex) -> Self {
        match value {
            ArchiveIndex::Main => MAIN_ARCHIVE_INDEX,
            ArchiveIndex::Part(n) => n,
        }
    }
}

impl fmt::Display for ArchiveIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveIndex::Main => write!(f, "the directory file"),
            ArchiveIndex::Part(n) => write!(f, "part {n:03}"),
        }
    }
}

/// Sizes of the trailing sections of a version 2 archive
///
/// They are all stored in the directory file, in this order, after the embedded file data.
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct VpkSectionSizes {
    /// The size of the data embedded in the directory file
    pub file_data: u32,

    /// The size of the per-part MD5 table
    pub archive_md5: u32,

    /// The size of the tree and table MD5 block, always 48 when present
    pub other_md5: u32,

    /// The size of the public key and signature block
    pub signature: u32,
}

/// VPK file header
///
/// The header starts with [`VPK_SIGNATURE`] and a version of 1 or 2. Version 2 adds the
/// sizes of the checksum and signature sections. All data is stored in little endian format.
#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct VpkHeader {
    /// Must equal [`VPK_SIGNATURE`]
    pub signature: u32,

    /// Format version, 1 or 2
    pub version: u32,

    /// The number of bytes of the directory tree following the header
    pub tree_size: u32,

    /// Only present for version 2
    #[br(if(version == 2))]
    pub sections: Option<VpkSectionSizes>,
}

impl Default for VpkHeader {
    fn default() -> Self {
        Self {
            signature: VPK_SIGNATURE,
            version: 1,
            tree_size: 0,
            sections: None,
        }
    }
}

impl VpkHeader {
    /// Read and validate a header from the start of `reader`.
    ///
    /// Both the signature and the version must be correct, either one failing rejects the file.
    pub fn parse<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let header = match VpkHeader::read(reader) {
            Ok(header) => header,
            Err(binrw::Error::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(FormatError::Truncated("header").into())
            }
            Err(binrw::Error::Io(e)) => return Err(Error::IOError(e)),
            Err(_) => return Err(FormatError::Truncated("header").into()),
        };

        header.validate()?;
        Ok(header)
    }

    /// Check the signature and version
    pub fn validate(&self) -> core::result::Result<(), FormatError> {
        if self.signature != VPK_SIGNATURE {
            return Err(FormatError::BadSignature(self.signature));
        }
        if !(1..=2).contains(&self.version) {
            return Err(FormatError::UnsupportedVersion(self.version));
        }
        Ok(())
    }

    /// Number of bytes taken by the header on disk
    pub fn size(&self) -> u32 {
        match self.sections {
            Some(_) => HEADER_V2_SIZE,
            None => HEADER_V1_SIZE,
        }
    }

    /// Offset in the directory file where embedded entry data starts
    pub fn data_start(&self) -> u64 {
        self.size() as u64 + self.tree_size as u64
    }
}

/// Fixed record following every file name in the directory tree
#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq)]
#[brw(little)]
pub struct VpkEntryRecord {
    /// CRC-32 of the complete entry data
    pub crc32: u32,

    /// Number of bytes stored inline after this record
    pub preload_length: u16,

    /// Raw archive index, see [`ArchiveIndex`]
    pub archive_index: u16,

    /// Offset of the data within the owning file
    pub data_offset: u32,

    /// Number of bytes stored in the owning file, excluding preload
    pub data_length: u32,

    /// Always [`ENTRY_TERMINATOR`] in a well formed tree
    pub terminator: u16,
}

impl Default for VpkEntryRecord {
    fn default() -> Self {
        Self {
            crc32: 0,
            preload_length: 0,
            archive_index: MAIN_ARCHIVE_INDEX,
            data_offset: 0,
            data_length: 0,
            terminator: ENTRY_TERMINATOR,
        }
    }
}
