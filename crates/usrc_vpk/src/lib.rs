//! This library handles reading **VPK** package files used by *Source* engine games.
//!
//! # VPK Archive Format Documentation
//!
//! A VPK archive stores game assets (models, textures, sounds, ...) in one or more files. The file
//! whose name ends in `_dir.vpk` holds the directory of every entry and may embed entry data itself.
//! The remaining data lives in numbered parts named `<base>_000.vpk`, `<base>_001.vpk` and so on.
//!
//! ## File Structure
//!
//! A directory file consists of a header, the directory tree, the embedded entry data and, for
//! version 2, a checksum block.
//!
//! | Offset (bytes) | Field                  | Description                                                |
//! |----------------|------------------------|------------------------------------------------------------|
//! | 0x0000         | Signature              | 4 bytes: 0x55AA1234                                        |
//! | 0x0004         | Version                | 4 bytes: 1 or 2                                            |
//! | 0x0008         | Tree Size              | 4 bytes: Size of the directory tree following the header   |
//! | 0x000C         | File Data Size         | 4 bytes (v2): Size of the embedded entry data              |
//! | 0x0010         | Archive MD5 Size       | 4 bytes (v2): Size of the per-part MD5 table               |
//! | 0x0014         | Other MD5 Size         | 4 bytes (v2): Size of the tree and table digests           |
//! | 0x0018         | Signature Size         | 4 bytes (v2): Size of the public key and signature block   |
//!
//! ### Directory Tree
//!
//! The tree groups entries by extension, then by directory, then by file name. Each group is a
//! null terminated string and each level ends with an empty string:
//!
//! ```text
//! for each extension:            "mdl\0"    ("\0" ends the tree)
//!   for each directory:          "models\0" ("\0" ends the extension)
//!     for each file name:        "foo\0"    ("\0" ends the directory)
//!       entry record (18 bytes)
//!       preload bytes
//! ```
//!
//! A single space stands for "no directory" or "no extension". The logical path of an entry is
//! `<directory>/<file name>.<extension>`.
//!
//! ### Entry Record
//!
//! | Offset (bytes) | Field                  | Description                                             |
//! |----------------|------------------------|---------------------------------------------------------|
//! | 0x0000         | CRC32                  | 4 bytes: CRC-32 of the complete entry data              |
//! | 0x0004         | Preload Length         | 2 bytes: Bytes stored inline after the record           |
//! | 0x0006         | Archive Index          | 2 bytes: Part holding the data, 0x7FFF/0xFFFF = `_dir`  |
//! | 0x0008         | Data Offset            | 4 bytes: Offset of the data within its file             |
//! | 0x000C         | Data Length            | 4 bytes: Size of the data, preload excluded             |
//! | 0x0010         | Terminator             | 2 bytes: Always 0xFFFF                                  |
//!
//! Data of entries stored in the directory file starts right after the tree, so their offset is
//! relative to `header size + tree size`.
//!
//! ## Additional Information
//!
//! - **File Extension**: `.vpk`
//! - **Endianness**: Little-endian for all multi-byte integers
//! - **Compression**: None, entries are stored as they are
//!

pub mod entries;
pub mod error;
pub mod parts;
pub mod read;
pub mod tree;
pub mod types;

pub use entries::{VpkEntries, VpkEntry};
pub use read::{VpkArchive, VpkFile, VpkOptions};
pub use types::ArchiveIndex;
