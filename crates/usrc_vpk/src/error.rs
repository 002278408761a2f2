//! Error types that can be emitted from this library

use miette::Diagnostic;
use thiserror::Error;

use crate::types::ArchiveIndex;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent wrapper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Transparent wrapper for [`binrw::Error`]
    #[error(transparent)]
    BinRWError(#[from] binrw::Error),

    /// file is not a valid vpk archive: {0}
    #[error("file is not a valid vpk archive: {0}")]
    #[diagnostic(code(usrc_vpk::format))]
    Format(#[from] FormatError),

    /// no entry named {0}
    #[error("no entry named {0}")]
    EntryNotFound(String),

    /// entry {path} is stored in {index} which is not available
    #[error("entry {path} is stored in {index} which is not available")]
    #[diagnostic(help("check that every numbered part of the archive sits next to the _dir file"))]
    MissingPart {
        /// The archive the entry is routed to
        index: ArchiveIndex,
        /// The logical path of the entry
        path: String,
    },

    /// entry {path} is truncated, expected {expected} bytes but got {actual}
    #[error("entry {path} is truncated, expected {expected} bytes but got {actual}")]
    #[diagnostic(code(usrc_vpk::short_read))]
    ShortRead {
        /// The logical path of the entry
        path: String,
        /// Number of bytes declared by the directory
        expected: u64,
        /// Number of bytes actually available
        actual: u64,
    },

    /// failed reading {index} at offset {offset}
    #[error("failed reading {index} at offset {offset}")]
    PartIo {
        /// The part that was being read
        index: ArchiveIndex,
        /// Absolute offset within the part
        offset: u64,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },

    /// checksum mismatch for {subject}
    #[error("checksum mismatch for {subject}, expected {expected} but computed {actual}")]
    ChecksumMismatch {
        /// What was being verified
        subject: String,
        /// The checksum stored in the archive
        expected: String,
        /// The checksum computed from the data
        actual: String,
    },

    /// archive has been closed
    #[error("archive has been closed")]
    Closed,

    /// {0}
    #[error("{0}")]
    Unsupported(String),
}

/// Error type to provide further information when an archive fails to load
#[derive(Error, Diagnostic, Debug)]
pub enum FormatError {
    /// bad signature {0:#010x}
    #[error("bad signature {0:#010x}")]
    BadSignature(u32),

    /// unsupported version {0}
    #[error("unsupported version {0}")]
    UnsupportedVersion(u32),

    /// terminator after {path} was {found:#06x}
    #[error("terminator after {path} was {found:#06x}")]
    TerminatorMismatch {
        /// The entry whose record was followed by the bad terminator
        path: String,
        /// The value read in place of the terminator
        found: u16,
    },

    /// duplicate entry {0}
    #[error("duplicate entry {0}")]
    DuplicateEntry(String),

    /// unexpected end of data while reading {0}
    #[error("unexpected end of data while reading {0}")]
    Truncated(&'static str),
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
