//! Decoding of the directory tree
//!
//! The tree is three levels of null terminated strings, extension then directory then file name,
//! each level ending with an empty string. Every file name is followed by a [`VpkEntryRecord`]
//! and its preload bytes.

use binrw::BinRead;
use byteorder::ReadBytesExt;
use bytes::Bytes;
use std::io::{self, Cursor, Read};
use tracing::{debug, instrument};

use crate::{
    entries::{VpkEntries, VpkEntry},
    error::{Error, FormatError, Result},
    types::{VpkEntryRecord, ENTRY_TERMINATOR},
};

const TREE: &str = "directory tree";

fn eof_as_truncated(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        FormatError::Truncated(TREE).into()
    } else {
        e.into()
    }
}

/// Read the raw bytes of the tree which must immediately follow the header
pub(crate) fn read_tree_bytes<R: Read>(reader: &mut R, tree_size: u32) -> Result<Vec<u8>> {
    // Grown by the reader, the declared size may be anything
    let mut tree = Vec::new();
    reader.take(tree_size as u64).read_to_end(&mut tree)?;
    if tree.len() < tree_size as usize {
        return Err(FormatError::Truncated(TREE).into());
    }
    Ok(tree)
}

fn read_cstring<R: Read>(reader: &mut R) -> Result<String> {
    let mut raw = Vec::new();
    loop {
        let char = reader.read_u8().map_err(eof_as_truncated)?;
        if char == b'\0' {
            break;
        }
        raw.push(char);
    }
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

fn read_record<R: Read + io::Seek>(reader: &mut R) -> Result<VpkEntryRecord> {
    VpkEntryRecord::read(reader).map_err(|e| match e {
        binrw::Error::Io(e) => eof_as_truncated(e),
        e => e.into(),
    })
}

/// Build the logical path of an entry
///
/// A single space is how the packer spells "no directory" or "no extension".
pub fn logical_path(extension: &str, directory: &str, file_name: &str) -> String {
    let directory = directory.replace('\\', "/");
    let directory = directory.trim_matches('/');

    let mut path = String::with_capacity(directory.len() + file_name.len() + extension.len() + 2);
    if !directory.is_empty() && directory != " " {
        path.push_str(directory);
        path.push('/');
    }
    path.push_str(file_name);
    if !extension.is_empty() && extension != " " {
        path.push('.');
        path.push_str(extension);
    }

    path.trim_matches('/').to_owned()
}

/// Decode every entry of the tree
///
/// A record not followed by [`ENTRY_TERMINATOR`] aborts the whole decode, since every byte after
/// it would be misread.
#[instrument(skip_all, fields(tree_size = tree.len()), err)]
pub(crate) fn decode_tree(tree: &[u8], allow_duplicates: bool) -> Result<VpkEntries> {
    let mut reader = Cursor::new(tree);
    let mut entries = VpkEntries::with_capacity(tree.len() / 64);

    loop {
        let extension = read_cstring(&mut reader)?;
        if extension.is_empty() {
            break;
        }

        loop {
            let directory = read_cstring(&mut reader)?;
            if directory.is_empty() {
                break;
            }

            loop {
                let file_name = read_cstring(&mut reader)?;
                if file_name.is_empty() {
                    break;
                }

                let path = logical_path(&extension, &directory, &file_name);
                let record = read_record(&mut reader)?;
                if record.terminator != ENTRY_TERMINATOR {
                    return Err(FormatError::TerminatorMismatch {
                        path,
                        found: record.terminator,
                    }
                    .into());
                }

                let mut preload = vec![0u8; record.preload_length as usize];
                reader.read_exact(&mut preload).map_err(eof_as_truncated)?;

                entries.insert(
                    VpkEntry {
                        path: path.into(),
                        crc32: record.crc32,
                        preload_length: record.preload_length,
                        archive_index: record.archive_index.into(),
                        data_offset: record.data_offset,
                        data_length: record.data_length,
                        preload: Bytes::from(preload),
                    },
                    allow_duplicates,
                )?;
            }
        }
    }

    debug!("decoded {} entries", entries.len());
    Ok(entries)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{decode_tree, logical_path, read_tree_bytes};
    use crate::error::{Error, FormatError, Result};
    use crate::types::ArchiveIndex;

    fn push_str(tree: &mut Vec<u8>, s: &str) {
        tree.extend_from_slice(s.as_bytes());
        tree.push(0);
    }

    #[rustfmt::skip]
    fn push_record(tree: &mut Vec<u8>, preload: &[u8], index: u16, offset: u32, length: u32, terminator: u16) {
        tree.extend_from_slice(&0xCAFEu32.to_le_bytes());
        tree.extend_from_slice(&(preload.len() as u16).to_le_bytes());
        tree.extend_from_slice(&index.to_le_bytes());
        tree.extend_from_slice(&offset.to_le_bytes());
        tree.extend_from_slice(&length.to_le_bytes());
        tree.extend_from_slice(&terminator.to_le_bytes());
        tree.extend_from_slice(preload);
    }

    #[test]
    fn builds_logical_paths() {
        assert_eq!(logical_path("mdl", "models/props", "crate"), "models/props/crate.mdl");
        assert_eq!(logical_path("txt", " ", "readme"), "readme.txt");
        assert_eq!(logical_path(" ", "bin", "launcher"), "bin/launcher");
        assert_eq!(logical_path("wav", "\\sound\\ambient\\", "wind"), "sound/ambient/wind.wav");
    }

    #[test]
    fn decodes_nested_groups() -> Result<()> {
        let mut tree = Vec::new();
        push_str(&mut tree, "mdl");
        push_str(&mut tree, "models");
        push_str(&mut tree, "foo");
        push_record(&mut tree, &[], 0xFFFF, 128, 64, 0xFFFF);
        push_str(&mut tree, "bar");
        push_record(&mut tree, &[], 1, 0, 16, 0xFFFF);
        push_str(&mut tree, "");
        push_str(&mut tree, "");
        push_str(&mut tree, "wav");
        push_str(&mut tree, "sound");
        push_str(&mut tree, "beep");
        push_record(&mut tree, b"RIFF", 0, 0, 0, 0xFFFF);
        push_str(&mut tree, "");
        push_str(&mut tree, "");
        push_str(&mut tree, "");

        let entries = decode_tree(&tree, false)?;
        assert_eq!(
            entries.paths().collect::<Vec<_>>(),
            vec!["models/foo.mdl", "models/bar.mdl", "sound/beep.wav"]
        );

        let foo = entries.get("models/foo.mdl").expect("decoded entry");
        assert_eq!(foo.archive_index, ArchiveIndex::Main);
        assert_eq!((foo.data_offset, foo.data_length), (128, 64));
        assert_eq!(foo.crc32, 0xCAFE);

        let bar = entries.get("models/bar.mdl").expect("decoded entry");
        assert_eq!(bar.archive_index, ArchiveIndex::Part(1));

        let beep = entries.get("sound/beep.wav").expect("decoded entry");
        assert_eq!(beep.preload.as_ref(), b"RIFF");
        assert_eq!(beep.len(), 4);
        assert!(beep.is_preload_only());

        Ok(())
    }

    #[test]
    fn bad_terminator_fails_whole_tree() {
        let mut tree = Vec::new();
        push_str(&mut tree, "mdl");
        push_str(&mut tree, "models");
        push_str(&mut tree, "good");
        push_record(&mut tree, &[], 0, 0, 4, 0xFFFF);
        push_str(&mut tree, "bad");
        push_record(&mut tree, &[], 0, 4, 4, 0x1234);
        push_str(&mut tree, "after");
        push_record(&mut tree, &[], 0, 8, 4, 0xFFFF);
        push_str(&mut tree, "");
        push_str(&mut tree, "");
        push_str(&mut tree, "");

        let result = decode_tree(&tree, false);
        assert!(matches!(
            result,
            Err(Error::Format(FormatError::TerminatorMismatch { ref path, found: 0x1234 }))
                if path == "models/bad.mdl"
        ));
    }

    #[test]
    fn missing_outer_terminator_is_truncation() {
        let mut tree = Vec::new();
        push_str(&mut tree, "mdl");
        push_str(&mut tree, "models");
        push_str(&mut tree, "foo");
        push_record(&mut tree, &[], 0, 0, 4, 0xFFFF);

        assert!(matches!(
            decode_tree(&tree, false),
            Err(Error::Format(FormatError::Truncated(_)))
        ));
    }

    #[test]
    fn short_preload_is_truncation() {
        let mut tree = Vec::new();
        push_str(&mut tree, "txt");
        push_str(&mut tree, " ");
        push_str(&mut tree, "note");
        push_record(&mut tree, b"abcd", 0xFFFF, 0, 0, 0xFFFF);
        tree.truncate(tree.len() - 2);

        assert!(matches!(
            decode_tree(&tree, false),
            Err(Error::Format(FormatError::Truncated(_)))
        ));
    }

    #[test]
    fn duplicate_paths_fail() {
        let mut tree = Vec::new();
        push_str(&mut tree, "txt");
        push_str(&mut tree, "docs");
        push_str(&mut tree, "a");
        push_record(&mut tree, &[], 0, 0, 1, 0xFFFF);
        push_str(&mut tree, "A");
        push_record(&mut tree, &[], 0, 1, 1, 0xFFFF);
        push_str(&mut tree, "");
        push_str(&mut tree, "");
        push_str(&mut tree, "");

        assert!(matches!(
            decode_tree(&tree, false),
            Err(Error::Format(FormatError::DuplicateEntry(_)))
        ));
        assert_eq!(decode_tree(&tree, true).map(|e| e.len()).ok(), Some(1));
    }

    #[test]
    fn tree_shorter_than_declared() {
        let mut input = std::io::Cursor::new(vec![0u8; 10]);
        assert!(matches!(
            read_tree_bytes(&mut input, 20),
            Err(Error::Format(FormatError::Truncated(_)))
        ));
    }
}
