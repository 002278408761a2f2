#![allow(dead_code)]

use binrw::BinWrite;
use indexmap::IndexMap;
use md5::{Digest, Md5};
use std::{
    collections::BTreeMap,
    io::{self, Cursor, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use usrc_vpk::types::{
    VpkEntryRecord, VpkHeader, VpkSectionSizes, ENTRY_TERMINATOR, MAIN_ARCHIVE_INDEX,
};

const CRC32: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);

struct FixtureEntry {
    path: String,
    preload: Vec<u8>,
    record: VpkEntryRecord,
}

/// Builds VPK archives in memory for tests
pub struct VpkFixture {
    version: u32,
    entries: Vec<FixtureEntry>,
    main_data: Vec<u8>,
    parts: BTreeMap<u16, Vec<u8>>,
}

impl VpkFixture {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            entries: Vec::new(),
            main_data: Vec::new(),
            parts: BTreeMap::new(),
        }
    }

    fn push(&mut self, path: &str, preload: &[u8], index: u16, offset: u32, data: &[u8]) {
        let mut all = preload.to_vec();
        all.extend_from_slice(data);

        self.entries.push(FixtureEntry {
            path: path.to_owned(),
            preload: preload.to_vec(),
            record: VpkEntryRecord {
                crc32: CRC32.checksum(&all),
                preload_length: preload.len() as u16,
                archive_index: index,
                data_offset: offset,
                data_length: data.len() as u32,
                terminator: ENTRY_TERMINATOR,
            },
        });
    }

    /// An entry whose data follows the directory tree
    pub fn embedded(mut self, path: &str, data: &[u8]) -> Self {
        let offset = self.main_data.len() as u32;
        self.main_data.extend_from_slice(data);
        self.push(path, &[], MAIN_ARCHIVE_INDEX, offset, data);
        self
    }

    /// An entry whose data is appended to part `index`
    pub fn in_part(mut self, index: u16, path: &str, data: &[u8]) -> Self {
        let part = self.parts.entry(index).or_default();
        let offset = part.len() as u32;
        part.extend_from_slice(data);
        self.push(path, &[], index, offset, data);
        self
    }

    /// An entry stored entirely in the directory tree
    pub fn preloaded(mut self, path: &str, index: u16, preload: &[u8]) -> Self {
        self.push(path, preload, index, 0, &[]);
        self
    }

    /// An entry with preload bytes followed by data in part `index`
    pub fn split(mut self, index: u16, path: &str, preload: &[u8], data: &[u8]) -> Self {
        let part = self.parts.entry(index).or_default();
        let offset = part.len() as u32;
        part.extend_from_slice(data);
        self.push(path, preload, index, offset, data);
        self
    }

    /// Raw bytes placed in part `index` without any entry
    pub fn part_bytes(mut self, index: u16, data: &[u8]) -> Self {
        self.parts.entry(index).or_default().extend_from_slice(data);
        self
    }

    /// Raw bytes placed after the directory tree without any entry
    pub fn main_bytes(mut self, data: &[u8]) -> Self {
        self.main_data.extend_from_slice(data);
        self
    }

    /// An entry pointing at bytes that were added with [`VpkFixture::part_bytes`] or
    /// [`VpkFixture::main_bytes`]
    pub fn span(mut self, path: &str, index: u16, offset: u32, length: u32) -> Self {
        let source = if index == MAIN_ARCHIVE_INDEX {
            &self.main_data
        } else {
            &self.parts[&index]
        };
        let data = source[offset as usize..(offset + length) as usize].to_vec();
        self.push(path, &[], index, offset, &data);
        self
    }

    pub fn corrupt_terminator(mut self, path: &str, value: u16) -> Self {
        for entry in self.entries.iter_mut().filter(|e| e.path == path) {
            entry.record.terminator = value;
        }
        self
    }

    pub fn tree(&self) -> Vec<u8> {
        let mut groups: IndexMap<String, IndexMap<String, Vec<(String, &FixtureEntry)>>> =
            IndexMap::new();
        for entry in &self.entries {
            let (directory, file) = match entry.path.rsplit_once('/') {
                Some((d, f)) => (d.to_owned(), f),
                None => (" ".to_owned(), entry.path.as_str()),
            };
            let (name, extension) = match file.rsplit_once('.') {
                Some((n, e)) => (n.to_owned(), e.to_owned()),
                None => (file.to_owned(), " ".to_owned()),
            };
            groups
                .entry(extension)
                .or_default()
                .entry(directory)
                .or_default()
                .push((name, entry));
        }

        let mut tree = Cursor::new(Vec::new());
        let write_str = |tree: &mut Cursor<Vec<u8>>, s: &str| {
            tree.get_mut().extend_from_slice(s.as_bytes());
            tree.get_mut().push(0);
            tree.seek(SeekFrom::End(0)).expect("seek in memory");
        };

        for (extension, directories) in &groups {
            write_str(&mut tree, extension);
            for (directory, files) in directories {
                write_str(&mut tree, directory);
                for (name, entry) in files {
                    write_str(&mut tree, name);
                    entry.record.write(&mut tree).expect("write record");
                    tree.get_mut().extend_from_slice(&entry.preload);
                    tree.seek(SeekFrom::End(0)).expect("seek in memory");
                }
                write_str(&mut tree, "");
            }
            write_str(&mut tree, "");
        }
        write_str(&mut tree, "");

        tree.into_inner()
    }

    /// The directory file and every part
    pub fn build(&self) -> (Vec<u8>, BTreeMap<u16, Vec<u8>>) {
        let tree = self.tree();
        let table: Vec<u8> = Vec::new();

        let header = VpkHeader {
            version: self.version,
            tree_size: tree.len() as u32,
            sections: (self.version == 2).then_some(VpkSectionSizes {
                file_data: self.main_data.len() as u32,
                archive_md5: table.len() as u32,
                other_md5: 48,
                signature: 0,
            }),
            ..Default::default()
        };

        let mut main = Cursor::new(Vec::new());
        header.write(&mut main).expect("write header");
        let mut main = main.into_inner();
        main.extend_from_slice(&tree);
        main.extend_from_slice(&self.main_data);

        if self.version == 2 {
            main.extend_from_slice(&table);
            main.extend_from_slice(&Md5::digest(&tree));
            main.extend_from_slice(&Md5::digest(&table));
            let whole = Md5::digest(&main);
            main.extend_from_slice(&whole);
        }

        (main, self.parts.clone())
    }

    /// Write `<base>_dir.vpk` and its parts into `dir`, returning the path of the directory file
    pub fn write_to(&self, dir: &Path, base: &str) -> io::Result<PathBuf> {
        let (main, parts) = self.build();

        let main_path = dir.join(format!("{base}_dir.vpk"));
        std::fs::write(&main_path, main)?;
        for (index, data) in parts {
            std::fs::write(dir.join(format!("{base}_{index:03}.vpk")), data)?;
        }

        Ok(main_path)
    }
}

/// In-memory reader counting how many times it has been dropped
pub struct Tracked {
    inner: Cursor<Vec<u8>>,
    drops: Arc<AtomicUsize>,
}

impl Tracked {
    pub fn new(data: Vec<u8>, drops: &Arc<AtomicUsize>) -> Self {
        Self {
            inner: Cursor::new(data),
            drops: drops.clone(),
        }
    }
}

impl Read for Tracked {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for Tracked {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn drop_count(drops: &Arc<AtomicUsize>) -> usize {
    drops.load(Ordering::SeqCst)
}
