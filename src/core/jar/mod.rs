//! Purpose: Read and write JAR (zip) containers.
//! Exports: `JarReader`, `JarWriter`, `crc32`.
//! Role: The only module that understands the zip container layout.
//! Invariants: Reading supports stored and deflated entries and verifies CRC-32.
//! Invariants: Writing emits stored entries with fixed timestamps, so equal
//! Invariants: inputs produce byte-identical archives.

mod inflate;

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::core::error::{Error, ErrorKind};

const EOCD_SIG: u32 = 0x0605_4b50;
const CENTRAL_SIG: u32 = 0x0201_4b50;
const LOCAL_SIG: u32 = 0x0403_4b50;
const EOCD_LEN: usize = 22;
const MAX_COMMENT: usize = 0xFFFF;

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATED: u16 = 8;

// 1980-01-01, the zip epoch. Fixed so output archives are reproducible.
const DOS_DATE: u16 = 0x0021;
const DOS_TIME: u16 = 0;

const CRC_TABLE: [u32; 256] = crc_table();

const fn crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut index = 0;
    while index < 256 {
        let mut crc = index as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                0xEDB8_8320 ^ (crc >> 1)
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[index] = crc;
        index += 1;
    }
    table
}

pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = !0u32;
    for &byte in data {
        crc = CRC_TABLE[((crc ^ byte as u32) & 0xFF) as usize] ^ (crc >> 8);
    }
    !crc
}

fn read_u16_le(buf: &[u8], offset: usize) -> Result<u16, Error> {
    buf.get(offset..offset + 2)
        .map(|bytes| u16::from_le_bytes([bytes[0], bytes[1]]))
        .ok_or_else(|| corrupt("truncated zip record"))
}

fn read_u32_le(buf: &[u8], offset: usize) -> Result<u32, Error> {
    buf.get(offset..offset + 4)
        .map(|bytes| u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .ok_or_else(|| corrupt("truncated zip record"))
}

fn corrupt(message: &str) -> Error {
    Error::new(ErrorKind::Corrupt).with_message(message.to_string())
}

#[derive(Debug)]
enum Backing {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Backing {
    fn data(&self) -> &[u8] {
        match self {
            Backing::Mapped(map) => map,
            Backing::Owned(bytes) => bytes,
        }
    }
}

#[derive(Clone, Debug)]
struct Entry {
    name: String,
    method: u16,
    flags: u16,
    crc: u32,
    compressed_len: u32,
    uncompressed_len: u32,
    local_offset: u32,
}

/// Read-only view of a JAR. Entry metadata comes from the central directory;
/// payloads are sliced out of the mapping on demand.
#[derive(Debug)]
pub struct JarReader {
    path: PathBuf,
    backing: Backing,
    entries: Vec<Entry>,
    by_name: HashMap<String, usize>,
}

impl JarReader {
    pub fn open(path: &Path) -> Result<Self, Error> {
        let file = File::open(path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to open archive")
                .with_path(path)
                .with_source(err)
        })?;
        // Mapping is read-only and the tool treats inputs as immutable.
        let map = unsafe { Mmap::map(&file) }.map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to map archive")
                .with_path(path)
                .with_source(err)
        })?;
        Self::from_backing(path.to_path_buf(), Backing::Mapped(map))
    }

    /// Parses an in-memory archive; `label` stands in for a path in errors.
    pub fn from_bytes(label: impl Into<PathBuf>, bytes: Vec<u8>) -> Result<Self, Error> {
        Self::from_backing(label.into(), Backing::Owned(bytes))
    }

    fn from_backing(path: PathBuf, backing: Backing) -> Result<Self, Error> {
        let entries = parse_central_directory(backing.data())
            .map_err(|err| err.with_path(path.clone()))?;
        let mut by_name = HashMap::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            by_name.entry(entry.name.clone()).or_insert(index);
        }
        Ok(Self {
            path,
            backing,
            entries,
            by_name,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn read(&self, name: &str) -> Result<Vec<u8>, Error> {
        let index = self.by_name.get(name).ok_or_else(|| {
            Error::new(ErrorKind::NotFound)
                .with_message("no such archive entry")
                .with_path(&self.path)
                .with_entry(name)
        })?;
        self.read_entry(&self.entries[*index])
            .map_err(|err| err.with_path(&self.path).with_entry(name))
    }

    fn read_entry(&self, entry: &Entry) -> Result<Vec<u8>, Error> {
        if entry.flags & 0x0001 != 0 {
            return Err(Error::new(ErrorKind::Unsupported)
                .with_message("encrypted archive entries are not supported"));
        }
        let data = self.backing.data();
        let local = entry.local_offset as usize;
        if read_u32_le(data, local)? != LOCAL_SIG {
            return Err(corrupt("bad local file header signature"));
        }
        let name_len = read_u16_le(data, local + 26)? as usize;
        let extra_len = read_u16_le(data, local + 28)? as usize;
        let start = local + 30 + name_len + extra_len;
        let end = start
            .checked_add(entry.compressed_len as usize)
            .filter(|&end| end <= data.len())
            .ok_or_else(|| corrupt("entry data exceeds archive bounds"))?;
        let compressed = &data[start..end];

        let payload = match entry.method {
            METHOD_STORED => {
                if entry.compressed_len != entry.uncompressed_len {
                    return Err(corrupt("stored entry size mismatch"));
                }
                compressed.to_vec()
            }
            METHOD_DEFLATED => {
                let out = inflate::inflate(compressed, entry.uncompressed_len as usize)?;
                if out.len() != entry.uncompressed_len as usize {
                    return Err(corrupt("inflated size mismatch"));
                }
                out
            }
            other => {
                return Err(Error::new(ErrorKind::Unsupported)
                    .with_message(format!("unsupported compression method {other}")));
            }
        };
        if crc32(&payload) != entry.crc {
            return Err(corrupt("entry CRC-32 mismatch"));
        }
        Ok(payload)
    }
}

fn parse_central_directory(data: &[u8]) -> Result<Vec<Entry>, Error> {
    let eocd = find_eocd(data)?;
    let entry_count = read_u16_le(data, eocd + 10)? as usize;
    let cd_offset = read_u32_le(data, eocd + 16)? as usize;

    let mut entries = Vec::with_capacity(entry_count);
    let mut offset = cd_offset;
    for _ in 0..entry_count {
        if read_u32_le(data, offset)? != CENTRAL_SIG {
            return Err(corrupt("bad central directory signature"));
        }
        let flags = read_u16_le(data, offset + 8)?;
        let method = read_u16_le(data, offset + 10)?;
        let crc = read_u32_le(data, offset + 16)?;
        let compressed_len = read_u32_le(data, offset + 20)?;
        let uncompressed_len = read_u32_le(data, offset + 24)?;
        let name_len = read_u16_le(data, offset + 28)? as usize;
        let extra_len = read_u16_le(data, offset + 30)? as usize;
        let comment_len = read_u16_le(data, offset + 32)? as usize;
        let local_offset = read_u32_le(data, offset + 42)?;
        let name_bytes = data
            .get(offset + 46..offset + 46 + name_len)
            .ok_or_else(|| corrupt("truncated central directory name"))?;
        let name = String::from_utf8(name_bytes.to_vec())
            .map_err(|_| corrupt("archive entry name is not UTF-8"))?;
        entries.push(Entry {
            name,
            method,
            flags,
            crc,
            compressed_len,
            uncompressed_len,
            local_offset,
        });
        offset += 46 + name_len + extra_len + comment_len;
    }
    Ok(entries)
}

/// Scans backward for the end-of-central-directory record, tolerating a
/// trailing archive comment.
fn find_eocd(data: &[u8]) -> Result<usize, Error> {
    if data.len() < EOCD_LEN {
        return Err(corrupt("archive too small for end-of-central-directory"));
    }
    let floor = data.len().saturating_sub(EOCD_LEN + MAX_COMMENT);
    let mut offset = data.len() - EOCD_LEN;
    loop {
        if read_u32_le(data, offset)? == EOCD_SIG {
            return Ok(offset);
        }
        if offset == floor {
            return Err(corrupt("missing end-of-central-directory record"));
        }
        offset -= 1;
    }
}

struct PendingEntry {
    name: String,
    crc: u32,
    size: u32,
    local_offset: u32,
}

/// Stored-only archive writer. Entries keep insertion order and fixed
/// timestamps; `finish` appends the central directory.
#[derive(Default)]
pub struct JarWriter {
    buf: Vec<u8>,
    entries: Vec<PendingEntry>,
}

impl JarWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, data: &[u8]) -> Result<(), Error> {
        if name.len() > u16::MAX as usize {
            return Err(Error::new(ErrorKind::Unsupported)
                .with_message("archive entry name too long")
                .with_entry(name));
        }
        let size = u32::try_from(data.len()).map_err(|_| {
            Error::new(ErrorKind::Unsupported)
                .with_message("archive entry exceeds 4 GiB")
                .with_entry(name)
        })?;
        let local_offset = u32::try_from(self.buf.len()).map_err(|_| {
            Error::new(ErrorKind::Unsupported).with_message("archive exceeds 4 GiB")
        })?;
        let crc = crc32(data);

        self.buf.extend_from_slice(&LOCAL_SIG.to_le_bytes());
        self.push_u16(20); // version needed
        self.push_u16(0); // flags
        self.push_u16(METHOD_STORED);
        self.push_u16(DOS_TIME);
        self.push_u16(DOS_DATE);
        self.buf.extend_from_slice(&crc.to_le_bytes());
        self.buf.extend_from_slice(&size.to_le_bytes());
        self.buf.extend_from_slice(&size.to_le_bytes());
        self.push_u16(name.len() as u16);
        self.push_u16(0); // extra
        self.buf.extend_from_slice(name.as_bytes());
        self.buf.extend_from_slice(data);

        self.entries.push(PendingEntry {
            name: name.to_string(),
            crc,
            size,
            local_offset,
        });
        Ok(())
    }

    pub fn finish(mut self) -> Result<Vec<u8>, Error> {
        let cd_offset = u32::try_from(self.buf.len()).map_err(|_| {
            Error::new(ErrorKind::Unsupported).with_message("archive exceeds 4 GiB")
        })?;
        let count = u16::try_from(self.entries.len()).map_err(|_| {
            Error::new(ErrorKind::Unsupported)
                .with_message("archive has more than 65535 entries")
        })?;
        let entries = std::mem::take(&mut self.entries);
        for entry in &entries {
            self.buf.extend_from_slice(&CENTRAL_SIG.to_le_bytes());
            self.push_u16(20); // version made by
            self.push_u16(20); // version needed
            self.push_u16(0); // flags
            self.push_u16(METHOD_STORED);
            self.push_u16(DOS_TIME);
            self.push_u16(DOS_DATE);
            self.buf.extend_from_slice(&entry.crc.to_le_bytes());
            self.buf.extend_from_slice(&entry.size.to_le_bytes());
            self.buf.extend_from_slice(&entry.size.to_le_bytes());
            self.push_u16(entry.name.len() as u16);
            self.push_u16(0); // extra
            self.push_u16(0); // comment
            self.push_u16(0); // disk
            self.push_u16(0); // internal attrs
            self.buf.extend_from_slice(&0u32.to_le_bytes()); // external attrs
            self.buf.extend_from_slice(&entry.local_offset.to_le_bytes());
            self.buf.extend_from_slice(entry.name.as_bytes());
        }
        let cd_len = self.buf.len() as u32 - cd_offset;

        self.buf.extend_from_slice(&EOCD_SIG.to_le_bytes());
        self.push_u16(0); // disk
        self.push_u16(0); // central directory disk
        self.push_u16(count);
        self.push_u16(count);
        self.buf.extend_from_slice(&cd_len.to_le_bytes());
        self.buf.extend_from_slice(&cd_offset.to_le_bytes());
        self.push_u16(0); // comment length
        Ok(self.buf)
    }

    fn push_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::{crc32, JarReader, JarWriter};
    use crate::core::error::ErrorKind;
    use std::path::Path;

    const SAMPLE_JAR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/sample.jar");

    #[test]
    fn crc32_check_values() {
        assert_eq!(crc32(b""), 0);
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn reads_deflated_jar_entries() {
        let jar = JarReader::open(Path::new(SAMPLE_JAR)).expect("open");
        assert!(jar.contains("com/example/gson/Gson.class"));

        let bytes = jar.read("com/example/gson/Gson.class").expect("read");
        assert_eq!(&bytes[..4], &[0xCA, 0xFE, 0xBA, 0xBE]);
        assert_eq!(bytes.len(), 754);
    }

    #[test]
    fn missing_entry_is_not_found() {
        let jar = JarReader::open(Path::new(SAMPLE_JAR)).expect("open");
        let err = jar.read("com/example/Missing.class").expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn writer_output_round_trips_through_reader() {
        let mut writer = JarWriter::new();
        writer.add("a/B.class", b"first entry").expect("add");
        writer.add("a/C.class", b"second entry").expect("add");
        let archive = writer.finish().expect("finish");

        let jar = JarReader::from_bytes("mem.jar", archive).expect("parse");
        assert_eq!(jar.len(), 2);
        assert_eq!(jar.names().collect::<Vec<_>>(), ["a/B.class", "a/C.class"]);
        assert_eq!(jar.read("a/B.class").expect("read"), b"first entry");
        assert_eq!(jar.read("a/C.class").expect("read"), b"second entry");
    }

    #[test]
    fn writer_is_deterministic() {
        let build = || {
            let mut writer = JarWriter::new();
            writer.add("x/Y.class", b"payload").expect("add");
            writer.finish().expect("finish")
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn empty_archive_still_has_directory() {
        let archive = JarWriter::new().finish().expect("finish");
        let jar = JarReader::from_bytes("empty.jar", archive).expect("parse");
        assert!(jar.is_empty());
    }

    #[test]
    fn garbage_is_corrupt() {
        let err = JarReader::from_bytes("bad.jar", vec![0u8; 64]).expect_err("garbage");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn corrupted_payload_fails_crc() {
        let mut writer = JarWriter::new();
        writer.add("a/B.class", b"payload-bytes").expect("add");
        let mut archive = writer.finish().expect("finish");
        // Flip one payload byte; the local header is 30 bytes plus the name.
        let payload_start = 30 + "a/B.class".len();
        archive[payload_start] ^= 0xFF;

        let jar = JarReader::from_bytes("bad.jar", archive).expect("parse");
        let err = jar.read("a/B.class").expect_err("crc");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }
}
