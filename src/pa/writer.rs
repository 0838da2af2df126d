//! PA writer (spec §4.3.2): accepts ordered file producers and emits a
//! complete archive with a trailing SHA-1 digest.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use byteorder::{LittleEndian, WriteBytesExt};
use sha1::{Digest, Sha1};

use crate::error::PaError;
use crate::utils::write_cstring;

use super::entry::PackMethod;

/// A named byte source the writer streams into the archive. Concrete
/// variants cover the two the tool needs: an on-disk file and an
/// in-memory buffer (used by tests and synthetic entries).
pub enum FileProducer {
    File { name: String, path: PathBuf, size: u64 },
    Memory { name: String, data: Vec<u8> },
}

impl FileProducer {
    pub fn from_path(name: impl Into<String>, path: PathBuf) -> io::Result<Self> {
        let size = std::fs::metadata(&path)?.len();
        Ok(FileProducer::File { name: name.into(), path, size })
    }

    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Self {
        FileProducer::Memory { name: name.into(), data }
    }

    pub fn name(&self) -> &str {
        match self {
            FileProducer::File { name, .. } => name,
            FileProducer::Memory { name, .. } => name,
        }
    }

    pub fn stored_size(&self) -> u64 {
        match self {
            FileProducer::File { size, .. } => *size,
            FileProducer::Memory { data, .. } => data.len() as u64,
        }
    }

    fn write_into<W: Write>(&self, sink: &mut W) -> Result<(), PaError> {
        match self {
            FileProducer::File { path, .. } => {
                let mut file = File::open(path).map_err(|_| PaError::Unreadable(path.clone()))?;
                io::copy(&mut file, sink)?;
            }
            FileProducer::Memory { data, .. } => {
                sink.write_all(data)?;
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct PaWriter {
    properties: Vec<(String, String)>,
    entries: Vec<FileProducer>,
}

impl PaWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.push((key.into(), value.into()));
    }

    pub fn add_entry(&mut self, producer: FileProducer) {
        self.entries.push(producer);
    }

    /// Writes the complete archive: version-marker entry, properties,
    /// per-file headers, the sentinel, each file's body, and the trailing
    /// `0x00` + SHA-1 digest over everything written before it.
    pub fn write<W: Write>(&self, out: &mut W) -> Result<(), PaError> {
        let mut hashing = HashingWriter::new(out);

        write_cstring(&mut hashing, "")?;
        hashing.write_u32::<LittleEndian>(PackMethod::VersionMarker.to_code())?;
        hashing.write_u32::<LittleEndian>(0)?;
        hashing.write_u32::<LittleEndian>(0)?;
        hashing.write_u32::<LittleEndian>(0)?;
        hashing.write_u32::<LittleEndian>(0)?;

        for (key, value) in &self.properties {
            write_cstring(&mut hashing, key)?;
            write_cstring(&mut hashing, value)?;
        }
        write_cstring(&mut hashing, "")?;

        for producer in &self.entries {
            write_cstring(&mut hashing, producer.name())?;
            hashing.write_u32::<LittleEndian>(PackMethod::None.to_code())?;
            hashing.write_u32::<LittleEndian>(producer.stored_size() as u32)?;
            hashing.write_u32::<LittleEndian>(0)?;
            hashing.write_u32::<LittleEndian>(0)?;
            hashing.write_u32::<LittleEndian>(producer.stored_size() as u32)?;
        }
        write_cstring(&mut hashing, "")?;
        hashing.write_u32::<LittleEndian>(PackMethod::None.to_code())?;
        hashing.write_u32::<LittleEndian>(0)?;
        hashing.write_u32::<LittleEndian>(0)?;
        hashing.write_u32::<LittleEndian>(0)?;
        hashing.write_u32::<LittleEndian>(0)?;

        for producer in &self.entries {
            producer.write_into(&mut hashing)?;
        }

        let digest = hashing.finalize();
        out.write_all(&[0u8])?;
        out.write_all(&digest)?;
        Ok(())
    }
}

/// Wraps a writer and accumulates a SHA-1 digest of every byte written
/// through it, matching the archive trailer's "every preceding byte"
/// contract without buffering the whole archive in memory.
struct HashingWriter<'a, W> {
    inner: &'a mut W,
    hasher: Sha1,
}

impl<'a, W: Write> HashingWriter<'a, W> {
    fn new(inner: &'a mut W) -> Self {
        Self { inner, hasher: Sha1::new() }
    }

    fn finalize(self) -> [u8; 20] {
        self.hasher.finalize().into()
    }
}

impl<'a, W: Write> Write for HashingWriter<'a, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
