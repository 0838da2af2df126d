//! PA reader (spec §4.3.1): header parsing plus a buffered seekable
//! sub-stream factory per entry.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt};
use parking_lot::Mutex;

use crate::error::PaError;
use crate::utils::read_cstring;

use super::entry::{Entry, PackMethod};

const BUFFER_SIZE: usize = 4096;

fn read_entry_header<R: Read>(r: &mut R) -> io::Result<Entry> {
    let name = read_cstring(r)?;
    let method_code = r.read_u32::<LittleEndian>()?;
    let original_size = r.read_u32::<LittleEndian>()?;
    let _reserved = r.read_u32::<LittleEndian>()?;
    let _timestamp = r.read_u32::<LittleEndian>()?;
    let data_size = r.read_u32::<LittleEndian>()?;
    Ok(Entry {
        name,
        method: PackMethod::from_code(method_code),
        original_size,
        data_size,
        start_offset: 0,
    })
}

/// Reads and indexes a PA file's header. A malformed/header-less file (the
/// 3den-exported compatibility case) is detected by the intro entry's
/// packing method and the stream is rewound rather than treated as fatal.
pub struct PaReader<R> {
    source: Arc<Mutex<R>>,
    properties: Vec<(String, String)>,
    entries: Vec<Entry>,
    headerless: bool,
}

impl<R: Read + Seek> PaReader<R> {
    pub fn open(mut source: R) -> Result<Self, PaError> {
        let intro = read_entry_header(&mut source)?;
        let mut properties = Vec::new();
        let mut headerless = false;

        if intro.method != PackMethod::VersionMarker {
            source.seek(SeekFrom::Start(0))?;
            headerless = true;
        } else {
            loop {
                let key = read_cstring(&mut source)?;
                if key.is_empty() {
                    break;
                }
                let value = read_cstring(&mut source)?;
                properties.push((key, value));
            }
        }

        let mut entries = Vec::new();
        loop {
            let entry = read_entry_header(&mut source)?;
            if entry.is_sentinel() {
                break;
            }
            entries.push(entry);
        }

        let mut cursor = source.stream_position()?;
        for entry in &mut entries {
            entry.start_offset = cursor;
            cursor += u64::from(entry.data_size);
        }

        Ok(Self {
            source: Arc::new(Mutex::new(source)),
            properties,
            entries,
            headerless,
        })
    }

    pub fn properties(&self) -> &[(String, String)] {
        &self.properties
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn is_headerless(&self) -> bool {
        self.headerless
    }

    fn find(&self, name: &str) -> Result<&Entry, PaError> {
        self.entries
            .iter()
            .find(|e| crate::utils::path_eq_ignore_case(&e.name, name))
            .ok_or_else(|| PaError::EntryNotFound(name.to_string()))
    }

    pub fn entry_stream(&self, name: &str) -> Result<EntrySubStream<R>, PaError> {
        let entry = self.find(name)?;
        Ok(EntrySubStream::new(
            Arc::clone(&self.source),
            entry.start_offset,
            u64::from(entry.data_size),
        ))
    }

    pub fn read_entry_to_vec(&self, name: &str) -> Result<Vec<u8>, PaError> {
        let mut stream = self.entry_stream(name)?;
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Reads the archive's trailing 20-byte SHA-1 digest (spec §4.3.2),
    /// used verbatim as the signer's "archive hash".
    pub fn archive_digest(&self) -> Result<[u8; 20], PaError> {
        let mut source = self.source.lock();
        let end = source.seek(SeekFrom::End(0))?;
        source.seek(SeekFrom::Start(end - 20))?;
        let mut digest = [0u8; 20];
        source.read_exact(&mut digest)?;
        Ok(digest)
    }
}

/// A seekable sub-stream over one entry's byte range in the backing file,
/// buffered so repeated small reads/seeks within one 4-KiB window never
/// touch the backing file again.
pub struct EntrySubStream<R> {
    source: Arc<Mutex<R>>,
    base_offset: u64,
    len: u64,
    pos: u64,
    buf: Vec<u8>,
    buf_start: u64,
}

impl<R: Read + Seek> EntrySubStream<R> {
    fn new(source: Arc<Mutex<R>>, base_offset: u64, len: u64) -> Self {
        Self {
            source,
            base_offset,
            len,
            pos: 0,
            buf: Vec::new(),
            buf_start: 0,
        }
    }

    fn in_buffer(&self, pos: u64) -> bool {
        pos >= self.buf_start && pos < self.buf_start + self.buf.len() as u64
    }

    fn refill(&mut self) -> io::Result<()> {
        let mut source = self.source.lock();
        source.seek(SeekFrom::Start(self.base_offset + self.pos))?;
        let to_read = (self.len - self.pos).min(BUFFER_SIZE as u64) as usize;
        let mut buf = vec![0u8; to_read];
        source.read_exact(&mut buf)?;
        self.buf = buf;
        self.buf_start = self.pos;
        Ok(())
    }
}

impl<R: Read + Seek> Read for EntrySubStream<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.len {
            return Ok(0);
        }
        if !self.in_buffer(self.pos) {
            self.refill()?;
        }
        let offset_in_buf = (self.pos - self.buf_start) as usize;
        let available = &self.buf[offset_in_buf..];
        let n = available.len().min(out.len());
        out[..n].copy_from_slice(&available[..n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for EntrySubStream<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::End(p) => self.len as i64 + p,
            SeekFrom::Current(p) => self.pos as i64 + p,
        };
        if new_pos < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "seek before start"));
        }
        self.pos = new_pos as u64;
        Ok(self.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pa::writer::{FileProducer, PaWriter};
    use std::io::Cursor;

    #[test]
    fn round_trip_properties_and_entries() {
        let mut writer = PaWriter::new();
        writer.set_property("prefix", "a\\b");
        writer.add_entry(FileProducer::from_bytes("c.txt", b"abc".to_vec()));
        writer.add_entry(FileProducer::from_bytes("d.txt", b"defgh".to_vec()));
        let mut out = Cursor::new(Vec::new());
        writer.write(&mut out).unwrap();

        let bytes = out.into_inner();
        let digest_start = bytes.len() - 20;
        let computed = {
            use sha1::{Digest, Sha1};
            let mut hasher = Sha1::new();
            hasher.update(&bytes[..bytes.len() - 21]);
            hasher.finalize()
        };
        assert_eq!(&bytes[digest_start..], &computed[..]);

        let reader = PaReader::open(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.properties(), &[("prefix".to_string(), "a\\b".to_string())]);
        assert_eq!(reader.entries().len(), 2);
        assert_eq!(reader.read_entry_to_vec("c.txt").unwrap(), b"abc");
        assert_eq!(reader.read_entry_to_vec("d.txt").unwrap(), b"defgh");
    }

    #[test]
    fn substream_seek_within_buffer_reads_correct_bytes() {
        let mut writer = PaWriter::new();
        writer.add_entry(FileProducer::from_bytes("f.bin", (0u8..=255).collect()));
        let mut out = Cursor::new(Vec::new());
        writer.write(&mut out).unwrap();

        let reader = PaReader::open(Cursor::new(out.into_inner())).unwrap();
        let mut stream = reader.entry_stream("f.bin").unwrap();
        stream.seek(SeekFrom::Start(10)).unwrap();
        let mut byte = [0u8; 1];
        stream.read_exact(&mut byte).unwrap();
        assert_eq!(byte[0], 10);
        stream.seek(SeekFrom::Start(5)).unwrap();
        stream.read_exact(&mut byte).unwrap();
        assert_eq!(byte[0], 5);
    }
}
