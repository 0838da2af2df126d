//! Small shared helpers used across the config, model, PA and signing engines.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Reads a "compressed" variable-length unsigned integer: little-endian
/// 7-bit groups, MSB of each byte is the continuation bit.
pub fn read_compressed_int<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut result: u32 = 0;
    let mut shift = 0u32;
    loop {
        let mut byte = [0u8; 1];
        r.read_exact(&mut byte)?;
        let byte = byte[0];
        result |= u32::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    Ok(result)
}

/// Writes `value` using the same 7-bit-group/continuation-bit scheme as
/// [`read_compressed_int`].
pub fn write_compressed_int<W: Write>(w: &mut W, mut value: u32) -> io::Result<()> {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        w.write_all(&[byte])?;
        if value == 0 {
            break;
        }
    }
    Ok(())
}

/// Reads a NUL-terminated C string from `r`.
pub fn read_cstring<R: Read>(r: &mut R) -> io::Result<String> {
    let mut bytes = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        r.read_exact(&mut byte)?;
        if byte[0] == 0 {
            break;
        }
        bytes.push(byte[0]);
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Writes `s` followed by a NUL terminator.
pub fn write_cstring<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    w.write_all(s.as_bytes())?;
    w.write_all(&[0])
}

/// Normalizes a logical archive/config path to use backslashes, matching
/// the engine's on-disk convention regardless of host path separator.
pub fn normalize_backslashes(path: &str) -> String {
    path.replace('/', "\\")
}

/// Case-insensitive equality for logical (backslash) paths.
pub fn path_eq_ignore_case(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Creates a string from a slice of little-endian UTF-16 code units packed
/// as raw bytes.
pub fn string_from_utf16_bytes(slice: &[u8]) -> Option<String> {
    if slice.len() < 2 {
        return None;
    }
    let u16_slice = slice
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect::<Vec<u16>>();

    String::from_utf16(&u16_slice).ok()
}

/// A simple glob matcher supporting `*` and `?`, used by the PA
/// include/exclude filters. Comparisons are case-insensitive.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    fn inner(p: &[u8], t: &[u8]) -> bool {
        match (p.first(), t.first()) {
            (None, None) => true,
            (Some(b'*'), _) => inner(&p[1..], t) || (!t.is_empty() && inner(p, &t[1..])),
            (Some(b'?'), Some(_)) => inner(&p[1..], &t[1..]),
            (Some(pc), Some(tc)) if pc.eq_ignore_ascii_case(tc) => inner(&p[1..], &t[1..]),
            _ => false,
        }
    }
    inner(pattern.as_bytes(), text.as_bytes())
}

/// RAII guard around a process-local temporary directory. Acquired once at
/// the start of an operation and removed on every exit path, including
/// panics, matching the "disciplined acquire/release pair" of the resource
/// model.
pub struct TempDirGuard {
    path: PathBuf,
}

impl TempDirGuard {
    pub fn new(prefix: &str) -> io::Result<Self> {
        let base = std::env::temp_dir();
        let unique = format!("{prefix}-{}", std::process::id());
        let path = base.join(unique);
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

/// Formats a float with enough digits to round-trip through `f32::from_str`,
/// matching the derapifier's textual output contract.
pub fn format_roundtrip_f32(value: f32) -> String {
    let mut s = format!("{value}");
    if !s.contains('.') && !s.contains('e') && !s.contains('E') {
        s.push_str(".0");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compressed_int_roundtrip() {
        for value in [0u32, 1, 127, 128, 300, 16384, u32::MAX] {
            let mut buf = Vec::new();
            write_compressed_int(&mut buf, value).unwrap();
            let mut cursor = io::Cursor::new(buf);
            let decoded = read_compressed_int(&mut cursor).unwrap();
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn cstring_roundtrip() {
        let mut buf = Vec::new();
        write_cstring(&mut buf, "hello").unwrap();
        let mut cursor = io::Cursor::new(buf);
        assert_eq!(read_cstring(&mut cursor).unwrap(), "hello");
    }

    #[test]
    fn glob_matches_wildcards() {
        assert!(glob_match("*.paa", "texture.PAA"));
        assert!(glob_match("cfg?.hpp", "cfg1.hpp"));
        assert!(!glob_match("cfg?.hpp", "cfg12.hpp"));
    }
}
