//! Unpack driver (spec §4.1 AMBIENT supplement, grounded in `unpack.cpp`'s
//! `cmd_unpack`): writes an archive's entries to a destination directory.

use std::io::{Read, Seek};
use std::path::Path;

use crate::error::PaError;

use super::filter::EntryFilter;
use super::reader::PaReader;

/// Extracts every kept entry from `reader` under `dest_dir`. Backslash
/// path separators in entry names become host path separators.
/// `$PBOPREFIX$` is written back out when the archive carries a `prefix`
/// property, matching the original tool writing it as a sibling file.
pub fn unpack_to_dir<R: Read + Seek>(
    reader: &PaReader<R>,
    dest_dir: &Path,
    filter: &EntryFilter,
    force: bool,
) -> Result<usize, PaError> {
    std::fs::create_dir_all(dest_dir)?;

    if let Some((_, prefix)) = reader.properties().iter().find(|(k, _)| k == "prefix") {
        let marker_path = dest_dir.join("$PBOPREFIX$");
        if force || !marker_path.exists() {
            std::fs::write(&marker_path, prefix)?;
        }
    }

    let mut written = 0;
    for entry in reader.entries() {
        if !filter.keep(&entry.name) {
            continue;
        }
        let relative = entry.name.replace('\\', std::path::MAIN_SEPARATOR_STR);
        let out_path = dest_dir.join(relative);
        if out_path.exists() && !force {
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut stream = reader.entry_stream(&entry.name)?;
        let mut out_file = std::fs::File::create(&out_path)?;
        std::io::copy(&mut stream, &mut out_file)?;
        written += 1;
    }
    Ok(written)
}
