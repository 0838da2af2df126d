//! PA entry headers and packing methods (spec §4.3, §3 "PA entry").

/// How an entry's bytes are stored on disk. `VersionMarker` is reserved for
/// the synthetic first entry that carries the archive's property list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackMethod {
    None,
    VersionMarker,
    Compressed,
    Encrypted,
}

impl PackMethod {
    /// The four-byte method code as read from/written to the header,
    /// matching the original tool's packed-char constants (`'Vers'`, etc).
    pub fn from_code(code: u32) -> Self {
        match code {
            0x5665_7273 => PackMethod::VersionMarker,
            0x4370_7273 => PackMethod::Compressed,
            0x456e_6372 => PackMethod::Encrypted,
            _ => PackMethod::None,
        }
    }

    pub fn to_code(self) -> u32 {
        match self {
            PackMethod::None => 0,
            PackMethod::VersionMarker => 0x5665_7273,
            PackMethod::Compressed => 0x4370_7273,
            PackMethod::Encrypted => 0x456e_6372,
        }
    }
}

/// One entry's header plus its resolved absolute start offset within the
/// archive file (offset is computed during read, not stored on disk).
#[derive(Debug, Clone)]
pub struct Entry {
    pub name: String,
    pub method: PackMethod,
    pub original_size: u32,
    pub data_size: u32,
    pub start_offset: u64,
}

impl Entry {
    pub fn is_sentinel(&self) -> bool {
        self.name.is_empty()
    }
}
