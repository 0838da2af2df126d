//! Detached-signature generator (spec §4.4), grounded in `sign.cpp`.

use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use num_bigint::BigUint;
use sha1::{Digest, Sha1};

use crate::error::SignError;
use crate::pa::PaReader;
use crate::utils::read_cstring;

/// The BISIGN format version: which extensions are hashed into the file
/// digest, and the sentinel used when no file matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureVersion {
    V2,
    V3,
}

const V2_BLACKLIST: &[&str] = &[
    ".paa", ".jpg", ".p3d", ".tga", ".rvmat", ".lip", ".ogg", ".wss", ".png", ".rtm", ".pac", ".fxy", ".wrp",
];

const V3_WHITELIST: &[&str] = &[
    ".sqf", ".inc", ".bikb", ".ext", ".fsm", ".sqm", ".hpp", ".cfg", ".sqs", ".h",
];

impl SignatureVersion {
    fn included(self, ext: &str) -> bool {
        match self {
            SignatureVersion::V2 => !V2_BLACKLIST.contains(&ext),
            SignatureVersion::V3 => V3_WHITELIST.contains(&ext),
        }
    }

    fn empty_set_literal(self) -> &'static [u8] {
        match self {
            SignatureVersion::V2 => b"nothing",
            SignatureVersion::V3 => b"gnihton",
        }
    }

    fn number(self) -> u32 {
        match self {
            SignatureVersion::V2 => 2,
            SignatureVersion::V3 => 3,
        }
    }
}

fn extension_of(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((_, ext)) => format!(".{}", ext.to_ascii_lowercase()),
        None => String::new(),
    }
}

fn sha1_digest(chunks: &[&[u8]]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    for chunk in chunks {
        hasher.update(chunk);
    }
    hasher.finalize().into()
}

fn name_hash(entry_names: &[String]) -> [u8; 20] {
    let mut lowered: Vec<String> = entry_names.iter().map(|n| n.to_ascii_lowercase()).collect();
    lowered.sort();
    let concatenated = lowered.concat();
    sha1_digest(&[concatenated.as_bytes()])
}

fn file_hash<R: Read + Seek>(reader: &PaReader<R>, version: SignatureVersion) -> Result<[u8; 20], SignError> {
    let mut hasher = Sha1::new();
    let mut any = false;
    for entry in reader.entries() {
        if !version.included(&extension_of(&entry.name)) {
            continue;
        }
        any = true;
        let bytes = reader.read_entry_to_vec(&entry.name)?;
        hasher.update(&bytes);
    }
    if !any {
        hasher.update(version.empty_set_literal());
    }
    Ok(hasher.finalize().into())
}

/// PKCS#1-v1.5-style padding with the ASN.1 DER SHA-1 `DigestInfo` prefix,
/// to exactly `key_len_bytes`, matching `pad_hash` in the original tool.
fn pad_hash(hash: &[u8; 20], key_len_bytes: usize) -> Vec<u8> {
    let mut buf = vec![0xffu8; key_len_bytes];
    buf[0] = 0;
    buf[1] = 1;
    const DER_PREFIX: [u8; 16] = [
        0x00, 0x30, 0x21, 0x30, 0x09, 0x06, 0x05, 0x2b, 0x0e, 0x03, 0x02, 0x1a, 0x05, 0x00, 0x04, 0x14,
    ];
    let der_at = key_len_bytes - 36;
    buf[der_at..der_at + 16].copy_from_slice(&DER_PREFIX);
    buf[key_len_bytes - 20..].copy_from_slice(hash);
    buf
}

fn biguint_from_le_bytes(bytes: &[u8]) -> BigUint {
    let mut be = bytes.to_vec();
    be.reverse();
    BigUint::from_bytes_be(&be)
}

fn biguint_to_le_bytes(value: &BigUint, len: usize) -> Vec<u8> {
    let mut be = value.to_bytes_be();
    if be.len() < len {
        let mut padded = vec![0u8; len - be.len()];
        padded.extend_from_slice(&be);
        be = padded;
    }
    be.reverse();
    be
}

/// A `.biprivatekey` file: an RSA private key in the engine's own binary
/// blob layout (MS `PRIVATEKEYBLOB`-derived).
pub struct PrivateKey {
    pub key_name: String,
    pub key_length_bits: u32,
    pub public_exponent_le: u32,
    pub modulus: BigUint,
    pub private_exponent: BigUint,
}

impl PrivateKey {
    pub fn load(path: &Path) -> Result<Self, SignError> {
        let mut file = std::fs::File::open(path).map_err(|_| SignError::KeyUnreadable(path.to_path_buf()))?;
        let key_name = read_cstring(&mut file)?;
        let mut skip = [0u8; 16];
        file.read_exact(&mut skip)?;

        let key_length_bits = file.read_u32::<LittleEndian>()?;
        let public_exponent_le = file.read_u32::<LittleEndian>()?;

        let byte_len = (key_length_bits / 8) as usize;
        let mut modulus_bytes = vec![0u8; byte_len];
        file.read_exact(&mut modulus_bytes)?;
        let modulus = biguint_from_le_bytes(&modulus_bytes);

        // Skip prime1, prime2, exponent1, exponent2, coefficient — each
        // half the modulus width, matching the PRIVATEKEYBLOB layout.
        let skip_len = (key_length_bits as usize / 16) * 5;
        let mut skip_buf = vec![0u8; skip_len];
        file.read_exact(&mut skip_buf)?;

        let mut exponent_bytes = vec![0u8; byte_len];
        file.read_exact(&mut exponent_bytes)?;
        let private_exponent = biguint_from_le_bytes(&exponent_bytes);

        Ok(Self {
            key_name,
            key_length_bits,
            public_exponent_le,
            modulus,
            private_exponent,
        })
    }

    fn key_len_bytes(&self) -> usize {
        (self.key_length_bits / 8) as usize
    }

    fn raw_sign(&self, padded: &[u8]) -> BigUint {
        let m = BigUint::from_bytes_be(padded);
        m.modpow(&self.private_exponent, &self.modulus)
    }
}

/// The fully composed `.bisign` detached signature.
pub struct SignatureFile {
    pub key_name: String,
    pub key_length_bits: u32,
    pub public_exponent_le: u32,
    pub modulus: BigUint,
    pub version: u32,
    pub sig1: BigUint,
    pub sig2: BigUint,
    pub sig3: BigUint,
}

impl SignatureFile {
    pub fn write<W: Write>(&self, out: &mut W) -> Result<(), SignError> {
        let key_len = (self.key_length_bits / 8) as usize;

        out.write_all(self.key_name.as_bytes())?;
        out.write_all(&[0])?;
        out.write_u32::<LittleEndian>((key_len + 20) as u32)?;
        out.write_all(&[0x06, 0x02, 0x00, 0x00, 0x00, 0x24, 0x00, 0x00])?;
        out.write_all(b"RSA1")?;
        out.write_u32::<LittleEndian>(self.key_length_bits)?;
        out.write_u32::<LittleEndian>(self.public_exponent_le)?;
        out.write_all(&biguint_to_le_bytes(&self.modulus, key_len))?;

        out.write_u32::<LittleEndian>(key_len as u32)?;
        out.write_all(&biguint_to_le_bytes(&self.sig1, key_len))?;

        out.write_u32::<LittleEndian>(self.version)?;

        out.write_u32::<LittleEndian>(key_len as u32)?;
        out.write_all(&biguint_to_le_bytes(&self.sig2, key_len))?;

        out.write_u32::<LittleEndian>(key_len as u32)?;
        out.write_all(&biguint_to_le_bytes(&self.sig3, key_len))?;
        Ok(())
    }
}

/// Signs an open archive, producing the three padded-and-exponentiated
/// digests of spec §4.4.
pub fn sign_archive<R: Read + Seek>(
    reader: &PaReader<R>,
    key: &PrivateKey,
    version: SignatureVersion,
) -> Result<SignatureFile, SignError> {
    let mut prefix = reader
        .properties()
        .iter()
        .find(|(k, _)| k == "prefix")
        .map(|(_, v)| v.clone())
        .unwrap_or_default();
    if !prefix.is_empty() {
        prefix.push('\\');
    }

    let names: Vec<String> = reader.entries().iter().map(|e| e.name.clone()).collect();
    let h_name = name_hash(&names);
    let h_file = file_hash(reader, version)?;
    let h_archive = reader.archive_digest()?;

    let h2 = sha1_digest(&[&h_archive, &h_name, prefix.as_bytes()]);
    let h3 = sha1_digest(&[&h_file, &h_name, prefix.as_bytes()]);

    let key_len = key.key_len_bytes();
    let sig1 = key.raw_sign(&pad_hash(&h_archive, key_len));
    let sig2 = key.raw_sign(&pad_hash(&h2, key_len));
    let sig3 = key.raw_sign(&pad_hash(&h3, key_len));

    Ok(SignatureFile {
        key_name: key.key_name.clone(),
        key_length_bits: key.key_length_bits,
        public_exponent_le: key.public_exponent_le,
        modulus: key.modulus.clone(),
        version: version.number(),
        sig1,
        sig2,
        sig3,
    })
}

/// Resolves the default output path for a signature file, mirroring
/// `cmd_sign`'s `<archive>.<keyfilename>[.bisign]` convention.
pub fn default_signature_path(archive_path: &Path, key_path: &Path) -> PathBuf {
    let key_filename = key_path.file_name().and_then(|s| s.to_str()).unwrap_or("key");
    let mut path = format!("{}.{key_filename}", archive_path.display());
    if !path.ends_with(".bisign") {
        path.push_str(".bisign");
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad_hash_places_prefix_der_and_digest_correctly() {
        let hash = [7u8; 20];
        let padded = pad_hash(&hash, 128);
        assert_eq!(padded[0], 0);
        assert_eq!(padded[1], 1);
        assert_eq!(&padded[108..128], &hash);
        assert_eq!(padded[92], 0x00);
        assert_eq!(padded[93], 0x30);
    }

    #[test]
    fn name_hash_is_order_independent_of_input_case_and_sorts_first() {
        let h1 = name_hash(&["BETA.hpp".to_string(), "alpha.sqf".to_string()]);
        let h2 = name_hash(&["alpha.sqf".to_string(), "beta.hpp".to_string()]);
        assert_eq!(h1, h2);
    }

    #[test]
    fn biguint_le_roundtrip() {
        let value = BigUint::from(123456789u64);
        let bytes = biguint_to_le_bytes(&value, 16);
        assert_eq!(bytes.len(), 16);
        let back = biguint_from_le_bytes(&bytes);
        assert_eq!(back, value);
    }
}
