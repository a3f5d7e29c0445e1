//! Encrypted note container codec.
//!
//! This module provides [`ContainerCodec`] for sealing note text into a
//! self-describing byte container and opening it again with a password.
//!
//! ## Container Format (version 1)
//!
//! ```text
//! [magic:4 "ENOT"][version:1]
//! [salt_len:2][salt:salt_len]
//! [nonce_len:2][nonce:24]
//! [caret:4]
//! [ciphertext_len:4][ciphertext:ciphertext_len]
//! [tag:16]
//! ```
//!
//! Integers are big-endian. Everything from the magic up to and including
//! `ciphertext_len` is the header and is bound into the XChaCha20-Poly1305
//! tag as associated data, so tampering with any byte is detected before
//! plaintext is released.

use crate::error::{NoteError, Result};
use crate::kdf::{self, KdfParams, KeyMaterial};
use chacha20poly1305::aead::AeadInPlace;
use chacha20poly1305::{Tag, XNonce};
use rand_core::{OsRng, RngCore};
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

/// Marker at the start of every container
pub const MAGIC: [u8; 4] = *b"ENOT";

/// Current container format version
pub const VERSION: u8 = 1;

/// XChaCha20-Poly1305 nonce length
pub const NONCE_LEN: usize = 24;

/// Poly1305 tag length
pub const TAG_LEN: usize = 16;

const MIN_SALT_LEN: usize = 16;
const MAX_SALT_LEN: usize = 64;

/// Parsed container header. Carries nothing secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub salt: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
    pub caret_position: u32,
    pub ciphertext_len: u32,
}

impl Header {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + 1 + 2 + self.salt.len() + 2 + NONCE_LEN + 4 + 4);
        buf.extend_from_slice(&MAGIC);
        buf.push(self.version);
        buf.extend_from_slice(&(self.salt.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.salt);
        buf.extend_from_slice(&(NONCE_LEN as u16).to_be_bytes());
        buf.extend_from_slice(&self.nonce);
        buf.extend_from_slice(&self.caret_position.to_be_bytes());
        buf.extend_from_slice(&self.ciphertext_len.to_be_bytes());
        buf
    }

    /// Total container size implied by this header.
    pub fn container_len(&self) -> usize {
        self.to_bytes().len() + self.ciphertext_len as usize + TAG_LEN
    }
}

/// Output of [`ContainerCodec::seal`]: the container bytes and the key they
/// were sealed under.
#[derive(Debug)]
pub struct Sealed {
    pub bytes: Vec<u8>,
    pub key: KeyMaterial,
}

/// Output of [`ContainerCodec::open`]. Only produced after the tag verified.
#[derive(Debug)]
pub struct Opened {
    pub text: String,
    pub caret_position: usize,
    pub key: KeyMaterial,
}

/// Bounds-checked cursor over container bytes. Every shortfall is a
/// format error, never a panic.
struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize, field: &str) -> Result<&'a [u8]> {
        let remaining = self.buf.len() - self.pos;
        if remaining < n {
            return Err(NoteError::format(format!(
                "truncated container: {field} needs {n} bytes, {remaining} left"
            )));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn read_u8(&mut self, field: &str) -> Result<u8> {
        Ok(self.take(1, field)?[0])
    }

    fn read_u16(&mut self, field: &str) -> Result<u16> {
        let b = self.take(2, field)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn read_u32(&mut self, field: &str) -> Result<u32> {
        let b = self.take(4, field)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// Header plus borrowed payload, as laid out in the input.
struct RawContainer<'a> {
    header: Header,
    header_bytes: &'a [u8],
    ciphertext: &'a [u8],
    tag: &'a [u8],
}

fn parse(bytes: &[u8]) -> Result<RawContainer<'_>> {
    let mut r = FieldReader::new(bytes);

    if r.take(MAGIC.len(), "magic")? != MAGIC {
        return Err(NoteError::format("not a note container (bad magic)"));
    }

    let version = r.read_u8("version")?;
    if version != VERSION {
        return Err(NoteError::format(format!(
            "unsupported container version: {version}"
        )));
    }

    let salt_len = r.read_u16("salt length")? as usize;
    if !(MIN_SALT_LEN..=MAX_SALT_LEN).contains(&salt_len) {
        return Err(NoteError::format(format!("invalid salt length: {salt_len}")));
    }
    let salt = r.take(salt_len, "salt")?.to_vec();

    let nonce_len = r.read_u16("nonce length")? as usize;
    if nonce_len != NONCE_LEN {
        return Err(NoteError::format(format!(
            "invalid nonce length: {nonce_len}"
        )));
    }
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(r.take(NONCE_LEN, "nonce")?);

    let caret_position = r.read_u32("caret position")?;
    let ciphertext_len = r.read_u32("ciphertext length")?;
    let header_end = r.pos;

    let ciphertext = r.take(ciphertext_len as usize, "ciphertext")?;
    let tag = r.take(TAG_LEN, "tag")?;

    if r.pos != bytes.len() {
        return Err(NoteError::format(format!(
            "{} trailing bytes after tag",
            bytes.len() - r.pos
        )));
    }

    Ok(RawContainer {
        header: Header {
            version,
            salt,
            nonce,
            caret_position,
            ciphertext_len,
        },
        header_bytes: &bytes[..header_end],
        ciphertext,
        tag,
    })
}

/// Read the header of a container without a password. Nothing is decrypted.
pub fn inspect(bytes: &[u8]) -> Result<Header> {
    Ok(parse(bytes)?.header)
}

/// Seals and opens note containers under a fixed KDF work factor.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerCodec {
    params: KdfParams,
}

impl ContainerCodec {
    pub fn new(params: KdfParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &KdfParams {
        &self.params
    }

    /// Encrypt `text` under `password` with a fresh salt and nonce.
    ///
    /// Sealing the same text twice never yields the same bytes.
    pub fn seal(&self, text: &str, caret_position: usize, password: &str) -> Result<Sealed> {
        let key = kdf::derive_fresh_key(password, &self.params)?;
        let bytes = seal_with_key(text, caret_position, &key)?;
        Ok(Sealed { bytes, key })
    }

    /// Verify and decrypt a container.
    ///
    /// A wrong password and a damaged container both surface as
    /// [`NoteError::WrongPasswordOrCorrupt`].
    #[allow(deprecated)]
    pub fn open(&self, bytes: &[u8], password: &str) -> Result<Opened> {
        let raw = parse(bytes)?;
        debug!(
            version = raw.header.version,
            ciphertext_len = raw.header.ciphertext_len,
            "parsed container header"
        );

        let key = kdf::derive_key(password, &raw.header.salt, &self.params)?;

        let mut buffer = Zeroizing::new(raw.ciphertext.to_vec());
        key.cipher()
            .decrypt_in_place_detached(
                XNonce::from_slice(&raw.header.nonce),
                raw.header_bytes,
                &mut buffer[..],
                Tag::from_slice(raw.tag),
            )
            .map_err(|_| NoteError::WrongPasswordOrCorrupt)?;

        let text = match String::from_utf8(std::mem::take(&mut *buffer)) {
            Ok(text) => text,
            Err(e) => {
                e.into_bytes().zeroize();
                return Err(NoteError::format("note text is not valid UTF-8"));
            }
        };

        Ok(Opened {
            text,
            caret_position: raw.header.caret_position as usize,
            key,
        })
    }
}

/// Encrypt under an already derived key. The key's salt is written into the
/// header; a fresh random nonce is drawn for every call.
#[allow(deprecated)]
fn seal_with_key(text: &str, caret_position: usize, key: &KeyMaterial) -> Result<Vec<u8>> {
    let ciphertext_len = u32::try_from(text.len())
        .map_err(|_| NoteError::format("note text too large for container"))?;

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let header = Header {
        version: VERSION,
        salt: key.salt().to_vec(),
        nonce,
        // Positions past u32::MAX cannot be stored; readers clamp anyway.
        caret_position: u32::try_from(caret_position).unwrap_or(u32::MAX),
        ciphertext_len,
    };
    let header_bytes = header.to_bytes();

    let mut payload = text.as_bytes().to_vec();
    let tag = key
        .cipher()
        .encrypt_in_place_detached(XNonce::from_slice(&nonce), &header_bytes, &mut payload)
        .map_err(|e| NoteError::format(format!("encryption failed: {e}")))?;

    let mut out = header_bytes;
    out.reserve(payload.len() + TAG_LEN);
    out.extend_from_slice(&payload);
    out.extend_from_slice(tag.as_slice());

    debug!(
        plaintext_len = text.len(),
        container_len = out.len(),
        "sealed container"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> ContainerCodec {
        ContainerCodec::new(KdfParams::new(32, 1, 1).expect("valid params"))
    }

    #[test]
    fn test_seal_open_round_trip() {
        let codec = codec();
        let sealed = codec.seal("dear diary", 3, "pw").unwrap();
        let opened = codec.open(&sealed.bytes, "pw").unwrap();
        assert_eq!(opened.text, "dear diary");
        assert_eq!(opened.caret_position, 3);
        assert_eq!(opened.key.as_bytes(), sealed.key.as_bytes());
    }

    #[test]
    fn test_layout_matches_header() {
        let sealed = codec().seal("abc", 0, "pw").unwrap();
        let bytes = &sealed.bytes;
        assert_eq!(&bytes[..4], b"ENOT");
        assert_eq!(bytes[4], VERSION);
        assert_eq!(u16::from_be_bytes([bytes[5], bytes[6]]), 16);

        let header = inspect(bytes).unwrap();
        assert_eq!(header.salt, sealed.key.salt());
        assert_eq!(header.ciphertext_len, 3);
        assert_eq!(header.container_len(), bytes.len());
        // 4 + 1 + 2 + 16 + 2 + 24 + 4 + 4 header, 3 ciphertext, 16 tag
        assert_eq!(bytes.len(), 57 + 3 + TAG_LEN);
    }

    #[test]
    fn test_empty_text_is_valid() {
        let codec = codec();
        let sealed = codec.seal("", 0, "pw").unwrap();
        let opened = codec.open(&sealed.bytes, "pw").unwrap();
        assert_eq!(opened.text, "");
    }

    #[test]
    fn test_wrong_password() {
        let codec = codec();
        let sealed = codec.seal("secret", 0, "right").unwrap();
        let err = codec.open(&sealed.bytes, "wrong").unwrap_err();
        assert!(matches!(err, NoteError::WrongPasswordOrCorrupt));
    }

    #[test]
    fn test_bad_magic_and_version() {
        let codec = codec();
        let sealed = codec.seal("x", 0, "pw").unwrap();

        let mut bad_magic = sealed.bytes.clone();
        bad_magic[0] = b'X';
        assert!(matches!(codec.open(&bad_magic, "pw"), Err(NoteError::Format(_))));

        let mut bad_version = sealed.bytes.clone();
        bad_version[4] = 2;
        assert!(matches!(codec.open(&bad_version, "pw"), Err(NoteError::Format(_))));
    }

    #[test]
    fn test_truncated_and_trailing() {
        let codec = codec();
        let sealed = codec.seal("some text", 0, "pw").unwrap();

        for len in [0, 3, 10, sealed.bytes.len() - 1] {
            let err = codec.open(&sealed.bytes[..len], "pw").unwrap_err();
            assert!(matches!(err, NoteError::Format(_)), "len {len}: {err}");
        }

        let mut longer = sealed.bytes.clone();
        longer.push(0);
        assert!(matches!(codec.open(&longer, "pw"), Err(NoteError::Format(_))));
    }

    #[test]
    fn test_huge_declared_length_is_format_error() {
        let codec = codec();
        let sealed = codec.seal("hi", 0, "pw").unwrap();
        let mut bytes = sealed.bytes.clone();
        let len_at = 4 + 1 + 2 + 16 + 2 + NONCE_LEN + 4;
        bytes[len_at..len_at + 4].copy_from_slice(&u32::MAX.to_be_bytes());
        assert!(matches!(codec.open(&bytes, "pw"), Err(NoteError::Format(_))));
    }

    #[test]
    fn test_caret_tamper_detected() {
        let codec = codec();
        let sealed = codec.seal("hello", 2, "pw").unwrap();
        let mut bytes = sealed.bytes.clone();
        let caret_at = 4 + 1 + 2 + 16 + 2 + NONCE_LEN;
        bytes[caret_at + 3] ^= 0x01;
        assert!(matches!(
            codec.open(&bytes, "pw"),
            Err(NoteError::WrongPasswordOrCorrupt)
        ));
    }

    #[test]
    fn test_fresh_salt_and_nonce_each_seal() {
        let codec = codec();
        let a = codec.seal("same", 0, "pw").unwrap();
        let b = codec.seal("same", 0, "pw").unwrap();
        assert_ne!(a.bytes, b.bytes);
        let (ha, hb) = (inspect(&a.bytes).unwrap(), inspect(&b.bytes).unwrap());
        assert_ne!(ha.salt, hb.salt);
        assert_ne!(ha.nonce, hb.nonce);
    }

    #[test]
    fn test_out_of_range_caret_is_passed_through() {
        let codec = codec();
        let sealed = codec.seal("ab", 500, "pw").unwrap();
        assert_eq!(codec.open(&sealed.bytes, "pw").unwrap().caret_position, 500);
    }

    #[test]
    #[allow(deprecated)]
    fn test_authentic_non_utf8_text_is_format_error() {
        let codec = codec();
        let key = kdf::derive_fresh_key("pw", codec.params()).unwrap();
        let mut payload = vec![0xff, 0xfe, 0x00];
        let header = Header {
            version: VERSION,
            salt: key.salt().to_vec(),
            nonce: [5u8; NONCE_LEN],
            caret_position: 0,
            ciphertext_len: payload.len() as u32,
        };
        let mut bytes = header.to_bytes();
        let tag = key
            .cipher()
            .encrypt_in_place_detached(XNonce::from_slice(&header.nonce), &bytes, &mut payload)
            .unwrap();
        bytes.extend_from_slice(&payload);
        bytes.extend_from_slice(tag.as_slice());

        let err = codec.open(&bytes, "pw").unwrap_err();
        assert!(matches!(err, NoteError::Format(_)), "{err}");
    }

    #[test]
    fn test_caret_beyond_u32_saturates() {
        let codec = codec();
        let sealed = codec.seal("short", usize::MAX, "pw").unwrap();
        assert_eq!(inspect(&sealed.bytes).unwrap().caret_position, u32::MAX);
        assert_eq!(
            codec.open(&sealed.bytes, "pw").unwrap().caret_position,
            u32::MAX as usize
        );
    }
}
