//! Decrypted note documents.
//!
//! This module provides [`Document`], the in-memory form of a note: plaintext
//! plus [`DocumentMetadata`]. Documents are produced only by [`Document::create`],
//! [`Document::blank`] or a fully verified [`Document::open`]; a failed open
//! yields no document at all.
//!
//! ## Features
//!
//! - Synchronous open/save over any `Read`/`Write` byte stream
//! - Fresh salt, nonce and key on every save
//! - Text and key material zeroized when the document is dropped

use crate::container::ContainerCodec;
use crate::error::Result;
use crate::kdf;
use crate::metadata::DocumentMetadata;
use std::fmt;
use std::io::{Read, Write};
use tracing::debug;
use zeroize::Zeroize;

pub struct Document {
    text: String,
    metadata: DocumentMetadata,
    codec: ContainerCodec,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("text", &"[REDACTED]")
            .field("text_len", &self.text.len())
            .field("metadata", &self.metadata)
            .field("codec", &self.codec)
            .finish()
    }
}

impl Drop for Document {
    fn drop(&mut self) {
        self.text.zeroize();
    }
}

impl Document {
    /// New document keyed from `password`, using the production work factor.
    pub fn create(text: impl Into<String>, password: &str) -> Result<Self> {
        Self::create_with(ContainerCodec::default(), text, password)
    }

    pub fn create_with(codec: ContainerCodec, text: impl Into<String>, password: &str) -> Result<Self> {
        let mut doc = Self::blank(codec);
        doc.text = text.into();
        doc.metadata.set_key(kdf::derive_fresh_key(password, codec.params())?);
        Ok(doc)
    }

    /// Empty, unkeyed, never-saved document.
    pub fn blank(codec: ContainerCodec) -> Self {
        Self {
            text: String::new(),
            metadata: DocumentMetadata::new(),
            codec,
        }
    }

    /// Read a whole container from `reader` and decrypt it.
    pub fn open<R: Read>(reader: R, password: &str) -> Result<Self> {
        Self::open_with(ContainerCodec::default(), reader, password)
    }

    pub fn open_with<R: Read>(codec: ContainerCodec, mut reader: R, password: &str) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;

        let opened = codec.open(&bytes, password)?;
        debug!(
            chars = opened.text.chars().count(),
            caret = opened.caret_position,
            "document opened"
        );

        let mut metadata = DocumentMetadata::new();
        metadata.caret_position = opened.caret_position;
        metadata.set_key(opened.key);

        Ok(Self {
            text: opened.text,
            metadata,
            codec,
        })
    }

    /// Encrypt the current text and caret under `password` and write the
    /// container to `writer`.
    ///
    /// Always derives a new key under a new salt. On success the document is
    /// clean and holds the new key; on failure it is left as it was.
    pub fn save<W: Write>(&mut self, password: &str, mut writer: W) -> Result<()> {
        let sealed = self
            .codec
            .seal(&self.text, self.metadata.caret_position, password)?;

        writer.write_all(&sealed.bytes)?;
        writer.flush()?;

        debug!(bytes = sealed.bytes.len(), "document saved");
        self.metadata.set_key(sealed.key);
        self.metadata.modified = false;
        Ok(())
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut DocumentMetadata {
        &mut self.metadata
    }

    pub fn codec(&self) -> &ContainerCodec {
        &self.codec
    }

    /// Replace the text and mark the document dirty.
    pub fn set_text(&mut self, text: impl Into<String>) {
        let mut old = std::mem::replace(&mut self.text, text.into());
        old.zeroize();
        self.on_text_changed();
    }

    /// Record an external edit of the text.
    pub fn on_text_changed(&mut self) {
        self.metadata.modified = true;
    }

    /// Moving the caret does not dirty the document.
    pub fn set_caret(&mut self, position: usize) {
        self.metadata.caret_position = position;
    }

    /// Caret clamped to the text length. Containers are free to carry an
    /// out-of-range caret.
    pub fn clamped_caret(&self) -> usize {
        self.metadata.caret_position.min(self.text.chars().count())
    }

    pub fn is_modified(&self) -> bool {
        self.metadata.modified
    }

    /// Discard the document, wiping text and key material.
    pub fn close(mut self) {
        self.metadata.clear_key();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NoteError;
    use crate::kdf::KdfParams;
    use std::io::Cursor;

    fn codec() -> ContainerCodec {
        ContainerCodec::new(KdfParams::new(32, 1, 1).unwrap())
    }

    #[test]
    fn test_create_is_clean_and_keyed() {
        let doc = Document::create_with(codec(), "hello", "pw").unwrap();
        assert_eq!(doc.text(), "hello");
        assert!(!doc.is_modified());
        assert!(doc.metadata().has_key());
        assert!(doc.metadata().filename.is_none());
    }

    #[test]
    fn test_save_open_round_trip() {
        let mut doc = Document::create_with(codec(), "line one\nline two", "pw").unwrap();
        doc.set_caret(9);

        let mut buf = Vec::new();
        doc.save("pw", &mut buf).unwrap();

        let reopened = Document::open_with(codec(), Cursor::new(buf), "pw").unwrap();
        assert_eq!(reopened.text(), "line one\nline two");
        assert_eq!(reopened.metadata().caret_position, 9);
        assert!(!reopened.is_modified());
        assert!(reopened.metadata().has_key());
    }

    #[test]
    fn test_save_rotates_salt() {
        let mut doc = Document::create_with(codec(), "x", "pw").unwrap();
        let created_salt = doc.metadata().key().unwrap().salt().to_vec();

        let mut first = Vec::new();
        doc.save("pw", &mut first).unwrap();
        let first_salt = doc.metadata().key().unwrap().salt().to_vec();

        let mut second = Vec::new();
        doc.save("pw", &mut second).unwrap();
        let second_salt = doc.metadata().key().unwrap().salt().to_vec();

        assert_ne!(created_salt, first_salt);
        assert_ne!(first_salt, second_salt);
        assert_ne!(first, second);
    }

    #[test]
    fn test_edits_mark_dirty_and_save_cleans() {
        let mut doc = Document::create_with(codec(), "a", "pw").unwrap();
        doc.set_caret(1);
        assert!(!doc.is_modified());

        doc.set_text("ab");
        assert!(doc.is_modified());

        doc.save("pw", Vec::new()).unwrap();
        assert!(!doc.is_modified());
    }

    #[test]
    fn test_failed_write_keeps_dirty() {
        struct FailingWriter;
        impl Write for FailingWriter {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut doc = Document::blank(codec());
        doc.set_text("unsaved");
        let err = doc.save("pw", FailingWriter).unwrap_err();
        assert!(matches!(err, NoteError::Io(_)));
        assert!(doc.is_modified());
        assert!(!doc.metadata().has_key());
    }

    #[test]
    fn test_wrong_password_yields_no_document() {
        let mut doc = Document::create_with(codec(), "secret", "pw").unwrap();
        let mut buf = Vec::new();
        doc.save("pw", &mut buf).unwrap();

        let result = Document::open_with(codec(), Cursor::new(buf), "nope");
        assert!(matches!(result, Err(NoteError::WrongPasswordOrCorrupt)));
    }

    #[test]
    fn test_clamped_caret() {
        let mut doc = Document::blank(codec());
        doc.set_text("héllo");
        doc.set_caret(42);
        assert_eq!(doc.clamped_caret(), 5);
        doc.set_caret(2);
        assert_eq!(doc.clamped_caret(), 2);
    }

    #[test]
    fn test_debug_redacts_text() {
        let doc = Document::create_with(codec(), "launch codes 0000", "pw").unwrap();
        let out = format!("{:?}", doc);
        assert!(out.contains("REDACTED"));
        assert!(!out.contains("launch codes"));
    }
}
