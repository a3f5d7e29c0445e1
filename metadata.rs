use crate::kdf::KeyMaterial;

/// Title shown for a note that has never been saved.
pub const UNTITLED: &str = "New note";

/// Structural record carried alongside note text.
///
/// Only `caret_position` travels inside the container. Everything else is
/// session state supplied by the caller or produced by key derivation.
#[derive(Debug, Default)]
pub struct DocumentMetadata {
    key: Option<KeyMaterial>,
    /// Opaque locator handed in by the caller; never interpreted.
    pub filename: Option<String>,
    pub display_name: Option<String>,
    /// Offset in characters.
    pub caret_position: usize,
    pub modified: bool,
}

impl DocumentMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    pub fn key(&self) -> Option<&KeyMaterial> {
        self.key.as_ref()
    }

    /// Replace the key. The previous key is zeroized as it drops.
    pub fn set_key(&mut self, key: KeyMaterial) {
        self.key = Some(key);
    }

    pub fn clear_key(&mut self) {
        self.key = None;
    }

    /// Window-style title: display name, or [`UNTITLED`] when there is no
    /// filename handle yet, with `*` appended while modified.
    pub fn title(&self) -> String {
        let mut title = match (&self.filename, &self.display_name) {
            (None, _) => UNTITLED.to_string(),
            (Some(_), Some(name)) => name.clone(),
            (Some(_), None) => String::new(),
        };
        if self.modified {
            title.push('*');
        }
        title
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::{derive_key, KdfParams};

    #[test]
    fn test_fresh_metadata_has_no_key() {
        let meta = DocumentMetadata::new();
        assert!(!meta.has_key());
        assert!(!meta.modified);
        assert_eq!(meta.caret_position, 0);
    }

    #[test]
    fn test_title() {
        let mut meta = DocumentMetadata::new();
        assert_eq!(meta.title(), "New note");
        meta.modified = true;
        assert_eq!(meta.title(), "New note*");

        meta.filename = Some("content://notes/7".into());
        meta.display_name = Some("groceries.enote".into());
        assert_eq!(meta.title(), "groceries.enote*");
        meta.modified = false;
        assert_eq!(meta.title(), "groceries.enote");
    }

    #[test]
    fn test_set_and_clear_key() {
        let params = KdfParams::new(32, 1, 1).unwrap();
        let mut meta = DocumentMetadata::new();
        meta.set_key(derive_key("pw", &[0u8; 16], &params).unwrap());
        assert!(meta.has_key());
        meta.clear_key();
        assert!(meta.key().is_none());
    }
}
