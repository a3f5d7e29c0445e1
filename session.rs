//! Lifecycle of the one note an editor has open.
//!
//! [`NoteSession`] tracks the document through
//! `Unloaded -> Loading -> Loaded(clean) <-> Loaded(dirty) -> Saving -> Loaded(clean)`.
//! The password prompt itself belongs to the caller: it calls
//! [`NoteSession::begin_open`] before prompting, then either
//! [`NoteSession::complete_open`] with the password or
//! [`NoteSession::cancel_open`]. No retry state is kept; a failed open
//! leaves the session `Unloaded` and the caller decides whether to ask again.

use crate::container::ContainerCodec;
use crate::document::Document;
use crate::error::{NoteError, Result};
use crate::metadata::UNTITLED;
use std::io::{Read, Write};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default idle period after which an open note is locked again.
pub const DEFAULT_RELOCK_AFTER: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unloaded,
    /// Waiting for the caller to supply a password.
    Loading,
    Loaded { dirty: bool },
    Saving,
}

/// Where a save should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveTarget {
    /// Already keyed and saved before: write back to this handle.
    Existing(String),
    /// Needs a new password and a destination from the caller.
    SaveAs,
}

pub struct NoteSession {
    state: SessionState,
    document: Option<Document>,
    codec: ContainerCodec,
    relock_after: Duration,
    last_active: Instant,
}

impl NoteSession {
    pub fn new(codec: ContainerCodec) -> Self {
        Self {
            state: SessionState::Unloaded,
            document: None,
            codec,
            relock_after: DEFAULT_RELOCK_AFTER,
            last_active: Instant::now(),
        }
    }

    pub fn with_relock_after(mut self, relock_after: Duration) -> Self {
        self.relock_after = relock_after;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn title(&self) -> String {
        match &self.document {
            Some(doc) => doc.metadata().title(),
            None => UNTITLED.to_string(),
        }
    }

    /// Start an empty, unsaved note in place of whatever was open.
    pub fn new_note(&mut self) {
        self.discard();
        self.document = Some(Document::blank(self.codec));
        self.state = SessionState::Loaded { dirty: false };
    }

    /// Password prompt is about to be shown. Drops the current document.
    pub fn begin_open(&mut self) {
        self.discard();
        self.state = SessionState::Loading;
    }

    /// Prompt dismissed without a password.
    pub fn cancel_open(&mut self) {
        if self.state == SessionState::Loading {
            self.state = SessionState::Unloaded;
        }
    }

    /// Decrypt the note read from `reader`. On any failure the session is
    /// `Unloaded` and holds no document.
    pub fn complete_open<R: Read>(
        &mut self,
        reader: R,
        password: &str,
        filename: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Result<&Document> {
        if self.state != SessionState::Loading {
            return Err(NoteError::InvalidState(format!(
                "cannot complete open from {:?}",
                self.state
            )));
        }

        match Document::open_with(self.codec, reader, password) {
            Ok(mut doc) => {
                let meta = doc.metadata_mut();
                meta.filename = Some(filename.into());
                meta.display_name = Some(display_name.into());
                debug!(title = %doc.metadata().title(), "note opened");
                self.state = SessionState::Loaded { dirty: false };
                self.last_active = Instant::now();
                Ok(&*self.document.insert(doc))
            }
            Err(e) => {
                debug!(error = %e, "note open failed");
                self.state = SessionState::Unloaded;
                Err(e)
            }
        }
    }

    /// Replace the note text. Returns false when nothing is loaded.
    pub fn edit(&mut self, text: impl Into<String>) -> bool {
        match (&mut self.document, self.state) {
            (Some(doc), SessionState::Loaded { .. }) => {
                doc.set_text(text);
                self.state = SessionState::Loaded { dirty: true };
                true
            }
            _ => false,
        }
    }

    pub fn set_caret(&mut self, position: usize) {
        if let Some(doc) = &mut self.document {
            doc.set_caret(position);
        }
    }

    /// Unsaved changes would be lost by replacing the document.
    pub fn needs_save_prompt(&self) -> bool {
        matches!(self.state, SessionState::Loaded { dirty: true })
    }

    pub fn save_target(&self) -> Option<SaveTarget> {
        let doc = self.document.as_ref()?;
        let meta = doc.metadata();
        Some(match (&meta.filename, meta.has_key()) {
            (Some(handle), true) => SaveTarget::Existing(handle.clone()),
            _ => SaveTarget::SaveAs,
        })
    }

    /// Save back to the document's current handle.
    pub fn save<W: Write>(&mut self, password: &str, writer: W) -> Result<()> {
        self.save_inner(password, writer, None)
    }

    /// Save to a new handle, re-keying under `password`.
    pub fn save_as<W: Write>(
        &mut self,
        password: &str,
        writer: W,
        filename: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Result<()> {
        self.save_inner(password, writer, Some((filename.into(), display_name.into())))
    }

    fn save_inner<W: Write>(
        &mut self,
        password: &str,
        writer: W,
        target: Option<(String, String)>,
    ) -> Result<()> {
        let SessionState::Loaded { dirty } = self.state else {
            return Err(NoteError::InvalidState(format!(
                "cannot save from {:?}",
                self.state
            )));
        };
        let Some(doc) = self.document.as_mut() else {
            return Err(NoteError::InvalidState("no document loaded".into()));
        };

        self.state = SessionState::Saving;
        match doc.save(password, writer) {
            Ok(()) => {
                if let Some((filename, display_name)) = target {
                    let meta = doc.metadata_mut();
                    meta.filename = Some(filename);
                    meta.display_name = Some(display_name);
                }
                debug!(title = %doc.metadata().title(), "note saved");
                self.state = SessionState::Loaded { dirty: false };
                self.last_active = Instant::now();
                Ok(())
            }
            Err(e) => {
                debug!(error = %e, "note save failed");
                self.state = SessionState::Loaded { dirty };
                Err(e)
            }
        }
    }

    /// Record user activity.
    pub fn touch(&mut self, now: Instant) {
        self.last_active = now;
    }

    /// A saved note has been idle longer than the relock period.
    pub fn should_relock(&self, now: Instant) -> bool {
        let has_handle = self
            .document
            .as_ref()
            .is_some_and(|doc| doc.metadata().filename.is_some());
        has_handle && now.saturating_duration_since(self.last_active) > self.relock_after
    }

    /// Drop the document and its key. Returns the handle to reopen, if any.
    ///
    /// Unsaved edits are discarded.
    pub fn lock(&mut self) -> Option<String> {
        let handle = self
            .document
            .as_ref()
            .and_then(|doc| doc.metadata().filename.clone());
        if self.needs_save_prompt() {
            debug!("locking note with unsaved changes");
        }
        self.discard();
        self.state = SessionState::Unloaded;
        handle
    }

    pub fn close(&mut self) {
        self.discard();
        self.state = SessionState::Unloaded;
    }

    fn discard(&mut self) {
        if let Some(doc) = self.document.take() {
            doc.close();
        }
    }
}
