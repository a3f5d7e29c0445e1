//! # notecrypt - Password-Protected Notes
//!
//! notecrypt turns note text into an opaque container that only the right
//! password can open, and searches decrypted notes incrementally.
//!
//! ## Features
//!
//! - **Argon2id**: Memory-hard password key derivation, fresh salt per save
//! - **XChaCha20-Poly1305**: Authenticated encryption with the header bound
//!   in as associated data
//! - **No oracle**: Wrong password and corruption are one error
//! - **Incremental search**: Case-insensitive find-next with wraparound and a
//!   pluggable highlighter
//! - **Key hygiene**: Key material and plaintext zeroized on drop
//!
//! ## Quick Start
//!
//! ```no_run
//! use notecrypt::document::Document;
//! use notecrypt::search::{Highlighter, Searcher};
//!
//! struct NoHighlights;
//! impl Highlighter for NoHighlights {
//!     fn clear_highlights(&mut self) {}
//!     fn add_highlight(&mut self, _start: usize, _end: usize, _is_current: bool) {}
//! }
//!
//! fn main() -> notecrypt::Result<()> {
//!     let mut doc = Document::create("buy milk", "hunter2")?;
//!     let mut container = Vec::new();
//!     doc.save("hunter2", &mut container)?;
//!
//!     let reopened = Document::open(container.as_slice(), "hunter2")?;
//!     let mut searcher = Searcher::new("MILK", reopened.text(), 0, NoHighlights)?;
//!     assert_eq!(searcher.find_next(), Some(4));
//!     Ok(())
//! }
//! ```
//!
//! All operations are synchronous. Key derivation is deliberately slow, so
//! interactive callers should run open and save off their UI thread.

pub mod config;
pub mod container;
pub mod document;
pub mod error;
pub mod kdf;
pub mod metadata;
pub mod search;
pub mod session;

// Re-export common types for convenience
pub use error::{NoteError, Result};
