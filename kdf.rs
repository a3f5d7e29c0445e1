//! Password-based key derivation.
//!
//! This module turns a password plus a per-document random salt into a
//! 256-bit [`KeyMaterial`] using Argon2id.
//!
//! ## Work Factor
//!
//! The production setting ([`KdfParams::default`]) is 64 MiB of memory,
//! 3 passes and a single lane. The work factor is not recorded in the
//! container, so the same params must be used to write and to read a note.
//!
//! ## Security Features
//!
//! - Key bytes are zeroized on drop (via `ZeroizeOnDrop`)
//! - `Debug` output never shows key bytes
//! - Salts come from `OsRng` and are generated fresh for every derivation
//!   that produces a container

use crate::error::{NoteError, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::{Key, KeyInit, XChaCha20Poly1305};
use rand_core::{OsRng, RngCore};
use std::fmt;
use tracing::trace;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Argon2id memory cost in KiB (64 MiB)
pub const DEFAULT_MEMORY_KIB: u32 = 64 * 1024;
/// Argon2id passes over memory
pub const DEFAULT_ITERATIONS: u32 = 3;
/// Argon2id lanes
pub const DEFAULT_PARALLELISM: u32 = 1;

/// Length of a derived key in bytes
pub const KEY_LEN: usize = 32;
/// Length of a freshly generated salt in bytes
pub const SALT_LEN: usize = 16;

/// Argon2id work factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    memory_kib: u32,
    iterations: u32,
    parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: DEFAULT_MEMORY_KIB,
            iterations: DEFAULT_ITERATIONS,
            parallelism: DEFAULT_PARALLELISM,
        }
    }
}

impl KdfParams {
    /// Build a custom work factor. Rejects combinations Argon2 cannot run.
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self> {
        let params = Self {
            memory_kib,
            iterations,
            parallelism,
        };
        params.argon2_params()?;
        Ok(params)
    }

    pub fn memory_kib(&self) -> u32 {
        self.memory_kib
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn parallelism(&self) -> u32 {
        self.parallelism
    }

    fn argon2_params(&self) -> Result<Params> {
        Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(KEY_LEN),
        )
        .map_err(|e| NoteError::key(format!("invalid Argon2 params: {e}")))
    }
}

/// A symmetric key derived from a password, together with the salt it was
/// derived with. Lives only in memory.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    key: [u8; KEY_LEN],
    salt: Vec<u8>,
}

impl KeyMaterial {
    /// Salt this key was derived with.
    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    /// Raw key bytes. Use only for immediate cipher construction.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    #[allow(deprecated)]
    pub fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new(Key::from_slice(&self.key))
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("key", &"[REDACTED]")
            .field("salt_len", &self.salt.len())
            .finish()
    }
}

/// Fresh random salt from the OS generator.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive a key from `password` and `salt`.
///
/// Deterministic: the same password, salt and params always give the same
/// key. Accepts any password, including an empty one; rejecting weak
/// passwords is left to the caller.
pub fn derive_key(password: &str, salt: &[u8], params: &KdfParams) -> Result<KeyMaterial> {
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.argon2_params()?);

    trace!(
        salt_len = salt.len(),
        memory_kib = params.memory_kib,
        iterations = params.iterations,
        "deriving key"
    );

    // Derive straight into the zeroize-on-drop struct, no loose copy of the key.
    let mut material = KeyMaterial {
        key: [0u8; KEY_LEN],
        salt: salt.to_vec(),
    };
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut material.key)
        .map_err(|e| NoteError::key(format!("key derivation failed: {e}")))?;

    Ok(material)
}

/// Derive a key under a freshly generated salt.
pub fn derive_fresh_key(password: &str, params: &KdfParams) -> Result<KeyMaterial> {
    derive_key(password, &generate_salt(), params)
}
