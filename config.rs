//! Configuration management with environment variable support.
//!
//! This module provides [`Config`] for loading and validating front-end
//! settings from JSON files and environment variables. None of these
//! settings change the container format or the KDF work factor.
//!
//! ## Environment Variables
//!
//! - `NOTECRYPT_MIN_QUERY_LEN`: Shortest query searched while typing
//! - `NOTECRYPT_RELOCK_SECS`: Idle seconds before an open note is locked
//! - `NOTECRYPT_CONTEXT_CHARS`: Characters of context around search hits
//! - `NOTECRYPT_CONFIG`: Override config file path

use crate::error::{NoteError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Environment variable names for configuration overrides
pub const ENV_MIN_QUERY_LEN: &str = "NOTECRYPT_MIN_QUERY_LEN";
pub const ENV_RELOCK_SECS: &str = "NOTECRYPT_RELOCK_SECS";
pub const ENV_CONTEXT_CHARS: &str = "NOTECRYPT_CONTEXT_CHARS";
pub const ENV_CONFIG_PATH: &str = "NOTECRYPT_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub min_query_len: usize,
    pub relock_after_secs: u64,
    pub context_chars: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_query_len: 2,
            relock_after_secs: 300,
            context_chars: 24,
        }
    }
}

impl Config {
    /// Load config from file path
    pub fn load(path: &str) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config with environment variable overrides
    /// Priority: ENV vars > config file > defaults
    pub fn load_with_env(path: Option<&str>) -> Result<Self> {
        let config_path = path
            .map(String::from)
            .or_else(|| env::var(ENV_CONFIG_PATH).ok());

        let mut config = match config_path {
            Some(ref p) if Path::new(p).exists() => {
                debug!(path = p, "loading config from file");
                Self::from_file(p)?
            }
            Some(ref p) => {
                debug!(path = p, "config file not found, using defaults");
                Config::default()
            }
            None => {
                debug!("using default configuration");
                Config::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let s = fs::read_to_string(path)
            .map_err(|e| NoteError::config(format!("reading config file {path}: {e}")))?;
        serde_json::from_str(&s)
            .map_err(|e| NoteError::config(format!("parsing config file {path}: {e}")))
    }

    /// Apply environment variable overrides to config
    fn apply_env_overrides(&mut self) {
        override_from_env(ENV_MIN_QUERY_LEN, &mut self.min_query_len);
        override_from_env(ENV_RELOCK_SECS, &mut self.relock_after_secs);
        override_from_env(ENV_CONTEXT_CHARS, &mut self.context_chars);
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.min_query_len == 0 {
            return Err(NoteError::config("min_query_len must be at least 1"));
        }

        if self.relock_after_secs == 0 {
            return Err(NoteError::config("relock_after_secs must be at least 1"));
        }

        if self.relock_after_secs > 24 * 60 * 60 {
            debug!(
                relock_after_secs = self.relock_after_secs,
                "relock period over a day keeps decrypted notes in memory for long stretches"
            );
        }

        Ok(())
    }

    pub fn relock_after(&self) -> Duration {
        Duration::from_secs(self.relock_after_secs)
    }
}

fn override_from_env<T: FromStr>(var: &str, slot: &mut T) {
    let Ok(raw) = env::var(var) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => {
            debug!(var, value = %raw, "overriding config from environment");
            *slot = value;
        }
        Err(_) => debug!(var, value = %raw, "ignoring unparsable environment override"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_defaults_validate() {
        let cfg = Config::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.min_query_len, 2);
        assert_eq!(cfg.relock_after(), Duration::from_secs(300));
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let _guard = ENV_LOCK.lock().expect("env lock");
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "context_chars": 10 }}"#).unwrap();

        let cfg = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.context_chars, 10);
        assert_eq!(cfg.relock_after_secs, 300);
    }

    #[test]
    fn test_zero_min_query_len_rejected() {
        let cfg = Config {
            min_query_len: 0,
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(NoteError::Config(_))));
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let _guard = ENV_LOCK.lock().expect("env lock");
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = Config::load(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, NoteError::Config(_)));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let _guard = ENV_LOCK.lock().expect("env lock");
        let cfg = Config::load_with_env(Some("/definitely/not/here.json")).unwrap();
        assert_eq!(cfg.min_query_len, Config::default().min_query_len);
    }

    #[test]
    fn test_env_overrides_file() {
        let _guard = ENV_LOCK.lock().expect("env lock");
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "min_query_len": 4, "context_chars": 10 }}"#).unwrap();
        let path = file.path().to_str().unwrap();

        env::set_var(ENV_MIN_QUERY_LEN, "3");
        let cfg = Config::load_with_env(Some(path));
        env::remove_var(ENV_MIN_QUERY_LEN);

        let cfg = cfg.unwrap();
        assert_eq!(cfg.min_query_len, 3);
        assert_eq!(cfg.context_chars, 10);
        assert_eq!(cfg.relock_after_secs, 300);
    }

    #[test]
    fn test_unparsable_env_value_is_ignored() {
        let _guard = ENV_LOCK.lock().expect("env lock");
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "min_query_len": 4 }}"#).unwrap();
        let path = file.path().to_str().unwrap();

        env::set_var(ENV_MIN_QUERY_LEN, "three");
        env::set_var(ENV_RELOCK_SECS, "-5");
        let cfg = Config::load_with_env(Some(path));
        env::remove_var(ENV_MIN_QUERY_LEN);
        env::remove_var(ENV_RELOCK_SECS);

        let cfg = cfg.unwrap();
        assert_eq!(cfg.min_query_len, 4);
        assert_eq!(cfg.relock_after_secs, 300);
    }

    #[test]
    fn test_env_zero_fails_validation() {
        let _guard = ENV_LOCK.lock().expect("env lock");
        env::set_var(ENV_MIN_QUERY_LEN, "0");
        let result = Config::load_with_env(Some("/definitely/not/here.json"));
        env::remove_var(ENV_MIN_QUERY_LEN);

        assert!(matches!(result, Err(NoteError::Config(_))));
    }
}
