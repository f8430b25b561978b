//! Session tuning, login parameters and connection files.

use std::{fs, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GemError, GemResult};

/// Default number of bytes requested per chunked fetch call.
pub const DEFAULT_FETCH_CHUNK_SIZE: usize = 200;
/// Default number of finalized oops held back before a release is forced.
pub const DEFAULT_RELEASE_BATCH_SIZE: usize = 1000;

/// Per-session tuning knobs.
///
/// ```
/// use gembridge::SessionConfig;
///
/// let config = SessionConfig::new().fetch_chunk_size(64).release_batch_size(10);
/// assert_eq!(config.fetch_chunk_size, 64);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Bytes requested per call when fetching strings and byte arrays. Also the step by
    /// which the password encryption buffer grows.
    pub fetch_chunk_size: usize,
    /// The pending-release set is flushed once it holds more than this many oops.
    pub release_batch_size: usize,
}

impl SessionConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the chunk size used by chunked fetches. Zero is treated as one.
    #[must_use]
    pub fn fetch_chunk_size(mut self, size: usize) -> Self {
        self.fetch_chunk_size = size.max(1);
        self
    }

    /// Sets how many finalized oops may accumulate before a release is forced.
    #[must_use]
    pub fn release_batch_size(mut self, size: usize) -> Self {
        self.release_batch_size = size;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fetch_chunk_size: DEFAULT_FETCH_CHUNK_SIZE,
            release_batch_size: DEFAULT_RELEASE_BATCH_SIZE,
        }
    }
}

fn default_stone_name() -> String {
    "gs64stone".to_owned()
}

fn default_netldi_task() -> String {
    "gemnetobject".to_owned()
}

/// Credentials and addressing for a login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginParams {
    /// GemStone user.
    pub username: String,
    /// GemStone password, sent encrypted.
    pub password: String,
    #[serde(default = "default_stone_name")]
    pub stone_name: String,
    /// Operating-system user on the gem's host, when the NetLDI requires one.
    #[serde(default)]
    pub host_username: Option<String>,
    #[serde(default)]
    pub host_password: Option<String>,
    /// NetLDI service that spawns the gem (RPC sessions only).
    #[serde(default = "default_netldi_task")]
    pub netldi_task: String,
}

impl LoginParams {
    /// Parameters for `username`/`password` with the stock stone name and NetLDI task.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            stone_name: default_stone_name(),
            host_username: None,
            host_password: None,
            netldi_task: default_netldi_task(),
        }
    }

    #[must_use]
    pub fn stone_name(mut self, name: impl Into<String>) -> Self {
        self.stone_name = name.into();
        self
    }

    #[must_use]
    pub fn host_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.host_username = Some(username.into());
        self.host_password = Some(password.into());
        self
    }

    #[must_use]
    pub fn netldi_task(mut self, task: impl Into<String>) -> Self {
        self.netldi_task = task.into();
        self
    }
}

/// Which GCI library a connection goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// `libgcilnk`: the gem runs inside this process.
    Linked,
    /// `libgcits`: the gem runs in its own process.
    Rpc,
}

/// A connection file: everything needed to load a library and log in.
///
/// ```json
/// {
///   "transport": "rpc",
///   "library": "/opt/gemstone/lib/libgcits-3.7.0-64.so",
///   "login": { "username": "DataCurator", "password": "swordfish" },
///   "session": { "fetch_chunk_size": 400 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub transport: TransportKind,
    /// Path of the shared library matching `transport`.
    pub library: PathBuf,
    pub login: LoginParams,
    #[serde(default)]
    pub session: SessionConfig,
}

impl ConnectionConfig {
    /// Parses a connection description from JSON text.
    pub fn from_json(text: &str) -> GemResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reads and parses a connection file.
    pub fn load(path: impl AsRef<Path>) -> GemResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| GemError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_defaults_fill_in_stone_and_task() {
        let config = ConnectionConfig::from_json(
            r#"{"transport": "linked", "library": "/tmp/libgcilnk.so",
                "login": {"username": "DataCurator", "password": "swordfish"}}"#,
        )
        .unwrap();
        assert_eq!(config.transport, TransportKind::Linked);
        assert_eq!(config.login, LoginParams::new("DataCurator", "swordfish"));
        assert_eq!(config.login.stone_name, "gs64stone");
        assert_eq!(config.login.netldi_task, "gemnetobject");
        assert_eq!(config.session, SessionConfig::default());
    }

    #[test]
    fn partial_session_section_keeps_other_defaults() {
        let config = ConnectionConfig::from_json(
            r#"{"transport": "rpc", "library": "libgcits.so",
                "login": {"username": "u", "password": "p", "host_username": "os"},
                "session": {"release_batch_size": 5}}"#,
        )
        .unwrap();
        assert_eq!(config.session.release_batch_size, 5);
        assert_eq!(config.session.fetch_chunk_size, DEFAULT_FETCH_CHUNK_SIZE);
        assert_eq!(config.login.host_username.as_deref(), Some("os"));
        assert_eq!(config.login.host_password, None);
    }

    #[test]
    fn unknown_transport_is_a_config_error() {
        let err = ConnectionConfig::from_json(
            r#"{"transport": "carrier-pigeon", "library": "x", "login": {"username": "u", "password": "p"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, GemError::Config(_)), "{err}");
    }

    #[test]
    fn zero_chunk_size_is_clamped() {
        assert_eq!(SessionConfig::new().fetch_chunk_size(0).fetch_chunk_size, 1);
    }
}
