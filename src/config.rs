// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Credential store layout and layered resolution.
//!
//! Buzz keeps one credential document per user: a small JSON file holding the
//! server URL and the bearer token. Both fields are optional on disk, because
//! either one can instead come from the environment or from a command-line
//! flag. Resolution is performed per field with strict precedence:
//!
//! 1. explicit command-line flag,
//! 2. environment variable (`BUZZ_SERVER`, `BUZZ_TOKEN`),
//! 3. stored credential file,
//! 4. built-in default (server only).
//!
//! A missing or corrupt credential file is a logically empty configuration,
//! never an error surfaced to the operator. Saving always rewrites the whole
//! document, so callers must load, mutate, then save to avoid dropping
//! sibling fields.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs,
    path::Path,
    str::FromStr,
};
use tracing::warn;

/// Environment variable overriding the server URL.
pub const SERVER_ENV_VAR: &str = "BUZZ_SERVER";

/// Environment variable overriding the bearer token.
pub const TOKEN_ENV_VAR: &str = "BUZZ_TOKEN";

/// Server URL used when no layer provides one.
pub const DEFAULT_SERVER: &str = "http://localhost:8080";

/// On-disk credential document layout.
///
/// Field absence is meaningful, so both fields stay optional and serialization
/// skips them when unset to keep the document stable across round trips.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct StoredConfig {
    /// Base URL of the Buzz server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,

    /// Bearer token for authenticated calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl StoredConfig {
    /// Load credential document from `path`.
    ///
    /// A missing file or malformed content yields an empty configuration.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let Ok(data) = fs::read_to_string(path.as_ref()) else {
            return Self::default();
        };

        match data.parse() {
            Ok(config) => config,
            Err(_) => {
                warn!("credential file {:?} is malformed, treating as empty", path.as_ref());
                Self::default()
            }
        }
    }

    /// Overwrite credential document at `path` in full.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Write`] if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path.as_ref(), format!("{self}\n")).map_err(|err| ConfigError::Write {
            source: err,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Read one field by key.
    pub fn get(&self, key: ConfigKey) -> Option<&str> {
        match key {
            ConfigKey::Server => self.server.as_deref(),
            ConfigKey::Token => self.token.as_deref(),
        }
    }

    /// Replace one field by key.
    pub fn set(&mut self, key: ConfigKey, value: impl Into<String>) {
        match key {
            ConfigKey::Server => self.server = Some(value.into()),
            ConfigKey::Token => self.token = Some(value.into()),
        }
    }
}

impl FromStr for StoredConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(data).map_err(ConfigError::Json)
    }
}

impl Display for StoredConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            serde_json::to_string_pretty(self)
                .map_err(|_| std::fmt::Error)?
                .as_str(),
        )
    }
}

/// Addressable fields of the credential document.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConfigKey {
    Server,
    Token,
}

impl ConfigKey {
    /// All addressable keys, for listing output.
    pub const ALL: [ConfigKey; 2] = [ConfigKey::Server, ConfigKey::Token];
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "server" => Ok(Self::Server),
            "token" => Ok(Self::Token),
            unknown => Err(ConfigError::UnknownKey(unknown.to_string())),
        }
    }
}

impl Display for ConfigKey {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Server => fmt.write_str("server"),
            Self::Token => fmt.write_str("token"),
        }
    }
}

/// Effective per-invocation settings.
///
/// Constructed exactly once per command invocation and passed into each
/// component entry point. Nothing performs ambient configuration lookup after
/// this point.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Settings {
    /// Resolved server base URL.
    pub server: String,

    /// Resolved bearer token, when any layer provides one.
    pub token: Option<String>,
}

impl Settings {
    /// Resolve effective settings from explicit flags, environment, and the
    /// stored credential document. Fields resolve independently, first
    /// present value wins.
    pub fn resolve(
        flag_server: Option<String>,
        flag_token: Option<String>,
        stored: &StoredConfig,
    ) -> Self {
        let server = flag_server
            .or_else(|| std::env::var(SERVER_ENV_VAR).ok())
            .or_else(|| stored.server.clone())
            .unwrap_or_else(|| DEFAULT_SERVER.to_string());
        let token = flag_token
            .or_else(|| std::env::var(TOKEN_ENV_VAR).ok())
            .or_else(|| stored.token.clone());

        Self { server, token }
    }
}

/// Partially mask a bearer token for display.
///
/// Shows at most a short prefix and the last four characters, counted in
/// characters so multibyte tokens stay intact. Tokens too short to keep a
/// meaningful hidden portion are fully redacted.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 16 {
        return "********".to_string();
    }

    let prefix: String = chars[..8].iter().collect();
    let suffix: String = chars[chars.len() - 4..].iter().collect();

    format!("{prefix}…{suffix}")
}

/// Credential store error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize credential document.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Failed to write credential document.
    #[error("cannot write credential file {path:?}")]
    Write {
        source: std::io::Error,
        path: std::path::PathBuf,
    },

    /// Key does not name a credential field.
    #[error("unknown configuration key {0:?}, expected \"server\" or \"token\"")]
    UnknownKey(String),
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
