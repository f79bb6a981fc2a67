// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for the two files Buzz keeps across
//! invocations: the per-user credential file, and the per-project subdomain
//! marker file.

use std::path::{Path, PathBuf};

/// File name of the per-project subdomain marker.
pub const MARKER_FILE_NAME: &str = ".buzz";

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(NoWayHome)
}

/// Determine absolute path to the credential file.
///
/// The credential file is a single JSON document at `$HOME/.buzz.json`. Does
/// not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn default_credential_file() -> Result<PathBuf> {
    home_dir().map(|path| path.join(".buzz.json"))
}

/// Determine path to the subdomain marker file inside `dir`.
pub fn marker_file(dir: impl AsRef<Path>) -> PathBuf {
    dir.as_ref().join(MARKER_FILE_NAME)
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;
