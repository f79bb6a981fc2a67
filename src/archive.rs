// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Site directory archiving.
//!
//! Turn a project directory into a single ZIP byte stream ready for upload.
//! The archive preserves paths relative to the directory itself, so `a.txt`
//! and `b/c.txt` become entries `a.txt` and `b/c.txt` without a wrapping root
//! segment. Entry order is sorted to keep the archive deterministic for
//! identical input trees.
//!
//! Progress is reported through an observer callback supplied by the caller,
//! which keeps this module free of any terminal rendering concern. The
//! observer always sees `(0, total)` once the walk is complete, then one call
//! per archived entry, ending at `processed == total`.

use ignore::WalkBuilder;
use std::{
    fs::File,
    io::{self, Cursor},
    path::{Path, PathBuf},
};
use tracing::debug;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

/// Archive `dir` into an in-memory ZIP byte stream.
///
/// `on_progress` receives `(processed, total)` entry counts as the archive is
/// written. It fires at least once before completion, and the final call
/// always has `processed == total`.
///
/// # Errors
///
/// - Return [`ArchiveError::NotADirectory`] if `dir` does not exist or is not
///   a directory. Checked before any walking begins.
/// - Return [`ArchiveError::Walk`] if the directory tree cannot be traversed.
/// - Return [`ArchiveError::Entry`] if any file becomes unreadable mid-walk.
///   The whole operation aborts, no partial archive is returned.
pub fn pack_dir(
    dir: impl AsRef<Path>,
    mut on_progress: impl FnMut(usize, usize),
) -> Result<Vec<u8>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(ArchiveError::NotADirectory(dir.to_path_buf()));
    }

    let entries = collect_entries(dir)?;
    let total = entries.len();
    on_progress(0, total);

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(9));

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (processed, relative) in entries.iter().enumerate() {
        let name = zip_entry_name(relative);
        debug!("archiving {name}");

        zip.start_file(name.as_str(), options)?;

        let mut file = File::open(dir.join(relative)).map_err(|err| ArchiveError::Entry {
            source: err,
            path: relative.clone(),
        })?;
        io::copy(&mut file, &mut zip).map_err(|err| ArchiveError::Entry {
            source: err,
            path: relative.clone(),
        })?;

        on_progress(processed + 1, total);
    }

    let cursor = zip.finish()?;

    Ok(cursor.into_inner())
}

/// Walk `dir` and collect sorted file paths relative to it.
///
/// Hidden files are included and ignore-file semantics are disabled; the
/// archive mirrors the directory tree as-is.
fn collect_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let walk = WalkBuilder::new(dir)
        .hidden(false)
        .ignore(false)
        .parents(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .build();

    let mut entries = Vec::new();
    for step in walk {
        let entry = step?;
        if !entry.file_type().is_some_and(|kind| kind.is_file()) {
            continue;
        }

        // INVARIANT: Every walked path lives under `dir`, so stripping the
        // prefix cannot fail.
        let relative = entry
            .path()
            .strip_prefix(dir)
            .expect("walker yielded path outside root")
            .to_path_buf();
        entries.push(relative);
    }

    entries.sort();

    Ok(entries)
}

/// Convert a relative path to a forward-slash ZIP entry name.
fn zip_entry_name(path: &Path) -> String {
    path.components()
        .map(|part| part.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Archiving error types.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// Target path missing or not a directory.
    #[error("{0:?} does not exist or is not a directory")]
    NotADirectory(PathBuf),

    /// Directory tree traversal failed.
    #[error(transparent)]
    Walk(#[from] ignore::Error),

    /// ZIP stream could not be written.
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    /// A file could not be archived.
    #[error("cannot archive {path:?}")]
    Entry {
        source: io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
type Result<T, E = ArchiveError> = std::result::Result<T, E>;
