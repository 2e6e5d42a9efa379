use crate::document::Document;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// Where the final text of a document goes.
pub trait Persist {
    /// Replace the contents of `path` with `content`.
    fn persist(&self, path: &Path, content: &[u8]) -> io::Result<()>;

    /// Whether `persist` changes the filesystem.
    fn touches_disk(&self) -> bool {
        true
    }
}

/// Built-in persistence strategies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriteStrategy {
    /// Temp file in the same directory, fsync, rename over the target.
    #[default]
    Atomic,
    /// Truncate and rewrite the target in place.
    Overwrite,
    /// Leave the filesystem alone.
    DryRun,
}

impl Persist for WriteStrategy {
    fn persist(&self, path: &Path, content: &[u8]) -> io::Result<()> {
        match self {
            WriteStrategy::Atomic => atomic_write(path, content),
            WriteStrategy::Overwrite => fs::write(path, content),
            WriteStrategy::DryRun => Ok(()),
        }
    }

    fn touches_disk(&self) -> bool {
        !matches!(self, WriteStrategy::DryRun)
    }
}

#[derive(Error, Debug)]
pub enum WriteError {
    /// The on-disk state of `path` is unspecified after this error.
    #[error("Failed to write {path}: {source}")]
    Failed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path} changed on disk after it was loaded; refusing to overwrite")]
    Modified { path: PathBuf },
}

/// Persist a document if its text changed since load.
///
/// Returns whether anything was written. Before writing, the file on disk is
/// re-read and compared with the fingerprint taken at load so a concurrent
/// edit is never silently clobbered.
pub fn write_document(doc: &Document, persist: &dyn Persist) -> Result<bool, WriteError> {
    if !doc.is_modified() || !persist.touches_disk() {
        return Ok(false);
    }

    let path = doc.path();
    ensure_unchanged_on_disk(path, doc.fingerprint())?;

    persist
        .persist(path, doc.content().as_bytes())
        .map_err(|source| WriteError::Failed {
            path: path.to_path_buf(),
            source,
        })?;

    // Bump mtime so incremental builds downstream pick up the change. The new
    // content is already in place, so a failure here must not report the write as failed.
    if let Err(err) = filetime::set_file_mtime(path, filetime::FileTime::now()) {
        tracing::warn!(path = %path.display(), "could not update mtime: {err}");
    }

    tracing::info!(
        path = %path.display(),
        bytes = doc.content().len(),
        "wrote document"
    );
    Ok(true)
}

fn ensure_unchanged_on_disk(path: &Path, fingerprint: u64) -> Result<(), WriteError> {
    let current = fs::read(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => WriteError::Modified {
            path: path.to_path_buf(),
        },
        _ => WriteError::Failed {
            path: path.to_path_buf(),
            source,
        },
    })?;

    if xxh3_64(&current) != fingerprint {
        return Err(WriteError::Modified {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full new content replaces the file or the original stays as it
/// was. Permissions of an existing target carry over to the new file.
///
/// A symlinked target is resolved first so the rename replaces the file it
/// points to and the link itself survives.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let resolved = match fs::canonicalize(path) {
        Ok(resolved) => resolved,
        Err(err) if err.kind() == io::ErrorKind::NotFound => path.to_path_buf(),
        Err(err) => return Err(err),
    };
    let path = resolved.as_path();

    // Same directory keeps the rename on one filesystem
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        Some(_) => Path::new("."),
        None => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Path has no parent directory",
            ))
        }
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;

    if let Ok(metadata) = fs::metadata(path) {
        temp.as_file().set_permissions(metadata.permissions())?;
    }

    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}
