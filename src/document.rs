use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// The one text encoding used for every read and write.
pub const ENCODING: &str = "utf-8";

/// The full text of one target file for the duration of a run.
///
/// Loaded in one piece, mutated in place by the applier, persisted by the
/// writer, then dropped.
#[derive(Debug, Clone)]
pub struct Document {
    path: PathBuf,
    content: String,
    /// xxh3 of the bytes as they were on disk at load time
    fingerprint: u64,
    line_ending: LineEnding,
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("File not found: {path}")]
    NotFound { path: PathBuf },

    #[error("{path} is not valid UTF-8 (first invalid byte at offset {offset})")]
    Decode { path: PathBuf, offset: usize },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl LoadError {
    pub fn path(&self) -> &Path {
        match self {
            LoadError::NotFound { path }
            | LoadError::Decode { path, .. }
            | LoadError::Io { path, .. } => path,
        }
    }
}

/// Dominant line terminator of a text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    Lf,
    CrLf,
}

impl LineEnding {
    /// Pick whichever terminator occurs more often. Ties (including text with
    /// no line breaks at all) resolve to LF.
    pub fn detect(text: &str) -> Self {
        let total = text.matches('\n').count();
        let crlf = text.matches("\r\n").count();
        if crlf > total - crlf {
            LineEnding::CrLf
        } else {
            LineEnding::Lf
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

impl Document {
    /// Read and decode the whole file at `path`.
    ///
    /// The file handle is scoped to `fs::read`, so it is closed before
    /// decoding starts and on every error path.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => LoadError::NotFound {
                path: path.to_path_buf(),
            },
            _ => LoadError::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;

        let fingerprint = xxh3_64(&bytes);
        let content = String::from_utf8(bytes).map_err(|err| LoadError::Decode {
            path: path.to_path_buf(),
            offset: err.utf8_error().valid_up_to(),
        })?;

        tracing::debug!(
            path = %path.display(),
            bytes = content.len(),
            "loaded document"
        );

        Ok(Self::with_fingerprint(path.to_path_buf(), content, fingerprint))
    }

    /// Build a document from text already in memory.
    pub fn from_text(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        let content = content.into();
        let fingerprint = xxh3_64(content.as_bytes());
        Self::with_fingerprint(path.into(), content, fingerprint)
    }

    fn with_fingerprint(path: PathBuf, content: String, fingerprint: u64) -> Self {
        let line_ending = LineEnding::detect(&content);
        Self {
            path,
            content,
            fingerprint,
            line_ending,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn content_mut(&mut self) -> &mut String {
        &mut self.content
    }

    /// Fingerprint of the bytes as loaded; unaffected by later mutation.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Line ending detected at load time.
    pub fn line_ending(&self) -> LineEnding {
        self.line_ending
    }

    /// Whether the in-memory text differs from what was loaded.
    pub fn is_modified(&self) -> bool {
        xxh3_64(self.content.as_bytes()) != self.fingerprint
    }
}
