//! Reading rulesets from TOML text, files and directories.

use crate::config::schema::{RuleSet, ValidationError};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
    /// A directory argument with no `*.toml` file directly inside it
    NoRulesets { dir: PathBuf },
}

impl ConfigError {
    /// File or directory the error is about, when known.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Io { path, .. } => Some(path),
            ConfigError::Toml { path, .. } | ConfigError::Validation { path, .. } => {
                path.as_deref()
            }
            ConfigError::NoRulesets { dir } => Some(dir),
        }
    }

    fn located(self, file: &Path) -> Self {
        match self {
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(file.to_path_buf()),
                source,
            },
            ConfigError::Validation { path: None, source } => ConfigError::Validation {
                path: Some(file.to_path_buf()),
                source,
            },
            other => other,
        }
    }
}

/// Renders ` (path)` for a known path and nothing otherwise.
struct Origin<'a>(&'a Option<PathBuf>);

impl fmt::Display for Origin<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(path) => write!(f, " ({})", path.display()),
            None => Ok(()),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read ruleset {}: {}", path.display(), source)
            }
            ConfigError::Toml { path, source } => {
                write!(f, "malformed ruleset TOML{}: {}", Origin(path), source)
            }
            ConfigError::Validation { path, source } => {
                write!(f, "invalid ruleset{}: {}", Origin(path), source)
            }
            ConfigError::NoRulesets { dir } => {
                write!(f, "no .toml ruleset files in {}", dir.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
            ConfigError::NoRulesets { .. } => None,
        }
    }
}

/// Parse and validate a ruleset held in memory.
pub fn load_from_str(input: &str) -> Result<RuleSet, ConfigError> {
    let ruleset: RuleSet = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    ruleset
        .validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(ruleset)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<RuleSet, ConfigError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&text).map_err(|err| err.located(path))
}

/// Expand ruleset arguments into ruleset files.
///
/// Files pass through unchanged. A directory contributes the `*.toml` files
/// directly inside it, sorted by name, and must contain at least one.
pub fn discover_rulesets(paths: &[PathBuf]) -> Result<Vec<PathBuf>, ConfigError> {
    let mut files = Vec::new();

    for path in paths {
        if !path.is_dir() {
            files.push(path.clone());
            continue;
        }

        let mut found = Vec::new();
        for entry in WalkDir::new(path).max_depth(1) {
            let entry = entry.map_err(|err| ConfigError::Io {
                path: path.clone(),
                source: io::Error::from(err),
            })?;
            if entry.file_type().is_file()
                && entry.path().extension().and_then(|ext| ext.to_str()) == Some("toml")
            {
                found.push(entry.into_path());
            }
        }

        if found.is_empty() {
            return Err(ConfigError::NoRulesets { dir: path.clone() });
        }
        found.sort();
        files.extend(found);
    }

    Ok(files)
}
