use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directories under the workspace that rulesets may never patch.
const FORBIDDEN_DIRS: &[&str] = &[".git", "node_modules", "target"];

/// Confines ruleset targets to one workspace directory.
///
/// Both the root and every target are canonicalized before comparison, so
/// `..` components and symlinks pointing elsewhere cannot escape it.
#[derive(Debug, Clone)]
pub struct WorkspaceGuard {
    root: PathBuf,
    /// Canonical directories that are off limits even inside the root
    forbidden: Vec<PathBuf>,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("Path is outside workspace: {path} (workspace: {workspace})")]
    OutsideWorkspace { path: PathBuf, workspace: PathBuf },

    #[error("Path is in forbidden directory: {path} (forbidden: {forbidden})")]
    ForbiddenPath { path: PathBuf, forbidden: PathBuf },

    #[error("Failed to resolve {path}: {source}")]
    Resolve {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl WorkspaceGuard {
    /// Guard rooted at an existing directory. Any of `.git`, `node_modules`
    /// and `target` present under it are forbidden.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        let root = resolve_existing(root.as_ref())?;
        let forbidden = FORBIDDEN_DIRS
            .iter()
            .filter_map(|dir| root.join(dir).canonicalize().ok())
            .collect();
        Ok(Self { root, forbidden })
    }

    /// Guard with an explicit forbidden list instead of the defaults.
    pub fn with_forbidden(
        root: impl AsRef<Path>,
        forbidden: Vec<PathBuf>,
    ) -> Result<Self, SafetyError> {
        let root = resolve_existing(root.as_ref())?;
        let forbidden = forbidden
            .iter()
            .map(|dir| resolve_existing(dir))
            .collect::<Result<_, _>>()?;
        Ok(Self { root, forbidden })
    }

    /// Resolve a ruleset `file` entry to a canonical path inside the root.
    ///
    /// Relative entries are joined to the root. A target that does not exist
    /// yet is resolved through its parent directory so that loading it still
    /// fails with a plain not-found error.
    pub fn validate_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let joined = self.root.join(path.as_ref());
        let resolved = resolve_target(&joined)?;

        if !resolved.starts_with(&self.root) {
            return Err(SafetyError::OutsideWorkspace {
                path: resolved,
                workspace: self.root.clone(),
            });
        }

        if let Some(dir) = self.forbidden.iter().find(|dir| resolved.starts_with(dir)) {
            return Err(SafetyError::ForbiddenPath {
                path: resolved,
                forbidden: dir.clone(),
            });
        }

        Ok(resolved)
    }

    pub fn workspace_root(&self) -> &Path {
        &self.root
    }
}

fn resolve_existing(path: &Path) -> Result<PathBuf, SafetyError> {
    path.canonicalize().map_err(|source| SafetyError::Resolve {
        path: path.to_path_buf(),
        source,
    })
}

fn resolve_target(path: &Path) -> Result<PathBuf, SafetyError> {
    match path.canonicalize() {
        Ok(canonical) => Ok(canonical),
        Err(source) if source.kind() == io::ErrorKind::NotFound => {
            match (path.parent(), path.file_name()) {
                (Some(parent), Some(name)) => Ok(resolve_existing(parent)?.join(name)),
                _ => Err(SafetyError::Resolve {
                    path: path.to_path_buf(),
                    source,
                }),
            }
        }
        Err(source) => Err(SafetyError::Resolve {
            path: path.to_path_buf(),
            source,
        }),
    }
}
