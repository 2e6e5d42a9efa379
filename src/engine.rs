//! One run: load a file, apply rules in order, write it back, report.

use crate::apply::{apply_rules_for, ApplyError, ApplyOptions};
use crate::document::{Document, LoadError};
use crate::outcome::{ApplyOutcome, RunReport};
use crate::rule::{PatchRule, RuleError};
use crate::safety::SafetyError;
use crate::write::{write_document, Persist, WriteError, WriteStrategy};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Stage of a run that produced a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Load,
    Validate,
    Apply,
    Write,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Load => "load",
            Phase::Validate => "validate",
            Phase::Apply => "apply",
            Phase::Write => "write",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Unsafe(#[from] SafetyError),

    #[error("Invalid rule in {path}: {source}")]
    InvalidRule {
        path: PathBuf,
        #[source]
        source: RuleError,
    },

    /// All-or-nothing run where some rule did not apply. Nothing was written.
    #[error("No changes made to {path}: {} rule(s) did not apply ({})", .failed.len(), .failed.join(", "))]
    RolledBack {
        path: PathBuf,
        failed: Vec<String>,
        outcomes: Vec<ApplyOutcome>,
    },

    #[error(transparent)]
    Write(#[from] WriteError),
}

impl RunError {
    pub fn phase(&self) -> Phase {
        match self {
            RunError::Load(_) | RunError::Unsafe(_) => Phase::Load,
            RunError::InvalidRule { .. } => Phase::Validate,
            RunError::RolledBack { .. } => Phase::Apply,
            RunError::Write(_) => Phase::Write,
        }
    }

    fn from_apply(path: &Path, err: ApplyError) -> Self {
        match err {
            ApplyError::InvalidRule(source) => RunError::InvalidRule {
                path: path.to_path_buf(),
                source,
            },
            ApplyError::RolledBack { failed, outcomes } => RunError::RolledBack {
                path: path.to_path_buf(),
                failed,
                outcomes,
            },
        }
    }
}

/// A single-file patch run.
///
/// ```no_run
/// use anchor_patch::{PatchRule, PatchRun};
///
/// let report = PatchRun::new("app/signup/EducationScreen.jsx")
///     .rule(PatchRule::new("level-guard", "if (selectedUniversity", "if (isCollege && selectedUniversity"))
///     .run()?;
///
/// for outcome in &report.outcomes {
///     println!("{outcome}");
/// }
/// # Ok::<(), anchor_patch::RunError>(())
/// ```
#[derive(Debug, Clone)]
#[must_use = "PatchRun does nothing until run() is called"]
pub struct PatchRun {
    path: PathBuf,
    rules: Vec<PatchRule>,
    options: ApplyOptions,
    write: WriteStrategy,
}

impl PatchRun {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            rules: Vec::new(),
            options: ApplyOptions::default(),
            write: WriteStrategy::default(),
        }
    }

    pub fn rule(mut self, rule: PatchRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(mut self, rules: impl IntoIterator<Item = PatchRule>) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn options(mut self, options: ApplyOptions) -> Self {
        self.options = options;
        self
    }

    pub fn write_strategy(mut self, write: WriteStrategy) -> Self {
        self.write = write;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and apply without writing anything.
    pub fn prepare(&self) -> Result<Prepared, RunError> {
        let mut document = Document::load(&self.path)?;
        let bytes_before = document.content().len();
        let ending = document.line_ending();

        let outcomes = apply_rules_for(document.content_mut(), &self.rules, &self.options, ending)
            .map_err(|err| RunError::from_apply(&self.path, err))?;

        Ok(Prepared {
            document,
            outcomes,
            bytes_before,
        })
    }

    /// Load, apply and persist with the configured write strategy.
    pub fn run(&self) -> Result<RunReport, RunError> {
        self.run_with(&self.write)
    }

    /// Load, apply and persist through a caller-supplied [`Persist`].
    pub fn run_with(&self, persist: &dyn Persist) -> Result<RunReport, RunError> {
        self.prepare()?.commit(persist)
    }
}

/// A document with every rule applied in memory, not yet persisted.
#[derive(Debug)]
#[must_use = "Prepared changes are lost unless commit() is called"]
pub struct Prepared {
    document: Document,
    outcomes: Vec<ApplyOutcome>,
    bytes_before: usize,
}

impl Prepared {
    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn outcomes(&self) -> &[ApplyOutcome] {
        &self.outcomes
    }

    pub fn is_changed(&self) -> bool {
        self.document.is_modified()
    }

    /// Persist the document and produce the run report.
    pub fn commit(self, persist: &dyn Persist) -> Result<RunReport, RunError> {
        let changed = self.document.is_modified();
        let written = write_document(&self.document, persist)?;

        Ok(RunReport::new(
            self.document.path(),
            self.outcomes,
            changed,
            written,
            self.bytes_before,
            self.document.content().len(),
        ))
    }
}

/// Apply `rules` to the file at `path` with default options and an atomic write.
pub fn patch_file(
    path: impl AsRef<Path>,
    rules: impl IntoIterator<Item = PatchRule>,
) -> Result<RunReport, RunError> {
    PatchRun::new(path.as_ref()).rules(rules).run()
}
