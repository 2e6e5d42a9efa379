//! Ruleset applicator - runs every rule of a ruleset, one target file at a time
//!
//! Rules are grouped by their `file`. Each group becomes one [`PatchRun`]
//! with the rules in ruleset order, so rules aimed at the same file compose
//! exactly as they would in a single run. Groups are processed in order of
//! first appearance and never concurrently.

use crate::config::schema::{RuleDefinition, RuleSet};
use crate::engine::{PatchRun, Prepared, RunError};
use crate::outcome::RunReport;
use crate::safety::WorkspaceGuard;
use crate::write::{Persist, WriteStrategy};
use std::path::{Path, PathBuf};

/// Result of running one file's rules.
#[derive(Debug)]
pub struct FileRun {
    pub file: PathBuf,
    pub rule_ids: Vec<String>,
    pub result: Result<RunReport, RunError>,
}

/// One file's rules applied in memory, awaiting commit.
#[derive(Debug)]
pub struct FilePlan {
    pub file: PathBuf,
    pub rule_ids: Vec<String>,
    pub prepared: Result<Prepared, RunError>,
}

impl FilePlan {
    pub fn commit(self, persist: &dyn Persist) -> FileRun {
        FileRun {
            file: self.file,
            rule_ids: self.rule_ids,
            result: self.prepared.and_then(|prepared| prepared.commit(persist)),
        }
    }
}

/// Apply a ruleset, writing with the strategy named in its metadata.
pub fn apply_ruleset(config: &RuleSet, workspace_root: &Path) -> Vec<FileRun> {
    run_ruleset(config, workspace_root, &config.meta.write)
}

/// Evaluate a ruleset without touching any file.
pub fn check_ruleset(config: &RuleSet, workspace_root: &Path) -> Vec<FileRun> {
    run_ruleset(config, workspace_root, &WriteStrategy::DryRun)
}

/// Apply a ruleset, persisting each file through `persist`.
///
/// Each file is prepared and committed before the next one is loaded.
pub fn run_ruleset(config: &RuleSet, workspace_root: &Path, persist: &dyn Persist) -> Vec<FileRun> {
    run_ruleset_inspect(config, workspace_root, persist, |_| {})
}

/// Like [`run_ruleset`], calling `inspect` with each file's plan right
/// before it is committed (the target still holds its old content).
pub fn run_ruleset_inspect<F>(
    config: &RuleSet,
    workspace_root: &Path,
    persist: &dyn Persist,
    mut inspect: F,
) -> Vec<FileRun>
where
    F: FnMut(&FilePlan),
{
    config
        .rules_by_file()
        .into_iter()
        .map(|(file, rules)| {
            let plan = plan_group(config, workspace_root, file, &rules);
            inspect(&plan);
            plan.commit(persist)
        })
        .collect()
}

/// Prepare every file of a ruleset in memory without committing any.
pub fn plan_ruleset(config: &RuleSet, workspace_root: &Path) -> Vec<FilePlan> {
    config
        .rules_by_file()
        .into_iter()
        .map(|(file, rules)| plan_group(config, workspace_root, file, &rules))
        .collect()
}

fn plan_group(
    config: &RuleSet,
    workspace_root: &Path,
    file: &str,
    rules: &[&RuleDefinition],
) -> FilePlan {
    let rule_ids = rules.iter().map(|rule| rule.id.clone()).collect();
    let (path, prepared) = match resolve_target(config, workspace_root, file) {
        Ok(path) => {
            tracing::info!(path = %path.display(), rules = rules.len(), "patching file");
            let prepared = PatchRun::new(&path)
                .rules(rules.iter().map(|rule| rule.to_rule()))
                .options(config.meta.apply_options())
                .prepare();
            (path, prepared)
        }
        Err(err) => (workspace_root.join(file), Err(err)),
    };

    FilePlan {
        file: path,
        rule_ids,
        prepared,
    }
}

fn resolve_target(config: &RuleSet, workspace_root: &Path, file: &str) -> Result<PathBuf, RunError> {
    if config.meta.workspace_relative {
        let guard = WorkspaceGuard::new(workspace_root)?;
        Ok(guard.validate_path(file)?)
    } else {
        Ok(PathBuf::from(file))
    }
}
