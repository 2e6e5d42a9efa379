use crate::diagnose::Hint;
use crate::document::ENCODING;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Result of attempting one rule against a document.
///
/// `matched` is always `occurrences > 0`; the constructors are the only way
/// to build one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[must_use = "ApplyOutcome should be checked for matched/unmatched"]
pub struct ApplyOutcome {
    rule_id: String,
    matched: bool,
    occurrences: usize,
    required: bool,
    #[serde(flatten)]
    status: RuleStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RuleStatus {
    /// Every occurrence of the anchor was replaced
    Applied,
    /// The anchor did not occur; the document was left as it was
    Unmatched {
        #[serde(skip_serializing_if = "Option::is_none")]
        hint: Option<Hint>,
    },
    /// The rule was structurally invalid and never evaluated
    Rejected { reason: String },
}

impl ApplyOutcome {
    /// Outcome for a rule that replaced `occurrences` anchors. Zero
    /// occurrences is reported as unmatched.
    pub fn applied(rule_id: impl Into<String>, occurrences: usize, required: bool) -> Self {
        if occurrences == 0 {
            return Self::unmatched(rule_id, required, None);
        }
        Self {
            rule_id: rule_id.into(),
            matched: true,
            occurrences,
            required,
            status: RuleStatus::Applied,
        }
    }

    pub fn unmatched(rule_id: impl Into<String>, required: bool, hint: Option<Hint>) -> Self {
        Self {
            rule_id: rule_id.into(),
            matched: false,
            occurrences: 0,
            required,
            status: RuleStatus::Unmatched { hint },
        }
    }

    pub fn rejected(rule_id: impl Into<String>, required: bool, reason: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            matched: false,
            occurrences: 0,
            required,
            status: RuleStatus::Rejected {
                reason: reason.into(),
            },
        }
    }

    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    pub fn matched(&self) -> bool {
        self.matched
    }

    pub fn occurrences(&self) -> usize {
        self.occurrences
    }

    pub fn required(&self) -> bool {
        self.required
    }

    pub fn status(&self) -> &RuleStatus {
        &self.status
    }

    pub fn hint(&self) -> Option<&Hint> {
        match &self.status {
            RuleStatus::Unmatched { hint } => hint.as_ref(),
            _ => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.status, RuleStatus::Rejected { .. })
    }
}

impl fmt::Display for ApplyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            RuleStatus::Applied => write!(
                f,
                "{}: replaced {} occurrence{}",
                self.rule_id,
                self.occurrences,
                if self.occurrences == 1 { "" } else { "s" }
            ),
            RuleStatus::Unmatched { hint: None } => write!(f, "{}: anchor not found", self.rule_id),
            RuleStatus::Unmatched { hint: Some(hint) } => {
                write!(f, "{}: anchor not found ({})", self.rule_id, hint)
            }
            RuleStatus::Rejected { reason } => write!(f, "{}: rejected - {}", self.rule_id, reason),
        }
    }
}

/// Overall state of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every rule matched
    Clean,
    /// Some rules matched, others were unmatched or rejected
    Partial,
    /// No rule matched; the document is unchanged
    Unchanged,
}

impl RunStatus {
    fn from_outcomes(outcomes: &[ApplyOutcome]) -> Self {
        if !outcomes.iter().any(ApplyOutcome::matched) {
            RunStatus::Unchanged
        } else if outcomes.iter().all(ApplyOutcome::matched) {
            RunStatus::Clean
        } else {
            RunStatus::Partial
        }
    }
}

/// Everything a caller learns from one completed run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[must_use = "RunReport should be inspected for unmatched rules"]
pub struct RunReport {
    pub path: PathBuf,
    pub encoding: &'static str,
    pub status: RunStatus,
    /// One entry per rule, in rule order
    pub outcomes: Vec<ApplyOutcome>,
    /// Final text differs from the loaded text
    pub changed: bool,
    /// Final text was persisted to `path`
    pub written: bool,
    pub bytes_before: usize,
    pub bytes_after: usize,
}

impl RunReport {
    pub fn new(
        path: impl Into<PathBuf>,
        outcomes: Vec<ApplyOutcome>,
        changed: bool,
        written: bool,
        bytes_before: usize,
        bytes_after: usize,
    ) -> Self {
        Self {
            path: path.into(),
            encoding: ENCODING,
            status: RunStatus::from_outcomes(&outcomes),
            outcomes,
            changed,
            written,
            bytes_before,
            bytes_after,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_clean(&self) -> bool {
        self.status == RunStatus::Clean
    }

    pub fn outcome(&self, rule_id: &str) -> Option<&ApplyOutcome> {
        self.outcomes.iter().find(|o| o.rule_id == rule_id)
    }

    pub fn total_occurrences(&self) -> usize {
        self.outcomes.iter().map(|o| o.occurrences).sum()
    }

    pub fn unmatched(&self) -> impl Iterator<Item = &ApplyOutcome> {
        self.outcomes.iter().filter(|o| !o.matched)
    }

    /// Unmatched or rejected rules the caller marked as required.
    pub fn unmatched_required(&self) -> impl Iterator<Item = &ApplyOutcome> {
        self.unmatched().filter(|o| o.required)
    }
}
