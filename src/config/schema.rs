use crate::apply::{ApplyOptions, Atomicity, LineEndingPolicy};
use crate::rule::PatchRule;
use crate::write::WriteStrategy;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// A ruleset file: metadata plus rules that may target several files.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct RuleSet {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

impl RuleSet {
    /// Rules grouped by their `file` field. Groups keep the order in which
    /// each file first appears; rules keep ruleset order within a group.
    pub fn rules_by_file(&self) -> Vec<(&str, Vec<&RuleDefinition>)> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut groups: Vec<(&str, Vec<&RuleDefinition>)> = Vec::new();

        for rule in &self.rules {
            match index.get(rule.file.as_str()) {
                Some(&idx) => groups[idx].1.push(rule),
                None => {
                    index.insert(rule.file.as_str(), groups.len());
                    groups.push((rule.file.as_str(), vec![rule]));
                }
            }
        }

        groups
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.rules.is_empty() {
            issues.push(ValidationIssue::EmptyRuleList);
        }

        let mut seen = HashSet::new();
        for rule in &self.rules {
            if rule.id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    rule_id: None,
                    field: "id",
                });
            } else if !seen.insert(rule.id.as_str()) {
                issues.push(ValidationIssue::DuplicateId {
                    rule_id: rule.id.clone(),
                });
            }

            if rule.file.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    rule_id: Some(rule.id.clone()),
                    field: "file",
                });
            }

            // Whitespace-only anchors are legal; only the empty string matches
            // everywhere.
            if rule.anchor.is_empty() {
                issues.push(ValidationIssue::MissingField {
                    rule_id: Some(rule.id.clone()),
                    field: "anchor",
                });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Resolve rule `file` paths against the workspace root and keep them
    /// inside it
    #[serde(default)]
    pub workspace_relative: bool,
    #[serde(default)]
    pub mode: Atomicity,
    #[serde(default)]
    pub line_endings: LineEndingPolicy,
    #[serde(default)]
    pub write: WriteStrategy,
}

impl Metadata {
    pub fn apply_options(&self) -> ApplyOptions {
        ApplyOptions {
            line_endings: self.line_endings,
            atomicity: self.mode,
            ..ApplyOptions::default()
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RuleDefinition {
    pub id: String,
    pub file: String,
    pub anchor: String,
    #[serde(default)]
    pub replacement: String,
    #[serde(default)]
    pub required: bool,
}

impl RuleDefinition {
    pub fn to_rule(&self) -> PatchRule {
        PatchRule {
            id: self.id.clone(),
            anchor: self.anchor.clone(),
            replacement: self.replacement.clone(),
            required: self.required,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    EmptyRuleList,
    MissingField {
        rule_id: Option<String>,
        field: &'static str,
    },
    DuplicateId {
        rule_id: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyRuleList => write!(f, "ruleset contains no rules"),
            ValidationIssue::MissingField { rule_id, field } => match rule_id {
                Some(id) => write!(f, "rule '{id}' missing required field '{field}'"),
                None => write!(f, "rule missing required field '{field}'"),
            },
            ValidationIssue::DuplicateId { rule_id } => {
                write!(f, "rule id '{rule_id}' is used more than once")
            }
        }
    }
}
