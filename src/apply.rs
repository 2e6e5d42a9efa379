//! The patch applier: ordered, global, literal substitution.
//!
//! Rules run in caller order against the progressively updated text, so a
//! later rule sees whatever earlier rules inserted or removed. Each rule
//! replaces every non-overlapping occurrence of its anchor, scanning left to
//! right. An anchor that does not occur is a normal outcome, not an error.

use crate::diagnose;
use crate::document::LineEnding;
use crate::outcome::ApplyOutcome;
use crate::rule::{PatchRule, RuleError};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, warn};

/// How rule text is reconciled with the document's line endings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LineEndingPolicy {
    /// Anchors and replacements are matched byte for byte.
    #[default]
    Exact,
    /// In a CRLF document, bare LF breaks in anchors and replacements are
    /// rewritten as CRLF before matching.
    MatchDocument,
}

/// What happens to already-applied rules when another rule cannot apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Atomicity {
    /// Keep every rule that applied; record the others in their outcomes.
    #[default]
    BestEffort,
    /// Every rule must be valid and must match, otherwise the text is left
    /// exactly as it was.
    AllOrNothing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOptions {
    pub line_endings: LineEndingPolicy,
    pub atomicity: Atomicity,
    /// Compute hints for unmatched anchors
    pub diagnose: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            line_endings: LineEndingPolicy::Exact,
            atomicity: Atomicity::BestEffort,
            diagnose: true,
        }
    }
}

#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("invalid rule: {0}")]
    InvalidRule(#[from] RuleError),

    #[error("rolled back: {} rule(s) did not apply ({})", .failed.len(), .failed.join(", "))]
    RolledBack {
        failed: Vec<String>,
        outcomes: Vec<ApplyOutcome>,
    },
}

/// Apply `rules` to `text` in order and report one outcome per rule.
///
/// In [`Atomicity::BestEffort`] mode this never fails: invalid rules become
/// rejected outcomes and are skipped. In [`Atomicity::AllOrNothing`] mode
/// `text` is only modified when every rule is valid and matched.
pub fn apply_rules(
    text: &mut String,
    rules: &[PatchRule],
    options: &ApplyOptions,
) -> Result<Vec<ApplyOutcome>, ApplyError> {
    let ending = LineEnding::detect(text);
    apply_rules_for(text, rules, options, ending)
}

/// Like [`apply_rules`], with the document's line ending already known.
pub(crate) fn apply_rules_for(
    text: &mut String,
    rules: &[PatchRule],
    options: &ApplyOptions,
    ending: LineEnding,
) -> Result<Vec<ApplyOutcome>, ApplyError> {
    let crlf = match options.line_endings {
        LineEndingPolicy::Exact => false,
        LineEndingPolicy::MatchDocument => ending == LineEnding::CrLf,
    };

    match options.atomicity {
        Atomicity::BestEffort => Ok(apply_in_place(text, rules, crlf, options.diagnose)),
        Atomicity::AllOrNothing => {
            validate_all(rules)?;

            let mut working = text.clone();
            let outcomes = apply_in_place(&mut working, rules, crlf, options.diagnose);
            let failed: Vec<String> = outcomes
                .iter()
                .filter(|o| !o.matched())
                .map(|o| o.rule_id().to_string())
                .collect();

            if failed.is_empty() {
                *text = working;
                Ok(outcomes)
            } else {
                warn!(failed = ?failed, "discarding changes from all rules");
                Err(ApplyError::RolledBack { failed, outcomes })
            }
        }
    }
}

/// Check every rule up front, including id uniqueness.
pub fn validate_all(rules: &[PatchRule]) -> Result<(), RuleError> {
    let mut seen = HashSet::with_capacity(rules.len());
    for rule in rules {
        check_rule(rule, &mut seen)?;
    }
    Ok(())
}

fn check_rule<'a>(rule: &'a PatchRule, seen: &mut HashSet<&'a str>) -> Result<(), RuleError> {
    rule.validate()?;
    if !seen.insert(rule.id.as_str()) {
        return Err(RuleError::DuplicateId {
            rule_id: rule.id.clone(),
        });
    }
    Ok(())
}

fn apply_in_place(
    text: &mut String,
    rules: &[PatchRule],
    crlf: bool,
    diagnose: bool,
) -> Vec<ApplyOutcome> {
    let mut seen = HashSet::with_capacity(rules.len());
    let mut outcomes = Vec::with_capacity(rules.len());

    for rule in rules {
        if let Err(err) = check_rule(rule, &mut seen) {
            warn!(rule = %rule.id, "rejected: {err}");
            outcomes.push(ApplyOutcome::rejected(
                &rule.id,
                rule.required,
                err.to_string(),
            ));
            continue;
        }

        let anchor = adapt_line_endings(&rule.anchor, crlf);
        let replacement = adapt_line_endings(&rule.replacement, crlf);

        match replace_all(text, &anchor, &replacement) {
            Some((updated, occurrences)) => {
                debug!(rule = %rule.id, occurrences, "applied");
                *text = updated;
                outcomes.push(ApplyOutcome::applied(&rule.id, occurrences, rule.required));
            }
            None => {
                let hint = if diagnose {
                    diagnose::explain(text, &anchor, &replacement)
                } else {
                    None
                };
                match &hint {
                    Some(hint) => warn!(rule = %rule.id, "anchor not found: {hint}"),
                    None => warn!(rule = %rule.id, "anchor not found"),
                }
                outcomes.push(ApplyOutcome::unmatched(&rule.id, rule.required, hint));
            }
        }
    }

    outcomes
}

/// Replace every non-overlapping occurrence of `anchor`, left to right.
///
/// Returns `None` when the anchor does not occur. `anchor` must not be empty.
pub fn replace_all(text: &str, anchor: &str, replacement: &str) -> Option<(String, usize)> {
    debug_assert!(!anchor.is_empty(), "empty anchor matches everywhere");

    let mut occurrences = text.match_indices(anchor).peekable();
    occurrences.peek()?;

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut count = 0;
    for (start, matched) in occurrences {
        out.push_str(&text[last..start]);
        out.push_str(replacement);
        last = start + matched.len();
        count += 1;
    }
    out.push_str(&text[last..]);

    Some((out, count))
}

fn adapt_line_endings(text: &str, crlf: bool) -> Cow<'_, str> {
    if crlf {
        Cow::Owned(lf_to_crlf(text))
    } else {
        Cow::Borrowed(text)
    }
}

/// Rewrite every LF not already preceded by CR as CRLF.
pub(crate) fn lf_to_crlf(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 16);
    let mut prev = None;
    for ch in text.chars() {
        if ch == '\n' && prev != Some('\r') {
            out.push('\r');
        }
        out.push(ch);
        prev = Some(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnose::Hint;
    use crate::outcome::RuleStatus;

    fn best_effort() -> ApplyOptions {
        ApplyOptions::default()
    }

    #[test]
    fn test_replace_all_counts_non_overlapping() {
        let (out, count) = replace_all("aaaa", "aa", "b").unwrap();
        assert_eq!(out, "bb");
        assert_eq!(count, 2);

        let (out, count) = replace_all("aaa", "aa", "b").unwrap();
        assert_eq!(out, "ba");
        assert_eq!(count, 1);
    }

    #[test]
    fn test_replace_all_absent() {
        assert_eq!(replace_all("hello", "xyz", "abc"), None);
    }

    #[test]
    fn test_replacement_containing_anchor_is_not_rescanned() {
        let (out, count) = replace_all("a-a", "a", "aa").unwrap();
        assert_eq!(out, "aa-aa");
        assert_eq!(count, 2);
    }

    #[test]
    fn test_single_rule_applied() {
        let mut text = String::from("() => deleteMessage(roomId, msgId, isCurrentUser),");
        let rules = vec![PatchRule::new(
            "pass-uid",
            "deleteMessage(roomId, msgId, isCurrentUser),",
            "deleteMessage(roomId, msgId, isCurrentUser, currentUser?.uid),",
        )];

        let outcomes = apply_rules(&mut text, &rules, &best_effort()).unwrap();
        assert_eq!(
            text,
            "() => deleteMessage(roomId, msgId, isCurrentUser, currentUser?.uid),"
        );
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].matched());
        assert_eq!(outcomes[0].occurrences(), 1);
    }

    #[test]
    fn test_later_rule_sees_earlier_replacement() {
        let mut text = String::from("alpha");
        let rules = vec![
            PatchRule::new("first", "alpha", "beta"),
            PatchRule::new("second", "beta", "gamma"),
        ];

        let outcomes = apply_rules(&mut text, &rules, &best_effort()).unwrap();
        assert_eq!(text, "gamma");
        assert!(outcomes.iter().all(|o| o.matched()));
    }

    #[test]
    fn test_later_rule_misses_removed_text() {
        let mut text = String::from("alpha beta");
        let rules = vec![
            PatchRule::new("drop-beta", " beta", ""),
            PatchRule::new("edit-beta", "beta", "BETA"),
        ];

        let outcomes = apply_rules(&mut text, &rules, &best_effort()).unwrap();
        assert_eq!(text, "alpha");
        assert!(outcomes[0].matched());
        assert!(!outcomes[1].matched());
    }

    #[test]
    fn test_empty_anchor_rejected_best_effort() {
        let mut text = String::from("abc");
        let rules = vec![
            PatchRule::new("ok", "a", "A"),
            PatchRule::new("empty", "", "X"),
            PatchRule::new("ok-too", "c", "C"),
        ];

        let outcomes = apply_rules(&mut text, &rules, &best_effort()).unwrap();
        assert_eq!(text, "AbC");
        assert!(outcomes[1].is_rejected());
        assert!(outcomes[0].matched());
        assert!(outcomes[2].matched());
    }

    #[test]
    fn test_duplicate_id_rejected_best_effort() {
        let mut text = String::from("abc");
        let rules = vec![
            PatchRule::new("same", "a", "A"),
            PatchRule::new("same", "b", "B"),
        ];

        let outcomes = apply_rules(&mut text, &rules, &best_effort()).unwrap();
        assert_eq!(text, "Abc");
        assert!(outcomes[1].is_rejected());
    }

    #[test]
    fn test_all_or_nothing_invalid_rule() {
        let mut text = String::from("abc");
        let rules = vec![PatchRule::new("ok", "a", "A"), PatchRule::new("empty", "", "X")];
        let options = ApplyOptions {
            atomicity: Atomicity::AllOrNothing,
            ..ApplyOptions::default()
        };

        let err = apply_rules(&mut text, &rules, &options).unwrap_err();
        assert!(matches!(err, ApplyError::InvalidRule(RuleError::EmptyAnchor { .. })));
        assert_eq!(text, "abc");
    }

    #[test]
    fn test_all_or_nothing_unmatched_rolls_back() {
        let mut text = String::from("abc");
        let rules = vec![
            PatchRule::new("ok", "a", "A"),
            PatchRule::new("missing", "zzz", "Z"),
        ];
        let options = ApplyOptions {
            atomicity: Atomicity::AllOrNothing,
            ..ApplyOptions::default()
        };

        match apply_rules(&mut text, &rules, &options) {
            Err(ApplyError::RolledBack { failed, outcomes }) => {
                assert_eq!(failed, vec!["missing".to_string()]);
                assert!(outcomes[0].matched());
            }
            other => panic!("expected rollback, got {other:?}"),
        }
        assert_eq!(text, "abc");
    }

    #[test]
    fn test_all_or_nothing_commits_when_everything_matches() {
        let mut text = String::from("abc");
        let rules = vec![PatchRule::new("a", "a", "A"), PatchRule::new("c", "c", "C")];
        let options = ApplyOptions {
            atomicity: Atomicity::AllOrNothing,
            ..ApplyOptions::default()
        };

        let outcomes = apply_rules(&mut text, &rules, &options).unwrap();
        assert_eq!(text, "AbC");
        assert_eq!(outcomes.len(), 2);
    }

    #[test]
    fn test_exact_policy_ignores_crlf() {
        let mut text = String::from("one\r\ntwo\r\n");
        let rules = vec![PatchRule::new("join", "one\ntwo", "one two")];

        let outcomes = apply_rules(&mut text, &rules, &best_effort()).unwrap();
        assert_eq!(text, "one\r\ntwo\r\n");
        assert_eq!(outcomes[0].hint(), Some(&Hint::LineEndingMismatch));
    }

    #[test]
    fn test_match_document_policy_translates_breaks() {
        let mut text = String::from("<AudioProvider>\r\n  <NotificationProvider>\r\n");
        let rules = vec![PatchRule::new(
            "wrap",
            "<AudioProvider>\n  <NotificationProvider>",
            "<AudioProvider>\n  <VideoCallProvider>\n  <NotificationProvider>",
        )];
        let options = ApplyOptions {
            line_endings: LineEndingPolicy::MatchDocument,
            ..ApplyOptions::default()
        };

        let outcomes = apply_rules(&mut text, &rules, &options).unwrap();
        assert!(outcomes[0].matched());
        assert_eq!(
            text,
            "<AudioProvider>\r\n  <VideoCallProvider>\r\n  <NotificationProvider>\r\n"
        );
    }

    #[test]
    fn test_match_document_policy_leaves_lf_documents_alone() {
        let mut text = String::from("a\nb\n");
        let rules = vec![PatchRule::new("ab", "a\nb", "a\nx\nb")];
        let options = ApplyOptions {
            line_endings: LineEndingPolicy::MatchDocument,
            ..ApplyOptions::default()
        };

        apply_rules(&mut text, &rules, &options).unwrap();
        assert_eq!(text, "a\nx\nb\n");
    }

    #[test]
    fn test_match_document_uses_given_line_ending() {
        let rules = vec![PatchRule::new("ab", "a\nb", "a\nx\nb")];
        let options = ApplyOptions {
            line_endings: LineEndingPolicy::MatchDocument,
            ..ApplyOptions::default()
        };

        // The ending recorded for the document wins over the current text.
        let mut text = String::from("a\nb\n");
        let outcomes = apply_rules_for(&mut text, &rules, &options, LineEnding::CrLf).unwrap();
        assert!(!outcomes[0].matched());
        assert_eq!(text, "a\nb\n");

        let mut text = String::from("a\r\nb\r\n");
        let outcomes = apply_rules_for(&mut text, &rules, &options, LineEnding::CrLf).unwrap();
        assert!(outcomes[0].matched());
        assert_eq!(text, "a\r\nx\r\nb\r\n");
    }

    #[test]
    fn test_diagnose_disabled_has_no_hint() {
        let mut text = String::from("already patched");
        let rules = vec![PatchRule::new("p", "patch me", "already patched")];
        let options = ApplyOptions {
            diagnose: false,
            ..ApplyOptions::default()
        };

        let outcomes = apply_rules(&mut text, &rules, &options).unwrap();
        assert_eq!(outcomes[0].status(), &RuleStatus::Unmatched { hint: None });
    }

    #[test]
    fn test_lf_to_crlf() {
        assert_eq!(lf_to_crlf("a\nb\r\nc\n"), "a\r\nb\r\nc\r\n");
        assert_eq!(lf_to_crlf("no breaks"), "no breaks");
    }
}
