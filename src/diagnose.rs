//! Explanations for anchors that matched nothing.
//!
//! A rule that finds no occurrence is either already applied or has drifted
//! from the document (whitespace, line endings, an earlier edit). The text
//! alone cannot prove which, but these hints narrow it down for a human.
//! Nothing here modifies the document.

use crate::apply::lf_to_crlf;
use serde::Serialize;
use std::fmt;

/// Minimum normalized Levenshtein similarity reported as a near miss.
pub const NEAR_MISS_THRESHOLD: f64 = 0.8;

/// Anchors longer than this are not scanned for near misses.
const MAX_SCAN_ANCHOR: usize = 4096;

/// Upper bound on `lines * anchor_len^2` for the full window scan. Beyond it
/// only the anchor's first line is compared.
const WINDOW_SCAN_BUDGET: u64 = 64_000_000;

const EXCERPT_CHARS: usize = 60;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Hint {
    /// The replacement text already occurs in the document.
    ReplacementPresent,
    /// The anchor would match if its line breaks were CRLF (or LF).
    LineEndingMismatch,
    /// Closest block of lines to the anchor.
    NearMiss {
        /// 1-based line where the closest block starts
        line: usize,
        similarity: f64,
        excerpt: String,
    },
}

impl fmt::Display for Hint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hint::ReplacementPresent => {
                write!(f, "replacement text already present (rule looks already applied)")
            }
            Hint::LineEndingMismatch => {
                write!(f, "anchor differs from the document only in line endings")
            }
            Hint::NearMiss {
                line,
                similarity,
                excerpt,
            } => write!(
                f,
                "closest text at line {} ({:.0}% similar): {}",
                line,
                similarity * 100.0,
                excerpt
            ),
        }
    }
}

/// Best available explanation for why `anchor` did not occur in `text`.
pub fn explain(text: &str, anchor: &str, replacement: &str) -> Option<Hint> {
    if !replacement.is_empty() && text.contains(replacement) {
        return Some(Hint::ReplacementPresent);
    }
    if line_ending_mismatch(text, anchor) {
        return Some(Hint::LineEndingMismatch);
    }
    near_miss(text, anchor)
}

fn line_ending_mismatch(text: &str, anchor: &str) -> bool {
    if !anchor.contains('\n') {
        return false;
    }
    let lf = anchor.replace("\r\n", "\n");
    if lf != anchor && text.contains(&lf) {
        return true;
    }
    let crlf = lf_to_crlf(&lf);
    crlf != anchor && text.contains(&crlf)
}

/// Find the block of lines most similar to `anchor`.
///
/// Comparison is line-based with line terminators stripped, so a trailing
/// newline difference alone still scores 1.0.
pub fn near_miss(text: &str, anchor: &str) -> Option<Hint> {
    if anchor.len() > MAX_SCAN_ANCHOR {
        return None;
    }

    let needle: Vec<&str> = anchor.lines().collect();
    if needle.is_empty() {
        return None;
    }
    let lines: Vec<&str> = text.lines().collect();

    let needle_joined = needle.join("\n");
    let needle_len = needle_joined.chars().count();
    let cost = (lines.len() as u64).saturating_mul((needle_len as u64).pow(2));

    let (width, target) = if cost <= WINDOW_SCAN_BUDGET {
        (needle.len(), needle_joined)
    } else {
        (1, needle[0].to_string())
    };
    let target_len = target.chars().count();

    if lines.len() < width {
        return None;
    }

    let mut best: Option<(usize, f64)> = None;
    for (idx, window) in lines.windows(width).enumerate() {
        let candidate = window.join("\n");

        // Levenshtein distance is at least the length difference, so the
        // similarity can never exceed shorter/longer.
        let candidate_len = candidate.chars().count();
        let (short, long) = if candidate_len < target_len {
            (candidate_len, target_len)
        } else {
            (target_len, candidate_len)
        };
        if long == 0 || (short as f64) < NEAR_MISS_THRESHOLD * long as f64 {
            continue;
        }

        let similarity = strsim::normalized_levenshtein(&candidate, &target);
        if similarity >= NEAR_MISS_THRESHOLD && best.map_or(true, |(_, s)| similarity > s) {
            best = Some((idx, similarity));
        }
    }

    best.map(|(idx, similarity)| Hint::NearMiss {
        line: idx + 1,
        similarity,
        excerpt: excerpt(lines[idx]),
    })
}

fn excerpt(line: &str) -> String {
    let trimmed = line.trim();
    if trimmed.chars().count() <= EXCERPT_CHARS {
        trimmed.to_string()
    } else {
        let mut short: String = trimmed.chars().take(EXCERPT_CHARS).collect();
        short.push('…');
        short
    }
}
