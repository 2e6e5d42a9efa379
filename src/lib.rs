//! Anchor Patch: literal anchor/replacement patching for source files
//!
//! Given a file and an ordered list of `anchor → replacement` rules, every
//! non-overlapping occurrence of each anchor is replaced, the file is written
//! back, and each rule reports whether it matched and how many times.
//!
//! # Architecture
//!
//! A run is three steps that compose linearly:
//!
//! - [`Document::load`] reads the whole file as UTF-8
//! - [`apply_rules`] applies rules in order, each one seeing the text left by
//!   the previous rules
//! - [`write_document`] persists the result (tempfile + fsync + rename by
//!   default) and [`RunReport`] carries one [`ApplyOutcome`] per rule
//!
//! Matching is exact text only: no regex, no parsing. An anchor that does not
//! occur is a normal outcome (`matched = false`), never a silent success.
//!
//! # Example
//!
//! ```no_run
//! use anchor_patch::{patch_file, PatchRule};
//!
//! let report = patch_file(
//!     "components/chat/MessageItem.tsx",
//!     [PatchRule::new(
//!         "pass-uid",
//!         "deleteMessage(roomId, msgId, isCurrentUser),",
//!         "deleteMessage(roomId, msgId, isCurrentUser, currentUser?.uid),",
//!     )],
//! )?;
//!
//! for outcome in report.unmatched() {
//!     eprintln!("{outcome}");
//! }
//! # Ok::<(), anchor_patch::RunError>(())
//! ```

pub mod apply;
pub mod config;
pub mod diagnose;
pub mod document;
pub mod engine;
pub mod outcome;
pub mod rule;
pub mod safety;
pub mod write;

// Re-exports
pub use apply::{apply_rules, replace_all, ApplyError, ApplyOptions, Atomicity, LineEndingPolicy};
pub use config::{
    apply_ruleset, check_ruleset, load_from_path, load_from_str, ConfigError, RuleSet,
};
pub use diagnose::Hint;
pub use document::{Document, LineEnding, LoadError, ENCODING};
pub use engine::{patch_file, PatchRun, Phase, Prepared, RunError};
pub use outcome::{ApplyOutcome, RuleStatus, RunReport, RunStatus};
pub use rule::{PatchRule, RuleError};
pub use safety::{SafetyError, WorkspaceGuard};
pub use write::{atomic_write, write_document, Persist, WriteError, WriteStrategy};
