//! End-to-end runs: load a file, apply rules, persist, inspect the report.

use anchor_patch::{
    apply_rules, patch_file, ApplyOptions, Atomicity, Hint, LineEndingPolicy, LoadError,
    PatchRule, PatchRun, Persist, Phase, RunError, RunStatus, WriteError, WriteStrategy,
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Persistence that always fails, as a full disk would.
struct FullDisk;

impl Persist for FullDisk {
    fn persist(&self, _path: &Path, _content: &[u8]) -> io::Result<()> {
        Err(io::Error::other("No space left on device"))
    }
}

fn write_fixture(dir: &TempDir, name: &str, text: &str) -> PathBuf {
    let file = dir.path().join(name);
    fs::write(&file, text).unwrap();
    file
}

#[test]
fn test_inserts_case_before_default() {
    let dir = TempDir::new().unwrap();
    let file = write_fixture(
        &dir,
        "reducer.js",
        "switch (action.type) {\n  default:\n  break;\n}\n",
    );

    let report = patch_file(
        &file,
        [PatchRule::new(
            "add-case",
            "default:\n  break;",
            "case 'x':\n  break;\ndefault:\n  break;",
        )],
    )
    .unwrap();

    let outcome = report.outcome("add-case").unwrap();
    assert!(outcome.matched());
    assert_eq!(outcome.occurrences(), 1);
    assert!(report.written);

    let patched = fs::read_to_string(&file).unwrap();
    let case_at = patched.find("case 'x':").unwrap();
    let default_at = patched.find("default:").unwrap();
    assert!(case_at < default_at);
    assert_eq!(
        patched,
        "switch (action.type) {\n  case 'x':\n  break;\ndefault:\n  break;\n}\n"
    );
}

#[test]
fn test_replaces_every_occurrence() {
    let dir = TempDir::new().unwrap();
    let file = write_fixture(
        &dir,
        "MessageItem.tsx",
        "deleteMessage(roomId, msgId);\nconst x = 1;\ndeleteMessage(roomId, msgId);\n",
    );

    let report = patch_file(
        &file,
        [PatchRule::new(
            "pass-user",
            "deleteMessage(roomId, msgId)",
            "deleteMessage(roomId, msgId, user)",
        )],
    )
    .unwrap();

    assert_eq!(report.outcomes[0].occurrences(), 2);
    assert_eq!(report.status, RunStatus::Clean);
    assert_eq!(
        fs::read_to_string(&file).unwrap(),
        "deleteMessage(roomId, msgId, user);\nconst x = 1;\ndeleteMessage(roomId, msgId, user);\n"
    );
}

#[test]
fn test_missing_file_fails_before_rules() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.tsx");

    // An invalid rule would be rejected if evaluation ever started.
    let err = PatchRun::new(&missing)
        .rule(PatchRule::new("empty", "", "x"))
        .run()
        .unwrap_err();

    assert_eq!(err.phase(), Phase::Load);
    assert!(matches!(err, RunError::Load(LoadError::NotFound { ref path }) if path == &missing));
    assert!(!missing.exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_disk_full_reports_write_error() {
    let dir = TempDir::new().unwrap();
    let file = write_fixture(&dir, "a.txt", "hello world");

    let result = PatchRun::new(&file)
        .rule(PatchRule::new("greet", "hello", "goodbye"))
        .run_with(&FullDisk);

    let err = result.unwrap_err();
    assert_eq!(err.phase(), Phase::Write);
    assert!(matches!(err, RunError::Write(WriteError::Failed { .. })));
    assert!(err.to_string().contains("No space left on device"));
}

#[test]
fn test_non_utf8_file_is_decode_error() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("binary.dat");
    fs::write(&file, [b'o', b'k', 0xff, 0xfe]).unwrap();

    let err = patch_file(&file, [PatchRule::new("r", "ok", "no")]).unwrap_err();
    assert!(matches!(
        err,
        RunError::Load(LoadError::Decode { offset: 2, .. })
    ));
    assert_eq!(fs::read(&file).unwrap(), vec![b'o', b'k', 0xff, 0xfe]);
}

#[test]
fn test_rules_apply_in_given_order() {
    // R1's replacement contains R2's anchor, so order changes the result.
    let r1 = PatchRule::new("r1", "a", "b");
    let r2 = PatchRule::new("r2", "b", "c");
    let options = ApplyOptions::default();

    let mut forward = "a".to_string();
    let outcomes = apply_rules(&mut forward, &[r1.clone(), r2.clone()], &options).unwrap();
    assert_eq!(forward, "c");
    assert!(outcomes.iter().all(|o| o.matched()));

    let mut backward = "a".to_string();
    let outcomes = apply_rules(&mut backward, &[r2, r1], &options).unwrap();
    assert_eq!(backward, "b");
    assert!(!outcomes[0].matched());
    assert!(outcomes[1].matched());
}

#[test]
fn test_inverse_restores_document() {
    // Holds only because the replacement text does not already occur in
    // the original document.
    let original = "const level = 'college';\nif (selectedUniversity) { save(); }\n";
    let rule = PatchRule::new(
        "guard",
        "if (selectedUniversity)",
        "if (isCollege && selectedUniversity)",
    );
    assert!(!original.contains(&rule.replacement));

    let dir = TempDir::new().unwrap();
    let file = write_fixture(&dir, "EducationScreen.jsx", original);

    patch_file(&file, [rule.clone()]).unwrap();
    assert_ne!(fs::read_to_string(&file).unwrap(), original);

    let report = patch_file(&file, [rule.inverse()]).unwrap();
    assert!(report.is_clean());
    assert_eq!(fs::read_to_string(&file).unwrap(), original);
}

#[test]
fn test_best_effort_keeps_applied_rules() {
    let dir = TempDir::new().unwrap();
    let file = write_fixture(&dir, "a.txt", "alpha beta");

    let report = PatchRun::new(&file)
        .rule(PatchRule::new("alpha", "alpha", "ALPHA"))
        .rule(PatchRule::new("empty", "", "x"))
        .rule(PatchRule::new("gamma", "gamma", "GAMMA"))
        .run()
        .unwrap();

    assert_eq!(report.status, RunStatus::Partial);
    assert!(report.outcome("empty").unwrap().is_rejected());
    assert!(!report.outcome("gamma").unwrap().matched());
    assert_eq!(fs::read_to_string(&file).unwrap(), "ALPHA beta");
}

#[test]
fn test_all_or_nothing_leaves_file_alone() {
    let dir = TempDir::new().unwrap();
    let file = write_fixture(&dir, "a.txt", "alpha beta");
    let options = ApplyOptions {
        atomicity: Atomicity::AllOrNothing,
        ..ApplyOptions::default()
    };

    let err = PatchRun::new(&file)
        .rule(PatchRule::new("alpha", "alpha", "ALPHA"))
        .rule(PatchRule::new("gamma", "gamma", "GAMMA"))
        .options(options)
        .run()
        .unwrap_err();

    match err {
        RunError::RolledBack {
            failed, outcomes, ..
        } => {
            assert_eq!(failed, vec!["gamma".to_string()]);
            assert!(outcomes[0].matched());
        }
        other => panic!("expected rollback, got {other:?}"),
    }
    assert_eq!(fs::read_to_string(&file).unwrap(), "alpha beta");

    let err = PatchRun::new(&file)
        .rule(PatchRule::new("alpha", "alpha", "ALPHA"))
        .rule(PatchRule::new("empty", "", "x"))
        .options(options)
        .run()
        .unwrap_err();
    assert_eq!(err.phase(), Phase::Validate);
    assert_eq!(fs::read_to_string(&file).unwrap(), "alpha beta");
}

#[test]
fn test_crlf_document_with_lf_rule() {
    let dir = TempDir::new().unwrap();
    let file = write_fixture(&dir, "win.js", "default:\r\n  break;\r\n");
    let rule = PatchRule::new("add-case", "default:\n  break;", "case 1:\n  break;\ndefault:\n  break;");

    // Exact matching misses and says why.
    let report = PatchRun::new(&file)
        .rule(rule.clone())
        .write_strategy(WriteStrategy::DryRun)
        .run()
        .unwrap();
    assert_eq!(report.outcomes[0].hint(), Some(&Hint::LineEndingMismatch));

    let report = PatchRun::new(&file)
        .rule(rule)
        .options(ApplyOptions {
            line_endings: LineEndingPolicy::MatchDocument,
            ..ApplyOptions::default()
        })
        .run()
        .unwrap();
    assert!(report.is_clean());
    assert_eq!(
        fs::read_to_string(&file).unwrap(),
        "case 1:\r\n  break;\r\ndefault:\r\n  break;\r\n"
    );
}

#[test]
fn test_concurrent_edit_is_not_clobbered() {
    let dir = TempDir::new().unwrap();
    let file = write_fixture(&dir, "a.txt", "hello world");

    let prepared = PatchRun::new(&file)
        .rule(PatchRule::new("greet", "hello", "goodbye"))
        .prepare()
        .unwrap();

    fs::write(&file, "hello there").unwrap();

    let err = prepared.commit(&WriteStrategy::Atomic).unwrap_err();
    assert!(matches!(err, RunError::Write(WriteError::Modified { .. })));
    assert_eq!(fs::read_to_string(&file).unwrap(), "hello there");
}

#[test]
fn test_unmatched_rule_leaves_bytes_and_mtime() {
    let dir = TempDir::new().unwrap();
    let file = write_fixture(&dir, "a.txt", "unchanged\n");
    let before = fs::metadata(&file).unwrap().modified().unwrap();

    let report = patch_file(&file, [PatchRule::new("missing", "nowhere", "x").required()]).unwrap();

    assert_eq!(report.status, RunStatus::Unchanged);
    assert!(!report.changed);
    assert!(!report.written);
    assert_eq!(report.unmatched_required().count(), 1);
    assert_eq!(fs::read_to_string(&file).unwrap(), "unchanged\n");
    assert_eq!(fs::metadata(&file).unwrap().modified().unwrap(), before);
}

#[test]
fn test_overwrite_strategy() {
    let dir = TempDir::new().unwrap();
    let file = write_fixture(&dir, "a.txt", "v1");

    let report = PatchRun::new(&file)
        .rule(PatchRule::new("bump", "v1", "v2"))
        .write_strategy(WriteStrategy::Overwrite)
        .run()
        .unwrap();

    assert!(report.written);
    assert_eq!(report.bytes_before, 2);
    assert_eq!(report.bytes_after, 2);
    assert_eq!(fs::read_to_string(&file).unwrap(), "v2");
}

#[test]
#[cfg(unix)]
fn test_symlinked_target_patches_real_file() {
    use std::os::unix::fs::symlink;

    let dir = TempDir::new().unwrap();
    let real = write_fixture(&dir, "real.tsx", "hello\n");
    let link = dir.path().join("link.tsx");
    symlink(&real, &link).unwrap();

    let report = patch_file(&link, [PatchRule::new("greet", "hello", "bye")]).unwrap();

    assert!(report.written);
    assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    assert_eq!(fs::read_link(&link).unwrap(), real);
    assert_eq!(fs::read_to_string(&real).unwrap(), "bye\n");
}

#[test]
#[cfg(unix)]
fn test_atomic_write_failure_keeps_original() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let locked = dir.path().join("locked");
    fs::create_dir(&locked).unwrap();
    let file = locked.join("a.txt");
    fs::write(&file, "hello world").unwrap();

    let prepared = PatchRun::new(&file)
        .rule(PatchRule::new("greet", "hello", "goodbye"))
        .prepare()
        .unwrap();

    fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();
    let bypassed = fs::write(locked.join("canary"), "").is_ok();
    let result = prepared.commit(&WriteStrategy::Atomic);
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
    if bypassed {
        // Running with privileges that ignore directory permissions.
        return;
    }

    let err = result.unwrap_err();
    assert_eq!(err.phase(), Phase::Write);
    assert!(matches!(err, RunError::Write(WriteError::Failed { .. })));
    assert_eq!(fs::read_to_string(&file).unwrap(), "hello world");
    assert_eq!(fs::read_dir(&locked).unwrap().count(), 1);
}
