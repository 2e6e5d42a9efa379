use anchor_patch::config::{
    discover_rulesets, load_from_path, run_ruleset_inspect, FilePlan, FileRun, RuleSet,
};
use anchor_patch::{
    ApplyOptions, ApplyOutcome, Atomicity, LineEndingPolicy, PatchRule, PatchRun, RuleStatus,
    RunError, RunReport, WriteStrategy,
};
use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;
use serde_json::json;
use similar::{ChangeTag, TextDiff};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "anchor-patch")]
#[command(about = "Literal anchor/replacement patching for text files", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply rulesets to a workspace
    Apply {
        /// Ruleset files, or directories holding *.toml rulesets
        #[arg(required = true)]
        rulesets: Vec<PathBuf>,

        /// Workspace root for workspace-relative rulesets
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Report which rules would match, without modifying files
    Check {
        #[arg(required = true)]
        rulesets: Vec<PathBuf>,

        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply a single anchor/replacement rule to one file
    Replace {
        file: PathBuf,

        /// Literal text to find
        #[arg(long, required_unless_present = "anchor_file", conflicts_with = "anchor_file")]
        anchor: Option<String>,

        /// Read the anchor from a file
        #[arg(long)]
        anchor_file: Option<PathBuf>,

        /// Literal text to put in place of every occurrence
        #[arg(
            long,
            required_unless_present = "replacement_file",
            conflicts_with = "replacement_file"
        )]
        replacement: Option<String>,

        /// Read the replacement from a file
        #[arg(long)]
        replacement_file: Option<PathBuf>,

        /// Rewrite LF breaks in the rule as CRLF when the file uses CRLF
        #[arg(long)]
        match_line_endings: bool,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// List the rules in rulesets, grouped by target file
    List {
        #[arg(required = true)]
        rulesets: Vec<PathBuf>,
    },
}

#[derive(Args, Clone, Copy)]
struct OutputArgs {
    /// Dry run - show what would be changed without modifying files
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Show unified diff of changes
    #[arg(short, long)]
    diff: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Exit non-zero when any rule is unmatched, not only required ones
    #[arg(long)]
    strict: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Apply {
            rulesets,
            workspace,
            output,
        } => cmd_apply(rulesets, workspace, output),

        Commands::Check {
            rulesets,
            workspace,
            json,
        } => cmd_check(rulesets, workspace, json),

        Commands::Replace {
            file,
            anchor,
            anchor_file,
            replacement,
            replacement_file,
            match_line_endings,
            output,
        } => {
            let anchor = text_arg(anchor, anchor_file, "anchor")?;
            let replacement = text_arg(replacement, replacement_file, "replacement")?;
            cmd_replace(file, anchor, replacement, match_line_endings, output)
        }

        Commands::List { rulesets } => cmd_list(rulesets),
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "error",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn text_arg(inline: Option<String>, file: Option<PathBuf>, what: &str) -> Result<String> {
    match (inline, file) {
        (Some(text), _) => Ok(text),
        (None, Some(path)) => fs::read_to_string(&path)
            .with_context(|| format!("failed to read {what} from {}", path.display())),
        (None, None) => anyhow::bail!("missing {what}"),
    }
}

/// Resolve the workspace root.
///
/// Priority order:
/// 1. Explicit --workspace flag
/// 2. ANCHOR_PATCH_WORKSPACE environment variable
/// 3. Current directory
fn resolve_workspace(cli_workspace: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = cli_workspace {
        return path
            .canonicalize()
            .with_context(|| format!("workspace not found: {}", path.display()));
    }

    if let Ok(env_path) = env::var("ANCHOR_PATCH_WORKSPACE") {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            return Ok(path.canonicalize()?);
        }
        eprintln!(
            "{}",
            format!(
                "Warning: ANCHOR_PATCH_WORKSPACE is set but path doesn't exist: {}",
                env_path
            )
            .yellow()
        );
    }

    Ok(env::current_dir()?)
}

fn load_ruleset(path: &Path) -> Result<RuleSet> {
    Ok(load_from_path(path)?)
}

/// Show unified diff between original and modified content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

fn show_plan_diff(plan: &FilePlan) {
    if let Ok(prepared) = &plan.prepared {
        if !prepared.is_changed() {
            return;
        }
        // The target has not been committed yet, so disk still holds the
        // original text.
        if let Ok(before) = fs::read_to_string(&plan.file) {
            display_diff(&plan.file, &before, prepared.document().content());
        }
    }
}

/// Running totals across every file of a command.
#[derive(Default)]
struct Tally {
    applied: usize,
    unmatched: usize,
    rejected: usize,
    failed: usize,
    /// Unmatched rules that make the command fail
    blocking: usize,
}

impl Tally {
    fn record(&mut self, outcome: &ApplyOutcome, strict: bool) {
        match outcome.status() {
            RuleStatus::Applied => self.applied += 1,
            RuleStatus::Unmatched { .. } => {
                self.unmatched += 1;
                if strict || outcome.required() {
                    self.blocking += 1;
                }
            }
            RuleStatus::Rejected { .. } => self.rejected += 1,
        }
    }

    fn should_fail(&self) -> bool {
        self.failed > 0 || self.rejected > 0 || self.blocking > 0
    }

    fn to_json(&self) -> serde_json::Value {
        json!({
            "applied": self.applied,
            "unmatched": self.unmatched,
            "rejected": self.rejected,
            "failed": self.failed,
        })
    }

    fn print(&self) {
        println!("{}", "Summary:".bold());
        println!("  {} applied", format!("{}", self.applied).green());
        println!("  {} unmatched", format!("{}", self.unmatched).yellow());
        println!("  {} rejected", format!("{}", self.rejected).red());
        println!("  {} failed", format!("{}", self.failed).red());
    }
}

fn print_outcome(outcome: &ApplyOutcome, file: &Path, dry_run: bool) {
    match outcome.status() {
        RuleStatus::Applied => {
            let verb = if dry_run { "Would replace" } else { "Replaced" };
            println!(
                "{} {}: {} {} occurrence{} in {}",
                "✓".green(),
                outcome.rule_id(),
                verb,
                outcome.occurrences(),
                if outcome.occurrences() == 1 { "" } else { "s" },
                file.display()
            );
        }
        RuleStatus::Unmatched { hint } => {
            let marker = if outcome.required() {
                "✗".red()
            } else {
                "⊙".yellow()
            };
            println!(
                "{} {}: Anchor not found in {}",
                marker,
                outcome.rule_id(),
                file.display()
            );
            if let Some(hint) = hint {
                println!("  {}", hint.to_string().dimmed());
            }
        }
        RuleStatus::Rejected { reason } => {
            eprintln!("{} {}: Rejected - {}", "✗".red(), outcome.rule_id(), reason);
        }
    }
}

fn print_error(file: &Path, rule_ids: &[String], err: &RunError) {
    eprintln!(
        "{} {}: Error during {} - {}",
        "✗".red(),
        file.display(),
        err.phase(),
        err
    );
    eprintln!("  Rules: {}", rule_ids.join(", "));

    if let RunError::RolledBack { outcomes, .. } = err {
        eprintln!("  {}", "ROLLED BACK: no rule was kept".red());
        for outcome in outcomes {
            eprintln!("    - {}", outcome);
        }
    }
}

fn error_json(err: &RunError) -> serde_json::Value {
    let mut value = json!({
        "phase": err.phase(),
        "message": err.to_string(),
    });
    if let RunError::RolledBack { outcomes, .. } = err {
        value["outcomes"] = json!(outcomes);
    }
    value
}

/// Tally and print one file's result; returns its JSON form.
fn report_file(
    file: &Path,
    rule_ids: &[String],
    result: &Result<RunReport, RunError>,
    tally: &mut Tally,
    output: OutputArgs,
) -> serde_json::Value {
    match result {
        Ok(report) => {
            for outcome in &report.outcomes {
                tally.record(outcome, output.strict);
                if !output.json {
                    print_outcome(outcome, file, output.dry_run);
                }
            }
            json!({ "file": file, "report": report })
        }
        Err(err) => {
            tally.failed += rule_ids.len();
            if !output.json {
                print_error(file, rule_ids, err);
            }
            json!({ "file": file, "rules": rule_ids, "error": error_json(err) })
        }
    }
}

fn cmd_apply(rulesets: Vec<PathBuf>, workspace: Option<PathBuf>, output: OutputArgs) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;
    let ruleset_files = discover_rulesets(&rulesets)?;

    if !output.json {
        println!("Workspace: {}", workspace.display());
        println!();
    }

    let mut tally = Tally::default();
    let mut runs = Vec::new();

    for ruleset_file in ruleset_files {
        let config = load_ruleset(&ruleset_file)?;
        let persist = if output.dry_run {
            WriteStrategy::DryRun
        } else {
            config.meta.write
        };

        if !output.json {
            println!("Loading rules from {}...", ruleset_file.display());
            if output.dry_run {
                println!("{}", "  [DRY RUN - showing what would be applied]".cyan());
            }
        }

        let show_diff = output.diff && !output.json;
        let results: Vec<FileRun> = run_ruleset_inspect(&config, &workspace, &persist, |plan| {
            if show_diff {
                show_plan_diff(plan);
            }
        });

        for run in &results {
            let mut value = report_file(&run.file, &run.rule_ids, &run.result, &mut tally, output);
            value["ruleset"] = json!(ruleset_file);
            runs.push(value);
        }

        if !output.json {
            println!();
        }
    }

    if output.json {
        let document = json!({ "runs": runs, "summary": tally.to_json() });
        println!("{}", serde_json::to_string_pretty(&document)?);
    } else {
        tally.print();
    }

    if tally.should_fail() {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_check(rulesets: Vec<PathBuf>, workspace: Option<PathBuf>, json: bool) -> Result<()> {
    // Any unmatched rule fails a check.
    let output = OutputArgs {
        dry_run: true,
        diff: false,
        json,
        strict: true,
    };
    let workspace = resolve_workspace(workspace)?;
    let ruleset_files = discover_rulesets(&rulesets)?;

    if !json {
        println!("{}", "Ruleset Check Report".bold());
        println!("Workspace: {}", workspace.display());
        println!();
    }

    let mut tally = Tally::default();
    let mut runs = Vec::new();

    for ruleset_file in ruleset_files {
        let config = load_ruleset(&ruleset_file)?;
        let results = run_ruleset_inspect(&config, &workspace, &WriteStrategy::DryRun, |_| {});

        for run in &results {
            let mut value = report_file(&run.file, &run.rule_ids, &run.result, &mut tally, output);
            value["ruleset"] = json!(ruleset_file);
            runs.push(value);
        }
    }

    if json {
        let document = json!({ "runs": runs, "summary": tally.to_json() });
        println!("{}", serde_json::to_string_pretty(&document)?);
    } else {
        println!();
        tally.print();
    }

    if tally.should_fail() {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_replace(
    file: PathBuf,
    anchor: String,
    replacement: String,
    match_line_endings: bool,
    output: OutputArgs,
) -> Result<()> {
    let options = ApplyOptions {
        line_endings: if match_line_endings {
            LineEndingPolicy::MatchDocument
        } else {
            LineEndingPolicy::Exact
        },
        atomicity: Atomicity::BestEffort,
        ..ApplyOptions::default()
    };
    let persist = if output.dry_run {
        WriteStrategy::DryRun
    } else {
        WriteStrategy::Atomic
    };
    let rule_ids = vec!["replace".to_string()];

    let run = PatchRun::new(&file)
        .rule(PatchRule::new("replace", anchor, replacement))
        .options(options);

    let result = run.prepare().and_then(|prepared| {
        if output.diff && !output.json && prepared.is_changed() {
            if let Ok(before) = fs::read_to_string(&file) {
                display_diff(&file, &before, prepared.document().content());
            }
        }
        prepared.commit(&persist)
    });

    let mut tally = Tally::default();
    let value = report_file(&file, &rule_ids, &result, &mut tally, output);

    if output.json {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }

    // A lone ad-hoc rule is always required.
    if tally.should_fail() || tally.unmatched > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_list(rulesets: Vec<PathBuf>) -> Result<()> {
    for ruleset_file in discover_rulesets(&rulesets)? {
        let config = load_ruleset(&ruleset_file)?;

        let title = if config.meta.name.is_empty() {
            ruleset_file.display().to_string()
        } else {
            format!("{} ({})", config.meta.name, ruleset_file.display())
        };
        println!("{}", title.bold());
        if let Some(description) = &config.meta.description {
            println!("  {}", description.dimmed());
        }

        for (file, rules) in config.rules_by_file() {
            println!("  {}", file.cyan());
            for rule in rules {
                if rule.required {
                    println!("    - {} {}", rule.id, "(required)".yellow());
                } else {
                    println!("    - {}", rule.id);
                }
            }
        }
        println!();
    }

    Ok(())
}
