pub mod applicator;
pub mod loader;
pub mod schema;

pub use applicator::{
    apply_ruleset, check_ruleset, plan_ruleset, run_ruleset, run_ruleset_inspect, FilePlan, FileRun,
};
pub use loader::{discover_rulesets, load_from_path, load_from_str, ConfigError};
pub use schema::{Metadata, RuleDefinition, RuleSet, ValidationError, ValidationIssue};
