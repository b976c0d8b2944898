//! The analysis side of the pipeline: the rule-engine contract, the
//! built-in no-unused-dependencies rule, textual fix application, and the
//! iterative driver that applies manifest fixes to a fixpoint.
//!
//! Everything here is pure and synchronous; the server crate owns all I/O.

mod driver;
mod fix;
mod manifest_span;
mod rule;

pub use driver::{AnalysisDriver, RunResult, MAX_ITERATIONS};
pub use fix::{apply_edits, offset_to_position, position_to_offset, Edit, FixFailure};
pub use manifest_span::{dependency_entry_span, EntrySpan};
pub use rule::{
    EngineOutput, RuleDiagnostic, RuleEngine, UnusedDependenciesRule, INCORRECT_PROJECT_RULE,
    PARSING_ERROR_RULE, UNUSED_DEPENDENCIES_RULE,
};
