use crate::fix::{apply_edits, FixFailure};
use crate::rule::{RuleEngine, INCORRECT_PROJECT_RULE, PARSING_ERROR_RULE};
use depsweep_project::{assemble, ArchiveTree, AssemblyError, DependencySource};
use depsweep_protocol::{Diagnostic, ElmJson, PackageManifest, PackageName};

/// Iteration budget for the fix loop. Each applied manifest fix consumes
/// one unit; the cap keeps a misbehaving fix from looping forever.
pub const MAX_ITERATIONS: u32 = 10;

/// Outcome of running the rule against one package version.
#[derive(Debug, Clone, PartialEq)]
pub enum RunResult {
    ParsingError(Vec<String>),
    IncorrectProject,
    FixFailed(FixFailure),
    NotEnoughIterations,
    NotAnEligiblePackage,
    MissingDependencies(Vec<PackageName>),
    FoundErrors {
        errors: Vec<Diagnostic>,
        old_manifest_text: String,
        new_manifest_text: String,
    },
    NoErrors,
}

impl RunResult {
    /// Short label for status projection on the operator console.
    pub fn summary(&self) -> String {
        match self {
            Self::ParsingError(messages) => format!("parsing error ({})", messages.len()),
            Self::IncorrectProject => "incorrect project".to_string(),
            Self::FixFailed(failure) => format!("fix failed: {failure}"),
            Self::NotEnoughIterations => "not enough iterations".to_string(),
            Self::NotAnEligiblePackage => "not an eligible package".to_string(),
            Self::MissingDependencies(names) => {
                let list: Vec<String> = names.iter().map(ToString::to_string).collect();
                format!("missing dependencies: {}", list.join(", "))
            }
            Self::FoundErrors { errors, .. } => format!(
                "found {} error{}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" }
            ),
            Self::NoErrors => "no errors".to_string(),
        }
    }
}

impl From<AssemblyError> for RunResult {
    fn from(err: AssemblyError) -> Self {
        match err {
            AssemblyError::NotAnEligiblePackage => Self::NotAnEligiblePackage,
            AssemblyError::MissingDependencies(names) => Self::MissingDependencies(names),
        }
    }
}

/// Drives the rule to a fixpoint over one archive.
///
/// The loop is a bounded state machine rather than recursion: assemble,
/// run the engine, apply at most one manifest fix, re-assemble, repeat.
pub struct AnalysisDriver<'a> {
    engine: &'a dyn RuleEngine,
    archive: &'a ArchiveTree,
    deps: &'a dyn DependencySource,
    max_iterations: u32,
}

impl<'a> AnalysisDriver<'a> {
    pub fn new(
        engine: &'a dyn RuleEngine,
        archive: &'a ArchiveTree,
        deps: &'a dyn DependencySource,
    ) -> Self {
        Self {
            engine,
            archive,
            deps,
            max_iterations: MAX_ITERATIONS,
        }
    }

    pub fn with_iteration_budget(mut self, budget: u32) -> Self {
        self.max_iterations = budget;
        self
    }

    pub fn analyze(&self, manifest: &PackageManifest, manifest_text: &str) -> RunResult {
        let mut project = match assemble(manifest, manifest_text, self.archive, self.deps) {
            Ok(project) => project,
            Err(err) => return err.into(),
        };
        let original_text = project.manifest.text.clone();
        let mut applied: Vec<Diagnostic> = Vec::new();
        let mut budget = self.max_iterations;

        loop {
            let output = self.engine.run(&project);

            let parsing: Vec<String> = output
                .diagnostics
                .iter()
                .filter(|d| d.rule == PARSING_ERROR_RULE)
                .map(|d| d.message.clone())
                .collect();
            if !parsing.is_empty() {
                return RunResult::ParsingError(parsing);
            }
            if output
                .diagnostics
                .iter()
                .any(|d| d.rule == INCORRECT_PROJECT_RULE)
            {
                return RunResult::IncorrectProject;
            }

            let Some((diagnostic, fix)) = output.diagnostics.iter().find_map(|d| {
                if d.path == project.manifest.path {
                    d.fix.as_ref().map(|fix| (d, fix))
                } else {
                    None
                }
            }) else {
                return if applied.is_empty() {
                    RunResult::NoErrors
                } else {
                    RunResult::FoundErrors {
                        errors: applied,
                        old_manifest_text: original_text,
                        new_manifest_text: project.manifest.text,
                    }
                };
            };

            let new_text = match apply_edits(&project.manifest.text, fix) {
                Ok(text) => text,
                Err(failure) => return RunResult::FixFailed(failure),
            };

            let new_manifest = match ElmJson::parse(&new_text) {
                Err(err) => {
                    return RunResult::FixFailed(FixFailure::SourceCodeInvalid(err.to_string()))
                }
                Ok(ElmJson::Application) => {
                    return RunResult::FixFailed(FixFailure::SourceCodeInvalid(
                        "manifest is now application-typed".to_string(),
                    ))
                }
                Ok(ElmJson::Package(parsed)) => parsed,
            };

            applied.push(diagnostic.to_public());
            log::debug!(
                "{}: applied fix {} ({} so far)",
                manifest.name,
                diagnostic.message,
                applied.len()
            );

            project = match assemble(&new_manifest, &new_text, self.archive, self.deps) {
                Ok(project) => project,
                Err(err) => return err.into(),
            };

            budget = budget.saturating_sub(1);
            if budget == 0 {
                return RunResult::NotEnoughIterations;
            }
        }
    }
}
