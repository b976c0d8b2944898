use crate::fix::Edit;
use crate::manifest_span::dependency_entry_span;
use depsweep_project::{imports_of, module_name_for_path, Project};
use depsweep_protocol::{Diagnostic, SourceRange};
use std::collections::HashSet;

/// Rule name reserved for source files the engine could not parse.
pub const PARSING_ERROR_RULE: &str = "ParsingError";

/// Rule name reserved for projects whose inputs are globally inconsistent.
pub const INCORRECT_PROJECT_RULE: &str = "Incorrect project";

/// The rule this whole system exists to apply.
pub const UNUSED_DEPENDENCIES_RULE: &str = "NoUnused.Dependencies";

/// A diagnostic as produced by the engine: the public record plus an
/// optional fix. The fix never leaves the analysis crate; records and
/// broadcasts only carry [`Diagnostic`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDiagnostic {
    pub message: String,
    pub rule: String,
    pub path: String,
    pub details: Vec<String>,
    pub range: SourceRange,
    pub fix: Option<Vec<Edit>>,
}

impl RuleDiagnostic {
    pub fn to_public(&self) -> Diagnostic {
        Diagnostic {
            message: self.message.clone(),
            rule: self.rule.clone(),
            path: self.path.clone(),
            details: self.details.clone(),
            range: self.range,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineOutput {
    pub diagnostics: Vec<RuleDiagnostic>,
}

/// The contract the analysis driver runs against. The production engine is
/// [`UnusedDependenciesRule`]; driver tests use scripted fakes.
pub trait RuleEngine {
    fn run(&self, project: &Project) -> EngineOutput;
}

/// Flags direct and test dependencies whose exposed modules are imported
/// nowhere in the project, with a manifest fix deleting the entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnusedDependenciesRule;

impl RuleEngine for UnusedDependenciesRule {
    fn run(&self, project: &Project) -> EngineOutput {
        let mut diagnostics = Vec::new();

        for module in &project.modules {
            if !has_module_header(&module.source) {
                diagnostics.push(RuleDiagnostic {
                    message: format!("Could not parse {}", module.path),
                    rule: PARSING_ERROR_RULE.to_string(),
                    path: module.path.clone(),
                    details: vec![
                        "The file does not start with a module declaration.".to_string(),
                    ],
                    range: SourceRange::new(1, 1, 1, 1),
                    fix: None,
                });
            }
        }
        if !diagnostics.is_empty() {
            return EngineOutput { diagnostics };
        }

        // Sanity: every declared dependency must have been resolved by the
        // assembler. A hole here means the inputs are inconsistent, which is
        // a project-level failure rather than a finding about the code.
        let resolved: HashSet<_> = project.dependencies.iter().map(|d| &d.name).collect();
        let declared = project
            .manifest
            .parsed
            .dependencies
            .keys()
            .chain(project.manifest.parsed.test_dependencies.keys());
        for name in declared {
            if !resolved.contains(name) {
                return EngineOutput {
                    diagnostics: vec![RuleDiagnostic {
                        message: format!("Dependency {name} was never resolved"),
                        rule: INCORRECT_PROJECT_RULE.to_string(),
                        path: project.manifest.path.clone(),
                        details: vec![
                            "The assembled project does not match its manifest.".to_string(),
                        ],
                        range: SourceRange::new(1, 1, 1, 1),
                        fix: None,
                    }],
                };
            }
        }

        // Imports that can only refer to dependency packages: anything that
        // resolves to one of the project's own modules shadows a package
        // module and does not count as usage. Imports are bucketed by the
        // importing module's origin because test dependencies are only
        // legitimately used from test modules.
        let local: HashSet<String> = project
            .modules
            .iter()
            .filter_map(|module| module_name_for_path(&module.path))
            .collect();
        let mut src_imports: HashSet<String> = HashSet::new();
        let mut test_imports: HashSet<String> = HashSet::new();
        for module in &project.modules {
            let bucket = if module.is_test {
                &mut test_imports
            } else {
                &mut src_imports
            };
            for import in imports_of(&module.source) {
                if !local.contains(&import) {
                    bucket.insert(import);
                }
            }
        }

        for dependency in &project.dependencies {
            let used = dependency.docs.iter().any(|doc| {
                if dependency.test_only {
                    test_imports.contains(&doc.name)
                } else {
                    src_imports.contains(&doc.name) || test_imports.contains(&doc.name)
                }
            });
            if used {
                continue;
            }

            let section = if dependency.test_only {
                "test-dependencies"
            } else {
                "dependencies"
            };
            let span =
                dependency_entry_span(&project.manifest.text, section, &dependency.name.to_string());
            let range = span
                .as_ref()
                .map(|s| s.key)
                .unwrap_or_else(|| SourceRange::new(1, 1, 1, 1));
            let fix = span.map(|s| vec![Edit::delete(s.removal)]);

            diagnostics.push(RuleDiagnostic {
                message: format!("Unused dependency `{}`", dependency.name),
                rule: UNUSED_DEPENDENCIES_RULE.to_string(),
                path: project.manifest.path.clone(),
                details: vec![
                    "None of the modules exposed by this package are imported anywhere."
                        .to_string(),
                    "Removing the entry makes the package cheaper for consumers to install."
                        .to_string(),
                ],
                range,
                fix,
            });
        }

        EngineOutput { diagnostics }
    }
}

/// Minimal parse check: the first meaningful line must be a module
/// declaration. Full parsing belongs to the compiler, not this bot.
fn has_module_header(source: &str) -> bool {
    let mut in_block_comment = 0usize;
    for line in source.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line).trim_start();
        if in_block_comment > 0 {
            in_block_comment = in_block_comment
                .saturating_add(line.matches("{-").count())
                .saturating_sub(line.matches("-}").count());
            continue;
        }
        if line.is_empty() || line.starts_with("--") {
            continue;
        }
        if line.starts_with("{-") {
            in_block_comment = line.matches("{-").count() - line.matches("-}").count();
            continue;
        }
        return line.starts_with("module ")
            || line.starts_with("port module ")
            || line.starts_with("effect module ");
    }
    false
}
