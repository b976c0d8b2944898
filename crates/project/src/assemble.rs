use crate::archive::ArchiveTree;
use crate::imports::{imports_of, module_name_for_path};
use depsweep_protocol::{
    ElmJson, ModuleDoc, PackageManifest, PackageName, Version, VersionConstraint,
    ELM_TARGET_VERSION, MANIFEST_PATH,
};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Where dependency manifests and docs come from during assembly. The
/// server's package cache implements this; tests use a fixed map.
pub trait DependencySource {
    /// The highest cached version of `name` that satisfies `constraint` and
    /// holds usable metadata, or `None`.
    fn latest_satisfying(
        &self,
        name: &PackageName,
        constraint: &VersionConstraint,
    ) -> Option<ResolvedDependency>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDependency {
    pub name: PackageName,
    pub version: Version,
    pub manifest: PackageManifest,
    pub docs: Vec<ModuleDoc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceModule {
    pub path: String,
    pub source: String,
    /// True for modules under `tests/`. The rule weighs imports from test
    /// modules differently when deciding whether a test dependency is used.
    pub is_test: bool,
}

/// The manifest entry of an assembled project, both as text (fixes splice
/// into it) and parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    pub path: String,
    pub text: String,
    pub parsed: PackageManifest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDependency {
    pub name: PackageName,
    pub version: Version,
    pub manifest: PackageManifest,
    pub docs: Vec<ModuleDoc>,
    /// True when the dependency was declared under `test-dependencies`.
    pub test_only: bool,
}

/// Everything the rule engine needs: reachable source modules, the test
/// modules, the manifest, and the resolved dependency entries.
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub modules: Vec<SourceModule>,
    pub manifest: ManifestEntry,
    pub dependencies: Vec<ProjectDependency>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    /// The manifest's language-version constraint excludes the fixed
    /// analysis target.
    NotAnEligiblePackage,
    /// Direct or test dependencies with no usable cached version. Sorted
    /// and deduplicated, never empty.
    MissingDependencies(Vec<PackageName>),
}

/// The manifest text a project is assembled around: the archive's own
/// `elm.json` when it parses as a library manifest, otherwise the cached
/// registry manifest re-serialized. Fixes must splice into the text that
/// will end up in a pull request, so the repository's actual file wins.
pub fn manifest_source_text(archive: &ArchiveTree, cached: &PackageManifest) -> (String, PackageManifest) {
    if let Some(text) = &archive.manifest_text {
        if let Some(parsed) = ElmJson::parse(text).ok().and_then(ElmJson::into_package) {
            return (text.clone(), parsed);
        }
        log::warn!(
            "{}: archive elm.json is unusable, falling back to registry manifest",
            cached.name
        );
    }
    let text = serde_json::to_string_pretty(&ElmJson::Package(cached.clone()))
        .unwrap_or_else(|_| String::from("{}"));
    (text, cached.clone())
}

/// Build an analyzable project.
///
/// Reachability: modules listed in `exposed-modules` seed the set (names
/// missing from the archive are silently dropped); imports extend it to a
/// fixpoint. Test modules are included unconditionally. Both loops
/// terminate on cyclic imports because a module is only enqueued once.
pub fn assemble(
    manifest: &PackageManifest,
    manifest_text: &str,
    archive: &ArchiveTree,
    deps: &dyn DependencySource,
) -> Result<Project, AssemblyError> {
    if !manifest.admits(ELM_TARGET_VERSION) {
        return Err(AssemblyError::NotAnEligiblePackage);
    }

    let dependencies = resolve_dependencies(manifest, deps)?;

    // Index src modules by module name for the reachability walk.
    let by_name: HashMap<String, usize> = archive
        .src_modules
        .iter()
        .enumerate()
        .filter_map(|(index, (path, _))| module_name_for_path(path).map(|name| (name, index)))
        .collect();

    let mut reachable: HashSet<String> = HashSet::new();
    let mut queue: Vec<String> = manifest
        .exposed_modules
        .names()
        .into_iter()
        .filter(|name| by_name.contains_key(*name))
        .map(str::to_string)
        .collect();

    while let Some(name) = queue.pop() {
        if !reachable.insert(name.clone()) {
            continue;
        }
        let (_, source) = &archive.src_modules[by_name[&name]];
        for import in imports_of(source) {
            if by_name.contains_key(&import) && !reachable.contains(&import) {
                queue.push(import);
            }
        }
    }

    // Archive order keeps the output deterministic for identical inputs.
    let mut modules: Vec<SourceModule> = archive
        .src_modules
        .iter()
        .filter(|(path, _)| {
            module_name_for_path(path).is_some_and(|name| reachable.contains(&name))
        })
        .map(|(path, source)| SourceModule {
            path: path.clone(),
            source: source.clone(),
            is_test: false,
        })
        .collect();
    modules.extend(archive.test_modules.iter().map(|(path, source)| SourceModule {
        path: path.clone(),
        source: source.clone(),
        is_test: true,
    }));

    Ok(Project {
        modules,
        manifest: ManifestEntry {
            path: MANIFEST_PATH.to_string(),
            text: manifest_text.to_string(),
            parsed: manifest.clone(),
        },
        dependencies,
    })
}

fn resolve_dependencies(
    manifest: &PackageManifest,
    deps: &dyn DependencySource,
) -> Result<Vec<ProjectDependency>, AssemblyError> {
    let mut resolved = Vec::new();
    let mut missing = BTreeSet::new();

    let wanted = manifest
        .dependencies
        .iter()
        .map(|(name, constraint)| (name, constraint, false))
        .chain(
            manifest
                .test_dependencies
                .iter()
                .map(|(name, constraint)| (name, constraint, true)),
        );

    for (name, constraint, test_only) in wanted {
        match deps.latest_satisfying(name, constraint) {
            Some(dependency) => resolved.push(ProjectDependency {
                name: dependency.name,
                version: dependency.version,
                manifest: dependency.manifest,
                docs: dependency.docs,
                test_only,
            }),
            None => {
                missing.insert(name.clone());
            }
        }
    }

    if missing.is_empty() {
        Ok(resolved)
    } else {
        Err(AssemblyError::MissingDependencies(
            missing.into_iter().collect(),
        ))
    }
}
