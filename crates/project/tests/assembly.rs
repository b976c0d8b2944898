use depsweep_project::{
    assemble, ArchiveTree, AssemblyError, DependencySource, ResolvedDependency,
};
use depsweep_protocol::{
    ElmJson, ModuleDoc, PackageManifest, PackageName, Version, VersionConstraint,
};
use std::collections::HashMap;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

fn zip_of(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (path, contents) in entries {
        writer.start_file(*path, options).expect("start file");
        writer.write_all(contents.as_bytes()).expect("write file");
    }
    writer.finish().expect("finish zip").into_inner()
}

fn manifest(raw: &str) -> PackageManifest {
    ElmJson::parse(raw)
        .expect("valid manifest json")
        .into_package()
        .expect("library-typed")
}

fn basic_manifest(exposed: &[&str], dependencies: &str) -> PackageManifest {
    let exposed_json = serde_json::to_string(exposed).unwrap();
    manifest(&format!(
        r#"{{
            "type": "package",
            "name": "author/pkg",
            "version": "1.0.0",
            "exposed-modules": {exposed_json},
            "elm-version": "0.19.0 <= v < 0.20.0",
            "dependencies": {dependencies},
            "test-dependencies": {{}}
        }}"#
    ))
}

/// A fixed in-memory dependency source.
#[derive(Default)]
struct FixedDeps {
    entries: HashMap<PackageName, (Version, PackageManifest, Vec<ModuleDoc>)>,
}

impl FixedDeps {
    fn with(mut self, name: &str, version: &str, exposes: &[&str]) -> Self {
        let name: PackageName = name.parse().unwrap();
        let version: Version = version.parse().unwrap();
        let dep_manifest = manifest(&format!(
            r#"{{
                "type": "package",
                "name": "{name}",
                "version": "{version}",
                "exposed-modules": {},
                "elm-version": "0.19.0 <= v < 0.20.0",
                "dependencies": {{}},
                "test-dependencies": {{}}
            }}"#,
            serde_json::to_string(exposes).unwrap()
        ));
        let docs = exposes
            .iter()
            .map(|module| ModuleDoc {
                name: module.to_string(),
                unions: vec![],
                aliases: vec![],
                values: vec![],
                binops: vec![],
            })
            .collect();
        self.entries.insert(name, (version, dep_manifest, docs));
        self
    }
}

impl DependencySource for FixedDeps {
    fn latest_satisfying(
        &self,
        name: &PackageName,
        constraint: &VersionConstraint,
    ) -> Option<ResolvedDependency> {
        let (version, dep_manifest, docs) = self.entries.get(name)?;
        constraint.satisfies(*version).then(|| ResolvedDependency {
            name: name.clone(),
            version: *version,
            manifest: dep_manifest.clone(),
            docs: docs.clone(),
        })
    }
}

#[test]
fn reachability_starts_at_exposed_and_follows_imports() {
    let bytes = zip_of(&[
        ("pkg-1.0.0/src/Api.elm", "module Api exposing (run)\nimport Internal.Core\n"),
        ("pkg-1.0.0/src/Internal/Core.elm", "module Internal.Core exposing (x)\n"),
        ("pkg-1.0.0/src/Dead/Code.elm", "module Dead.Code exposing (y)\n"),
        ("pkg-1.0.0/tests/ApiTest.elm", "module ApiTest exposing (all)\nimport Api\n"),
    ]);
    let archive = ArchiveTree::open(&bytes).unwrap();
    let m = basic_manifest(&["Api"], "{}");

    let project = assemble(&m, "{}", &archive, &FixedDeps::default()).expect("assembles");

    let paths: Vec<&str> = project.modules.iter().map(|m| m.path.as_str()).collect();
    assert_eq!(
        paths,
        vec!["src/Api.elm", "src/Internal/Core.elm", "tests/ApiTest.elm"]
    );
}

#[test]
fn import_cycles_terminate() {
    let bytes = zip_of(&[
        ("pkg-1.0.0/src/A.elm", "module A exposing (a)\nimport B\n"),
        ("pkg-1.0.0/src/B.elm", "module B exposing (b)\nimport A\n"),
    ]);
    let archive = ArchiveTree::open(&bytes).unwrap();
    let m = basic_manifest(&["A"], "{}");

    let project = assemble(&m, "{}", &archive, &FixedDeps::default()).expect("assembles");
    assert_eq!(project.modules.len(), 2);
}

#[test]
fn exposed_module_missing_from_archive_is_dropped_from_seed() {
    let bytes = zip_of(&[(
        "pkg-1.0.0/src/Present.elm",
        "module Present exposing (x)\n",
    )]);
    let archive = ArchiveTree::open(&bytes).unwrap();
    let m = basic_manifest(&["Present", "Absent.Module"], "{}");

    let project = assemble(&m, "{}", &archive, &FixedDeps::default()).expect("assembles");
    assert_eq!(project.modules.len(), 1);
    assert_eq!(project.modules[0].path, "src/Present.elm");
}

#[test]
fn archive_with_only_tests_assembles_to_zero_src_modules() {
    let bytes = zip_of(&[(
        "pkg-1.0.0/tests/OnlyTest.elm",
        "module OnlyTest exposing (all)\n",
    )]);
    let archive = ArchiveTree::open(&bytes).unwrap();
    let m = basic_manifest(&["Whatever"], "{}");

    let project = assemble(&m, "{}", &archive, &FixedDeps::default()).expect("assembles");
    assert_eq!(project.modules.len(), 1);
    assert!(project.modules[0].path.starts_with("tests/"));
}

#[test]
fn unresolvable_dependencies_short_circuit_sorted() {
    let bytes = zip_of(&[("pkg-1.0.0/src/Api.elm", "module Api exposing (run)\n")]);
    let archive = ArchiveTree::open(&bytes).unwrap();
    let m = basic_manifest(
        &["Api"],
        r#"{
            "zeta/missing": "1.0.0 <= v < 2.0.0",
            "alpha/missing": "1.0.0 <= v < 2.0.0",
            "elm/core": "1.0.0 <= v < 2.0.0"
        }"#,
    );
    let deps = FixedDeps::default().with("elm/core", "1.0.5", &["Basics", "List"]);

    let err = assemble(&m, "{}", &archive, &deps).expect_err("missing deps");
    let AssemblyError::MissingDependencies(missing) = err else {
        panic!("wrong error: {err:?}");
    };
    assert_eq!(
        missing,
        vec![
            PackageName::new("alpha", "missing"),
            PackageName::new("zeta", "missing"),
        ]
    );
}

#[test]
fn constraint_mismatch_counts_as_missing() {
    let bytes = zip_of(&[("pkg-1.0.0/src/Api.elm", "module Api exposing (run)\n")]);
    let archive = ArchiveTree::open(&bytes).unwrap();
    let m = basic_manifest(&["Api"], r#"{"elm/core": "2.0.0 <= v < 3.0.0"}"#);
    let deps = FixedDeps::default().with("elm/core", "1.0.5", &["Basics"]);

    assert!(matches!(
        assemble(&m, "{}", &archive, &deps),
        Err(AssemblyError::MissingDependencies(_))
    ));
}

#[test]
fn ineligible_target_version_short_circuits_before_dependencies() {
    let bytes = zip_of(&[("pkg-1.0.0/src/Api.elm", "module Api exposing (run)\n")]);
    let archive = ArchiveTree::open(&bytes).unwrap();
    let raw = r#"{
        "type": "package",
        "name": "author/pkg",
        "version": "1.0.0",
        "exposed-modules": ["Api"],
        "elm-version": "0.18.0 <= v < 0.19.0",
        "dependencies": {"not/cached": "1.0.0 <= v < 2.0.0"},
        "test-dependencies": {}
    }"#;
    let m = manifest(raw);

    assert_eq!(
        assemble(&m, "{}", &archive, &FixedDeps::default()).unwrap_err(),
        AssemblyError::NotAnEligiblePackage
    );
}

#[test]
fn assembly_is_deterministic() {
    let bytes = zip_of(&[
        ("pkg-1.0.0/src/Api.elm", "module Api exposing (run)\nimport Util\n"),
        ("pkg-1.0.0/src/Util.elm", "module Util exposing (u)\n"),
        ("pkg-1.0.0/tests/T.elm", "module T exposing (all)\n"),
    ]);
    let archive = ArchiveTree::open(&bytes).unwrap();
    let m = basic_manifest(&["Api"], r#"{"elm/core": "1.0.0 <= v < 2.0.0"}"#);
    let deps = FixedDeps::default().with("elm/core", "1.0.5", &["Basics"]);

    let first = assemble(&m, "{}", &archive, &deps).expect("assembles");
    let second = assemble(&m, "{}", &archive, &deps).expect("assembles");
    assert_eq!(first, second);
}
