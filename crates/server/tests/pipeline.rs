//! End-to-end pipeline scenarios: poll, fetch, analyze, and pull-request
//! flows driven through the backend actor with in-memory registry and
//! hosting fakes.

use async_trait::async_trait;
use depsweep_hosting::{ForkIdentity, HostingClient, RepoInfo};
use depsweep_registry::{decode_since_list, RegistryClient};
use depsweep_server::actor::{Backend, BackendSettings, Msg};
use depsweep_server::record::{PackageRecord, ReviewOutcome};
use depsweep_server::state::BackendState;
use depsweep_analysis::RunResult;
use depsweep_protocol::{
    ConsoleRequest, ConsoleResponse, ElmJson, ModuleDoc, PackageManifest, PackageName,
    StatusProjection, TransportError, Version,
};
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const SECRET: &str = "operator-secret";

fn name(raw: &str) -> PackageName {
    raw.parse().unwrap()
}

fn version(raw: &str) -> Version {
    raw.parse().unwrap()
}

fn manifest_json(pkg: &str, v: &str, deps: &str) -> String {
    format!(
        r#"{{
            "type": "package",
            "name": "{pkg}",
            "version": "{v}",
            "exposed-modules": ["Api"],
            "elm-version": "0.19.0 <= v < 0.20.0",
            "dependencies": {deps},
            "test-dependencies": {{}}
        }}"#
    )
}

fn manifest(pkg: &str, v: &str, deps: &str) -> PackageManifest {
    ElmJson::parse(&manifest_json(pkg, v, deps))
        .unwrap()
        .into_package()
        .unwrap()
}

fn docs(modules: &[&str]) -> Vec<ModuleDoc> {
    modules
        .iter()
        .map(|module| ModuleDoc {
            name: module.to_string(),
            unions: vec![],
            aliases: vec![],
            values: vec![],
            binops: vec![],
        })
        .collect()
}

fn zip_of(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (path, contents) in entries {
        writer.start_file(*path, options).expect("start file");
        writer.write_all(contents.as_bytes()).expect("write file");
    }
    writer.finish().expect("finish zip").into_inner()
}

#[derive(Default)]
struct FakeRegistry {
    since_body: Mutex<Option<String>>,
    manifests: HashMap<String, Result<PackageManifest, TransportError>>,
    docs: HashMap<String, Vec<ModuleDoc>>,
    manifest_calls: Mutex<Vec<String>>,
}

impl FakeRegistry {
    fn announcing(body: &str) -> Self {
        Self {
            since_body: Mutex::new(Some(body.to_string())),
            ..Self::default()
        }
    }

    fn with_package(
        mut self,
        pkg: &str,
        v: &str,
        deps: &str,
        exposed_docs: &[&str],
    ) -> Self {
        let key = format!("{pkg}@{v}");
        self.manifests
            .insert(key.clone(), Ok(manifest(pkg, v, deps)));
        self.docs.insert(key, docs(exposed_docs));
        self
    }

    fn with_failing_package(mut self, pkg: &str, v: &str, error: TransportError) -> Self {
        self.manifests.insert(format!("{pkg}@{v}"), Err(error));
        self
    }
}

#[async_trait]
impl RegistryClient for FakeRegistry {
    async fn since(&self, _cursor: u64) -> Result<Vec<(PackageName, Version)>, TransportError> {
        match self.since_body.lock().unwrap().take() {
            Some(body) => decode_since_list(&body),
            None => Ok(vec![]),
        }
    }

    async fn manifest(
        &self,
        pkg: &PackageName,
        v: Version,
    ) -> Result<PackageManifest, TransportError> {
        let key = format!("{pkg}@{v}");
        self.manifest_calls.lock().unwrap().push(key.clone());
        self.manifests
            .get(&key)
            .cloned()
            .unwrap_or(Err(TransportError::BadStatus(404)))
    }

    async fn docs(&self, pkg: &PackageName, v: Version) -> Result<Vec<ModuleDoc>, TransportError> {
        Ok(self
            .docs
            .get(&format!("{pkg}@{v}"))
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
struct FakeHosting {
    archives: HashMap<String, Vec<u8>>,
    fail_update_branch: bool,
    archive_calls: Mutex<Vec<String>>,
}

impl FakeHosting {
    fn with_archive(mut self, pkg: &str, tag: &str, bytes: Vec<u8>) -> Self {
        self.archives.insert(format!("{pkg}@{tag}"), bytes);
        self
    }
}

#[async_trait]
impl HostingClient for FakeHosting {
    async fn repo_info(&self, _name: &PackageName) -> Result<RepoInfo, TransportError> {
        Ok(RepoInfo {
            default_branch: "main".to_string(),
        })
    }

    async fn branch_head_sha(
        &self,
        _name: &PackageName,
        _branch: &str,
    ) -> Result<String, TransportError> {
        Ok("head-sha".to_string())
    }

    async fn tag_sha(&self, _name: &PackageName, _tag: &str) -> Result<String, TransportError> {
        Ok("head-sha".to_string())
    }

    async fn commit_tree_sha(
        &self,
        _name: &PackageName,
        _sha: &str,
    ) -> Result<String, TransportError> {
        Ok("tree-sha".to_string())
    }

    async fn create_tree(
        &self,
        _name: &PackageName,
        _base_tree: &str,
        _path: &str,
        _content: &str,
    ) -> Result<String, TransportError> {
        Ok("new-tree".to_string())
    }

    async fn create_commit(
        &self,
        _name: &PackageName,
        _message: &str,
        _tree: &str,
        _parent: &str,
    ) -> Result<String, TransportError> {
        Ok("new-commit".to_string())
    }

    async fn update_branch(
        &self,
        _name: &PackageName,
        _branch: &str,
        _sha: &str,
        _force: bool,
    ) -> Result<(), TransportError> {
        if self.fail_update_branch {
            Err(TransportError::BadStatus(422))
        } else {
            Ok(())
        }
    }

    async fn create_fork(&self, upstream: &PackageName) -> Result<ForkIdentity, TransportError> {
        Ok(ForkIdentity {
            owner: "depsweep-bot".to_string(),
            repo: upstream.repo.clone(),
        })
    }

    async fn archive_at_tag(
        &self,
        pkg: &PackageName,
        tag: &str,
    ) -> Result<Vec<u8>, TransportError> {
        let key = format!("{pkg}@{tag}");
        self.archive_calls.lock().unwrap().push(key.clone());
        self.archives
            .get(&key)
            .cloned()
            .ok_or(TransportError::BadStatus(404))
    }

    async fn open_pull_request(
        &self,
        upstream: &PackageName,
        _title: &str,
        _head: &str,
        _base: &str,
        _body: &str,
    ) -> Result<String, TransportError> {
        Ok(format!(
            "https://api.github.com/repos/{upstream}/pulls/1"
        ))
    }
}

struct Harness {
    backend: Backend,
    rx: mpsc::UnboundedReceiver<Msg>,
    session: Uuid,
    console_rx: mpsc::UnboundedReceiver<ConsoleResponse>,
}

impl Harness {
    fn new(registry: FakeRegistry, hosting: FakeHosting) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let settings = BackendSettings {
            operator_secret: SECRET.to_string(),
            package_offset: 0,
            ignore: vec![],
            abort_on_tag_mismatch: false,
            pacing: Duration::ZERO,
        };
        let backend = Backend::new(Arc::new(registry), Arc::new(hosting), settings, tx);
        let (console_tx, console_rx) = mpsc::unbounded_channel();
        let session = Uuid::new_v4();
        let mut harness = Self {
            backend,
            rx,
            session,
            console_rx,
        };
        harness.backend.handle(Msg::ClientConnected {
            session,
            sender: console_tx,
        });
        harness
    }

    fn login(&mut self) {
        self.backend.handle(Msg::Command {
            session: self.session,
            request: ConsoleRequest::LoginRequest {
                password: SECRET.to_string(),
            },
        });
        let first = self.console_rx.try_recv().expect("login answered");
        assert!(matches!(first, ConsoleResponse::FirstUpdate { .. }));
    }

    fn command(&mut self, request: ConsoleRequest) {
        self.backend.handle(Msg::Command {
            session: self.session,
            request,
        });
    }

    /// Process completion messages until the pipeline goes quiet.
    async fn drain(&mut self) {
        loop {
            match tokio::time::timeout(Duration::from_millis(250), self.rx.recv()).await {
                Ok(Some(msg)) => self.backend.handle(msg),
                _ => break,
            }
        }
    }

    fn state(&self) -> &BackendState {
        self.backend.state()
    }

    fn record(&self, pkg: &str, v: &str) -> PackageRecord {
        self.state()
            .cache
            .get(&name(pkg), version(v))
            .cloned()
            .unwrap_or_else(|| panic!("no record for {pkg}@{v}"))
    }

    fn updates(&mut self) -> Vec<ConsoleResponse> {
        let mut responses = Vec::new();
        while let Ok(response) = self.console_rx.try_recv() {
            responses.push(response);
        }
        responses
    }
}

#[tokio::test]
async fn fresh_poll_seeds_pending_records_newest_first() {
    let registry = FakeRegistry::announcing(r#"["a/p1@1.0.0", "b/p2@0.1.0"]"#);
    let mut harness = Harness::new(registry, FakeHosting::default());

    harness.backend.handle(Msg::PollRegistry);
    // Only the poll completion, no fetch results yet.
    let Some(msg) = harness.rx.recv().await else {
        panic!("poll never completed");
    };
    harness.backend.handle(msg);

    // Two insertions, two update-index increments, reverse order.
    assert_eq!(harness.state().update_index(), 2);
    let order: Vec<String> = harness
        .state()
        .cache
        .iter()
        .map(|(n, _)| n.to_string())
        .collect();
    assert_eq!(order, vec!["b/p2", "a/p1"]);
    assert!(matches!(
        harness.record("b/p2", "0.1.0"),
        PackageRecord::Pending(_)
    ));

    // The scheduler dispatched a metadata fetch for the first record.
    let Some(msg) = harness.rx.recv().await else {
        panic!("no dispatch happened");
    };
    let Msg::MetaFetched { name: fetched, .. } = &msg else {
        panic!("expected a metadata completion, got {msg:?}");
    };
    assert_eq!(fetched, &name("b/p2"));
}

#[tokio::test]
async fn metadata_failure_marks_record_and_moves_on() {
    let registry = FakeRegistry::announcing(r#"["a/p1@1.0.0", "b/p2@0.1.0"]"#)
        .with_failing_package("b/p2", "0.1.0", TransportError::BadStatus(500))
        .with_package("a/p1", "1.0.0", "{}", &[]);
    let mut harness = Harness::new(registry, FakeHosting::default());
    harness.login();

    harness.backend.handle(Msg::PollRegistry);
    harness.drain().await;

    assert!(matches!(
        harness.record("b/p2", "0.1.0"),
        PackageRecord::FetchMetaFailed(_)
    ));
    // The failure did not stall the pipeline: the next pending record got
    // fetched and analyzed (its archive 404s into TagNotFound).
    assert!(matches!(
        harness.record("a/p1", "1.0.0"),
        PackageRecord::FetchedAndChecked(_)
    ));

    // Every transition was broadcast, including the failure.
    let updates = harness.updates();
    let mut saw_meta_failed = false;
    let mut saw_fetched = false;
    for response in &updates {
        if let ConsoleResponse::Updates { delta } = response {
            for row in delta.values().flatten() {
                match &row.status {
                    StatusProjection::MetaFailed { error } => {
                        assert_eq!(error, &TransportError::BadStatus(500));
                        saw_meta_failed = true;
                    }
                    StatusProjection::Fetched => saw_fetched = true,
                    _ => {}
                }
            }
        }
    }
    assert!(saw_meta_failed, "missing MetaFailed broadcast: {updates:?}");
    assert!(saw_fetched, "missing Fetched broadcast: {updates:?}");
}

fn happy_path_fixture() -> (FakeRegistry, FakeHosting) {
    let registry = FakeRegistry::announcing(r#"["elm/core@1.0.1", "x/y@1.0.0"]"#)
        .with_package(
            "x/y",
            "1.0.0",
            r#"{"elm/core": "1.0.0 <= v < 2.0.0"}"#,
            &["Api"],
        )
        .with_package("elm/core", "1.0.1", "{}", &["Basics", "List", "Maybe"]);
    let hosting = FakeHosting::default().with_archive(
        "x/y",
        "v1.0.0",
        zip_of(&[
            (
                "y-1.0.0/elm.json",
                &manifest_json("x/y", "1.0.0", r#"{"elm/core": "1.0.0 <= v < 2.0.0"}"#),
            ),
            (
                "y-1.0.0/src/Api.elm",
                "module Api exposing (run)\n\nrun = 1\n",
            ),
        ]),
    );
    (registry, hosting)
}

#[tokio::test]
async fn happy_path_analysis_finds_the_unused_dependency() {
    let (registry, hosting) = happy_path_fixture();
    let mut harness = Harness::new(registry, hosting);
    harness.login();

    harness.backend.handle(Msg::PollRegistry);
    harness.drain().await;

    let PackageRecord::FetchedAndChecked(data) = harness.record("x/y", "1.0.0") else {
        panic!("x/y was not analyzed: {:?}", harness.record("x/y", "1.0.0"));
    };
    let ReviewOutcome::RuleRun(RunResult::FoundErrors {
        errors,
        new_manifest_text,
        ..
    }) = &data.extra
    else {
        panic!("unexpected outcome: {:?}", data.extra);
    };
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("elm/core"));
    let fixed = ElmJson::parse(new_manifest_text)
        .unwrap()
        .into_package()
        .unwrap();
    assert!(fixed.dependencies.is_empty());
}

#[tokio::test]
async fn only_the_latest_version_is_analyzed() {
    let registry = FakeRegistry::announcing(r#"["x/y@1.0.0", "x/y@1.1.0"]"#)
        .with_package("x/y", "1.0.0", "{}", &["Api"])
        .with_package("x/y", "1.1.0", "{}", &["Api"]);
    let hosting = FakeHosting::default().with_archive(
        "x/y",
        "v1.1.0",
        zip_of(&[
            ("y-1.1.0/elm.json", &manifest_json("x/y", "1.1.0", "{}")),
            (
                "y-1.1.0/src/Api.elm",
                "module Api exposing (run)\n\nrun = 1\n",
            ),
        ]),
    );
    let mut harness = Harness::new(registry, hosting);

    harness.backend.handle(Msg::PollRegistry);
    harness.drain().await;

    assert!(matches!(
        harness.record("x/y", "1.1.0"),
        PackageRecord::FetchedAndChecked(_)
    ));
    // The older version was fetched but never analyzed.
    assert!(matches!(
        harness.record("x/y", "1.0.0"),
        PackageRecord::Fetched(_)
    ));
}

#[tokio::test]
async fn reserved_owner_is_fetched_but_never_analyzed() {
    let registry = FakeRegistry::announcing(r#"["elm/core@1.0.1"]"#).with_package(
        "elm/core",
        "1.0.1",
        "{}",
        &["Basics"],
    );
    let mut harness = Harness::new(registry, FakeHosting::default());

    harness.backend.handle(Msg::PollRegistry);
    harness.drain().await;

    assert!(matches!(
        harness.record("elm/core", "1.0.1"),
        PackageRecord::Fetched(_)
    ));
}

#[tokio::test]
async fn pull_request_round_trip_reaches_sent() {
    let (registry, hosting) = happy_path_fixture();
    let mut harness = Harness::new(registry, hosting);
    harness.login();
    harness.backend.handle(Msg::PollRegistry);
    harness.drain().await;
    harness.updates();

    harness.command(ConsoleRequest::PullRequestRequest { name: name("x/y") });
    assert!(matches!(
        harness.record("x/y", "1.0.0"),
        PackageRecord::PullRequestPending(_)
    ));
    harness.drain().await;

    let PackageRecord::PullRequestSent(data) = harness.record("x/y", "1.0.0") else {
        panic!("pull request did not settle: {:?}", harness.record("x/y", "1.0.0"));
    };
    assert_eq!(data.extra.url, "https://api.github.com/repos/x/y/pulls/1");

    // Both transitions were broadcast, in update-index order.
    let updates = harness.updates();
    let mut stamps = Vec::new();
    for response in &updates {
        if let ConsoleResponse::Updates { delta } = response {
            for row in delta.values().flatten() {
                stamps.push(row.update_index);
            }
        }
    }
    assert!(stamps.windows(2).all(|pair| pair[0] < pair[1]));
}

#[tokio::test]
async fn failed_pull_request_keeps_errors_for_retry() {
    let (registry, mut hosting) = happy_path_fixture();
    hosting.fail_update_branch = true;
    let mut harness = Harness::new(registry, hosting);
    harness.login();
    harness.backend.handle(Msg::PollRegistry);
    harness.drain().await;

    harness.command(ConsoleRequest::PullRequestRequest { name: name("x/y") });
    harness.drain().await;

    let PackageRecord::PullRequestFailed(data) = harness.record("x/y", "1.0.0") else {
        panic!("expected a failed pull request");
    };
    assert_eq!(data.extra.stage, "updateBranch");
    assert_eq!(data.extra.error, TransportError::BadStatus(422));
    assert_eq!(data.extra.found.errors.len(), 1);
}

#[tokio::test]
async fn commands_before_login_are_no_ops() {
    let (registry, hosting) = happy_path_fixture();
    let mut harness = Harness::new(registry, hosting);
    harness.backend.handle(Msg::PollRegistry);
    harness.drain().await;

    // Not logged in: the PR request must do nothing.
    harness.command(ConsoleRequest::PullRequestRequest { name: name("x/y") });
    assert!(matches!(
        harness.record("x/y", "1.0.0"),
        PackageRecord::FetchedAndChecked(_)
    ));
    assert!(harness.updates().is_empty());
}

#[tokio::test]
async fn wrong_password_does_not_authenticate() {
    let (registry, hosting) = happy_path_fixture();
    let mut harness = Harness::new(registry, hosting);
    harness.backend.handle(Msg::Command {
        session: harness.session,
        request: ConsoleRequest::LoginRequest {
            password: "wrong".to_string(),
        },
    });
    assert!(harness.updates().is_empty());
}

#[tokio::test]
async fn rerun_downgrades_and_reanalyzes() {
    let (registry, hosting) = happy_path_fixture();
    let mut harness = Harness::new(registry, hosting);
    harness.login();
    harness.backend.handle(Msg::PollRegistry);
    harness.drain().await;
    assert!(matches!(
        harness.record("x/y", "1.0.0"),
        PackageRecord::FetchedAndChecked(_)
    ));

    harness.command(ConsoleRequest::RerunPackageRequest {
        name: name("x/y"),
        version: version("1.0.0"),
    });
    harness.drain().await;

    // Re-analyzed back into the same outcome.
    let PackageRecord::FetchedAndChecked(data) = harness.record("x/y", "1.0.0") else {
        panic!("rerun did not complete");
    };
    assert!(matches!(
        data.extra,
        ReviewOutcome::RuleRun(RunResult::FoundErrors { .. })
    ));
}

#[tokio::test]
async fn reset_rules_triggers_reanalysis() {
    let (registry, hosting) = happy_path_fixture();
    let mut harness = Harness::new(registry, hosting);
    harness.login();
    harness.backend.handle(Msg::PollRegistry);
    harness.drain().await;

    let before = harness.record("x/y", "1.0.0").update_index();
    harness.command(ConsoleRequest::ResetRules);
    harness.drain().await;

    let record = harness.record("x/y", "1.0.0");
    assert!(matches!(record, PackageRecord::FetchedAndChecked(_)));
    assert!(record.update_index() > before);
}
