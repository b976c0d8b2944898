use crate::broadcast::ClientRegistry;
use crate::record::{PackageRecord, ReviewOutcome};
use crate::scheduler::{select_next, WorkItem};
use crate::state::BackendState;
use depsweep_analysis::{AnalysisDriver, UnusedDependenciesRule};
use depsweep_hosting::{
    open_unused_dependencies_pull_request, HostingClient, PrFailure, PullRequestInput,
};
use depsweep_project::{manifest_source_text, ArchiveTree};
use depsweep_protocol::{
    ConsoleRequest, ConsoleResponse, ModuleDoc, PackageManifest, PackageName, TransportError,
    Version,
};
use depsweep_registry::RegistryClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Pacing delay inserted before each scheduled dispatch; combined with
/// single-flight scheduling this caps outbound registry load.
pub const DISPATCH_PACING: Duration = Duration::from_millis(200);

/// Everything the actor loop consumes. External I/O completions arrive as
/// messages so that all state mutation happens on one task.
#[derive(Debug)]
pub enum Msg {
    /// Ask the registry for packages published since the current cursor.
    PollRegistry,
    PollCompleted {
        result: Result<Vec<(PackageName, Version)>, TransportError>,
    },
    MetaFetched {
        name: PackageName,
        version: Version,
        result: Result<(PackageManifest, Vec<ModuleDoc>), TransportError>,
    },
    ArchiveFetched {
        name: PackageName,
        version: Version,
        result: Result<Vec<u8>, TransportError>,
    },
    PullRequestSettled {
        name: PackageName,
        version: Version,
        result: Result<String, PrFailure>,
    },
    Command {
        session: Uuid,
        request: ConsoleRequest,
    },
    ClientConnected {
        session: Uuid,
        sender: mpsc::UnboundedSender<ConsoleResponse>,
    },
    ClientDisconnected {
        session: Uuid,
    },
}

/// Operator-facing configuration the actor needs at runtime.
#[derive(Clone)]
pub struct BackendSettings {
    pub operator_secret: String,
    pub package_offset: u64,
    pub ignore: Vec<PackageName>,
    pub abort_on_tag_mismatch: bool,
    pub pacing: Duration,
}

/// The actor. Owns [`BackendState`] exclusively; see the crate docs for the
/// concurrency model.
pub struct Backend {
    state: BackendState,
    clients: ClientRegistry,
    registry: Arc<dyn RegistryClient>,
    hosting: Arc<dyn HostingClient>,
    settings: BackendSettings,
    tx: mpsc::UnboundedSender<Msg>,
    /// One outstanding fetch/analyze dispatch at a time. Pull requests are
    /// operator-initiated and may overlap.
    in_flight: bool,
}

impl Backend {
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        hosting: Arc<dyn HostingClient>,
        settings: BackendSettings,
        tx: mpsc::UnboundedSender<Msg>,
    ) -> Self {
        Self {
            state: BackendState::new(),
            clients: ClientRegistry::new(),
            registry,
            hosting,
            settings,
            tx,
            in_flight: false,
        }
    }

    pub fn state(&self) -> &BackendState {
        &self.state
    }

    /// Consume messages until every sender is gone.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Msg>) {
        while let Some(msg) = rx.recv().await {
            self.handle(msg);
        }
        log::info!("backend actor stopped");
    }

    pub fn handle(&mut self, msg: Msg) {
        match msg {
            Msg::PollRegistry => self.poll_registry(),
            Msg::PollCompleted { result } => self.on_poll_completed(result),
            Msg::MetaFetched {
                name,
                version,
                result,
            } => self.on_meta_fetched(name, version, result),
            Msg::ArchiveFetched {
                name,
                version,
                result,
            } => self.on_archive_fetched(name, version, result),
            Msg::PullRequestSettled {
                name,
                version,
                result,
            } => self.on_pull_request_settled(name, version, result),
            Msg::Command { session, request } => self.on_command(session, request),
            Msg::ClientConnected { session, sender } => self.clients.connect(session, sender),
            Msg::ClientDisconnected { session } => self.clients.disconnect(session),
        }
    }

    fn poll_registry(&mut self) {
        let cursor = self.settings.package_offset + self.state.cache.total_versions() as u64;
        let registry = Arc::clone(&self.registry);
        let tx = self.tx.clone();
        log::info!("polling registry from cursor {cursor}");
        tokio::spawn(async move {
            let result = registry.since(cursor).await;
            let _ = tx.send(Msg::PollCompleted { result });
        });
    }

    fn on_poll_completed(
        &mut self,
        result: Result<Vec<(PackageName, Version)>, TransportError>,
    ) {
        match result {
            Ok(announced) => {
                let mut inserted = 0usize;
                for (name, version) in announced {
                    if self.state.insert_pending(name, version) {
                        inserted += 1;
                    }
                }
                if inserted > 0 {
                    log::info!("registry poll: {inserted} new package versions");
                }
                self.maybe_dispatch();
            }
            Err(error) => log::warn!("registry poll failed: {error}"),
        }
    }

    fn on_meta_fetched(
        &mut self,
        name: PackageName,
        version: Version,
        result: Result<(PackageManifest, Vec<ModuleDoc>), TransportError>,
    ) {
        self.in_flight = false;
        if self.state.complete_metadata_fetch(&name, version, result) {
            self.clients.broadcast_record(&self.state, &name, version);
        }
        self.maybe_dispatch();
    }

    fn on_archive_fetched(
        &mut self,
        name: PackageName,
        version: Version,
        result: Result<Vec<u8>, TransportError>,
    ) {
        self.in_flight = false;
        let outcome = self.review(&name, version, result);
        if self.state.complete_check(&name, version, outcome) {
            self.clients.broadcast_record(&self.state, &name, version);
        }
        self.maybe_dispatch();
    }

    /// Classify the archive fetch and, when it produced bytes, run assembly
    /// and the rule synchronously. Both are pure so they stay on the actor
    /// task.
    fn review(
        &self,
        name: &PackageName,
        version: Version,
        result: Result<Vec<u8>, TransportError>,
    ) -> ReviewOutcome {
        let bytes = match result {
            Err(error) if error.is_not_found() => return ReviewOutcome::TagNotFound,
            Err(error) => return ReviewOutcome::TransportError(error),
            Ok(bytes) => bytes,
        };
        let tree = match ArchiveTree::open(&bytes) {
            Err(error) => {
                log::warn!("{name}@{version}: {error}");
                return ReviewOutcome::CouldNotOpenArchive;
            }
            Ok(tree) => tree,
        };
        let Some(PackageRecord::Fetched(data)) = self.state.cache.get(name, version) else {
            // Single-flight scheduling should make this unreachable; the
            // archive stays unclassified rather than panicking.
            log::warn!("{name}@{version}: archive arrived for a record not in Fetched");
            return ReviewOutcome::CouldNotOpenArchive;
        };

        let (text, manifest) = manifest_source_text(&tree, &data.manifest);
        let engine = UnusedDependenciesRule;
        let driver = AnalysisDriver::new(&engine, &tree, &self.state.cache);
        ReviewOutcome::RuleRun(driver.analyze(&manifest, &text))
    }

    fn on_pull_request_settled(
        &mut self,
        name: PackageName,
        version: Version,
        result: Result<String, PrFailure>,
    ) {
        let result = result.map_err(|failure| (failure.stage, failure.error));
        if self.state.complete_pull_request(&name, version, result) {
            self.clients.broadcast_record(&self.state, &name, version);
        }
    }

    fn on_command(&mut self, session: Uuid, request: ConsoleRequest) {
        if let ConsoleRequest::LoginRequest { password } = &request {
            if constant_time_eq(password.as_bytes(), self.settings.operator_secret.as_bytes()) {
                self.clients
                    .authenticate(session, &self.state, &self.settings.ignore);
            } else {
                log::warn!("console session {session}: failed login attempt");
            }
            return;
        }
        if !self.clients.is_authenticated(session) {
            log::debug!("console session {session}: ignoring command before login");
            return;
        }

        match request {
            ConsoleRequest::LoginRequest { .. } => unreachable!("handled above"),
            ConsoleRequest::ResetBackend => {
                log::info!("operator reset: clearing state and re-polling");
                self.state.reset();
                self.in_flight = false;
                self.clients
                    .broadcast_snapshot(&self.state, &self.settings.ignore);
                self.poll_registry();
            }
            ConsoleRequest::ResetRules => {
                let downgraded = self.state.reset_rules();
                log::info!("operator reset-rules: {} records downgraded", downgraded.len());
                self.clients.broadcast_records(&self.state, &downgraded);
                self.maybe_dispatch();
            }
            ConsoleRequest::PullRequestRequest { name } => self.start_pull_request(name),
            ConsoleRequest::RerunPackageRequest { name, version } => {
                if self.state.rerun(&name, version) {
                    self.clients.broadcast_record(&self.state, &name, version);
                    self.maybe_dispatch();
                } else {
                    log::warn!("{name}@{version}: rerun requested for a record not analyzed");
                }
            }
        }
    }

    fn start_pull_request(&mut self, name: PackageName) {
        // Highest version holding a FoundErrors outcome (or a failed PR to
        // retry).
        let candidate = self
            .state
            .cache
            .versions(&name)
            .into_iter()
            .flatten()
            .filter(|(_, record)| match record {
                PackageRecord::FetchedAndChecked(data) => data.extra.found_errors().is_some(),
                PackageRecord::PullRequestFailed(_) => true,
                _ => false,
            })
            .map(|(version, _)| *version)
            .max();
        let Some(version) = candidate else {
            log::warn!("{name}: pull request requested but no record carries fixable errors");
            return;
        };
        let Some(found) = self.state.begin_pull_request(&name, version) else {
            return;
        };
        self.clients.broadcast_record(&self.state, &name, version);

        let input = PullRequestInput {
            upstream: name.clone(),
            version,
            old_manifest_text: found.old_manifest_text,
            new_manifest_text: found.new_manifest_text,
            error_count: found.errors.len(),
            abort_on_tag_mismatch: self.settings.abort_on_tag_mismatch,
        };
        let hosting = Arc::clone(&self.hosting);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = open_unused_dependencies_pull_request(hosting.as_ref(), &input).await;
            let _ = tx.send(Msg::PullRequestSettled {
                name,
                version,
                result,
            });
        });
    }

    /// Re-entered after every mutation that can change the work frontier.
    fn maybe_dispatch(&mut self) {
        if self.in_flight {
            return;
        }
        let Some(work) = select_next(&self.state.cache, &self.settings.ignore) else {
            return;
        };
        self.in_flight = true;
        let pacing = self.settings.pacing;
        let tx = self.tx.clone();
        match work {
            WorkItem::FetchMetadata { name, version } => {
                let registry = Arc::clone(&self.registry);
                tokio::spawn(async move {
                    tokio::time::sleep(pacing).await;
                    let result = async {
                        let manifest = registry.manifest(&name, version).await?;
                        let docs = registry.docs(&name, version).await?;
                        Ok::<_, TransportError>((manifest, docs))
                    }
                    .await;
                    let _ = tx.send(Msg::MetaFetched {
                        name,
                        version,
                        result,
                    });
                });
            }
            WorkItem::Analyze { name, version, .. } => {
                let hosting = Arc::clone(&self.hosting);
                tokio::spawn(async move {
                    tokio::time::sleep(pacing).await;
                    let result = hosting.archive_at_tag(&name, &version.tag()).await;
                    let _ = tx.send(Msg::ArchiveFetched {
                        name,
                        version,
                        result,
                    });
                });
            }
        }
    }
}

/// Compare the operator secret without early exit, so response timing does
/// not leak how much of the password matched.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let mut diff = a.len() ^ b.len();
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= (x ^ y) as usize;
    }
    diff == 0
}
