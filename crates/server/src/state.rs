use crate::cache::PackageCache;
use crate::record::{
    FetchFailedData, FetchedData, FoundErrorsPayload, PackageRecord, PendingData, PrFailed,
    PrPending, PrSent, ReviewOutcome,
};
use depsweep_protocol::{ModuleDoc, PackageManifest, PackageName, TransportError, Version};

/// All mutable backend state. The actor task is the only owner; every
/// handler takes `&mut BackendState` and stamps its mutations with a fresh
/// update index, so broadcast deltas are totally ordered.
#[derive(Debug, Default)]
pub struct BackendState {
    pub cache: PackageCache,
    update_index: u64,
    insert_counter: u64,
}

impl BackendState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_index(&self) -> u64 {
        self.update_index
    }

    fn next_index(&mut self) -> u64 {
        self.update_index += 1;
        self.update_index
    }

    /// Seed a freshly announced (name, version) as `Pending`. Returns false
    /// when the pair was already known; nothing is stamped in that case.
    pub fn insert_pending(&mut self, name: PackageName, version: Version) -> bool {
        // Stamp first, roll back on duplicate: the cache decides presence.
        let update_index = self.next_index();
        let inserted_at = self.insert_counter;
        let record = PackageRecord::Pending(PendingData {
            version,
            inserted_at,
            update_index,
        });
        let inserted = self.cache.insert_if_absent(name, version, record);
        if inserted {
            self.insert_counter += 1;
        } else {
            self.update_index -= 1;
        }
        inserted
    }

    /// Metadata fetch settled: `Pending` advances to `Fetched` or
    /// `FetchMetaFailed`.
    pub fn complete_metadata_fetch(
        &mut self,
        name: &PackageName,
        version: Version,
        result: Result<(PackageManifest, Vec<ModuleDoc>), TransportError>,
    ) -> bool {
        let Some(PackageRecord::Pending(pending)) = self.cache.get(name, version).cloned() else {
            log::warn!("{name}@{version}: metadata completion for a non-pending record");
            return false;
        };
        let update_index = self.next_index();
        let record = match result {
            Ok((manifest, docs)) => PackageRecord::Fetched(FetchedData {
                inserted_at: pending.inserted_at,
                update_index,
                manifest,
                docs,
                extra: (),
            }),
            Err(error) => PackageRecord::FetchMetaFailed(FetchFailedData {
                version,
                inserted_at: pending.inserted_at,
                update_index,
                error,
            }),
        };
        self.cache.update(name, version, record)
    }

    /// Analysis settled: `Fetched` advances to `FetchedAndChecked`.
    pub fn complete_check(
        &mut self,
        name: &PackageName,
        version: Version,
        outcome: ReviewOutcome,
    ) -> bool {
        let Some(PackageRecord::Fetched(fetched)) = self.cache.get(name, version).cloned() else {
            log::warn!("{name}@{version}: check completion for a record not in Fetched");
            return false;
        };
        let update_index = self.next_index();
        let record = PackageRecord::FetchedAndChecked(fetched.advance(update_index, outcome));
        self.cache.update(name, version, record)
    }

    /// Operator asked for a pull request. Valid against `FetchedAndChecked`
    /// with a `FoundErrors` outcome, and against `PullRequestFailed` for a
    /// retry. Returns the payload to hand to the orchestrator.
    pub fn begin_pull_request(
        &mut self,
        name: &PackageName,
        version: Version,
    ) -> Option<FoundErrorsPayload> {
        let record = self.cache.get(name, version).cloned()?;
        let (data, found) = match record {
            PackageRecord::FetchedAndChecked(data) => {
                let found = data.extra.found_errors()?;
                (data.advance(0, ()), found)
            }
            PackageRecord::PullRequestFailed(data) => {
                let found = data.extra.found.clone();
                (data.advance(0, ()), found)
            }
            _ => return None,
        };
        let update_index = self.next_index();
        let record = PackageRecord::PullRequestPending(data.advance(
            update_index,
            PrPending {
                found: found.clone(),
            },
        ));
        self.cache.update(name, version, record);
        Some(found)
    }

    /// The orchestration settled: `PullRequestPending` advances to sent or
    /// failed, keeping the found-errors payload either way.
    pub fn complete_pull_request(
        &mut self,
        name: &PackageName,
        version: Version,
        result: Result<String, (String, TransportError)>,
    ) -> bool {
        let Some(PackageRecord::PullRequestPending(data)) = self.cache.get(name, version).cloned()
        else {
            log::warn!("{name}@{version}: pull-request completion without a pending request");
            return false;
        };
        let update_index = self.next_index();
        let found = data.extra.found.clone();
        let data = data.advance(0, ());
        let record = match result {
            Ok(url) => {
                PackageRecord::PullRequestSent(data.advance(update_index, PrSent { found, url }))
            }
            Err((stage, error)) => PackageRecord::PullRequestFailed(data.advance(
                update_index,
                PrFailed {
                    found,
                    stage,
                    error,
                },
            )),
        };
        self.cache.update(name, version, record)
    }

    /// `ResetRules`: every analyzed record goes back to `Fetched` (metadata
    /// preserved) and every metadata failure back to `Pending`; PR states
    /// are left alone. Returns the downgraded pairs for broadcasting.
    pub fn reset_rules(&mut self) -> Vec<(PackageName, Version)> {
        let mut downgraded = Vec::new();
        // Two passes so the index stamping can borrow `self` mutably
        // without fighting the cache iterator.
        let targets: Vec<(PackageName, Version)> = self
            .cache
            .iter()
            .flat_map(|(name, versions)| {
                versions.iter().filter_map(move |(version, record)| {
                    matches!(
                        record,
                        PackageRecord::FetchedAndChecked(_) | PackageRecord::FetchMetaFailed(_)
                    )
                    .then(|| (name.clone(), *version))
                })
            })
            .collect();

        for (name, version) in targets {
            let Some(record) = self.cache.get(&name, version).cloned() else {
                continue;
            };
            let update_index = self.next_index();
            let next = match record {
                PackageRecord::FetchedAndChecked(data) => {
                    PackageRecord::Fetched(data.advance(update_index, ()))
                }
                PackageRecord::FetchMetaFailed(data) => PackageRecord::Pending(PendingData {
                    version: data.version,
                    inserted_at: data.inserted_at,
                    update_index,
                }),
                _ => continue,
            };
            self.cache.update(&name, version, next);
            downgraded.push((name, version));
        }
        downgraded
    }

    /// `RerunPackageRequest`: downgrade one analyzed record to `Fetched` so
    /// the scheduler picks it up again.
    pub fn rerun(&mut self, name: &PackageName, version: Version) -> bool {
        let Some(PackageRecord::FetchedAndChecked(data)) = self.cache.get(name, version).cloned()
        else {
            return false;
        };
        let update_index = self.next_index();
        self.cache.update(
            name,
            version,
            PackageRecord::Fetched(data.advance(update_index, ())),
        )
    }

    /// `ResetBackend`: drop everything. The update index keeps counting so
    /// deltas stay totally ordered across the reset.
    pub fn reset(&mut self) {
        self.cache.clear();
        self.insert_counter = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depsweep_analysis::RunResult;
    use depsweep_protocol::ElmJson;

    fn manifest(name: &str, version: &str) -> PackageManifest {
        ElmJson::parse(&format!(
            r#"{{
                "type": "package",
                "name": "{name}",
                "version": "{version}",
                "exposed-modules": [],
                "elm-version": "0.19.0 <= v < 0.20.0",
                "dependencies": {{}},
                "test-dependencies": {{}}
            }}"#
        ))
        .unwrap()
        .into_package()
        .unwrap()
    }

    fn name(raw: &str) -> PackageName {
        raw.parse().unwrap()
    }

    fn version(raw: &str) -> Version {
        raw.parse().unwrap()
    }

    fn found_errors() -> ReviewOutcome {
        ReviewOutcome::RuleRun(RunResult::FoundErrors {
            errors: vec![],
            old_manifest_text: "old".to_string(),
            new_manifest_text: "new".to_string(),
        })
    }

    fn seeded() -> BackendState {
        let mut state = BackendState::new();
        state.insert_pending(name("a/b"), version("1.0.0"));
        assert!(state.complete_metadata_fetch(
            &name("a/b"),
            version("1.0.0"),
            Ok((manifest("a/b", "1.0.0"), vec![])),
        ));
        state
    }

    #[test]
    fn update_index_counts_every_mutation() {
        let mut state = BackendState::new();
        assert_eq!(state.update_index(), 0);
        state.insert_pending(name("a/b"), version("1.0.0"));
        state.insert_pending(name("c/d"), version("2.0.0"));
        assert_eq!(state.update_index(), 2);

        // A duplicate insertion is not a mutation.
        state.insert_pending(name("a/b"), version("1.0.0"));
        assert_eq!(state.update_index(), 2);
    }

    #[test]
    fn check_stamp_is_strictly_greater_than_fetch_stamp() {
        let mut state = seeded();
        let fetched_stamp = state
            .cache
            .get(&name("a/b"), version("1.0.0"))
            .unwrap()
            .update_index();
        state.complete_check(
            &name("a/b"),
            version("1.0.0"),
            ReviewOutcome::RuleRun(RunResult::NoErrors),
        );
        let checked_stamp = state
            .cache
            .get(&name("a/b"), version("1.0.0"))
            .unwrap()
            .update_index();
        assert!(checked_stamp > fetched_stamp);
    }

    #[test]
    fn pull_request_lifecycle_preserves_found_errors() {
        let mut state = seeded();
        state.complete_check(&name("a/b"), version("1.0.0"), found_errors());

        let found = state
            .begin_pull_request(&name("a/b"), version("1.0.0"))
            .expect("found-errors record accepts a PR request");
        assert_eq!(found.new_manifest_text, "new");

        state.complete_pull_request(
            &name("a/b"),
            version("1.0.0"),
            Err(("updateBranch".to_string(), TransportError::BadStatus(422))),
        );
        let Some(PackageRecord::PullRequestFailed(data)) =
            state.cache.get(&name("a/b"), version("1.0.0"))
        else {
            panic!("expected PullRequestFailed");
        };
        assert_eq!(data.extra.stage, "updateBranch");
        assert_eq!(data.extra.found.new_manifest_text, "new");

        // A failed PR can be retried.
        assert!(state
            .begin_pull_request(&name("a/b"), version("1.0.0"))
            .is_some());
        state.complete_pull_request(
            &name("a/b"),
            version("1.0.0"),
            Ok("https://api.github.com/repos/a/b/pulls/1".to_string()),
        );
        let Some(PackageRecord::PullRequestSent(data)) =
            state.cache.get(&name("a/b"), version("1.0.0"))
        else {
            panic!("expected PullRequestSent");
        };
        assert!(data.extra.url.ends_with("/pulls/1"));
    }

    #[test]
    fn pull_request_needs_found_errors() {
        let mut state = seeded();
        state.complete_check(
            &name("a/b"),
            version("1.0.0"),
            ReviewOutcome::RuleRun(RunResult::NoErrors),
        );
        assert!(state
            .begin_pull_request(&name("a/b"), version("1.0.0"))
            .is_none());
    }

    #[test]
    fn reset_rules_downgrades_checked_and_failed_records() {
        let mut state = seeded();
        state.complete_check(
            &name("a/b"),
            version("1.0.0"),
            ReviewOutcome::RuleRun(RunResult::NoErrors),
        );
        state.insert_pending(name("c/d"), version("1.0.0"));
        state.complete_metadata_fetch(
            &name("c/d"),
            version("1.0.0"),
            Err(TransportError::BadStatus(500)),
        );

        let downgraded = state.reset_rules();
        assert_eq!(downgraded.len(), 2);
        assert!(matches!(
            state.cache.get(&name("a/b"), version("1.0.0")),
            Some(PackageRecord::Fetched(_))
        ));
        assert!(matches!(
            state.cache.get(&name("c/d"), version("1.0.0")),
            Some(PackageRecord::Pending(_))
        ));
    }

    #[test]
    fn reset_rules_leaves_pr_states_alone() {
        let mut state = seeded();
        state.complete_check(&name("a/b"), version("1.0.0"), found_errors());
        state.begin_pull_request(&name("a/b"), version("1.0.0"));

        assert!(state.reset_rules().is_empty());
        assert!(matches!(
            state.cache.get(&name("a/b"), version("1.0.0")),
            Some(PackageRecord::PullRequestPending(_))
        ));
    }
}
