use crate::client::HostingClient;
use depsweep_protocol::{ElmJson, PackageName, TransportError, Version};

const PR_TITLE: &str = "Remove unused dependencies";

/// A failure during the pull-request sequence: which step broke, and the
/// transport error it surfaced. The originally-found errors stay on the
/// record so the operator can retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrFailure {
    pub stage: String,
    pub error: TransportError,
}

impl PrFailure {
    fn at(stage: &str, error: TransportError) -> Self {
        Self {
            stage: stage.to_string(),
            error,
        }
    }
}

/// What the orchestrator needs from a `FoundErrors` outcome.
#[derive(Debug, Clone)]
pub struct PullRequestInput {
    pub upstream: PackageName,
    pub version: Version,
    pub old_manifest_text: String,
    pub new_manifest_text: String,
    pub error_count: usize,
    /// When set, a default-branch head that no longer matches the released
    /// tag aborts the sequence instead of being logged.
    pub abort_on_tag_mismatch: bool,
}

/// Drive the full fork → branch → commit → PR sequence. Returns the opened
/// pull request's URL.
pub async fn open_unused_dependencies_pull_request(
    client: &dyn HostingClient,
    input: &PullRequestInput,
) -> Result<String, PrFailure> {
    let upstream = &input.upstream;

    let info = client
        .repo_info(upstream)
        .await
        .map_err(|error| PrFailure::at("repoInfo", error))?;
    let branch = info.default_branch;

    // The released tag and the branch head can drift apart when the
    // maintainer kept committing after publishing. The manifest we patch
    // came from the tag, so flag the drift; whether it aborts is operator
    // configuration.
    let head = client
        .branch_head_sha(upstream, &branch)
        .await
        .map_err(|error| PrFailure::at("tagGuard", error))?;
    let tag = client
        .tag_sha(upstream, &input.version.tag())
        .await
        .map_err(|error| PrFailure::at("tagGuard", error))?;
    if head != tag {
        log::warn!(
            "{upstream}: default branch {branch} is at {head} but tag {} is at {tag}",
            input.version.tag()
        );
        if input.abort_on_tag_mismatch {
            return Err(PrFailure {
                stage: "tagGuard".to_string(),
                error: TransportError::BadBody(format!(
                    "default branch head {head} does not match tag {tag}"
                )),
            });
        }
    }

    let fork = client
        .create_fork(upstream)
        .await
        .map_err(|error| PrFailure::at("fork", error))?;
    let fork_name = fork.as_name();

    let fork_head = client
        .branch_head_sha(&fork_name, &branch)
        .await
        .map_err(|error| PrFailure::at("branchHead", error))?;

    let base_tree = client
        .commit_tree_sha(&fork_name, &fork_head)
        .await
        .map_err(|error| PrFailure::at("commit", error))?;

    let new_tree = client
        .create_tree(
            &fork_name,
            &base_tree,
            depsweep_protocol::MANIFEST_PATH,
            &input.new_manifest_text,
        )
        .await
        .map_err(|error| PrFailure::at("createTree", error))?;

    let new_commit = client
        .create_commit(&fork_name, PR_TITLE, &new_tree, &fork_head)
        .await
        .map_err(|error| PrFailure::at("createCommit", error))?;

    client
        .update_branch(&fork_name, &branch, &new_commit, false)
        .await
        .map_err(|error| PrFailure::at("updateBranch", error))?;

    let body = pull_request_body(input);
    let head_ref = format!("{}:{branch}", fork.owner);
    let url = client
        .open_pull_request(upstream, PR_TITLE, &head_ref, &branch, &body)
        .await
        .map_err(|error| PrFailure::at("openPullRequest", error))?;

    log::info!("{upstream}: opened pull request {url}");
    Ok(url)
}

/// The templated PR body. Wording varies on whether one or several entries
/// were removed, and whether everything removed was a test dependency
/// (in which case the published package is unaffected and no release is
/// needed).
fn pull_request_body(input: &PullRequestInput) -> String {
    let (removed_direct, _removed_test) =
        removed_dependencies(&input.old_manifest_text, &input.new_manifest_text);
    let all_test_only = removed_direct.is_empty();

    let opening = if input.error_count == 1 {
        "This automated pull request removes a dependency that is declared in \
         `elm.json` but whose modules are never imported by the package."
    } else {
        "This automated pull request removes dependencies that are declared in \
         `elm.json` but whose modules are never imported by the package."
    };

    let release_note = if all_test_only {
        "Only test dependencies are affected, so the published package is \
         unchanged and there is no need to publish a new release."
    } else {
        "Removing these entries means fewer packages for your users to \
         download, so publishing a new release with this change is worthwhile."
    };

    format!(
        "Hello :wave:,\n\n{opening}\n\n{release_note}\n\nIf a removed entry is \
         actually needed (for example it is used through a mechanism the \
         import scan cannot see), feel free to close this pull request.\n"
    )
}

/// Dependency names present in `old` but not in `new`, split into
/// (direct, test). Unparsable texts yield empty lists.
pub(crate) fn removed_dependencies(old: &str, new: &str) -> (Vec<PackageName>, Vec<PackageName>) {
    let parse = |text: &str| ElmJson::parse(text).ok().and_then(ElmJson::into_package);
    let (Some(old), Some(new)) = (parse(old), parse(new)) else {
        return (Vec::new(), Vec::new());
    };
    let direct = old
        .dependencies
        .keys()
        .filter(|name| !new.dependencies.contains_key(*name))
        .cloned()
        .collect();
    let test = old
        .test_dependencies
        .keys()
        .filter(|name| !new.test_dependencies.contains_key(*name))
        .cloned()
        .collect();
    (direct, test)
}
