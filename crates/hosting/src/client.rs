use async_trait::async_trait;
use depsweep_protocol::{PackageName, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoInfo {
    pub default_branch: String,
}

/// A fork created under the bot's identity. `owner` differs from the
/// upstream owner; `repo` usually matches but GitHub may rename on
/// collision, so both come from the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkIdentity {
    pub owner: String,
    pub repo: String,
}

impl ForkIdentity {
    pub fn as_name(&self) -> PackageName {
        PackageName::new(self.owner.clone(), self.repo.clone())
    }
}

/// Everything the pipeline needs from the hosting platform: the archive
/// download for analysis and the Git data calls for the PR sequence.
#[async_trait]
pub trait HostingClient: Send + Sync {
    /// Repository metadata; we only consume the default branch name.
    async fn repo_info(&self, name: &PackageName) -> Result<RepoInfo, TransportError>;

    /// Head commit SHA of a branch.
    async fn branch_head_sha(
        &self,
        name: &PackageName,
        branch: &str,
    ) -> Result<String, TransportError>;

    /// Commit SHA a tag points at.
    async fn tag_sha(&self, name: &PackageName, tag: &str) -> Result<String, TransportError>;

    /// The tree SHA of a commit.
    async fn commit_tree_sha(
        &self,
        name: &PackageName,
        commit_sha: &str,
    ) -> Result<String, TransportError>;

    /// Create a tree replacing one blob, parented at `base_tree`.
    /// Returns the new tree's SHA.
    async fn create_tree(
        &self,
        name: &PackageName,
        base_tree: &str,
        path: &str,
        content: &str,
    ) -> Result<String, TransportError>;

    /// Create a commit; returns its SHA.
    async fn create_commit(
        &self,
        name: &PackageName,
        message: &str,
        tree: &str,
        parent: &str,
    ) -> Result<String, TransportError>;

    /// Point `branch` at `sha`.
    async fn update_branch(
        &self,
        name: &PackageName,
        branch: &str,
        sha: &str,
        force: bool,
    ) -> Result<(), TransportError>;

    /// Fork the repository under the bot's identity.
    async fn create_fork(&self, name: &PackageName) -> Result<ForkIdentity, TransportError>;

    /// Source archive for a tag, as opaque bytes.
    async fn archive_at_tag(
        &self,
        name: &PackageName,
        tag: &str,
    ) -> Result<Vec<u8>, TransportError>;

    /// Open a pull request against `upstream`; returns the PR's `url`.
    async fn open_pull_request(
        &self,
        upstream: &PackageName,
        title: &str,
        head: &str,
        base: &str,
        body: &str,
    ) -> Result<String, TransportError>;
}
