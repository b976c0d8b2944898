use crate::client::{ForkIdentity, HostingClient, RepoInfo};
use async_trait::async_trait;
use depsweep_protocol::{PackageName, TransportError};
use serde::Deserialize;
use serde_json::json;

const DEFAULT_API_URL: &str = "https://api.github.com";
const DEFAULT_ARCHIVE_URL: &str = "https://github.com";
const USER_AGENT: &str = concat!("depsweep/", env!("CARGO_PKG_VERSION"));

/// GitHub REST implementation of [`HostingClient`].
#[derive(Clone)]
pub struct HttpHosting {
    client: reqwest::Client,
    api_url: String,
    archive_url: String,
    token: String,
}

#[derive(Deserialize)]
struct RepoInfoResponse {
    default_branch: String,
}

#[derive(Deserialize)]
struct RefResponse {
    object: RefObject,
}

#[derive(Deserialize)]
struct RefObject {
    sha: String,
}

#[derive(Deserialize)]
struct CommitResponse {
    tree: TreeRef,
}

#[derive(Deserialize)]
struct TreeRef {
    sha: String,
}

#[derive(Deserialize)]
struct ShaResponse {
    sha: String,
}

#[derive(Deserialize)]
struct ForkResponse {
    owner: OwnerLogin,
    name: String,
}

#[derive(Deserialize)]
struct OwnerLogin {
    login: String,
}

#[derive(Deserialize)]
struct PullResponse {
    url: String,
}

impl HttpHosting {
    pub fn new(client: reqwest::Client, token: impl Into<String>) -> Self {
        Self::with_base_urls(client, token, DEFAULT_API_URL, DEFAULT_ARCHIVE_URL)
    }

    /// Point the client at different API and archive hosts (tests).
    pub fn with_base_urls(
        client: reqwest::Client,
        token: impl Into<String>,
        api_url: impl Into<String>,
        archive_url: impl Into<String>,
    ) -> Self {
        let trim = |mut url: String| {
            while url.ends_with('/') {
                url.pop();
            }
            url
        };
        Self {
            client,
            api_url: trim(api_url.into()),
            archive_url: trim(archive_url.into()),
            token: token.into(),
        }
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Authorization", format!("token {}", self.token))
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, TransportError> {
        log::debug!("hosting GET {url}");
        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(to_transport_error)?;
        decode_json(response).await
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        method: reqwest::Method,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T, TransportError> {
        log::debug!("hosting {method} {url}");
        let response = self
            .request(method, url)
            .json(body)
            .send()
            .await
            .map_err(to_transport_error)?;
        decode_json(response).await
    }
}

async fn decode_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, TransportError> {
    let status = response.status();
    if !status.is_success() {
        return Err(TransportError::BadStatus(status.as_u16()));
    }
    let body = response.text().await.map_err(to_transport_error)?;
    serde_json::from_str(&body).map_err(|e| TransportError::BadBody(e.to_string()))
}

#[async_trait]
impl HostingClient for HttpHosting {
    async fn repo_info(&self, name: &PackageName) -> Result<RepoInfo, TransportError> {
        let url = format!("{}/repos/{}/{}", self.api_url, name.owner, name.repo);
        let decoded: RepoInfoResponse = self.get_json(&url).await?;
        Ok(RepoInfo {
            default_branch: decoded.default_branch,
        })
    }

    async fn branch_head_sha(
        &self,
        name: &PackageName,
        branch: &str,
    ) -> Result<String, TransportError> {
        let url = format!(
            "{}/repos/{}/{}/git/refs/heads/{branch}",
            self.api_url, name.owner, name.repo
        );
        let decoded: RefResponse = self.get_json(&url).await?;
        Ok(decoded.object.sha)
    }

    async fn tag_sha(&self, name: &PackageName, tag: &str) -> Result<String, TransportError> {
        let url = format!(
            "{}/repos/{}/{}/git/refs/tags/{tag}",
            self.api_url, name.owner, name.repo
        );
        let decoded: RefResponse = self.get_json(&url).await?;
        Ok(decoded.object.sha)
    }

    async fn commit_tree_sha(
        &self,
        name: &PackageName,
        commit_sha: &str,
    ) -> Result<String, TransportError> {
        let url = format!(
            "{}/repos/{}/{}/git/commits/{commit_sha}",
            self.api_url, name.owner, name.repo
        );
        let decoded: CommitResponse = self.get_json(&url).await?;
        Ok(decoded.tree.sha)
    }

    async fn create_tree(
        &self,
        name: &PackageName,
        base_tree: &str,
        path: &str,
        content: &str,
    ) -> Result<String, TransportError> {
        let url = format!(
            "{}/repos/{}/{}/git/trees",
            self.api_url, name.owner, name.repo
        );
        let body = json!({
            "base_tree": base_tree,
            "tree": [{
                "path": path,
                "mode": "100644",
                "type": "blob",
                "content": content,
            }],
        });
        let decoded: ShaResponse = self
            .send_json(reqwest::Method::POST, &url, &body)
            .await?;
        Ok(decoded.sha)
    }

    async fn create_commit(
        &self,
        name: &PackageName,
        message: &str,
        tree: &str,
        parent: &str,
    ) -> Result<String, TransportError> {
        let url = format!(
            "{}/repos/{}/{}/git/commits",
            self.api_url, name.owner, name.repo
        );
        let body = json!({
            "message": message,
            "tree": tree,
            "parents": [parent],
        });
        let decoded: ShaResponse = self
            .send_json(reqwest::Method::POST, &url, &body)
            .await?;
        Ok(decoded.sha)
    }

    async fn update_branch(
        &self,
        name: &PackageName,
        branch: &str,
        sha: &str,
        force: bool,
    ) -> Result<(), TransportError> {
        let url = format!(
            "{}/repos/{}/{}/git/refs/heads/{branch}",
            self.api_url, name.owner, name.repo
        );
        let body = json!({ "sha": sha, "force": force });
        let _: RefResponse = self
            .send_json(reqwest::Method::PATCH, &url, &body)
            .await?;
        Ok(())
    }

    async fn create_fork(&self, name: &PackageName) -> Result<ForkIdentity, TransportError> {
        let url = format!(
            "{}/repos/{}/{}/forks",
            self.api_url, name.owner, name.repo
        );
        let decoded: ForkResponse = self
            .send_json(reqwest::Method::POST, &url, &json!({}))
            .await?;
        Ok(ForkIdentity {
            owner: decoded.owner.login,
            repo: decoded.name,
        })
    }

    async fn archive_at_tag(
        &self,
        name: &PackageName,
        tag: &str,
    ) -> Result<Vec<u8>, TransportError> {
        // No explicit timeout: archives can be large and slow to stream.
        let url = format!(
            "{}/{}/{}/archive/refs/tags/{tag}.zip",
            self.archive_url, name.owner, name.repo
        );
        log::debug!("hosting GET {url}");
        let response = self
            .request(reqwest::Method::GET, &url)
            .send()
            .await
            .map_err(to_transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::BadStatus(status.as_u16()));
        }
        let bytes = response.bytes().await.map_err(to_transport_error)?;
        Ok(bytes.to_vec())
    }

    async fn open_pull_request(
        &self,
        upstream: &PackageName,
        title: &str,
        head: &str,
        base: &str,
        body: &str,
    ) -> Result<String, TransportError> {
        let url = format!(
            "{}/repos/{}/{}/pulls",
            self.api_url, upstream.owner, upstream.repo
        );
        let payload = json!({
            "title": title,
            "head": head,
            "base": base,
            "body": body,
        });
        let decoded: PullResponse = self
            .send_json(reqwest::Method::POST, &url, &payload)
            .await?;
        Ok(decoded.url)
    }
}

fn to_transport_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_builder() {
        TransportError::BadUrl(err.to_string())
    } else if let Some(status) = err.status() {
        TransportError::BadStatus(status.as_u16())
    } else if err.is_decode() {
        TransportError::BadBody(err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}
