use crate::decode::{decode_manifest, decode_module_docs, decode_since_list};
use crate::RegistryClient;
use async_trait::async_trait;
use depsweep_protocol::{ModuleDoc, PackageManifest, PackageName, TransportError, Version};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://package.elm-lang.org";

// Metadata payloads are small; a stuck fetch should fail the record and let
// the scheduler move on rather than wedge the single-flight pipeline.
const METADATA_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP implementation of [`RegistryClient`] against the live registry.
#[derive(Clone)]
pub struct HttpRegistry {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRegistry {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, DEFAULT_BASE_URL)
    }

    /// Point the client at a different registry root (tests, mirrors).
    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { client, base_url }
    }

    async fn fetch_text(&self, url: &str) -> Result<String, TransportError> {
        log::debug!("registry GET {url}");
        let response = self
            .client
            .get(url)
            .timeout(METADATA_TIMEOUT)
            .send()
            .await
            .map_err(to_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::BadStatus(status.as_u16()));
        }
        response.text().await.map_err(to_transport_error)
    }
}

#[async_trait]
impl RegistryClient for HttpRegistry {
    async fn since(&self, cursor: u64) -> Result<Vec<(PackageName, Version)>, TransportError> {
        let url = format!("{}/all-packages/since/{cursor}", self.base_url);
        let body = self.fetch_text(&url).await?;
        decode_since_list(&body)
    }

    async fn manifest(
        &self,
        name: &PackageName,
        version: Version,
    ) -> Result<PackageManifest, TransportError> {
        let url = format!(
            "{}/packages/{}/{}/{version}/elm.json",
            self.base_url, name.owner, name.repo
        );
        let body = self.fetch_text(&url).await?;
        decode_manifest(&body)
    }

    async fn docs(
        &self,
        name: &PackageName,
        version: Version,
    ) -> Result<Vec<ModuleDoc>, TransportError> {
        let url = format!(
            "{}/packages/{}/{}/{version}/docs.json",
            self.base_url, name.owner, name.repo
        );
        let body = self.fetch_text(&url).await?;
        decode_module_docs(&body)
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
