//! Client for the public Elm package registry.
//!
//! Two concerns live here: decoding the registry's wire payloads (pure,
//! heavily unit-tested) and the HTTP client that fetches them. The server
//! crate only ever talks to the [`RegistryClient`] trait so that scheduler
//! tests can run against an in-memory fake.

mod decode;
mod http;

pub use decode::{decode_manifest, decode_module_docs, decode_since_list};
pub use http::HttpRegistry;

use async_trait::async_trait;
use depsweep_protocol::{ModuleDoc, PackageManifest, PackageName, TransportError, Version};

/// What the metadata fetcher needs from the registry.
///
/// Every failure is a [`TransportError`]: decode problems surface as
/// `BadBody` so that a record's `FetchMetaFailed` state carries one uniform
/// payload regardless of where the fetch went wrong.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Packages published after the `cursor`-th known entry, newest first.
    async fn since(&self, cursor: u64) -> Result<Vec<(PackageName, Version)>, TransportError>;

    /// The package's `elm.json`, which must be library-typed.
    async fn manifest(
        &self,
        name: &PackageName,
        version: Version,
    ) -> Result<PackageManifest, TransportError>;

    /// The package's per-module documentation summaries, comments stripped.
    async fn docs(
        &self,
        name: &PackageName,
        version: Version,
    ) -> Result<Vec<ModuleDoc>, TransportError>;
}
