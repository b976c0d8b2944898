use crate::name::PackageName;
use crate::transport::TransportError;
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-package status rows keyed by package name, used both for the initial
/// snapshot and for incremental deltas.
pub type StatusMap = BTreeMap<PackageName, Vec<VersionStatus>>;

/// Commands an operator session may send.
///
/// Everything except `LoginRequest` is a no-op on unauthenticated sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ConsoleRequest {
    ResetBackend,
    ResetRules,
    #[serde(rename_all = "camelCase")]
    LoginRequest { password: String },
    #[serde(rename_all = "camelCase")]
    PullRequestRequest { name: PackageName },
    #[serde(rename_all = "camelCase")]
    RerunPackageRequest { name: PackageName, version: Version },
}

/// Messages pushed to an operator session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ConsoleResponse {
    #[serde(rename_all = "camelCase")]
    Updates { delta: StatusMap },
    #[serde(rename_all = "camelCase")]
    FirstUpdate {
        snapshot: StatusMap,
        ignore_list: Vec<PackageName>,
    },
}

/// One package-version row as projected for display. Raw manifests and doc
/// summaries never cross the console boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionStatus {
    pub version: Version,
    pub update_index: u64,
    pub status: StatusProjection,
}

/// The display sum over record states. `Pending` records are deliberately
/// absent: clients only see a package once its metadata is in hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum StatusProjection {
    Fetched,
    #[serde(rename_all = "camelCase")]
    Checked { outcome: String },
    #[serde(rename_all = "camelCase")]
    MetaFailed { error: TransportError },
    PullRequestPending,
    #[serde(rename_all = "camelCase")]
    PullRequestSent { url: String },
    #[serde(rename_all = "camelCase")]
    PullRequestFailed {
        stage: String,
        error: TransportError,
    },
}
