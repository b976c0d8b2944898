use depsweep_analysis::RunResult;
use depsweep_protocol::{
    Diagnostic, ModuleDoc, PackageManifest, StatusProjection, TransportError, Version,
    VersionStatus,
};

/// Lifecycle state of one observed package version.
///
/// The sum is closed and the payloads are composed rather than shared:
/// every post-fetch state embeds [`FetchedData`] parameterized over what
/// the stage added. Transitions are monotonic down the variant list except
/// that a failed pull request may be retried (`PullRequestFailed` back to
/// `PullRequestPending`).
#[derive(Debug, Clone, PartialEq)]
pub enum PackageRecord {
    Pending(PendingData),
    Fetched(FetchedData<()>),
    FetchedAndChecked(FetchedData<ReviewOutcome>),
    PullRequestPending(FetchedData<PrPending>),
    PullRequestSent(FetchedData<PrSent>),
    PullRequestFailed(FetchedData<PrFailed>),
    FetchMetaFailed(FetchFailedData),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingData {
    pub version: Version,
    pub inserted_at: u64,
    pub update_index: u64,
}

/// Shared payload of every state that holds fetched metadata; `extra` is
/// whatever the later stages added.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedData<Extra> {
    pub inserted_at: u64,
    pub update_index: u64,
    pub manifest: PackageManifest,
    pub docs: Vec<ModuleDoc>,
    pub extra: Extra,
}

impl<Extra> FetchedData<Extra> {
    /// Same metadata, different stage payload.
    pub fn advance<Next>(self, update_index: u64, extra: Next) -> FetchedData<Next> {
        FetchedData {
            inserted_at: self.inserted_at,
            update_index,
            manifest: self.manifest,
            docs: self.docs,
            extra,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchFailedData {
    pub version: Version,
    pub inserted_at: u64,
    pub update_index: u64,
    pub error: TransportError,
}

/// What the analysis stage concluded for a record.
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewOutcome {
    CouldNotOpenArchive,
    TagNotFound,
    TransportError(TransportError),
    RuleRun(RunResult),
}

impl ReviewOutcome {
    pub fn summary(&self) -> String {
        match self {
            Self::CouldNotOpenArchive => "could not open archive".to_string(),
            Self::TagNotFound => "tag not found".to_string(),
            Self::TransportError(error) => format!("transport error: {error}"),
            Self::RuleRun(result) => result.summary(),
        }
    }

    /// The payload a pull request is built from, when there is one.
    pub fn found_errors(&self) -> Option<FoundErrorsPayload> {
        match self {
            Self::RuleRun(RunResult::FoundErrors {
                errors,
                old_manifest_text,
                new_manifest_text,
            }) => Some(FoundErrorsPayload {
                errors: errors.clone(),
                old_manifest_text: old_manifest_text.clone(),
                new_manifest_text: new_manifest_text.clone(),
            }),
            _ => None,
        }
    }
}

/// The errors-plus-texts payload that rides along through the PR states.
#[derive(Debug, Clone, PartialEq)]
pub struct FoundErrorsPayload {
    pub errors: Vec<Diagnostic>,
    pub old_manifest_text: String,
    pub new_manifest_text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrPending {
    pub found: FoundErrorsPayload,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrSent {
    pub found: FoundErrorsPayload,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrFailed {
    pub found: FoundErrorsPayload,
    pub stage: String,
    pub error: TransportError,
}

impl PackageRecord {
    pub fn update_index(&self) -> u64 {
        match self {
            Self::Pending(data) => data.update_index,
            Self::Fetched(data) => data.update_index,
            Self::FetchedAndChecked(data) => data.update_index,
            Self::PullRequestPending(data) => data.update_index,
            Self::PullRequestSent(data) => data.update_index,
            Self::PullRequestFailed(data) => data.update_index,
            Self::FetchMetaFailed(data) => data.update_index,
        }
    }

    /// Manifest and docs, when the record holds usable metadata. Fetch
    /// failures and still-pending records have none.
    pub fn usable_meta(&self) -> Option<(&PackageManifest, &[ModuleDoc])> {
        match self {
            Self::Fetched(data) => Some((&data.manifest, &data.docs)),
            Self::FetchedAndChecked(data) => Some((&data.manifest, &data.docs)),
            Self::PullRequestPending(data) => Some((&data.manifest, &data.docs)),
            Self::PullRequestSent(data) => Some((&data.manifest, &data.docs)),
            Self::PullRequestFailed(data) => Some((&data.manifest, &data.docs)),
            Self::Pending(_) | Self::FetchMetaFailed(_) => None,
        }
    }

    /// The display projection, or `None` for records clients never see.
    pub fn project(&self, version: Version) -> Option<VersionStatus> {
        let status = match self {
            Self::Pending(_) => return None,
            Self::Fetched(_) => StatusProjection::Fetched,
            Self::FetchedAndChecked(data) => StatusProjection::Checked {
                outcome: data.extra.summary(),
            },
            Self::PullRequestPending(_) => StatusProjection::PullRequestPending,
            Self::PullRequestSent(data) => StatusProjection::PullRequestSent {
                url: data.extra.url.clone(),
            },
            Self::PullRequestFailed(data) => StatusProjection::PullRequestFailed {
                stage: data.extra.stage.clone(),
                error: data.extra.error.clone(),
            },
            Self::FetchMetaFailed(data) => StatusProjection::MetaFailed {
                error: data.error.clone(),
            },
        };
        Some(VersionStatus {
            version,
            update_index: self.update_index(),
            status,
        })
    }
}
