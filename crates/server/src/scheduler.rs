use crate::cache::PackageCache;
use crate::record::PackageRecord;
use depsweep_protocol::{ModuleDoc, PackageManifest, PackageName, Version, RESERVED_OWNER};

/// What the scheduler decided to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkItem {
    /// A `Pending` record needs its manifest and docs.
    FetchMetadata { name: PackageName, version: Version },
    /// A `Fetched` record is the latest of its package and gets analyzed.
    /// Manifest and docs are cloned at selection time so the spawned task
    /// never reaches back into the cache.
    Analyze {
        name: PackageName,
        version: Version,
        manifest: PackageManifest,
        docs: Vec<ModuleDoc>,
    },
}

/// The work-selection policy, deterministic over cache iteration order:
///
/// 1. the first `Pending` record anywhere, else
/// 2. the first `Fetched` record that is not under the reserved ecosystem
///    owner, not on the operator's ignore list, and the latest known
///    version of its package, else
/// 3. nothing.
pub fn select_next(cache: &PackageCache, ignore: &[PackageName]) -> Option<WorkItem> {
    for (name, versions) in cache.iter() {
        for (version, record) in versions {
            if let PackageRecord::Pending(_) = record {
                return Some(WorkItem::FetchMetadata {
                    name: name.clone(),
                    version: *version,
                });
            }
        }
    }

    for (name, versions) in cache.iter() {
        if name.has_reserved_owner(RESERVED_OWNER) || ignore.contains(name) {
            continue;
        }
        for (version, record) in versions {
            let PackageRecord::Fetched(data) = record else {
                continue;
            };
            if !cache.is_latest_known(name, *version) {
                continue;
            }
            return Some(WorkItem::Analyze {
                name: name.clone(),
                version: *version,
                manifest: data.manifest.clone(),
                docs: data.docs.clone(),
            });
        }
    }

    None
}
