use crate::record::PackageRecord;
use depsweep_project::{DependencySource, ResolvedDependency};
use depsweep_protocol::{PackageName, Version, VersionConstraint};

/// The package cache: every observed (name, version) and its lifecycle
/// state, insertion-ordered at both levels.
///
/// Insertion order is load-bearing: the scheduler's "first record in cache
/// iteration order" selection must be deterministic, so the structure is a
/// plain ordered vector rather than a hash map. Lookups are linear, which
/// is fine at registry scale (tens of thousands of names, a handful of
/// versions each) against a scheduler that touches one record per pass.
#[derive(Debug, Clone, Default)]
pub struct PackageCache {
    entries: Vec<(PackageName, Vec<(Version, PackageRecord)>)>,
}

impl PackageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record unless that (name, version) is already known.
    /// Duplicate announcements coalesce on first sight.
    pub fn insert_if_absent(
        &mut self,
        name: PackageName,
        version: Version,
        record: PackageRecord,
    ) -> bool {
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, versions)) => {
                if versions.iter().any(|(v, _)| *v == version) {
                    return false;
                }
                versions.push((version, record));
                true
            }
            None => {
                self.entries.push((name, vec![(version, record)]));
                true
            }
        }
    }

    pub fn get(&self, name: &PackageName, version: Version) -> Option<&PackageRecord> {
        self.versions(name)?
            .iter()
            .find(|(v, _)| *v == version)
            .map(|(_, record)| record)
    }

    /// Replace the record for a known (name, version). Returns false when
    /// the pair was never inserted.
    pub fn update(&mut self, name: &PackageName, version: Version, record: PackageRecord) -> bool {
        let Some((_, versions)) = self.entries.iter_mut().find(|(n, _)| n == name) else {
            return false;
        };
        match versions.iter_mut().find(|(v, _)| *v == version) {
            Some((_, slot)) => {
                *slot = record;
                true
            }
            None => false,
        }
    }

    pub fn versions(&self, name: &PackageName) -> Option<&[(Version, PackageRecord)]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, versions)| versions.as_slice())
    }

    /// All entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&PackageName, &[(Version, PackageRecord)])> {
        self.entries
            .iter()
            .map(|(name, versions)| (name, versions.as_slice()))
    }

    /// Total number of known (name, version) pairs; with the configured
    /// baseline this is the registry poll cursor.
    pub fn total_versions(&self) -> usize {
        self.entries.iter().map(|(_, versions)| versions.len()).sum()
    }

    /// Whether `version` is the latest known version of `name`: exactly one
    /// cached version is greater than or equal to it (itself).
    pub fn is_latest_known(&self, name: &PackageName, version: Version) -> bool {
        match self.versions(name) {
            Some(versions) => versions.iter().filter(|(v, _)| *v >= version).count() == 1,
            None => false,
        }
    }

    /// The highest cached version of `name` satisfying `constraint` whose
    /// record holds usable metadata.
    pub fn latest_satisfying(
        &self,
        name: &PackageName,
        constraint: &VersionConstraint,
    ) -> Option<(Version, &PackageRecord)> {
        self.versions(name)?
            .iter()
            .filter(|(version, record)| {
                constraint.satisfies(*version) && record.usable_meta().is_some()
            })
            .max_by_key(|(version, _)| *version)
            .map(|(version, record)| (*version, record))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl DependencySource for PackageCache {
    fn latest_satisfying(
        &self,
        name: &PackageName,
        constraint: &VersionConstraint,
    ) -> Option<ResolvedDependency> {
        let (version, record) = PackageCache::latest_satisfying(self, name, constraint)?;
        let (manifest, docs) = record.usable_meta()?;
        Some(ResolvedDependency {
            name: name.clone(),
            version,
            manifest: manifest.clone(),
            docs: docs.to_vec(),
        })
    }
}
