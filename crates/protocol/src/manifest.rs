use crate::name::PackageName;
use crate::version::{Version, VersionConstraint};
use serde::de::{Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A decoded `elm.json`. The registry serves two shapes, discriminated by
/// the `"type"` field; only library packages carry the fields we analyze.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ElmJson {
    #[serde(rename = "package")]
    Package(PackageManifest),
    #[serde(rename = "application")]
    Application,
}

impl ElmJson {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn into_package(self) -> Option<PackageManifest> {
        match self {
            Self::Package(manifest) => Some(manifest),
            Self::Application => None,
        }
    }
}

/// A library package's manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
    pub name: PackageName,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub license: String,
    pub version: Version,
    #[serde(rename = "exposed-modules")]
    pub exposed_modules: ExposedModules,
    #[serde(rename = "elm-version")]
    pub elm_version: VersionConstraint,
    #[serde(default)]
    pub dependencies: BTreeMap<PackageName, VersionConstraint>,
    #[serde(rename = "test-dependencies", default)]
    pub test_dependencies: BTreeMap<PackageName, VersionConstraint>,
}

impl PackageManifest {
    /// Whether this package can be analyzed against the fixed target
    /// language version.
    pub fn admits(&self, target: Version) -> bool {
        self.elm_version.satisfies(target)
    }
}

/// The manifest's `exposed-modules` field: either a flat list or a map of
/// named groups. Declaration order is kept in both shapes because it seeds
/// the reachable-module fixpoint deterministically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExposedModules {
    Plain(Vec<String>),
    Grouped(Vec<(String, Vec<String>)>),
}

impl ExposedModules {
    /// All exposed module names, flattened in declaration order.
    pub fn names(&self) -> Vec<&str> {
        match self {
            Self::Plain(names) => names.iter().map(String::as_str).collect(),
            Self::Grouped(groups) => groups
                .iter()
                .flat_map(|(_, names)| names.iter().map(String::as_str))
                .collect(),
        }
    }
}

impl Serialize for ExposedModules {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Plain(names) => names.serialize(serializer),
            Self::Grouped(groups) => {
                let mut map = serializer.serialize_map(Some(groups.len()))?;
                for (group, names) in groups {
                    map.serialize_entry(group, names)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for ExposedModules {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ExposedVisitor;

        impl<'de> Visitor<'de> for ExposedVisitor {
            type Value = ExposedModules;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a list of module names or a map of group name to module names")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut names = Vec::new();
                while let Some(name) = seq.next_element::<String>()? {
                    names.push(name);
                }
                Ok(ExposedModules::Plain(names))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut groups = Vec::new();
                while let Some((group, names)) = map.next_entry::<String, Vec<String>>()? {
                    groups.push((group, names));
                }
                Ok(ExposedModules::Grouped(groups))
            }
        }

        deserializer.deserialize_any(ExposedVisitor)
    }
}

impl Default for ExposedModules {
    fn default() -> Self {
        Self::Plain(Vec::new())
    }
}
