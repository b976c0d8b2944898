use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A published package version. Ordering is lexicographic over
/// (major, minor, patch), which the derive gives us for free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// The Git tag the registry associates with this version.
    pub fn tag(&self) -> String {
        format!("v{self}")
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '.');
        let mut next = |label: &str| -> Result<u32, String> {
            parts
                .next()
                .ok_or_else(|| format!("invalid version '{s}': missing {label}"))?
                .parse::<u32>()
                .map_err(|_| format!("invalid version '{s}': bad {label}"))
        };
        let major = next("major")?;
        let minor = next("minor")?;
        let patch = next("patch")?;
        Ok(Self::new(major, minor, patch))
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Whether a constraint endpoint is inclusive or exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Inclusive,
    Exclusive,
}

impl Bound {
    fn parse(op: &str) -> Option<Self> {
        match op {
            "<=" => Some(Self::Inclusive),
            "<" => Some(Self::Exclusive),
            _ => None,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Self::Inclusive => "<=",
            Self::Exclusive => "<",
        }
    }
}

/// A bounded version range in the registry's textual form, e.g.
/// `1.0.0 <= v < 2.0.0`. Both comparison operators may independently be
/// `<` or `<=`; the registry itself only ever publishes `<= v <`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    lower: Version,
    lower_bound: Bound,
    upper: Version,
    upper_bound: Bound,
}

impl VersionConstraint {
    /// The predicate the engine needs: does `version` fall in the range?
    pub fn satisfies(&self, version: Version) -> bool {
        let above_lower = match self.lower_bound {
            Bound::Inclusive => version >= self.lower,
            Bound::Exclusive => version > self.lower,
        };
        let below_upper = match self.upper_bound {
            Bound::Inclusive => version <= self.upper,
            Bound::Exclusive => version < self.upper,
        };
        above_lower && below_upper
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} v {} {}",
            self.lower,
            self.lower_bound.symbol(),
            self.upper_bound.symbol(),
            self.upper
        )
    }
}

impl FromStr for VersionConstraint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = s.split_whitespace().collect();
        let err = || format!("invalid version constraint '{s}'");
        let [lower, lower_op, v, upper_op, upper] = tokens.as_slice() else {
            return Err(err());
        };
        if *v != "v" {
            return Err(err());
        }
        Ok(Self {
            lower: lower.parse().map_err(|_| err())?,
            lower_bound: Bound::parse(lower_op).ok_or_else(err)?,
            upper: upper.parse().map_err(|_| err())?,
            upper_bound: Bound::parse(upper_op).ok_or_else(err)?,
        })
    }
}

impl Serialize for VersionConstraint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionConstraint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}
