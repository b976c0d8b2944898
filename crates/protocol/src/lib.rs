//! Shared domain types for the depsweep crawler.
//!
//! Everything here is pure data: package identities, versions and
//! constraints, decoded manifests and doc summaries, diagnostics, the
//! transport-error taxonomy, and the operator-console message verbs. The
//! registry, hosting, project and server crates all speak these types; none
//! of them should redefine wire shapes locally.

pub mod console;
pub mod diagnostic;
pub mod docs;
pub mod manifest;
pub mod name;
pub mod transport;
pub mod version;

pub use console::{ConsoleRequest, ConsoleResponse, StatusMap, StatusProjection, VersionStatus};
pub use diagnostic::{Diagnostic, SourcePosition, SourceRange};
pub use docs::{AliasDoc, BinopDoc, ModuleDoc, UnionDoc, ValueDoc};
pub use manifest::{ElmJson, ExposedModules, PackageManifest};
pub use name::PackageName;
pub use transport::TransportError;
pub use version::{Version, VersionConstraint};

/// The analysis target: only packages whose `elm-version` constraint admits
/// this version are analyzed.
pub const ELM_TARGET_VERSION: Version = Version::new(0, 19, 1);

/// Packages under this owner have no upstream we can open pull requests
/// against, so the scheduler never selects them for analysis.
pub const RESERVED_OWNER: &str = "elm";

/// Canonical manifest path inside an assembled project. Fixes and the
/// pull-request blob change both target this path.
pub const MANIFEST_PATH: &str = "elm.json";

/// File extension of analyzable source modules.
pub const SOURCE_EXTENSION: &str = "elm";
