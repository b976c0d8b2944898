//! Turns a package archive plus cached metadata into an analyzable project.
//!
//! The pipeline stage this crate implements is pure: bytes in, `Project`
//! out. Assembly walks the archive for source modules, trims the module set
//! down to what is reachable from the manifest's `exposed-modules`, and
//! resolves the dependency closure against whatever the caller's cache
//! offers through [`DependencySource`].

mod archive;
mod assemble;
mod imports;

pub use archive::{ArchiveError, ArchiveTree};
pub use assemble::{
    assemble, manifest_source_text, AssemblyError, DependencySource, ManifestEntry, Project,
    ProjectDependency, ResolvedDependency, SourceModule,
};
pub use imports::{imports_of, module_name_for_path, path_for_module};
