use depsweep_protocol::{MANIFEST_PATH, SOURCE_EXTENSION};
use std::io::{Cursor, Read};
use thiserror::Error;
use zip::ZipArchive;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("could not open archive: {0}")]
    CouldNotOpen(String),
}

/// The useful contents of a package archive: source modules under `src/`
/// and `tests/` (top-level folder stripped) plus the manifest text, if the
/// archive carries one at `<top>/elm.json`.
///
/// Hosting-platform archives always wrap the tree in a single top-level
/// folder named after the ref; anything not under it is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveTree {
    pub src_modules: Vec<(String, String)>,
    pub test_modules: Vec<(String, String)>,
    pub manifest_text: Option<String>,
}

impl ArchiveTree {
    /// Decompress a ZIP archive held in memory and pick out the entries we
    /// analyze. Entries are visited in archive order, which keeps assembly
    /// deterministic for identical input bytes.
    pub fn open(bytes: &[u8]) -> Result<Self, ArchiveError> {
        let mut zip = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| ArchiveError::CouldNotOpen(e.to_string()))?;

        let mut tree = Self {
            src_modules: Vec::new(),
            test_modules: Vec::new(),
            manifest_text: None,
        };

        let source_suffix = format!(".{SOURCE_EXTENSION}");
        for index in 0..zip.len() {
            let mut entry = zip
                .by_index(index)
                .map_err(|e| ArchiveError::CouldNotOpen(e.to_string()))?;
            if entry.is_dir() {
                continue;
            }

            let full_path = entry.name().to_string();
            let Some((_top, stripped)) = full_path.split_once('/') else {
                continue;
            };

            let is_manifest = stripped == MANIFEST_PATH;
            let is_module = (stripped.starts_with("src/") || stripped.starts_with("tests/"))
                && stripped.ends_with(&source_suffix);
            if !is_manifest && !is_module {
                continue;
            }

            let mut raw = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut raw)
                .map_err(|e| ArchiveError::CouldNotOpen(e.to_string()))?;
            let contents = String::from_utf8_lossy(&raw).into_owned();

            if is_manifest {
                tree.manifest_text = Some(contents);
            } else if stripped.starts_with("src/") {
                tree.src_modules.push((stripped.to_string(), contents));
            } else {
                tree.test_modules.push((stripped.to_string(), contents));
            }
        }

        log::debug!(
            "archive: {} src modules, {} test modules, manifest {}",
            tree.src_modules.len(),
            tree.test_modules.len(),
            if tree.manifest_text.is_some() {
                "present"
            } else {
                "absent"
            }
        );
        Ok(tree)
    }
}
