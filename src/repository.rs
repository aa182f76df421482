//! Module discovery: scans the module directory for candidate folders.
//!
//! Each scan is one disk snapshot. A folder without a readable, valid
//! manifest produces a per-module error entry and never blocks the rest of
//! the scan; only an unreachable root directory fails the scan as a whole.

use crate::error::{HeraldError, Result};
use crate::manifest::ModuleManifest;
use crate::module::ModuleDescriptor;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Result of one directory scan.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Successfully parsed modules, sorted by folder name.
    pub modules: Vec<ModuleDescriptor>,
    /// Folders that failed to parse, with the reason.
    pub errors: Vec<(PathBuf, HeraldError)>,
}

/// Scans a root directory for module folders.
#[derive(Debug, Clone)]
pub struct ModuleRepository {
    root: PathBuf,
}

impl ModuleRepository {
    /// Creates a repository over `root`. The directory is not required to
    /// exist yet; a missing root fails at scan time.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the scanned root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walks the root directory once and parses every immediate
    /// subdirectory's manifest.
    ///
    /// # Errors
    ///
    /// [`HeraldError::Scan`] when the root directory itself cannot be read.
    /// Per-module failures land in [`ScanOutcome::errors`] instead.
    pub fn scan(&self) -> Result<ScanOutcome> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| {
            HeraldError::Scan(format!("cannot read {}: {e}", self.root.display()))
        })?;

        let mut dirs: Vec<PathBuf> = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| HeraldError::Scan(format!("cannot read directory entry: {e}")))?;
            let path = entry.path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
        dirs.sort();

        let mut outcome = ScanOutcome::default();
        for dir in dirs {
            match load_module(&dir) {
                Ok(descriptor) => outcome.modules.push(descriptor),
                Err(e) => {
                    debug!(module = %dir.display(), "skipping module: {e}");
                    outcome.errors.push((dir, e));
                }
            }
        }

        Ok(outcome)
    }

    /// Removes a module folder and everything beneath it. A folder that is
    /// already gone is not an error.
    pub fn remove_module_dir(&self, module_id: &str) -> Result<()> {
        let path = self.root.join(module_id);
        match std::fs::remove_dir_all(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(HeraldError::Scan(format!(
                "cannot remove {}: {e}",
                path.display()
            ))),
        }
    }
}

fn load_module(dir: &Path) -> Result<ModuleDescriptor> {
    let manifest = ModuleManifest::load_from_dir(dir)?;
    ModuleDescriptor::from_manifest(dir, &manifest)
}

// ── Tests ────────────────────────────────────────────────────────────────────
