//! Module descriptor: a module folder combined with its parsed manifest and
//! resolved assets.
//!
//! Descriptors are immutable once built for a given scan. Identity is the
//! folder name; the content hash (SHA-256 over the canonical manifest plus
//! referenced asset bytes) detects in-place redeployment of the same folder.

use crate::error::{HeraldError, Result};
use crate::manifest::{ManifestKind, ModuleManifest};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// A resolved media reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetRef {
    /// File inside (or resolved against) the module folder.
    File(PathBuf),
    /// Remote URL. `www.` hosts are promoted to `https://`.
    Url(String),
}

/// A resolved icon reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconRef {
    /// File resolved against the module folder.
    File(PathBuf),
    /// Remote URL.
    Url(String),
    /// Named built-in icon shipped with the presentation layer.
    Preset(String),
}

/// How a module becomes eligible for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleKind {
    /// Eligible as soon as any schedule has passed.
    Standard,
    /// Gated by a bundled script's exit code.
    Conditional {
        /// Absolute path of the script inside the module folder.
        script: PathBuf,
        /// Minutes between condition re-evaluations.
        recheck_minutes: u32,
    },
}

/// An immutable snapshot of one module folder.
#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    /// Stable module ID: the folder name (timestamp+slug by convention).
    pub id: String,
    /// The module folder.
    pub root: PathBuf,
    /// Notification title.
    pub title: String,
    /// Notification body.
    pub message: String,
    /// Grouping label.
    pub category: String,
    /// Optional media to open on request.
    pub media: Option<AssetRef>,
    /// Optional icon shown by the presentation layer.
    pub icon: Option<IconRef>,
    /// Whether the module asks for a notification sound.
    pub sound: bool,
    /// UTC instant before which the module must not surface.
    pub schedule: Option<DateTime<Utc>>,
    /// UTC instant after which the module is expired.
    pub expires: Option<DateTime<Utc>>,
    /// Standard or conditional.
    pub kind: ModuleKind,
    /// SHA-256 hex digest over manifest and asset content.
    pub content_hash: String,
}

impl ModuleDescriptor {
    /// Builds a descriptor from a module folder and its validated manifest.
    ///
    /// # Errors
    ///
    /// [`HeraldError::Manifest`] when a referenced local asset cannot be read
    /// for hashing.
    pub fn from_manifest(root: &Path, manifest: &ModuleManifest) -> Result<Self> {
        let id = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                HeraldError::Manifest(format!("module folder has no name: {}", root.display()))
            })?;

        let media = manifest
            .media
            .as_deref()
            .map(|reference| resolve_asset(root, reference));
        let icon = manifest
            .icon
            .as_deref()
            .map(|reference| resolve_icon(root, reference));

        let kind = match manifest.kind {
            ManifestKind::Standard => ModuleKind::Standard,
            ManifestKind::Conditional => {
                // validate() guarantees presence and a safe relative path.
                let script = manifest.condition_script.as_deref().ok_or_else(|| {
                    HeraldError::Manifest("conditional manifest missing script".to_owned())
                })?;
                ModuleKind::Conditional {
                    script: root.join(script),
                    recheck_minutes: manifest
                        .condition_interval_minutes
                        .unwrap_or(crate::manifest::DEFAULT_CONDITION_INTERVAL_MINUTES),
                }
            }
        };

        let content_hash = compute_content_hash(manifest, media.as_ref(), icon.as_ref())?;

        Ok(Self {
            id,
            root: root.to_path_buf(),
            title: manifest.title.clone(),
            message: manifest.message.clone(),
            category: manifest
                .category
                .clone()
                .unwrap_or_else(|| crate::manifest::DEFAULT_CATEGORY.to_owned()),
            media,
            icon,
            sound: manifest.sound.is_some(),
            schedule: manifest.schedule_utc(),
            expires: manifest.expires_utc(),
            kind,
            content_hash,
        })
    }

    /// Returns `true` if the module declares a condition script.
    pub fn is_conditional(&self) -> bool {
        matches!(self.kind, ModuleKind::Conditional { .. })
    }

    /// Returns `true` if the module's expiry instant has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|expires| now >= expires)
    }

    /// Returns `true` if a declared schedule has not yet been reached.
    pub fn schedule_pending(&self, now: DateTime<Utc>) -> bool {
        self.schedule.is_some_and(|schedule| now < schedule)
    }
}

fn resolve_asset(root: &Path, reference: &str) -> AssetRef {
    let lowered = reference.to_ascii_lowercase();
    if lowered.starts_with("https://") || lowered.starts_with("http://") {
        return AssetRef::Url(reference.to_owned());
    }
    if lowered.starts_with("www.") {
        return AssetRef::Url(format!("https://{reference}"));
    }
    AssetRef::File(root.join(reference))
}

fn resolve_icon(root: &Path, reference: &str) -> IconRef {
    let lowered = reference.to_ascii_lowercase();
    if let Some(name) = lowered.strip_prefix("preset:") {
        return IconRef::Preset(name.to_owned());
    }
    match resolve_asset(root, reference) {
        AssetRef::File(path) => IconRef::File(path),
        AssetRef::Url(url) => IconRef::Url(url),
    }
}

/// Computes a deterministic SHA-256 digest for a module.
///
/// The normalized manifest is serialized to JSON (stable field order) and
/// referenced asset content (file bytes or URL string) is folded into the
/// same digest so content updates are reflected.
fn compute_content_hash(
    manifest: &ModuleManifest,
    media: Option<&AssetRef>,
    icon: Option<&IconRef>,
) -> Result<String> {
    let mut digest = Sha256::new();

    let manifest_json = serde_json::to_vec(manifest)
        .map_err(|e| HeraldError::Manifest(format!("cannot canonicalize manifest: {e}")))?;
    digest.update(&manifest_json);

    match media {
        Some(AssetRef::File(path)) => digest.update(read_asset_bytes(path)?),
        Some(AssetRef::Url(url)) => digest.update(url.as_bytes()),
        None => {}
    }

    match icon {
        Some(IconRef::File(path)) => digest.update(read_asset_bytes(path)?),
        Some(IconRef::Url(url)) => digest.update(url.as_bytes()),
        Some(IconRef::Preset(name)) => digest.update(name.as_bytes()),
        None => {}
    }

    Ok(format!("{:x}", digest.finalize()))
}

fn read_asset_bytes(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        HeraldError::Manifest(format!("cannot read asset {}: {e}", path.display()))
    })
}

// ── Tests ────────────────────────────────────────────────────────────────────
