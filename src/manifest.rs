//! Module manifest (`manifest.json`) parsing and validation.
//!
//! Each module folder must contain a `manifest.json` file describing the
//! notification. Parsing returns a normalized [`ModuleManifest`] with defaults
//! applied; all timestamps are required to be ISO-8601 in UTC (`Z` suffix or
//! `+00:00` offset).
//!
//! # Example `manifest.json`
//!
//! ```json
//! {
//!   "title": "VPN certificate renewal",
//!   "message": "Your VPN certificate expires this week. Renew it today.",
//!   "category": "Security",
//!   "media": "howto.png",
//!   "schedule": "2026-09-01T08:00:00Z",
//!   "type": "conditional",
//!   "condition_script": "check_cert.ps1",
//!   "condition_interval_minutes": 30
//! }
//! ```

use crate::error::{HeraldError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Maximum accepted title length in characters.
pub const MAX_TITLE_LENGTH: usize = 120;

/// Maximum accepted message length in characters.
pub const MAX_MESSAGE_LENGTH: usize = 240;

/// Category applied when the manifest omits one.
pub const DEFAULT_CATEGORY: &str = "General";

/// Recheck interval (minutes) applied when a conditional manifest omits one.
pub const DEFAULT_CONDITION_INTERVAL_MINUTES: u32 = 60;

/// Manifest filename within a module folder.
pub const MANIFEST_FILENAME: &str = "manifest.json";

/// Notification kind declared by the manifest `type` field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestKind {
    /// Always eligible once any schedule has passed.
    #[default]
    Standard,
    /// Gated by a bundled script's exit code.
    Conditional,
}

/// Parsed and normalized contents of a module's `manifest.json`.
///
/// Field order is stable; the module content hash serializes this struct
/// back to canonical JSON, so reordering fields changes module identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleManifest {
    /// Short notification title. Required, at most 120 characters.
    pub title: String,

    /// Notification body. Required, at most 240 characters.
    pub message: String,

    /// Grouping label shown by the presentation layer. Defaults to `"General"`.
    #[serde(default)]
    pub category: Option<String>,

    /// Optional media reference: relative file path, `www.` host, or
    /// `http(s)://` URL.
    #[serde(default)]
    pub media: Option<String>,

    /// Optional icon reference: same shapes as `media`, plus `preset:<name>`.
    #[serde(default)]
    pub icon: Option<String>,

    /// Optional sound flag. Only `"default"` is accepted.
    #[serde(default)]
    pub sound: Option<String>,

    /// Optional UTC instant before which the module must not surface.
    #[serde(default)]
    pub schedule: Option<String>,

    /// Optional UTC instant after which the module is expired.
    #[serde(default)]
    pub expires: Option<String>,

    /// `"standard"` (default) or `"conditional"`.
    #[serde(default, rename = "type")]
    pub kind: ManifestKind,

    /// Relative path of the condition script. Required for conditional modules.
    #[serde(default)]
    pub condition_script: Option<String>,

    /// Minutes between condition re-evaluations. Defaults to 60.
    #[serde(default)]
    pub condition_interval_minutes: Option<u32>,
}

impl ModuleManifest {
    /// Loads and parses `manifest.json` from a module folder.
    ///
    /// # Errors
    ///
    /// [`HeraldError::Manifest`] if the file is missing, unreadable, not valid
    /// JSON, or fails validation.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILENAME);
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            HeraldError::Manifest(format!("cannot read {}: {e}", path.display()))
        })?;

        let mut manifest: Self = serde_json::from_str(&raw)
            .map_err(|e| HeraldError::Manifest(format!("invalid manifest.json: {e}")))?;

        manifest.normalize();
        manifest.validate()?;
        Ok(manifest)
    }

    /// Trims whitespace and applies defaults for omitted optional fields.
    fn normalize(&mut self) {
        self.title = self.title.trim().to_owned();
        self.message = self.message.trim().to_owned();

        for field in [
            &mut self.category,
            &mut self.media,
            &mut self.icon,
            &mut self.sound,
            &mut self.schedule,
            &mut self.expires,
            &mut self.condition_script,
        ] {
            if let Some(value) = field {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    *field = None;
                } else if trimmed.len() != value.len() {
                    *field = Some(trimmed.to_owned());
                }
            }
        }

        if self.category.is_none() {
            self.category = Some(DEFAULT_CATEGORY.to_owned());
        }
        if self.kind == ManifestKind::Conditional && self.condition_interval_minutes.is_none() {
            self.condition_interval_minutes = Some(DEFAULT_CONDITION_INTERVAL_MINUTES);
        }
    }

    /// Validates that the manifest fields are well-formed.
    ///
    /// # Errors
    ///
    /// [`HeraldError::Manifest`] describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.title.is_empty() {
            return Err(HeraldError::Manifest("title is required".to_owned()));
        }
        if self.title.chars().count() > MAX_TITLE_LENGTH {
            return Err(HeraldError::Manifest(format!(
                "title must be at most {MAX_TITLE_LENGTH} characters"
            )));
        }

        if self.message.is_empty() {
            return Err(HeraldError::Manifest("message is required".to_owned()));
        }
        if self.message.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(HeraldError::Manifest(format!(
                "message must be at most {MAX_MESSAGE_LENGTH} characters"
            )));
        }

        if let Some(media) = &self.media {
            validate_asset_reference(media, "media", false)?;
        }
        if let Some(icon) = &self.icon {
            validate_asset_reference(icon, "icon", true)?;
        }

        if let Some(sound) = &self.sound {
            if sound != "default" {
                return Err(HeraldError::Manifest(
                    "sound must be one of: default".to_owned(),
                ));
            }
        }

        if let Some(schedule) = &self.schedule {
            parse_utc(schedule, "schedule")?;
        }
        if let Some(expires) = &self.expires {
            parse_utc(expires, "expires")?;
        }

        match self.kind {
            ManifestKind::Standard => {}
            ManifestKind::Conditional => {
                let script = self.condition_script.as_deref().ok_or_else(|| {
                    HeraldError::Manifest(
                        "condition_script is required for conditional modules".to_owned(),
                    )
                })?;
                validate_relative_path(script, "condition_script")?;

                let interval = self
                    .condition_interval_minutes
                    .unwrap_or(DEFAULT_CONDITION_INTERVAL_MINUTES);
                if interval == 0 {
                    return Err(HeraldError::Manifest(
                        "condition_interval_minutes must be greater than zero".to_owned(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Parsed schedule instant, if any. Valid after [`validate`](Self::validate).
    pub fn schedule_utc(&self) -> Option<DateTime<Utc>> {
        self.schedule
            .as_deref()
            .and_then(|s| parse_utc(s, "schedule").ok())
    }

    /// Parsed expiry instant, if any. Valid after [`validate`](Self::validate).
    pub fn expires_utc(&self) -> Option<DateTime<Utc>> {
        self.expires
            .as_deref()
            .and_then(|s| parse_utc(s, "expires").ok())
    }
}

/// Parses an ISO-8601 timestamp that must carry a UTC offset.
///
/// Accepts a trailing `Z` or an explicit `+00:00`.
///
/// # Errors
///
/// [`HeraldError::Manifest`] when parsing fails or the offset is not UTC.
pub fn parse_utc(value: &str, field: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(value.trim()).map_err(|_| {
        HeraldError::Manifest(format!(
            "{field} must be ISO-8601 in UTC (e.g. 2026-01-01T00:00:00Z)"
        ))
    })?;

    if parsed.offset().local_minus_utc() != 0 {
        return Err(HeraldError::Manifest(format!(
            "{field} must be specified in UTC"
        )));
    }

    Ok(parsed.with_timezone(&Utc))
}

/// Formats a UTC instant as canonical ISO-8601 with a trailing `Z`,
/// truncated to whole seconds.
pub fn format_utc(when: DateTime<Utc>) -> String {
    when.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn validate_asset_reference(value: &str, field: &str, allow_preset: bool) -> Result<()> {
    let lowered = value.to_ascii_lowercase();

    if lowered.starts_with("preset:") {
        if allow_preset && value.len() > "preset:".len() {
            return Ok(());
        }
        return Err(asset_error(field, allow_preset));
    }

    if lowered.starts_with("https://") || lowered.starts_with("http://") {
        return Ok(());
    }
    if lowered.starts_with("www.") {
        return Ok(());
    }
    if value.contains("://") {
        return Err(asset_error(field, allow_preset));
    }

    validate_relative_path(value, field).map_err(|_| asset_error(field, allow_preset))
}

fn validate_relative_path(value: &str, field: &str) -> Result<()> {
    let path = Path::new(value);
    if path.is_absolute()
        || value.starts_with('/')
        || value.starts_with('\\')
        || path.components().any(|c| {
            matches!(
                c,
                std::path::Component::ParentDir | std::path::Component::Prefix(_)
            )
        })
    {
        return Err(HeraldError::Manifest(format!(
            "{field} must be a relative path without traversal"
        )));
    }
    Ok(())
}

fn asset_error(field: &str, allow_preset: bool) -> HeraldError {
    let mut supported = vec!["relative file path", "http:// or https:// URL", "www. URL"];
    if allow_preset {
        supported.push("preset:<name>");
    }
    HeraldError::Manifest(format!(
        "{field} must be one of the supported types: {}",
        supported.join(", ")
    ))
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn write_manifest(dir: &Path, content: &str) {
        std::fs::create_dir_all(dir).expect("create dir");
        std::fs::write(dir.join(MANIFEST_FILENAME), content).expect("write manifest");
    }

    #[test]
    fn parse_full_manifest() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_manifest(
            dir.path(),
            r#"{
                "title": "VPN certificate renewal",
                "message": "Renew your certificate today.",
                "category": "Security",
                "media": "howto.png",
                "icon": "preset:shield",
                "sound": "default",
                "schedule": "2026-09-01T08:00:00Z",
                "expires": "2026-10-01T08:00:00Z",
                "type": "conditional",
                "condition_script": "check.ps1",
                "condition_interval_minutes": 30
            }"#,
        );

        let manifest = ModuleManifest::load_from_dir(dir.path()).expect("load");
        assert_eq!(manifest.title, "VPN certificate renewal");
        assert_eq!(manifest.category.as_deref(), Some("Security"));
        assert_eq!(manifest.kind, ManifestKind::Conditional);
        assert_eq!(manifest.condition_script.as_deref(), Some("check.ps1"));
        assert_eq!(manifest.condition_interval_minutes, Some(30));
        assert!(manifest.schedule_utc().is_some());
        assert!(manifest.expires_utc().is_some());
    }

    #[test]
    fn minimal_manifest_applies_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_manifest(
            dir.path(),
            r#"{"title": "Hello", "message": "World"}"#,
        );

        let manifest = ModuleManifest::load_from_dir(dir.path()).expect("load");
        assert_eq!(manifest.category.as_deref(), Some(DEFAULT_CATEGORY));
        assert_eq!(manifest.kind, ManifestKind::Standard);
        assert!(manifest.media.is_none());
        assert!(manifest.schedule_utc().is_none());
    }

    #[test]
    fn missing_manifest_file_returns_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = ModuleManifest::load_from_dir(dir.path());
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("cannot read"), "got: {msg}");
    }

    #[test]
    fn malformed_json_returns_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_manifest(dir.path(), "not json {{{");
        let msg = ModuleManifest::load_from_dir(dir.path())
            .unwrap_err()
            .to_string();
        assert!(msg.contains("invalid manifest.json"), "got: {msg}");
    }

    #[test]
    fn empty_title_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_manifest(dir.path(), r#"{"title": "  ", "message": "Body"}"#);
        assert!(ModuleManifest::load_from_dir(dir.path()).is_err());
    }

    #[test]
    fn overlong_message_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let long = "x".repeat(MAX_MESSAGE_LENGTH + 1);
        write_manifest(
            dir.path(),
            &format!(r#"{{"title": "T", "message": "{long}"}}"#),
        );
        let msg = ModuleManifest::load_from_dir(dir.path())
            .unwrap_err()
            .to_string();
        assert!(msg.contains("240"), "got: {msg}");
    }

    #[test]
    fn conditional_requires_script() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_manifest(
            dir.path(),
            r#"{"title": "T", "message": "M", "type": "conditional"}"#,
        );
        let msg = ModuleManifest::load_from_dir(dir.path())
            .unwrap_err()
            .to_string();
        assert!(msg.contains("condition_script"), "got: {msg}");
    }

    #[test]
    fn conditional_interval_defaults_to_sixty() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_manifest(
            dir.path(),
            r#"{"title": "T", "message": "M", "type": "conditional", "condition_script": "c.sh"}"#,
        );
        let manifest = ModuleManifest::load_from_dir(dir.path()).expect("load");
        assert_eq!(
            manifest.condition_interval_minutes,
            Some(DEFAULT_CONDITION_INTERVAL_MINUTES)
        );
    }

    #[test]
    fn zero_interval_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_manifest(
            dir.path(),
            r#"{"title": "T", "message": "M", "type": "conditional",
                "condition_script": "c.sh", "condition_interval_minutes": 0}"#,
        );
        assert!(ModuleManifest::load_from_dir(dir.path()).is_err());
    }

    #[test]
    fn traversal_in_script_path_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_manifest(
            dir.path(),
            r#"{"title": "T", "message": "M", "type": "conditional",
                "condition_script": "../evil.sh"}"#,
        );
        assert!(ModuleManifest::load_from_dir(dir.path()).is_err());
    }

    #[test]
    fn unknown_sound_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_manifest(
            dir.path(),
            r#"{"title": "T", "message": "M", "sound": "airhorn"}"#,
        );
        assert!(ModuleManifest::load_from_dir(dir.path()).is_err());
    }

    #[test]
    fn absolute_media_path_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_manifest(
            dir.path(),
            r#"{"title": "T", "message": "M", "media": "/etc/passwd"}"#,
        );
        assert!(ModuleManifest::load_from_dir(dir.path()).is_err());
    }

    #[test]
    fn preset_icon_allowed_but_preset_media_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_manifest(
            dir.path(),
            r#"{"title": "T", "message": "M", "icon": "preset:info"}"#,
        );
        assert!(ModuleManifest::load_from_dir(dir.path()).is_ok());

        write_manifest(
            dir.path(),
            r#"{"title": "T", "message": "M", "media": "preset:info"}"#,
        );
        assert!(ModuleManifest::load_from_dir(dir.path()).is_err());
    }

    #[test]
    fn parse_utc_accepts_z_and_offset() {
        assert!(parse_utc("2026-01-01T00:00:00Z", "schedule").is_ok());
        assert!(parse_utc("2026-01-01T00:00:00+00:00", "schedule").is_ok());
    }

    #[test]
    fn parse_utc_rejects_non_utc_offset() {
        let msg = parse_utc("2026-01-01T00:00:00+02:00", "schedule")
            .unwrap_err()
            .to_string();
        assert!(msg.contains("UTC"), "got: {msg}");
    }

    #[test]
    fn parse_utc_rejects_naive_timestamp() {
        assert!(parse_utc("2026-01-01T00:00:00", "schedule").is_err());
    }

    #[test]
    fn format_utc_round_trips() {
        let when = parse_utc("2026-03-04T05:06:07Z", "schedule").expect("parse");
        assert_eq!(format_utc(when), "2026-03-04T05:06:07Z");
    }
}
