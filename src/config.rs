//! Process-wide configuration.
//!
//! Two layers:
//!
//! - [`EffectiveSettings`]: admin-controlled runtime behavior, read from the
//!   state store's process namespace on a fixed poll cadence. Defaults apply
//!   when a value is absent or malformed; the scan interval is clamped to
//!   safe bounds.
//! - [`DaemonConfig`]: where the daemon finds its module directory and state
//!   database, loaded once at startup from `herald.toml` with environment
//!   overrides.

use crate::error::{HeraldError, Result};
use crate::store::StateStore;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Setting key: master enable flag.
pub const SETTING_ENABLED: &str = "enabled";
/// Setting key: seconds between module scans.
pub const SETTING_SCAN_INTERVAL: &str = "scan_interval_secs";
/// Setting key: tray icon visibility (consumed by the presentation layer).
pub const SETTING_TRAY_VISIBLE: &str = "tray_visible";
/// Setting key: notification sound enable flag.
pub const SETTING_SOUND_ENABLED: &str = "sound_enabled";
/// Setting key: delete module folders once terminal.
pub const SETTING_AUTO_DELETE: &str = "auto_delete_modules";

/// Default scan interval in seconds.
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 300;

/// Interval between settings polls.
pub const SETTINGS_POLL_INTERVAL: Duration = Duration::from_secs(15);

const MIN_SCAN_INTERVAL_SECS: u64 = 60;
const MAX_SCAN_INTERVAL_SECS: u64 = 3600;

/// The current effective process-wide settings.
///
/// Initialized from defaults at startup, refreshed every poll tick,
/// discarded at process exit. Never persisted outside the store itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveSettings {
    /// When false, scan ticks are suppressed entirely.
    pub enabled: bool,
    /// Seconds between module scans, clamped to [60, 3600].
    pub scan_interval_secs: u64,
    /// Whether the presentation layer should show a tray icon.
    pub tray_visible: bool,
    /// Whether eligible modules may request a sound on display.
    pub sound_enabled: bool,
    /// Whether terminal module folders are removed from disk.
    pub auto_delete_modules: bool,
}

impl Default for EffectiveSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_interval_secs: DEFAULT_SCAN_INTERVAL_SECS,
            tray_visible: true,
            sound_enabled: true,
            auto_delete_modules: true,
        }
    }
}

impl EffectiveSettings {
    /// Reads the current settings from the store.
    ///
    /// Never fails: store errors and malformed values fall back to defaults.
    pub fn load(store: &dyn StateStore) -> Self {
        Self {
            enabled: read_bool(store, SETTING_ENABLED, true),
            scan_interval_secs: read_scan_interval(store),
            tray_visible: read_bool(store, SETTING_TRAY_VISIBLE, true),
            sound_enabled: read_bool(store, SETTING_SOUND_ENABLED, true),
            auto_delete_modules: read_bool(store, SETTING_AUTO_DELETE, true),
        }
    }

    /// Scan interval as a [`Duration`].
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }
}

fn read_bool(store: &dyn StateStore, key: &str, default: bool) -> bool {
    match store.setting(key) {
        Ok(Some(raw)) => raw != 0,
        Ok(None) => default,
        Err(e) => {
            warn!(key, "cannot read setting, using default: {e}");
            default
        }
    }
}

fn read_scan_interval(store: &dyn StateStore) -> u64 {
    let raw = match store.setting(SETTING_SCAN_INTERVAL) {
        Ok(Some(raw)) => raw,
        Ok(None) => return DEFAULT_SCAN_INTERVAL_SECS,
        Err(e) => {
            warn!("cannot read scan interval, using default: {e}");
            return DEFAULT_SCAN_INTERVAL_SECS;
        }
    };

    let clamped = u64::try_from(raw)
        .unwrap_or(MIN_SCAN_INTERVAL_SECS)
        .clamp(MIN_SCAN_INTERVAL_SECS, MAX_SCAN_INTERVAL_SECS);
    if i64::try_from(clamped) != Ok(raw) {
        warn!(raw, clamped, "scan interval out of bounds, clamping");
    }
    clamped
}

// ── Daemon bootstrap configuration ───────────────────────────────────────────

/// Startup configuration for the `heraldd` binary.
///
/// Loaded from `herald.toml` in the herald config directory; missing file or
/// fields fall back to defaults. `HERALD_MODULES_DIR` and `HERALD_STATE_DIR`
/// environment variables override the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Directory scanned for module folders.
    pub modules_dir: PathBuf,
    /// Directory holding the state database and logs.
    pub state_dir: PathBuf,
    /// Maximum concurrent condition script evaluations per tick.
    pub condition_workers: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let base = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("herald");
        Self {
            modules_dir: base.join("modules"),
            state_dir: base.join("state"),
            condition_workers: 4,
        }
    }
}

impl DaemonConfig {
    /// Loads the config file, applying environment overrides.
    ///
    /// # Errors
    ///
    /// [`HeraldError::Config`] only when a config file exists but cannot be
    /// parsed; a missing file is not an error.
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(&path).map_err(|e| {
                    HeraldError::Config(format!("cannot read {}: {e}", path.display()))
                })?;
                toml::from_str(&raw).map_err(|e| {
                    HeraldError::Config(format!("invalid {}: {e}", path.display()))
                })?
            }
            _ => Self::default(),
        };

        if let Some(dir) = std::env::var_os("HERALD_MODULES_DIR") {
            config.modules_dir = PathBuf::from(dir);
        }
        if let Some(dir) = std::env::var_os("HERALD_STATE_DIR") {
            config.state_dir = PathBuf::from(dir);
        }
        if config.condition_workers == 0 {
            config.condition_workers = 1;
        }

        Ok(config)
    }

    /// Path of `herald.toml`, if a config directory is available.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("herald").join("herald.toml"))
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
