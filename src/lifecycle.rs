//! Module lifecycle states and the persisted per-module record.
//!
//! The [`LifecycleRecord`] is the only mutable, durable representation of a
//! module's progress. Descriptors are never mutated; every decision the
//! engine makes is committed here.

use crate::module::ModuleDescriptor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of one module.
///
/// ```text
/// ConditionWait ──fire──▶ Pending ──schedule due──▶ Eligible ──handoff──▶ Displayed
///       │                    ▲                          ▲                    │
///       └──────fire──────────┘        idle gate ────────┘          acknowledge│defer
///       │                                   │                                ▼
///       └──error──▶ Error            Deferred ◀──────────────── Completed / Deferred
/// ```
///
/// `Completed`, `Expired`, and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    /// Known, but a declared schedule has not yet been reached.
    Pending,
    /// Has an unevaluated or not-yet-fired condition.
    ConditionWait,
    /// Ready to surface to the user.
    Eligible,
    /// Handed to the presentation boundary.
    Displayed,
    /// User asked to be reminded later; redisplay is idle-gated.
    Deferred,
    /// Terminal: user acknowledged.
    Completed,
    /// Terminal: expiry lapsed or folder removed out-of-band.
    Expired,
    /// Terminal: condition script failed.
    Error,
}

impl ModuleStatus {
    /// Returns `true` for statuses the engine never leaves.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Expired | Self::Error)
    }
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::ConditionWait => "condition_wait",
            Self::Eligible => "eligible",
            Self::Displayed => "displayed",
            Self::Deferred => "deferred",
            Self::Completed => "completed",
            Self::Expired => "expired",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// Durable per-module state, serialized as JSON in the state store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleRecord {
    /// Current status.
    pub status: ModuleStatus,
    /// When the engine first saw this content.
    pub first_seen: DateTime<Utc>,
    /// Schedule mirrored from the manifest at first sight.
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    /// When the user acknowledged, for terminal `Completed` records.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// When the condition script last ran.
    #[serde(default)]
    pub last_condition_check: Option<DateTime<Utc>>,
    /// Last condition or parse failure, truncated for storage.
    #[serde(default)]
    pub last_error: Option<String>,
    /// Content hash of the folder this record describes. A mismatch on scan
    /// means the folder was redeployed and the record is reset.
    pub content_hash: String,
}

/// Longest error message persisted in a record.
const MAX_STORED_ERROR_LEN: usize = 1024;

impl LifecycleRecord {
    /// Builds the record for a module seen for the first time (or redeployed
    /// with changed content).
    ///
    /// Initial status: `ConditionWait` for conditional modules, `Pending`
    /// when a future schedule exists, otherwise `Eligible`.
    pub fn first_sight(descriptor: &ModuleDescriptor, now: DateTime<Utc>) -> Self {
        let status = if descriptor.is_conditional() {
            ModuleStatus::ConditionWait
        } else if descriptor.schedule_pending(now) {
            ModuleStatus::Pending
        } else {
            ModuleStatus::Eligible
        };

        Self {
            status,
            first_seen: now,
            scheduled_at: descriptor.schedule,
            completed_at: None,
            last_condition_check: None,
            last_error: None,
            content_hash: descriptor.content_hash.clone(),
        }
    }

    /// Records a fatal condition or parse failure and moves to `Error`.
    pub fn mark_error(&mut self, message: &str) {
        self.status = ModuleStatus::Error;
        let mut stored = message.to_owned();
        if stored.len() > MAX_STORED_ERROR_LEN {
            let cut = stored
                .char_indices()
                .map(|(i, _)| i)
                .take_while(|i| *i <= MAX_STORED_ERROR_LEN)
                .last()
                .unwrap_or(0);
            stored.truncate(cut);
        }
        self.last_error = Some(stored);
    }

    /// Marks the module acknowledged by the user.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.status = ModuleStatus::Completed;
        self.completed_at = Some(now);
    }

    /// Returns `true` when the condition is due for (re-)evaluation.
    ///
    /// A never-checked condition is due immediately; afterwards checks run
    /// no more often than `recheck_minutes`.
    pub fn condition_due(&self, recheck_minutes: u32, now: DateTime<Utc>) -> bool {
        match self.last_condition_check {
            None => true,
            Some(last) => now >= last + chrono::Duration::minutes(i64::from(recheck_minutes)),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
