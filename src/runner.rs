//! The daemon control loop.
//!
//! Owns the scan cadence and the settings poll. Everything state-changing is
//! delegated to the [`LifecycleEngine`]; the runner only decides *when* a
//! tick happens and reacts to the master enable flag.

use crate::config::{EffectiveSettings, SETTINGS_POLL_INTERVAL};
use crate::engine::{LifecycleEngine, UserAction};
use crate::error::Result;
use crate::store::StateStore;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Drives the engine on a timer until cancelled.
pub struct EngineRunner {
    engine: LifecycleEngine,
    store: Arc<dyn StateStore>,
    action_rx: mpsc::Receiver<UserAction>,
    cancel: CancellationToken,
}

impl EngineRunner {
    pub fn new(
        engine: LifecycleEngine,
        store: Arc<dyn StateStore>,
        action_rx: mpsc::Receiver<UserAction>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            engine,
            store,
            action_rx,
            cancel,
        }
    }

    /// Runs until the cancellation token fires.
    ///
    /// Startup order: load settings, resurface modules a previous instance
    /// left on screen, then (when enabled) run an immediate first tick before
    /// settling into the scan interval.
    pub async fn run(mut self) -> Result<()> {
        let mut settings = EffectiveSettings::load(self.store.as_ref());
        info!(
            enabled = settings.enabled,
            scan_interval_secs = settings.scan_interval_secs,
            "runner starting"
        );

        if let Err(e) = self.engine.resurface_displayed() {
            warn!("cannot resurface previously displayed modules: {e}");
        }
        if settings.enabled {
            self.tick(&settings).await;
        }

        let mut scan_timer = tokio::time::interval(settings.scan_interval());
        scan_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        scan_timer.reset();
        let mut poll_timer = tokio::time::interval(SETTINGS_POLL_INTERVAL);
        poll_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    info!("runner shutting down");
                    if let Err(e) = self.engine.hide_all().await {
                        warn!("cannot withdraw notifications on shutdown: {e}");
                    }
                    return Ok(());
                }
                _ = scan_timer.tick() => {
                    if settings.enabled {
                        self.tick(&settings).await;
                    }
                }
                _ = poll_timer.tick() => {
                    let fresh = EffectiveSettings::load(self.store.as_ref());
                    self.apply_settings_change(&mut settings, fresh, &mut scan_timer).await;
                }
                action = self.action_rx.recv() => {
                    match action {
                        Some(action) => {
                            if let Err(e) = self.engine.apply_user_action(&action, Utc::now(), &settings) {
                                error!("cannot apply user action: {e}");
                            }
                        }
                        // Presentation side hung up; keep scanning regardless.
                        None => {}
                    }
                }
            }
        }
    }

    async fn tick(&self, settings: &EffectiveSettings) {
        if let Err(e) = self.engine.tick_at(Utc::now(), settings).await {
            // A failed scan skips this tick entirely; state is untouched.
            error!("scan tick failed: {e}");
        }
    }

    async fn apply_settings_change(
        &self,
        current: &mut EffectiveSettings,
        fresh: EffectiveSettings,
        scan_timer: &mut tokio::time::Interval,
    ) {
        if fresh == *current {
            return;
        }
        info!(
            enabled = fresh.enabled,
            scan_interval_secs = fresh.scan_interval_secs,
            "settings changed"
        );

        if fresh.scan_interval_secs != current.scan_interval_secs {
            *scan_timer = tokio::time::interval(fresh.scan_interval());
            scan_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            scan_timer.reset();
        }

        let was_enabled = current.enabled;
        *current = fresh;

        if was_enabled && !current.enabled {
            // Disabled: withdraw what is on screen, suppress future ticks.
            if let Err(e) = self.engine.hide_all().await {
                warn!("cannot withdraw notifications: {e}");
            }
        } else if !was_enabled && current.enabled {
            // Re-enabled: do not wait a full interval to catch up.
            self.tick(current).await;
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
