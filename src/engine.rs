//! The lifecycle engine: reconciles disk, store, and user actions.
//!
//! One [`LifecycleEngine::tick_at`] call is one full reconciliation pass:
//! scan the module directory, merge each descriptor with its persisted
//! record, evaluate due conditions, advance non-terminal states, hand
//! newly-eligible modules to the presentation boundary, and tombstone
//! records whose folders vanished out-of-band.
//!
//! Every state transition is committed to the store before the next module
//! is considered, so a crash mid-tick loses at most the transition in
//! flight and never corrupts neighbors.

use crate::condition::{ConditionVerdict, ConditionalExecutor, condition_timeout};
use crate::config::EffectiveSettings;
use crate::error::{HeraldError, Result};
use crate::idle::IdleMonitor;
use crate::lifecycle::{LifecycleRecord, ModuleStatus};
use crate::module::{AssetRef, IconRef, ModuleDescriptor, ModuleKind};
use crate::repository::ModuleRepository;
use crate::store::StateStore;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// What the presentation layer is asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresentEvent {
    /// Surface one module to the user.
    Show(DisplayRequest),
    /// Withdraw everything currently on screen (daemon disabled or exiting).
    HideAll,
}

/// Everything the presentation layer needs to render one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayRequest {
    /// Module ID, echoed back in user actions.
    pub module_id: String,
    /// Notification title.
    pub title: String,
    /// Notification body.
    pub message: String,
    /// Grouping label.
    pub category: String,
    /// Optional icon.
    pub icon: Option<IconRef>,
    /// Optional media target for "open" requests.
    pub media: Option<AssetRef>,
    /// Whether to play a sound. Already gated by the process-wide setting.
    pub sound: bool,
}

/// A user's response to a displayed module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    /// The user acknowledged the module; it is done forever.
    Acknowledge(String),
    /// The user asked to be reminded later.
    DeferLater(String),
    /// The user asked to open the module's media. Display state is unchanged.
    OpenMedia(String),
}

/// Counters for one reconciliation pass, for logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    /// Module folders parsed successfully.
    pub scanned: usize,
    /// Module folders that failed to parse.
    pub parse_errors: usize,
    /// Condition scripts run this tick.
    pub conditions_run: usize,
    /// Modules handed to the presentation layer this tick.
    pub displayed: usize,
    /// Orphaned records tombstoned this tick.
    pub orphaned: usize,
}

/// Reconciles the module directory against the state store.
pub struct LifecycleEngine {
    repository: ModuleRepository,
    store: Arc<dyn StateStore>,
    executor: ConditionalExecutor,
    idle: IdleMonitor,
    present_tx: mpsc::Sender<PresentEvent>,
}

impl LifecycleEngine {
    pub fn new(
        repository: ModuleRepository,
        store: Arc<dyn StateStore>,
        executor: ConditionalExecutor,
        idle: IdleMonitor,
        present_tx: mpsc::Sender<PresentEvent>,
    ) -> Self {
        Self {
            repository,
            store,
            executor,
            idle,
            present_tx,
        }
    }

    /// Runs one reconciliation pass at the given instant.
    ///
    /// # Errors
    ///
    /// Fails only when the module directory itself is unreachable or the
    /// store rejects a write; individual module failures are absorbed into
    /// their own records.
    pub async fn tick_at(
        &self,
        now: DateTime<Utc>,
        settings: &EffectiveSettings,
    ) -> Result<TickSummary> {
        let outcome = self.repository.scan()?;
        let mut summary = TickSummary {
            scanned: outcome.modules.len(),
            parse_errors: outcome.errors.len(),
            ..TickSummary::default()
        };

        for (path, e) in &outcome.errors {
            warn!(module = %path.display(), "unparseable module folder: {e}");
        }

        // Merge each on-disk module with its record and advance state.
        let mut eligible: Vec<(ModuleDescriptor, LifecycleRecord)> = Vec::new();
        let mut condition_jobs: Vec<(ModuleDescriptor, LifecycleRecord)> = Vec::new();

        for descriptor in outcome.modules {
            let record = match self.merge_record(&descriptor, now, settings)? {
                Some(record) => record,
                None => continue,
            };

            match record.status {
                ModuleStatus::ConditionWait => {
                    if let ModuleKind::Conditional {
                        recheck_minutes, ..
                    } = descriptor.kind
                    {
                        if record.condition_due(recheck_minutes, now) {
                            condition_jobs.push((descriptor, record));
                        }
                    }
                }
                ModuleStatus::Pending => {
                    if !descriptor.schedule_pending(now) {
                        let mut record = record;
                        record.status = ModuleStatus::Eligible;
                        self.store.put_record(&descriptor.id, &record)?;
                        eligible.push((descriptor, record));
                    }
                }
                ModuleStatus::Deferred => {
                    if self.idle.gate_open() {
                        debug!(
                            module = descriptor.id,
                            idle_secs = self.idle.idle_duration().as_secs(),
                            "idle gate open, resurfacing deferred module"
                        );
                        let mut record = record;
                        record.status = ModuleStatus::Eligible;
                        self.store.put_record(&descriptor.id, &record)?;
                        eligible.push((descriptor, record));
                    }
                }
                ModuleStatus::Eligible => eligible.push((descriptor, record)),
                // Displayed stays with the presentation layer until a user
                // action or restart resurfacing moves it.
                ModuleStatus::Displayed => {}
                ModuleStatus::Completed | ModuleStatus::Expired | ModuleStatus::Error => {}
            }
        }

        summary.conditions_run = condition_jobs.len();
        let fired = self.run_conditions(condition_jobs, now, settings).await?;
        eligible.extend(fired);

        summary.displayed = self.display_eligible(eligible, now, settings).await?;
        summary.orphaned = self.tombstone_orphans(now)?;

        info!(
            scanned = summary.scanned,
            parse_errors = summary.parse_errors,
            conditions = summary.conditions_run,
            displayed = summary.displayed,
            orphaned = summary.orphaned,
            "scan tick complete"
        );
        Ok(summary)
    }

    /// Loads (or creates) the record for a descriptor and handles the
    /// transitions that depend only on disk content: redeployment resets,
    /// expiry, and terminal cleanup.
    ///
    /// Returns `None` when the module needs no further processing this tick.
    fn merge_record(
        &self,
        descriptor: &ModuleDescriptor,
        now: DateTime<Utc>,
        settings: &EffectiveSettings,
    ) -> Result<Option<LifecycleRecord>> {
        let existing = self.store.get_record(&descriptor.id)?;

        let record = match existing {
            Some(record) if record.content_hash == descriptor.content_hash => record,
            Some(record) => {
                info!(
                    module = descriptor.id,
                    previous_status = %record.status,
                    "module content changed, restarting lifecycle"
                );
                let fresh = LifecycleRecord::first_sight(descriptor, now);
                self.store.put_record(&descriptor.id, &fresh)?;
                fresh
            }
            None => {
                info!(module = descriptor.id, "new module discovered");
                let fresh = LifecycleRecord::first_sight(descriptor, now);
                self.store.put_record(&descriptor.id, &fresh)?;
                fresh
            }
        };

        if record.status.is_terminal() {
            // A finished module's folder may linger (crash between commit and
            // delete, or redeployed with identical content): remove it here.
            if settings.auto_delete_modules {
                self.cleanup_folder(&descriptor.id);
            }
            return Ok(None);
        }

        if descriptor.is_expired(now) {
            info!(module = descriptor.id, "module expired before completion");
            let mut record = record;
            record.status = ModuleStatus::Expired;
            self.store.put_record(&descriptor.id, &record)?;
            if settings.auto_delete_modules {
                self.cleanup_folder(&descriptor.id);
            }
            return Ok(None);
        }

        Ok(Some(record))
    }

    /// Evaluates due condition scripts concurrently and applies verdicts.
    ///
    /// Returns the modules whose conditions fired and are now eligible.
    async fn run_conditions(
        &self,
        jobs: Vec<(ModuleDescriptor, LifecycleRecord)>,
        now: DateTime<Utc>,
        settings: &EffectiveSettings,
    ) -> Result<Vec<(ModuleDescriptor, LifecycleRecord)>> {
        let mut set: JoinSet<(usize, ConditionVerdict)> = JoinSet::new();
        let mut task_index: HashMap<tokio::task::Id, usize> = HashMap::new();
        for (index, (descriptor, _)) in jobs.iter().enumerate() {
            let ModuleKind::Conditional {
                ref script,
                recheck_minutes,
            } = descriptor.kind
            else {
                continue;
            };
            let executor = self.executor.clone();
            let script = script.clone();
            let module_root = descriptor.root.clone();
            let module_id = descriptor.id.clone();
            let timeout = condition_timeout(recheck_minutes, settings.scan_interval_secs);
            let handle = set.spawn(async move {
                let verdict = executor
                    .evaluate(&module_id, &script, &module_root, timeout)
                    .await;
                (index, verdict)
            });
            task_index.insert(handle.id(), index);
        }

        let mut verdicts: BTreeMap<usize, ConditionVerdict> = BTreeMap::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, verdict)) => {
                    verdicts.insert(index, verdict);
                }
                // A crashed task only dooms its own module; the rest of the
                // batch keeps its verdicts.
                Err(e) => {
                    warn!("condition task failed: {e}");
                    if let Some(index) = task_index.get(&e.id()) {
                        verdicts.insert(
                            *index,
                            ConditionVerdict::Error(format!("condition task failed: {e}")),
                        );
                    }
                }
            }
        }

        let mut fired = Vec::new();
        for (index, (descriptor, mut record)) in jobs.into_iter().enumerate() {
            let Some(verdict) = verdicts.remove(&index) else {
                continue;
            };
            record.last_condition_check = Some(now);
            match verdict {
                ConditionVerdict::Fire => {
                    record.status = if descriptor.schedule_pending(now) {
                        ModuleStatus::Pending
                    } else {
                        ModuleStatus::Eligible
                    };
                    info!(module = descriptor.id, status = %record.status, "condition fired");
                    self.store.put_record(&descriptor.id, &record)?;
                    if record.status == ModuleStatus::Eligible {
                        fired.push((descriptor, record));
                    }
                }
                ConditionVerdict::Wait => {
                    self.store.put_record(&descriptor.id, &record)?;
                }
                ConditionVerdict::Error(message) => {
                    warn!(module = descriptor.id, "condition failed permanently: {message}");
                    record.mark_error(&message);
                    self.store.put_record(&descriptor.id, &record)?;
                    // A broken script never recovers; remove the folder so it
                    // stops being scanned.
                    if let Err(e) = self.repository.remove_module_dir(&descriptor.id) {
                        warn!(module = descriptor.id, "cannot remove failed module: {e}");
                    }
                }
            }
        }
        Ok(fired)
    }

    /// Hands eligible modules to the presentation layer in deterministic
    /// order and commits the `Displayed` transition for each handoff.
    async fn display_eligible(
        &self,
        mut eligible: Vec<(ModuleDescriptor, LifecycleRecord)>,
        _now: DateTime<Utc>,
        settings: &EffectiveSettings,
    ) -> Result<usize> {
        eligible.sort_by(|(a, ra), (b, rb)| {
            let ka = (ra.scheduled_at.unwrap_or(ra.first_seen), a.title.as_str());
            let kb = (rb.scheduled_at.unwrap_or(rb.first_seen), b.title.as_str());
            ka.cmp(&kb)
        });

        let mut displayed = 0;
        for (descriptor, mut record) in eligible {
            let request = DisplayRequest {
                module_id: descriptor.id.clone(),
                title: descriptor.title.clone(),
                message: descriptor.message.clone(),
                category: descriptor.category.clone(),
                icon: descriptor.icon.clone(),
                media: descriptor.media.clone(),
                sound: descriptor.sound && settings.sound_enabled,
            };
            if self.present_tx.send(PresentEvent::Show(request)).await.is_err() {
                // Presentation side is gone; stay Eligible and retry next tick.
                warn!(module = descriptor.id, "presentation channel closed, keeping eligible");
                break;
            }
            record.status = ModuleStatus::Displayed;
            self.store.put_record(&descriptor.id, &record)?;
            displayed += 1;
        }
        Ok(displayed)
    }

    /// Tombstones non-terminal records whose folders are gone.
    ///
    /// Records are kept (as `Expired`) rather than deleted so an identical
    /// folder reappearing later cannot resurrect a finished module.
    fn tombstone_orphans(&self, _now: DateTime<Utc>) -> Result<usize> {
        let records = self.store.list_records()?;
        let mut orphaned = 0;
        for (module_id, mut record) in records {
            if record.status.is_terminal() {
                continue;
            }
            if self.repository.root().join(&module_id).is_dir() {
                continue;
            }
            info!(module = module_id, previous_status = %record.status, "module folder removed out-of-band");
            record.status = ModuleStatus::Expired;
            self.store.put_record(&module_id, &record)?;
            orphaned += 1;
        }
        Ok(orphaned)
    }

    /// Applies a user's response to a displayed module.
    ///
    /// Actions against unknown or already-terminal modules are logged and
    /// dropped; the user may race a tick that finished the module first.
    pub fn apply_user_action(
        &self,
        action: &UserAction,
        now: DateTime<Utc>,
        settings: &EffectiveSettings,
    ) -> Result<()> {
        let module_id = match action {
            UserAction::Acknowledge(id)
            | UserAction::DeferLater(id)
            | UserAction::OpenMedia(id) => id.as_str(),
        };

        let Some(mut record) = self.store.get_record(module_id)? else {
            warn!(module = module_id, "user action for unknown module, ignoring");
            return Ok(());
        };
        if record.status.is_terminal() {
            debug!(module = module_id, status = %record.status, "user action for finished module, ignoring");
            return Ok(());
        }

        match action {
            UserAction::Acknowledge(_) => {
                info!(module = module_id, "module acknowledged");
                record.mark_completed(now);
                self.store.put_record(module_id, &record)?;
                if settings.auto_delete_modules {
                    self.cleanup_folder(module_id);
                }
            }
            UserAction::DeferLater(_) => {
                info!(module = module_id, "module deferred");
                record.status = ModuleStatus::Deferred;
                self.store.put_record(module_id, &record)?;
            }
            UserAction::OpenMedia(_) => {
                // Opening happens on the presentation side; only note it.
                debug!(module = module_id, "media opened");
            }
        }
        Ok(())
    }

    /// Returns `Displayed` records to `Eligible`.
    ///
    /// Run once at startup: a notification shown by a previous process
    /// instance died with it, so the module must surface again.
    pub fn resurface_displayed(&self) -> Result<usize> {
        let records = self.store.list_records()?;
        let mut resurfaced = 0;
        for (module_id, mut record) in records {
            if record.status != ModuleStatus::Displayed {
                continue;
            }
            record.status = ModuleStatus::Eligible;
            self.store.put_record(&module_id, &record)?;
            resurfaced += 1;
        }
        if resurfaced > 0 {
            info!(count = resurfaced, "resurfacing modules displayed by previous run");
        }
        Ok(resurfaced)
    }

    /// Asks the presentation layer to withdraw everything on screen.
    pub async fn hide_all(&self) -> Result<()> {
        self.present_tx
            .send(PresentEvent::HideAll)
            .await
            .map_err(|_| HeraldError::Channel("presentation channel closed".to_owned()))
    }

    fn cleanup_folder(&self, module_id: &str) {
        if let Err(e) = self.repository.remove_module_dir(module_id) {
            warn!(module = module_id, "cannot remove module folder: {e}");
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::idle::FixedIdleSource;
    use crate::manifest::parse_utc;
    use crate::store::MemoryStore;
    use std::path::Path;
    use std::time::Duration;

    struct Harness {
        _guard: tempfile::TempDir,
        root: std::path::PathBuf,
        store: Arc<MemoryStore>,
        engine: LifecycleEngine,
        present_rx: mpsc::Receiver<PresentEvent>,
    }

    fn harness_with_idle(idle: Duration) -> Harness {
        let guard = tempfile::tempdir().expect("tempdir");
        let root = guard.path().join("modules");
        std::fs::create_dir_all(&root).expect("mkdir");
        let store = Arc::new(MemoryStore::new());
        let (present_tx, present_rx) = mpsc::channel(64);
        let engine = LifecycleEngine::new(
            ModuleRepository::new(&root),
            store.clone() as Arc<dyn StateStore>,
            ConditionalExecutor::new(2).with_interpreter("/bin/sh", Vec::new()),
            IdleMonitor::new(Arc::new(FixedIdleSource(idle))),
            present_tx,
        );
        Harness {
            _guard: guard,
            root,
            store,
            engine,
            present_rx,
        }
    }

    fn harness() -> Harness {
        harness_with_idle(Duration::ZERO)
    }

    fn add_module(root: &Path, name: &str, json: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(dir.join("manifest.json"), json).expect("write");
    }

    fn add_conditional(root: &Path, name: &str, script_body: &str) {
        add_module(
            root,
            name,
            r#"{"title": "T", "message": "M", "type": "conditional",
                "condition_script": "check.sh", "condition_interval_minutes": 60}"#,
        );
        std::fs::write(root.join(name).join("check.sh"), script_body).expect("script");
    }

    fn now() -> DateTime<Utc> {
        parse_utc("2026-03-01T12:00:00Z", "t").unwrap()
    }

    fn status_of(h: &Harness, id: &str) -> ModuleStatus {
        h.store.get_record(id).unwrap().unwrap().status
    }

    #[tokio::test]
    async fn unscheduled_module_displays_on_first_tick() {
        let mut h = harness();
        add_module(&h.root, "m", r#"{"title": "T", "message": "M"}"#);

        let summary = h.engine.tick_at(now(), &EffectiveSettings::default()).await.unwrap();
        assert_eq!(summary.displayed, 1);
        assert_eq!(status_of(&h, "m"), ModuleStatus::Displayed);

        match h.present_rx.try_recv().unwrap() {
            PresentEvent::Show(request) => {
                assert_eq!(request.module_id, "m");
                assert_eq!(request.category, "General");
            }
            other => panic!("expected show, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn future_schedule_stays_pending_until_due() {
        let mut h = harness();
        add_module(
            &h.root,
            "m",
            r#"{"title": "T", "message": "M", "schedule": "2026-03-01T13:00:00Z"}"#,
        );
        let settings = EffectiveSettings::default();

        h.engine.tick_at(now(), &settings).await.unwrap();
        assert_eq!(status_of(&h, "m"), ModuleStatus::Pending);
        assert!(h.present_rx.try_recv().is_err());

        let later = now() + chrono::Duration::minutes(61);
        let summary = h.engine.tick_at(later, &settings).await.unwrap();
        assert_eq!(summary.displayed, 1);
        assert_eq!(status_of(&h, "m"), ModuleStatus::Displayed);
    }

    #[tokio::test]
    async fn double_tick_is_idempotent() {
        let mut h = harness();
        add_module(&h.root, "m", r#"{"title": "T", "message": "M"}"#);
        let settings = EffectiveSettings::default();

        h.engine.tick_at(now(), &settings).await.unwrap();
        let second = h.engine.tick_at(now(), &settings).await.unwrap();
        assert_eq!(second.displayed, 0);

        assert!(matches!(h.present_rx.try_recv(), Ok(PresentEvent::Show(_))));
        assert!(h.present_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn condition_wait_then_fire() {
        let mut h = harness();
        add_conditional(&h.root, "m", "exit 0\n");
        let settings = EffectiveSettings::default();

        h.engine.tick_at(now(), &settings).await.unwrap();
        assert_eq!(status_of(&h, "m"), ModuleStatus::ConditionWait);
        let record = h.store.get_record("m").unwrap().unwrap();
        assert_eq!(record.last_condition_check, Some(now()));

        // Within the recheck interval the script must not run again, even if
        // it would now fire.
        std::fs::write(h.root.join("m").join("check.sh"), "exit 1\n").unwrap();
        let soon = now() + chrono::Duration::minutes(30);
        let summary = h.engine.tick_at(soon, &settings).await.unwrap();
        assert_eq!(summary.conditions_run, 0);
        assert_eq!(status_of(&h, "m"), ModuleStatus::ConditionWait);

        let later = now() + chrono::Duration::minutes(60);
        let summary = h.engine.tick_at(later, &settings).await.unwrap();
        assert_eq!(summary.conditions_run, 1);
        assert_eq!(summary.displayed, 1);
        assert_eq!(status_of(&h, "m"), ModuleStatus::Displayed);
        assert!(matches!(h.present_rx.try_recv(), Ok(PresentEvent::Show(_))));
    }

    #[tokio::test]
    async fn condition_script_sees_its_own_module_folder() {
        let mut h = harness();
        // The script consults a data file deployed beside it, by relative
        // path, so it must run with the module folder as cwd.
        add_conditional(&h.root, "m", "[ -f marker.txt ] && exit 1\nexit 0\n");
        std::fs::write(h.root.join("m").join("marker.txt"), "ready").unwrap();
        let settings = EffectiveSettings::default();

        let summary = h.engine.tick_at(now(), &settings).await.unwrap();
        assert_eq!(summary.conditions_run, 1);
        assert_eq!(summary.displayed, 1);
        assert_eq!(status_of(&h, "m"), ModuleStatus::Displayed);
        assert!(matches!(h.present_rx.try_recv(), Ok(PresentEvent::Show(_))));
    }

    #[tokio::test]
    async fn one_broken_condition_never_blocks_the_batch() {
        let mut h = harness();
        add_conditional(&h.root, "broken", "exit 9\n");
        add_conditional(&h.root, "healthy", "exit 1\n");
        let settings = EffectiveSettings::default();

        let summary = h.engine.tick_at(now(), &settings).await.unwrap();
        assert_eq!(summary.conditions_run, 2);
        assert_eq!(summary.displayed, 1);
        assert_eq!(status_of(&h, "broken"), ModuleStatus::Error);
        assert_eq!(status_of(&h, "healthy"), ModuleStatus::Displayed);
    }

    #[tokio::test]
    async fn condition_failure_is_terminal_and_removes_folder() {
        let mut h = harness();
        add_conditional(&h.root, "m", "exit 7\n");
        let settings = EffectiveSettings::default();

        h.engine.tick_at(now(), &settings).await.unwrap();
        let record = h.store.get_record("m").unwrap().unwrap();
        assert_eq!(record.status, ModuleStatus::Error);
        assert!(record.last_error.as_ref().unwrap().contains("exited 7"));
        assert!(!h.root.join("m").exists());
        assert!(h.present_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn fired_condition_with_future_schedule_waits_for_schedule() {
        let mut h = harness();
        add_module(
            &h.root,
            "m",
            r#"{"title": "T", "message": "M", "schedule": "2026-03-01T18:00:00Z",
                "type": "conditional", "condition_script": "check.sh"}"#,
        );
        std::fs::write(h.root.join("m").join("check.sh"), "exit 1\n").unwrap();
        let settings = EffectiveSettings::default();

        h.engine.tick_at(now(), &settings).await.unwrap();
        assert_eq!(status_of(&h, "m"), ModuleStatus::Pending);
        assert!(h.present_rx.try_recv().is_err());

        let later = now() + chrono::Duration::hours(7);
        h.engine.tick_at(later, &settings).await.unwrap();
        assert_eq!(status_of(&h, "m"), ModuleStatus::Displayed);
    }

    #[tokio::test]
    async fn deferred_module_waits_for_idle_gate() {
        let mut h = harness();
        add_module(&h.root, "m", r#"{"title": "T", "message": "M"}"#);
        let settings = EffectiveSettings::default();

        h.engine.tick_at(now(), &settings).await.unwrap();
        h.present_rx.try_recv().unwrap();
        h.engine
            .apply_user_action(&UserAction::DeferLater("m".to_owned()), now(), &settings)
            .unwrap();
        assert_eq!(status_of(&h, "m"), ModuleStatus::Deferred);

        // Idle source reports zero idle time: the gate stays closed.
        let later = now() + chrono::Duration::hours(2);
        h.engine.tick_at(later, &settings).await.unwrap();
        assert_eq!(status_of(&h, "m"), ModuleStatus::Deferred);
        assert!(h.present_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn deferred_module_resurfaces_when_idle() {
        let mut h = harness_with_idle(Duration::from_secs(700));
        add_module(&h.root, "m", r#"{"title": "T", "message": "M"}"#);
        let settings = EffectiveSettings::default();

        h.engine.tick_at(now(), &settings).await.unwrap();
        h.present_rx.try_recv().unwrap();
        h.engine
            .apply_user_action(&UserAction::DeferLater("m".to_owned()), now(), &settings)
            .unwrap();

        let later = now() + chrono::Duration::minutes(20);
        let summary = h.engine.tick_at(later, &settings).await.unwrap();
        assert_eq!(summary.displayed, 1);
        assert_eq!(status_of(&h, "m"), ModuleStatus::Displayed);
    }

    #[tokio::test]
    async fn acknowledge_completes_and_deletes_folder() {
        let mut h = harness();
        add_module(&h.root, "m", r#"{"title": "T", "message": "M"}"#);
        let settings = EffectiveSettings::default();

        h.engine.tick_at(now(), &settings).await.unwrap();
        h.present_rx.try_recv().unwrap();
        h.engine
            .apply_user_action(&UserAction::Acknowledge("m".to_owned()), now(), &settings)
            .unwrap();

        let record = h.store.get_record("m").unwrap().unwrap();
        assert_eq!(record.status, ModuleStatus::Completed);
        assert_eq!(record.completed_at, Some(now()));
        assert!(!h.root.join("m").exists());

        // Completed record is a tombstone: nothing resurfaces later.
        let summary = h.engine.tick_at(now(), &settings).await.unwrap();
        assert_eq!(summary.displayed, 0);
    }

    #[tokio::test]
    async fn acknowledge_keeps_folder_when_auto_delete_off() {
        let mut h = harness();
        add_module(&h.root, "m", r#"{"title": "T", "message": "M"}"#);
        let settings = EffectiveSettings {
            auto_delete_modules: false,
            ..EffectiveSettings::default()
        };

        h.engine.tick_at(now(), &settings).await.unwrap();
        h.present_rx.try_recv().unwrap();
        h.engine
            .apply_user_action(&UserAction::Acknowledge("m".to_owned()), now(), &settings)
            .unwrap();

        assert_eq!(status_of(&h, "m"), ModuleStatus::Completed);
        assert!(h.root.join("m").exists());
    }

    #[tokio::test]
    async fn redeployed_identical_folder_is_swept_on_next_tick() {
        let mut h = harness();
        add_module(&h.root, "m", r#"{"title": "T", "message": "M"}"#);
        let settings = EffectiveSettings::default();

        h.engine.tick_at(now(), &settings).await.unwrap();
        h.present_rx.try_recv().unwrap();
        h.engine
            .apply_user_action(&UserAction::Acknowledge("m".to_owned()), now(), &settings)
            .unwrap();
        assert!(!h.root.join("m").exists());

        // Identical content comes back; the tombstone holds and the folder
        // is removed again without any display.
        add_module(&h.root, "m", r#"{"title": "T", "message": "M"}"#);
        let summary = h.engine.tick_at(now(), &settings).await.unwrap();
        assert_eq!(summary.displayed, 0);
        assert!(!h.root.join("m").exists());
        assert!(h.present_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn action_on_terminal_module_is_ignored() {
        let h = harness();
        add_module(&h.root, "m", r#"{"title": "T", "message": "M"}"#);
        let settings = EffectiveSettings::default();

        h.engine.tick_at(now(), &settings).await.unwrap();
        h.engine
            .apply_user_action(&UserAction::Acknowledge("m".to_owned()), now(), &settings)
            .unwrap();
        h.engine
            .apply_user_action(&UserAction::DeferLater("m".to_owned()), now(), &settings)
            .unwrap();
        assert_eq!(status_of(&h, "m"), ModuleStatus::Completed);
    }

    #[tokio::test]
    async fn expired_module_never_displays() {
        let mut h = harness();
        add_module(
            &h.root,
            "m",
            r#"{"title": "T", "message": "M", "expires": "2026-01-01T00:00:00Z"}"#,
        );
        let settings = EffectiveSettings::default();

        let summary = h.engine.tick_at(now(), &settings).await.unwrap();
        assert_eq!(summary.displayed, 0);
        assert_eq!(status_of(&h, "m"), ModuleStatus::Expired);
        assert!(!h.root.join("m").exists());
        assert!(h.present_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn removed_folder_tombstones_record() {
        let h = harness();
        add_module(
            &h.root,
            "m",
            r#"{"title": "T", "message": "M", "schedule": "2027-01-01T00:00:00Z"}"#,
        );
        let settings = EffectiveSettings::default();

        h.engine.tick_at(now(), &settings).await.unwrap();
        assert_eq!(status_of(&h, "m"), ModuleStatus::Pending);

        std::fs::remove_dir_all(h.root.join("m")).unwrap();
        let summary = h.engine.tick_at(now(), &settings).await.unwrap();
        assert_eq!(summary.orphaned, 1);
        assert_eq!(status_of(&h, "m"), ModuleStatus::Expired);
    }

    #[tokio::test]
    async fn redeployed_content_restarts_lifecycle() {
        let mut h = harness();
        add_module(&h.root, "m", r#"{"title": "T", "message": "M"}"#);
        let settings = EffectiveSettings {
            auto_delete_modules: false,
            ..EffectiveSettings::default()
        };

        h.engine.tick_at(now(), &settings).await.unwrap();
        h.present_rx.try_recv().unwrap();
        h.engine
            .apply_user_action(&UserAction::Acknowledge("m".to_owned()), now(), &settings)
            .unwrap();

        // Same folder, same content: the tombstone holds.
        let summary = h.engine.tick_at(now(), &settings).await.unwrap();
        assert_eq!(summary.displayed, 0);

        // Changed content: treated as a brand-new module.
        std::fs::write(
            h.root.join("m").join("manifest.json"),
            r#"{"title": "T2", "message": "M2"}"#,
        )
        .unwrap();
        let summary = h.engine.tick_at(now(), &settings).await.unwrap();
        assert_eq!(summary.displayed, 1);
        assert_eq!(status_of(&h, "m"), ModuleStatus::Displayed);
    }

    #[tokio::test]
    async fn eligible_modules_display_in_schedule_then_title_order() {
        let mut h = harness();
        add_module(
            &h.root,
            "b-later",
            r#"{"title": "Zed", "message": "M", "schedule": "2026-02-01T00:00:00Z"}"#,
        );
        add_module(
            &h.root,
            "a-early",
            r#"{"title": "Alpha", "message": "M", "schedule": "2026-01-01T00:00:00Z"}"#,
        );
        let settings = EffectiveSettings::default();

        h.engine.tick_at(now(), &settings).await.unwrap();
        let first = match h.present_rx.try_recv().unwrap() {
            PresentEvent::Show(r) => r.module_id,
            other => panic!("expected show, got {other:?}"),
        };
        let second = match h.present_rx.try_recv().unwrap() {
            PresentEvent::Show(r) => r.module_id,
            other => panic!("expected show, got {other:?}"),
        };
        assert_eq!(first, "a-early");
        assert_eq!(second, "b-later");
    }

    #[tokio::test]
    async fn sound_request_is_gated_by_settings() {
        let mut h = harness();
        add_module(
            &h.root,
            "m",
            r#"{"title": "T", "message": "M", "sound": "default"}"#,
        );
        let settings = EffectiveSettings {
            sound_enabled: false,
            ..EffectiveSettings::default()
        };

        h.engine.tick_at(now(), &settings).await.unwrap();
        match h.present_rx.try_recv().unwrap() {
            PresentEvent::Show(request) => assert!(!request.sound),
            other => panic!("expected show, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn resurface_returns_displayed_to_eligible() {
        let h = harness();
        add_module(&h.root, "m", r#"{"title": "T", "message": "M"}"#);
        let settings = EffectiveSettings::default();

        h.engine.tick_at(now(), &settings).await.unwrap();
        assert_eq!(status_of(&h, "m"), ModuleStatus::Displayed);

        let resurfaced = h.engine.resurface_displayed().unwrap();
        assert_eq!(resurfaced, 1);
        assert_eq!(status_of(&h, "m"), ModuleStatus::Eligible);
    }

    #[tokio::test]
    async fn unreachable_root_skips_the_tick() {
        let h = harness();
        std::fs::remove_dir_all(&h.root).unwrap();
        let err = h
            .engine
            .tick_at(now(), &EffectiveSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, HeraldError::Scan(_)));
    }

    #[tokio::test]
    async fn hide_all_reaches_presentation() {
        let mut h = harness();
        h.engine.hide_all().await.unwrap();
        assert_eq!(h.present_rx.try_recv().unwrap(), PresentEvent::HideAll);
    }
}
