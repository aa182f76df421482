//! herald: a module notification lifecycle daemon.
//!
//! Administrators drop self-contained "module" folders (a `manifest.json`
//! plus optional assets and a condition script) into a watched directory.
//! herald reconciles that directory against a durable state store on a
//! timer: it decides when each module becomes eligible, runs condition
//! scripts under a timeout to gate visibility, hands eligible modules to a
//! presentation layer over a channel, and records the user's response so a
//! module is acknowledged exactly once across restarts.
//!
//! The crate is the engine only. Rendering notifications, playing sounds,
//! opening media, and reporting user input activity are the presentation
//! layer's job, connected through [`engine::PresentEvent`] and
//! [`engine::UserAction`] channels plus an [`idle::IdleSource`].

pub mod condition;
pub mod config;
pub mod engine;
pub mod error;
pub mod idle;
pub mod lifecycle;
pub mod manifest;
pub mod module;
pub mod repository;
pub mod runner;
pub mod store;

pub use condition::{ConditionVerdict, ConditionalExecutor};
pub use config::{DaemonConfig, EffectiveSettings};
pub use engine::{DisplayRequest, LifecycleEngine, PresentEvent, TickSummary, UserAction};
pub use error::{HeraldError, Result};
pub use idle::{IdleMonitor, IdleSource, SharedIdleSource};
pub use lifecycle::{LifecycleRecord, ModuleStatus};
pub use manifest::ModuleManifest;
pub use module::ModuleDescriptor;
pub use repository::ModuleRepository;
pub use runner::EngineRunner;
pub use store::{MemoryStore, SqliteStore, StateStore};
