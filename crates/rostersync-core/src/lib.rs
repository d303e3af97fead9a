//! # Rostersync Core Library
//!
//! Keeps a target member directory in step with an authoritative source
//! roster. Every pass re-reads both sides, so the engine holds no state of
//! its own between runs.
//!
//! ## Architecture
//!
//! - **Storage**: read-only SQLite source, transactional SQLite target and
//!   TOML configuration
//! - **Sync**: readers, delta computation, the applier and the interval
//!   scheduler
//!
//! ## Key Components
//!
//! - [`SyncEngine`]: one reconciliation pass
//! - [`Scheduler`]: runs passes on an interval without overlap
//! - [`Config`]: daemon configuration
//! - [`SourceStore`] / [`TargetStore`]: store seams

pub mod error;
pub mod storage;
pub mod sync;

pub use error::{ApplyPath, ConfigError, CoreError, StoreError, SyncError};
pub use storage::{
    Config, SourceStore, SqliteSourceStore, SqliteTargetStore, TargetStore, TargetWriter,
};
pub use sync::{
    Delta, MemberTag, Scheduler, SchedulerReport, SchedulerState, SourceMember, SyncEngine,
    SyncPass, SyncReport, TargetMember,
};
