mod config;
pub mod source_db;
pub mod target_db;

pub use config::{Config, LogConfig, SourceConfig, SyncConfig, TargetConfig, CONFIG_ENV};
pub use source_db::{ActivityBoundary, ActivityPredicate, SqliteSourceStore};
pub use target_db::SqliteTargetStore;

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::sync::types::{Association, NewTargetMember, SourceMember, TargetMember};

/// Read surface of the authoritative roster.
pub trait SourceStore: Send + Sync {
    /// Trivial liveness query.
    fn ping(&self) -> Result<(), StoreError>;

    /// Members the store considers active at `now`.
    fn active_members(&self, now: DateTime<Utc>) -> Result<Vec<SourceMember>, StoreError>;

    /// Abort whatever statement is currently running. Called from another
    /// thread when a pass overruns its deadline.
    fn interrupt(&self) {}
}

/// Managed roster: read surface plus transactional writes.
pub trait TargetStore: Send + Sync {
    fn ping(&self) -> Result<(), StoreError>;

    /// Rows with no management link and a non-null nickname.
    fn unlinked_members(&self) -> Result<Vec<TargetMember>, StoreError>;

    /// Run `f` inside one transaction. Commits when `f` returns `Ok`, rolls
    /// back otherwise.
    fn transaction<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut dyn TargetWriter) -> Result<R, E>,
        E: From<StoreError>;

    fn interrupt(&self) {}
}

/// Write statements available inside a target transaction.
///
/// Every lookup and delete is restricted to rows without a management link.
pub trait TargetWriter {
    fn insert_members(&mut self, members: &[NewTargetMember]) -> Result<usize, StoreError>;

    /// `(id, nickname)` of unlinked rows whose nickname is in `nicknames`.
    fn resolve_ids(&mut self, nicknames: &[String]) -> Result<Vec<(i64, String)>, StoreError>;

    fn insert_associations(&mut self, rows: &[Association]) -> Result<usize, StoreError>;

    fn delete_associations(&mut self, subject_type: &str, ids: &[i64])
        -> Result<usize, StoreError>;

    fn delete_members(&mut self, nicknames: &[String]) -> Result<usize, StoreError>;
}

/// Returns `~/.config/rostersync[-dev]/` based on ROSTERSYNC_ENV.
///
/// Set ROSTERSYNC_ENV=dev to use development data directory. The directory is
/// created lazily by whoever writes into it first.
pub fn data_dir() -> PathBuf {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    match std::env::var("ROSTERSYNC_ENV").as_deref() {
        Ok("dev") => base_dir.join("rostersync-dev"),
        _ => base_dir.join("rostersync"),
    }
}

/// `?1, ?2, ... ?n` for an `IN (...)` clause.
pub(crate) fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
}
