pub mod check;
pub mod config;
pub mod daemon;
pub mod init_target;
pub mod sync;

use rostersync_core::error::Result;
use rostersync_core::{Config, MemberTag, SqliteSourceStore, SqliteTargetStore, SyncEngine};

pub type Engine = SyncEngine<SqliteSourceStore, SqliteTargetStore>;

/// Open both stores as configured.
pub fn open_engine(config: &Config) -> Result<Engine> {
    let source = SqliteSourceStore::open(
        &config.source.path,
        config.source.predicate(),
        config.sync.store_timeout(),
    )?;
    let target = SqliteTargetStore::open(&config.target.path, config.sync.store_timeout())?;
    let tag = MemberTag::new(config.sync.tag_id, config.sync.subject_type.clone());
    Ok(SyncEngine::new(source, target, tag))
}
