use rostersync_core::{Config, SqliteTargetStore};

pub fn run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(dir) = config.target.path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    SqliteTargetStore::create(&config.target.path, config.sync.store_timeout())?;
    println!("target schema ready: {}", config.target.path.display());
    Ok(())
}
