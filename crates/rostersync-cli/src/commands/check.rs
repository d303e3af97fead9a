use rostersync_core::Config;

pub fn run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let engine = super::open_engine(config)?;
    engine.check()?;
    println!("source: ok ({})", config.source.path.display());
    println!("target: ok ({})", config.target.path.display());
    Ok(())
}
