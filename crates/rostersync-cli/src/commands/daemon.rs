//! Long-running scheduler.

use std::sync::Arc;

use rostersync_core::sync::spawn_ticker;
use rostersync_core::{Config, Scheduler};
use tokio::signal;
use tokio::sync::mpsc;

pub fn run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let engine = super::open_engine(config)?;
    // Refuse to schedule anything against a store that does not answer.
    engine.check()?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(serve(config, engine))
}

async fn serve(config: &Config, engine: super::Engine) -> Result<(), Box<dyn std::error::Error>> {
    let interval = config.sync.interval();
    tracing::info!(
        interval_minutes = config.sync.interval_minutes,
        source = %config.source.path.display(),
        target = %config.target.path.display(),
        "rostersync daemon starting"
    );

    let scheduler = Scheduler::new(Arc::new(engine), config.sync.run_timeout());
    let (fires, rx) = mpsc::channel(1);
    let ticker = spawn_ticker(interval, fires);
    let mut scheduler = tokio::spawn(scheduler.run(rx));

    tokio::select! {
        _ = shutdown_signal() => {
            tracing::info!("shutdown requested; waiting for the current pass");
            ticker.abort();
        }
        joined = &mut scheduler => {
            ticker.abort();
            let report = joined?;
            tracing::warn!(?report, "scheduler stopped on its own");
            return Ok(());
        }
    }

    let report = scheduler.await?;
    tracing::info!(
        runs_succeeded = report.runs_succeeded,
        runs_failed = report.runs_failed,
        fires_dropped = report.fires_dropped,
        "rostersync daemon stopped"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
