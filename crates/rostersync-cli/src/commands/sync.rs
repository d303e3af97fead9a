//! Forced single pass, or a preview of what a pass would change.

use chrono::Utc;
use rostersync_core::{Config, Delta, SyncReport};

pub fn run(config: &Config, dry_run: bool, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let engine = super::open_engine(config)?;
    engine.check()?;

    if dry_run {
        let delta = engine.plan(Utc::now())?;
        if json {
            println!("{}", serde_json::to_string_pretty(&delta)?);
        } else {
            print_delta(&delta);
        }
        return Ok(());
    }

    let report = engine.run_once(Utc::now())?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_delta(delta: &Delta) {
    if delta.is_empty() {
        println!("Target is up to date.");
        return;
    }
    println!("Would add {} member(s):", delta.to_add.len());
    for m in &delta.to_add {
        println!("  + {} ({} {})", m.login, m.first_name, m.last_name);
    }
    println!("Would remove {} member(s):", delta.to_remove.len());
    for m in &delta.to_remove {
        println!("  - {} (id {})", m.nickname, m.id);
    }
}

fn print_report(report: &SyncReport) {
    let elapsed = report.finished_at - report.started_at;
    println!(
        "Added {}, removed {} ({} source, {} target) in {}ms",
        report.added,
        report.removed,
        report.source_count,
        report.target_count,
        elapsed.num_milliseconds()
    );
}
