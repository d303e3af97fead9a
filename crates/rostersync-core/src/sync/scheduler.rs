//! Interval scheduler for sync passes.
//!
//! Runs a pass immediately, then once per timer fire. The scheduler loop owns
//! its `Idle`/`Running` state; a fire that arrives while a pass is running is
//! dropped, never queued. Passes execute on tokio's blocking pool because the
//! stores are synchronous.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::types::SyncReport;
use crate::error::SyncError;

/// Stand-in for "never" when a deadline or period does not fit an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn instant_after(start: Instant, after: Duration) -> Instant {
    start
        .checked_add(after)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

/// A unit of work the scheduler can run. Blocking.
pub trait SyncPass: Send + Sync + 'static {
    fn run_pass(&self) -> Result<SyncReport, SyncError>;

    /// Ask a running pass to fail fast. Called from the scheduler thread.
    fn interrupt(&self) {}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    #[default]
    Idle,
    Running,
}

/// Counters published after every state change and returned on shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerReport {
    pub state: SchedulerState,
    pub runs_succeeded: u64,
    pub runs_failed: u64,
    pub fires_dropped: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

struct RunningPass {
    handle: JoinHandle<Result<SyncReport, SyncError>>,
    started: Instant,
    deadline: Instant,
    interrupted: bool,
}

enum State {
    Idle,
    Running(RunningPass),
}

impl State {
    fn is_running(&self) -> bool {
        matches!(self, State::Running(_))
    }
}

async fn join_running(
    state: &mut State,
) -> Result<Result<SyncReport, SyncError>, tokio::task::JoinError> {
    match state {
        State::Running(pass) => (&mut pass.handle).await,
        State::Idle => std::future::pending().await,
    }
}

pub struct Scheduler<P> {
    pass: Arc<P>,
    run_timeout: Duration,
    status: watch::Sender<SchedulerReport>,
}

impl<P: SyncPass> Scheduler<P> {
    pub fn new(pass: Arc<P>, run_timeout: Duration) -> Self {
        let (status, _) = watch::channel(SchedulerReport::default());
        Self {
            pass,
            run_timeout,
            status,
        }
    }

    /// Observe state and counters while the scheduler runs.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerReport> {
        self.status.subscribe()
    }

    /// Drive the scheduler from an explicit fire source. Returns once `fires`
    /// is closed and no pass is running.
    pub async fn run(self, mut fires: mpsc::Receiver<()>) -> SchedulerReport {
        let mut report = SchedulerReport::default();
        let mut state = self.start_pass(&mut report);
        let mut fires_open = true;

        loop {
            if !fires_open && !state.is_running() {
                break;
            }

            let deadline = match &state {
                State::Running(pass) if !pass.interrupted => Some(pass.deadline),
                _ => None,
            };

            tokio::select! {
                fire = fires.recv(), if fires_open => match fire {
                    Some(()) if state.is_running() => {
                        report.fires_dropped += 1;
                        tracing::debug!("sync pass still running; timer fire dropped");
                        self.publish(&report);
                    }
                    Some(()) => state = self.start_pass(&mut report),
                    None => fires_open = false,
                },
                joined = join_running(&mut state) => {
                    let elapsed = match std::mem::replace(&mut state, State::Idle) {
                        State::Running(pass) => self.finish_pass(&mut report, joined, &pass),
                        State::Idle => Duration::ZERO,
                    };
                    tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, "scheduler idle");
                    report.state = SchedulerState::Idle;
                    self.publish(&report);
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let State::Running(pass) = &mut state {
                        tracing::warn!(
                            timeout_secs = self.run_timeout.as_secs(),
                            "sync pass overran its deadline; interrupting stores"
                        );
                        pass.interrupted = true;
                        self.pass.interrupt();
                    }
                },
            }
        }

        report
    }

    fn start_pass(&self, report: &mut SchedulerReport) -> State {
        let pass = Arc::clone(&self.pass);
        let started = Instant::now();
        let handle = tokio::task::spawn_blocking(move || pass.run_pass());
        report.state = SchedulerState::Running;
        self.publish(report);
        State::Running(RunningPass {
            handle,
            started,
            deadline: instant_after(started, self.run_timeout),
            interrupted: false,
        })
    }

    fn finish_pass(
        &self,
        report: &mut SchedulerReport,
        joined: Result<Result<SyncReport, SyncError>, tokio::task::JoinError>,
        pass: &RunningPass,
    ) -> Duration {
        let outcome = match joined {
            Ok(Err(_)) if pass.interrupted => Err(SyncError::Timeout {
                secs: self.run_timeout.as_secs(),
            }),
            Ok(outcome) => outcome,
            Err(e) => Err(SyncError::Aborted(e.to_string())),
        };

        report.last_run_at = Some(Utc::now());
        match outcome {
            Ok(summary) => {
                report.runs_succeeded += 1;
                report.last_error = None;
                tracing::info!(
                    added = summary.added,
                    removed = summary.removed,
                    "sync pass completed"
                );
            }
            Err(e) => {
                report.runs_failed += 1;
                report.last_error = Some(e.to_string());
                tracing::error!(error = %e, "sync pass failed");
            }
        }
        pass.started.elapsed()
    }

    fn publish(&self, report: &SchedulerReport) {
        self.status.send_replace(report.clone());
    }
}

/// Send a fire every `interval`, starting one interval from now.
///
/// Periods beyond thirty years are clamped.
pub fn spawn_ticker(interval: Duration, fires: mpsc::Sender<()>) -> JoinHandle<()> {
    let period = interval.min(FAR_FUTURE);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(instant_after(Instant::now(), period), period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if fires.send(()).await.is_err() {
                break;
            }
        }
    })
}
