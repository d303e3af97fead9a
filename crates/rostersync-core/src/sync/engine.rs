//! One reconciliation pass: read both rosters, diff, apply.

use chrono::{DateTime, Utc};

use super::applier::{apply_additions, apply_removals, MemberTag};
use super::delta::compute_delta;
use super::reader::{read_source, read_target};
use super::scheduler::SyncPass;
use super::types::{Delta, SourceMember, SyncReport, TargetMember};
use crate::error::SyncError;
use crate::storage::{SourceStore, TargetStore};

/// Stateless pipeline over a source and a target store. Everything a pass
/// needs is re-read from the stores each time.
pub struct SyncEngine<S, T> {
    source: S,
    target: T,
    tag: MemberTag,
}

impl<S: SourceStore, T: TargetStore> SyncEngine<S, T> {
    pub fn new(source: S, target: T, tag: MemberTag) -> Self {
        Self {
            source,
            target,
            tag,
        }
    }

    #[cfg(test)]
    pub(crate) fn target(&self) -> &T {
        &self.target
    }

    /// Liveness query on both stores.
    ///
    /// # Errors
    /// `SourceUnavailable` or `TargetUnavailable` for the first store that
    /// does not answer.
    pub fn check(&self) -> Result<(), SyncError> {
        self.source.ping().map_err(SyncError::SourceUnavailable)?;
        self.target.ping().map_err(SyncError::TargetUnavailable)?;
        Ok(())
    }

    /// Read both rosters concurrently. A source failure is reported ahead of
    /// a target failure.
    pub fn read(
        &self,
        now: DateTime<Utc>,
    ) -> Result<(Vec<SourceMember>, Vec<TargetMember>), SyncError> {
        std::thread::scope(|scope| {
            let source = scope.spawn(|| read_source(&self.source, now));
            let target = read_target(&self.target);
            let source = source
                .join()
                .map_err(|_| SyncError::Aborted("source reader panicked".into()))?;
            Ok((source?, target?))
        })
    }

    /// Compute the delta without writing anything.
    pub fn plan(&self, now: DateTime<Utc>) -> Result<Delta, SyncError> {
        let (source, target) = self.read(now)?;
        Ok(compute_delta(&source, &target))
    }

    /// Run a full pass with `now` as the run clock.
    ///
    /// # Errors
    /// Any [`SyncError`]; the pass stops at the first failure.
    pub fn run_once(&self, now: DateTime<Utc>) -> Result<SyncReport, SyncError> {
        let (source, target) = self.read(now)?;
        let delta = compute_delta(&source, &target);
        tracing::debug!(
            source = source.len(),
            target = target.len(),
            to_add = delta.to_add.len(),
            to_remove = delta.to_remove.len(),
            "delta computed"
        );

        let added = apply_additions(&self.target, &self.tag, &delta.to_add, now)?;
        let removed = apply_removals(&self.target, &self.tag, &delta.to_remove)?;

        tracing::info!("{added} members added");
        tracing::info!("{removed} members removed");

        Ok(SyncReport {
            started_at: now,
            finished_at: Utc::now(),
            source_count: source.len(),
            target_count: target.len(),
            added,
            removed,
        })
    }
}

impl<S, T> SyncPass for SyncEngine<S, T>
where
    S: SourceStore + 'static,
    T: TargetStore + 'static,
{
    fn run_pass(&self) -> Result<SyncReport, SyncError> {
        self.run_once(Utc::now())
    }

    fn interrupt(&self) {
        self.source.interrupt();
        self.target.interrupt();
    }
}
