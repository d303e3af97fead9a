//! Roster reconciliation.
//!
//! A pass reads both rosters, computes the add/remove delta keyed on
//! login/nickname and applies it to the target together with the member
//! associations. The scheduler repeats passes on a fixed interval.

pub mod applier;
pub mod delta;
pub mod engine;
pub mod reader;
pub mod scheduler;
pub mod types;

#[cfg(test)]
mod engine_tests;
#[cfg(test)]
mod test_support;

pub use applier::{apply_additions, apply_removals, MemberTag};
pub use delta::compute_delta;
pub use engine::SyncEngine;
pub use reader::{read_source, read_target};
pub use scheduler::{spawn_ticker, Scheduler, SchedulerReport, SchedulerState, SyncPass};
pub use types::{
    Association, Delta, NewTargetMember, ProfileFields, SourceMember, SyncReport, TargetMember,
};
