//! Source and target readers.
//!
//! Both are thin wrappers that tag store failures with the side they came
//! from and drop rows that cannot take part in a key match.

use chrono::{DateTime, Utc};

use super::types::{SourceMember, TargetMember};
use crate::error::SyncError;
use crate::storage::{SourceStore, TargetStore};

/// Active source members, minus rows without a usable login.
pub fn read_source<S: SourceStore>(
    store: &S,
    now: DateTime<Utc>,
) -> Result<Vec<SourceMember>, SyncError> {
    let mut members = store
        .active_members(now)
        .map_err(SyncError::SourceUnavailable)?;
    let fetched = members.len();
    members.retain(|m| !m.login.is_empty());
    if members.len() != fetched {
        tracing::warn!(
            dropped = fetched - members.len(),
            "source rows with an empty login were skipped"
        );
    }
    Ok(members)
}

/// Target rows under sync control.
///
/// Stores are expected to filter linked rows themselves; anything that slips
/// through is dropped here so it can never reach the remove set.
pub fn read_target<T: TargetStore>(store: &T) -> Result<Vec<TargetMember>, SyncError> {
    let mut members = store
        .unlinked_members()
        .map_err(SyncError::TargetUnavailable)?;
    let fetched = members.len();
    members.retain(|m| m.management_link_id.is_none());
    if members.len() != fetched {
        tracing::warn!(
            dropped = fetched - members.len(),
            "target store returned linked rows; ignoring them"
        );
    }
    Ok(members)
}
