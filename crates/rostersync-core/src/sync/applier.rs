//! Writes a computed delta to the target store.
//!
//! The add path is `insert -> resolve ids by nickname -> insert associations`;
//! the remove path is `resolve ids -> delete associations -> delete members`.
//! Each path runs inside a single target transaction and its steps are never
//! reordered, since each depends on rows produced by the previous one.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use super::delta::unique_nicknames;
use super::types::{Association, NewTargetMember, SourceMember, TargetMember};
use crate::error::{ApplyPath, StoreError, SyncError};
use crate::storage::TargetStore;

/// Classification attached to every member the engine manages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberTag {
    pub tag_id: i64,
    /// Discriminator identifying member rows among tagged subjects.
    pub subject_type: String,
}

impl MemberTag {
    pub fn new(tag_id: i64, subject_type: impl Into<String>) -> Self {
        Self {
            tag_id,
            subject_type: subject_type.into(),
        }
    }

    fn association(&self, subject_id: i64) -> Association {
        Association {
            tag_id: self.tag_id,
            subject_type: self.subject_type.clone(),
            subject_id,
        }
    }
}

/// Failure inside a transaction, before the path is attached.
enum PathFailure {
    Store(StoreError),
    Inconsistent { expected: usize, resolved: usize },
}

impl From<StoreError> for PathFailure {
    fn from(err: StoreError) -> Self {
        PathFailure::Store(err)
    }
}

impl PathFailure {
    fn on(self, path: ApplyPath) -> SyncError {
        match self {
            PathFailure::Store(source) => match path {
                ApplyPath::Add => SyncError::add_failed(source),
                ApplyPath::Remove => SyncError::remove_failed(source),
            },
            PathFailure::Inconsistent { expected, resolved } => SyncError::ApplyInconsistency {
                path,
                expected,
                resolved,
            },
        }
    }
}

/// Insert `to_add` with one association each. Returns the number of members
/// created.
///
/// # Errors
/// `ApplyFailed` when a statement fails, `ApplyInconsistency` when the ids
/// resolved after insert do not map the inserted logins one to one. The
/// transaction is rolled back in both cases.
pub fn apply_additions<T: TargetStore>(
    store: &T,
    tag: &MemberTag,
    to_add: &[SourceMember],
    now: DateTime<Utc>,
) -> Result<usize, SyncError> {
    if to_add.is_empty() {
        tracing::debug!("no members to add");
        return Ok(0);
    }

    let mut seen = HashSet::new();
    let rows: Vec<NewTargetMember> = to_add
        .iter()
        .filter(|m| seen.insert(m.login.as_str()))
        .map(|m| NewTargetMember::from_source(m, now))
        .collect();
    let logins: Vec<String> = rows.iter().map(|r| r.nickname.clone()).collect();

    store
        .transaction(|w| -> Result<usize, PathFailure> {
            w.insert_members(&rows)?;
            let resolved = w.resolve_ids(&logins)?;
            check_one_to_one(&logins, &resolved)?;
            let associations: Vec<Association> =
                resolved.iter().map(|(id, _)| tag.association(*id)).collect();
            w.insert_associations(&associations)?;
            Ok(rows.len())
        })
        .map_err(|f| f.on(ApplyPath::Add))
}

/// Every login resolved to exactly one id and nothing else came back.
fn check_one_to_one(logins: &[String], resolved: &[(i64, String)]) -> Result<(), PathFailure> {
    let mut hits: HashMap<&str, usize> = logins.iter().map(|l| (l.as_str(), 0)).collect();
    let mut stray = false;
    for (_, nickname) in resolved {
        match hits.get_mut(nickname.as_str()) {
            Some(count) => *count += 1,
            None => stray = true,
        }
    }
    if stray || resolved.len() != logins.len() || hits.values().any(|&c| c != 1) {
        return Err(PathFailure::Inconsistent {
            expected: logins.len(),
            resolved: resolved.len(),
        });
    }
    Ok(())
}

/// Delete `to_remove` together with their associations. Returns the number
/// of member rows deleted.
///
/// # Errors
/// `ApplyFailed` when a statement fails; the transaction is rolled back.
pub fn apply_removals<T: TargetStore>(
    store: &T,
    tag: &MemberTag,
    to_remove: &[TargetMember],
) -> Result<usize, SyncError> {
    if to_remove.is_empty() {
        tracing::debug!("no members to remove");
        return Ok(0);
    }

    let keys = unique_nicknames(to_remove);
    let deleted = store
        .transaction(|w| -> Result<usize, PathFailure> {
            let ids: Vec<i64> = w.resolve_ids(&keys)?.into_iter().map(|(id, _)| id).collect();
            if !ids.is_empty() {
                w.delete_associations(&tag.subject_type, &ids)?;
            }
            Ok(w.delete_members(&keys)?)
        })
        .map_err(|f| f.on(ApplyPath::Remove))?;

    if deleted != to_remove.len() {
        tracing::debug!(
            expected = to_remove.len(),
            deleted,
            "target changed between read and delete"
        );
    }
    Ok(deleted)
}
