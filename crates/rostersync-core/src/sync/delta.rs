//! Set difference between the source roster and the synced target rows.

use std::collections::HashSet;

use super::types::{Delta, SourceMember, TargetMember};

/// Compute which source members must be added and which target rows removed.
///
/// Keys are compared verbatim. A login that appears more than once in
/// `source` yields a single add (first occurrence). Output order follows
/// input order, so the result is deterministic.
pub fn compute_delta(source: &[SourceMember], target: &[TargetMember]) -> Delta {
    let target_keys: HashSet<&str> = target.iter().map(|m| m.nickname.as_str()).collect();
    let source_keys: HashSet<&str> = source.iter().map(|m| m.login.as_str()).collect();

    let mut queued: HashSet<&str> = HashSet::new();
    let to_add = source
        .iter()
        .filter(|m| !target_keys.contains(m.login.as_str()))
        .filter(|m| queued.insert(m.login.as_str()))
        .cloned()
        .collect();

    let to_remove = target
        .iter()
        .filter(|m| !source_keys.contains(m.nickname.as_str()))
        .cloned()
        .collect();

    Delta { to_add, to_remove }
}

/// Distinct keys of `members`, in first-seen order.
pub(crate) fn unique_nicknames(members: &[TargetMember]) -> Vec<String> {
    let mut seen = HashSet::new();
    members
        .iter()
        .filter(|m| seen.insert(m.nickname.as_str()))
        .map(|m| m.nickname.clone())
        .collect()
}
