//! In-memory stores with failure injection, for engine tests.

use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::storage::{SourceStore, TargetStore, TargetWriter};
use crate::sync::types::{Association, NewTargetMember, SourceMember, TargetMember};

pub struct FakeSource {
    members: Vec<SourceMember>,
    fail: bool,
}

impl FakeSource {
    pub fn with(members: Vec<SourceMember>) -> Self {
        Self {
            members,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            members: Vec::new(),
            fail: true,
        }
    }
}

impl SourceStore for FakeSource {
    fn ping(&self) -> Result<(), StoreError> {
        if self.fail {
            return Err(StoreError::QueryFailed("source down".into()));
        }
        Ok(())
    }

    fn active_members(&self, _now: DateTime<Utc>) -> Result<Vec<SourceMember>, StoreError> {
        if self.fail {
            return Err(StoreError::QueryFailed("source down".into()));
        }
        Ok(self.members.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeState {
    pub members: Vec<TargetMember>,
    pub associations: Vec<Association>,
    next_id: i64,
}

/// Target double. `unlinked_members` returns every row with a nickname,
/// linked or not, so reader-level filtering is exercised.
#[derive(Default)]
pub struct FakeTarget {
    state: Mutex<FakeState>,
    calls: Mutex<Vec<&'static str>>,
    fail_reads: bool,
    fail_on: Option<&'static str>,
    /// Extra unlinked row returned by `resolve_ids`, simulating a concurrent writer.
    phantom_on_resolve: bool,
}

impl FakeTarget {
    pub fn with(members: Vec<TargetMember>) -> Self {
        let next_id = members.iter().map(|m| m.id).max().unwrap_or(0) + 1;
        Self {
            state: Mutex::new(FakeState {
                members,
                associations: Vec::new(),
                next_id,
            }),
            ..Self::default()
        }
    }

    pub fn failing_reads() -> Self {
        Self {
            fail_reads: true,
            ..Self::default()
        }
    }

    pub fn fail_on(mut self, op: &'static str) -> Self {
        self.fail_on = Some(op);
        self
    }

    pub fn with_phantom_resolve(mut self) -> Self {
        self.phantom_on_resolve = true;
        self
    }

    pub fn with_associations(self, rows: Vec<Association>) -> Self {
        self.state.lock().unwrap().associations = rows;
        self
    }

    pub fn snapshot(&self) -> FakeState {
        self.state.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

impl TargetStore for FakeTarget {
    fn ping(&self) -> Result<(), StoreError> {
        if self.fail_reads {
            return Err(StoreError::QueryFailed("target down".into()));
        }
        Ok(())
    }

    fn unlinked_members(&self) -> Result<Vec<TargetMember>, StoreError> {
        self.calls.lock().unwrap().push("unlinked_members");
        if self.fail_reads {
            return Err(StoreError::QueryFailed("target down".into()));
        }
        Ok(self.state.lock().unwrap().members.clone())
    }

    fn transaction<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut dyn TargetWriter) -> Result<R, E>,
        E: From<StoreError>,
    {
        self.calls.lock().unwrap().push("begin");
        let mut writer = FakeWriter {
            state: self.state.lock().unwrap().clone(),
            calls: Vec::new(),
            fail_on: self.fail_on,
            phantom_on_resolve: self.phantom_on_resolve,
        };
        let result = f(&mut writer);
        self.calls.lock().unwrap().extend(writer.calls.iter().copied());
        let out = result?;
        *self.state.lock().unwrap() = writer.state;
        self.calls.lock().unwrap().push("commit");
        Ok(out)
    }
}

struct FakeWriter {
    state: FakeState,
    calls: Vec<&'static str>,
    fail_on: Option<&'static str>,
    phantom_on_resolve: bool,
}

impl FakeWriter {
    fn enter(&mut self, op: &'static str) -> Result<(), StoreError> {
        self.calls.push(op);
        if self.fail_on == Some(op) {
            return Err(StoreError::QueryFailed(format!("{op} rejected")));
        }
        Ok(())
    }
}

impl TargetWriter for FakeWriter {
    fn insert_members(&mut self, members: &[NewTargetMember]) -> Result<usize, StoreError> {
        self.enter("insert_members")?;
        for m in members {
            let id = self.state.next_id;
            self.state.next_id += 1;
            self.state.members.push(TargetMember {
                id,
                first_name: m.first_name.clone(),
                last_name: m.last_name.clone(),
                nickname: m.nickname.clone(),
                email: Some(m.email.clone()),
                management_link_id: None,
                profile: Default::default(),
                created_at: Some(m.created_at.to_rfc3339()),
                updated_at: Some(m.created_at.to_rfc3339()),
            });
        }
        Ok(members.len())
    }

    fn resolve_ids(&mut self, nicknames: &[String]) -> Result<Vec<(i64, String)>, StoreError> {
        self.enter("resolve_ids")?;
        let mut rows: Vec<(i64, String)> = self
            .state
            .members
            .iter()
            .filter(|m| m.management_link_id.is_none() && nicknames.contains(&m.nickname))
            .map(|m| (m.id, m.nickname.clone()))
            .collect();
        if self.phantom_on_resolve {
            if let Some(first) = nicknames.first() {
                rows.push((9_999, first.clone()));
            }
        }
        Ok(rows)
    }

    fn insert_associations(&mut self, rows: &[Association]) -> Result<usize, StoreError> {
        self.enter("insert_associations")?;
        self.state.associations.extend(rows.iter().cloned());
        Ok(rows.len())
    }

    fn delete_associations(
        &mut self,
        subject_type: &str,
        ids: &[i64],
    ) -> Result<usize, StoreError> {
        self.enter("delete_associations")?;
        let before = self.state.associations.len();
        self.state
            .associations
            .retain(|a| !(a.subject_type == subject_type && ids.contains(&a.subject_id)));
        Ok(before - self.state.associations.len())
    }

    fn delete_members(&mut self, nicknames: &[String]) -> Result<usize, StoreError> {
        self.enter("delete_members")?;
        let before = self.state.members.len();
        self.state
            .members
            .retain(|m| !(m.management_link_id.is_none() && nicknames.contains(&m.nickname)));
        Ok(before - self.state.members.len())
    }
}
