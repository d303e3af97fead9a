//! Core types for roster synchronization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Active member as projected from the source store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMember {
    pub first_name: String,
    pub last_name: String,
    /// Natural key, matched verbatim against [`TargetMember::nickname`].
    pub login: String,
    pub email: String,
}

/// Optional profile columns on a target member. The engine never fills them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileFields {
    pub phone: Option<String>,
    pub street: Option<String>,
    pub postal_code: Option<String>,
    pub locality: Option<String>,
    pub country_id: Option<i64>,
    pub company_id: Option<i64>,
    pub note: Option<String>,
}

/// Member row in the target store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetMember {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub nickname: String,
    pub email: Option<String>,
    /// Owning external account. Rows with a link are outside sync scope.
    pub management_link_id: Option<i64>,
    #[serde(default)]
    pub profile: ProfileFields,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Insert payload for a member created by the add path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTargetMember {
    pub first_name: String,
    pub last_name: String,
    pub nickname: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl NewTargetMember {
    /// Build the row for `member`, stamped with the run clock.
    pub fn from_source(member: &SourceMember, now: DateTime<Utc>) -> Self {
        Self {
            first_name: member.first_name.clone(),
            last_name: member.last_name.clone(),
            nickname: member.login.clone(),
            email: member.email.clone(),
            created_at: now,
        }
    }
}

/// Tag row tying a target member to the configured classification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Association {
    pub tag_id: i64,
    pub subject_type: String,
    pub subject_id: i64,
}

/// Result of comparing the two rosters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    pub to_add: Vec<SourceMember>,
    pub to_remove: Vec<TargetMember>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Summary of one completed reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Active members read from the source.
    pub source_count: usize,
    /// Unlinked members read from the target.
    pub target_count: usize,
    pub added: usize,
    pub removed: usize,
}
