//! Read-only SQLite access to the authoritative roster.
//!
//! The `etu_users` table is owned upstream. This module never writes to it;
//! the connection is opened with `SQLITE_OPEN_READ_ONLY`.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, InterruptHandle, OpenFlags};
use serde::{Deserialize, Serialize};

use super::SourceStore;
use crate::error::StoreError;
use crate::sync::types::SourceMember;

/// Upstream table layout, for fixtures and development databases.
pub const SOURCE_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS etu_users (
    login            TEXT PRIMARY KEY,
    firstName        TEXT,
    lastName         TEXT,
    mail             TEXT,
    bdeMembershipEnd INTEGER
);";

/// How the membership end instant is compared to the run clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityBoundary {
    /// Active while `membership_end > now`.
    #[default]
    Exclusive,
    /// Active while `membership_end >= now`.
    Inclusive,
}

/// Which source rows count as currently active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityPredicate {
    pub boundary: ActivityBoundary,
    /// Members stay active this long after their membership end.
    pub grace_minutes: u32,
}

impl ActivityPredicate {
    /// Unix timestamp compared against `bdeMembershipEnd`.
    pub fn cutoff(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp() - i64::from(self.grace_minutes) * 60
    }

    fn operator(&self) -> &'static str {
        match self.boundary {
            ActivityBoundary::Exclusive => ">",
            ActivityBoundary::Inclusive => ">=",
        }
    }
}

fn trace_source_sql(sql: &str) {
    tracing::trace!(target: "rostersync::source", "{sql}");
}

/// SQLite-backed [`SourceStore`].
pub struct SqliteSourceStore {
    conn: Mutex<Connection>,
    interrupt: InterruptHandle,
    predicate: ActivityPredicate,
}

impl SqliteSourceStore {
    /// Open the source database read-only.
    ///
    /// # Errors
    /// Returns an error if the file does not exist or cannot be opened.
    pub fn open(
        path: &Path,
        predicate: ActivityPredicate,
        busy_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn =
            Connection::open_with_flags(path, flags).map_err(|source| StoreError::OpenFailed {
                path: path.to_path_buf(),
                source,
            })?;
        conn.busy_timeout(busy_timeout)?;
        Ok(Self::from_connection(conn, predicate))
    }

    /// Wrap an already configured connection.
    pub fn from_connection(mut conn: Connection, predicate: ActivityPredicate) -> Self {
        conn.trace(Some(trace_source_sql));
        let interrupt = conn.get_interrupt_handle();
        Self {
            conn: Mutex::new(conn),
            interrupt,
            predicate,
        }
    }
}

impl SourceStore for SqliteSourceStore {
    fn ping(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock()?;
        let result: i64 = conn.query_row("SELECT 1 + 1 AS result", [], |row| row.get(0))?;
        if result == 2 {
            Ok(())
        } else {
            Err(StoreError::QueryFailed(format!(
                "liveness query returned {result}"
            )))
        }
    }

    fn active_members(&self, now: DateTime<Utc>) -> Result<Vec<SourceMember>, StoreError> {
        let conn = self.conn.lock()?;
        let sql = format!(
            "SELECT firstName, lastName, login, mail
             FROM etu_users
             WHERE login IS NOT NULL AND bdeMembershipEnd {} ?1
             ORDER BY login",
            self.predicate.operator()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![self.predicate.cutoff(now)], |row| {
            Ok(SourceMember {
                first_name: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                last_name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                login: row.get(2)?,
                email: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            })
        })?;
        let members = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(members)
    }

    fn interrupt(&self) {
        self.interrupt.interrupt();
    }
}
