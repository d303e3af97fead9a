//! SQLite-backed target directory.
//!
//! Provides access to:
//! - `persons`: directory members; `user_id` is the management link
//! - `taggables`: polymorphic tag rows pointing at members

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{params, params_from_iter, Connection, InterruptHandle, OpenFlags};

use super::{placeholders, TargetStore, TargetWriter};
use crate::error::StoreError;
use crate::sync::types::{Association, NewTargetMember, ProfileFields, TargetMember};

/// Keys per `IN (...)` statement; keeps well under SQLite's variable limit.
const CHUNK: usize = 500;

const TARGET_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS persons (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id     INTEGER NULL,
        first_name  TEXT NOT NULL,
        last_name   TEXT NOT NULL,
        nickname    TEXT NULL,
        email       TEXT NULL,
        phone       TEXT NULL,
        street      TEXT NULL,
        postal_code TEXT NULL,
        locality    TEXT NULL,
        country_id  INTEGER NULL,
        company_id  INTEGER NULL,
        note        TEXT NULL,
        created_at  TEXT NULL,
        updated_at  TEXT NULL
    );

    CREATE TABLE IF NOT EXISTS taggables (
        tag_id        INTEGER NOT NULL,
        taggable_type TEXT NOT NULL,
        taggable_id   INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_persons_nickname ON persons(nickname);
    CREATE INDEX IF NOT EXISTS idx_taggables_subject ON taggables(taggable_type, taggable_id);";

fn trace_target_sql(sql: &str) {
    tracing::trace!(target: "rostersync::target", "{sql}");
}

/// SQLite implementation of [`TargetStore`].
pub struct SqliteTargetStore {
    conn: Mutex<Connection>,
    interrupt: InterruptHandle,
}

impl SqliteTargetStore {
    /// Open an existing target database.
    ///
    /// A missing file is an error; nothing is created here. Use
    /// [`SqliteTargetStore::create`] for development databases.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, StoreError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        Self::open_with(path, flags, busy_timeout)
    }

    /// Open or create the database at `path` and apply the schema.
    pub fn create(path: &Path, busy_timeout: Duration) -> Result<Self, StoreError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let store = Self::open_with(path, flags, busy_timeout)?;
        store.create_schema()?;
        Ok(store)
    }

    fn open_with(path: &Path, flags: OpenFlags, busy_timeout: Duration) -> Result<Self, StoreError> {
        let conn =
            Connection::open_with_flags(path, flags).map_err(|source| StoreError::OpenFailed {
                path: path.to_path_buf(),
                source,
            })?;
        conn.busy_timeout(busy_timeout)?;
        Ok(Self::from_connection(conn))
    }

    /// Open an in-memory database with the schema applied.
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self::from_connection(conn);
        store.create_schema()?;
        Ok(store)
    }

    pub fn from_connection(mut conn: Connection) -> Self {
        conn.trace(Some(trace_target_sql));
        let interrupt = conn.get_interrupt_handle();
        Self {
            conn: Mutex::new(conn),
            interrupt,
        }
    }

    /// Create `persons` and `taggables` if they do not exist yet.
    pub fn create_schema(&self) -> Result<(), StoreError> {
        self.conn.lock()?.execute_batch(TARGET_SCHEMA)?;
        Ok(())
    }

    /// Run a closure against the raw connection (fixtures, diagnostics).
    pub fn with_conn<R>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<R>,
    ) -> Result<R, StoreError> {
        let conn = self.conn.lock()?;
        Ok(f(&*conn)?)
    }
}

impl TargetStore for SqliteTargetStore {
    /// Liveness query, then a check that `persons` and `taggables` exist.
    fn ping(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock()?;
        let result: i64 = conn.query_row("SELECT 1 + 1 AS result", [], |row| row.get(0))?;
        if result != 2 {
            return Err(StoreError::QueryFailed(format!(
                "liveness query returned {result}"
            )));
        }
        let tables: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'table' AND name IN ('persons', 'taggables')",
            [],
            |row| row.get(0),
        )?;
        if tables != 2 {
            return Err(StoreError::QueryFailed(
                "target schema missing: expected tables persons and taggables".into(),
            ));
        }
        Ok(())
    }

    fn unlinked_members(&self) -> Result<Vec<TargetMember>, StoreError> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, first_name, last_name, nickname, email, user_id,
                    phone, street, postal_code, locality, country_id, company_id, note,
                    created_at, updated_at
             FROM persons
             WHERE user_id IS NULL AND nickname IS NOT NULL
             ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(TargetMember {
                id: row.get(0)?,
                first_name: row.get(1)?,
                last_name: row.get(2)?,
                nickname: row.get(3)?,
                email: row.get(4)?,
                management_link_id: row.get(5)?,
                profile: ProfileFields {
                    phone: row.get(6)?,
                    street: row.get(7)?,
                    postal_code: row.get(8)?,
                    locality: row.get(9)?,
                    country_id: row.get(10)?,
                    company_id: row.get(11)?,
                    note: row.get(12)?,
                },
                created_at: row.get(13)?,
                updated_at: row.get(14)?,
            })
        })?;
        let members = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(members)
    }

    fn transaction<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut dyn TargetWriter) -> Result<R, E>,
        E: From<StoreError>,
    {
        let mut conn = self.conn.lock().map_err(StoreError::from)?;
        let tx = conn.transaction().map_err(StoreError::from)?;
        let mut writer = SqliteWriter { conn: &tx };
        let out = f(&mut writer)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(out)
    }

    fn interrupt(&self) {
        self.interrupt.interrupt();
    }
}

/// Statements executed inside an open transaction.
struct SqliteWriter<'a> {
    conn: &'a Connection,
}

impl TargetWriter for SqliteWriter<'_> {
    fn insert_members(&mut self, members: &[NewTargetMember]) -> Result<usize, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO persons (
                first_name, last_name, nickname, email, user_id,
                phone, street, postal_code, locality, country_id, company_id, note,
                created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL, ?5, ?5)",
        )?;
        let mut inserted = 0;
        for m in members {
            inserted += stmt.execute(params![
                m.first_name,
                m.last_name,
                m.nickname,
                m.email,
                m.created_at.to_rfc3339(),
            ])?;
        }
        Ok(inserted)
    }

    fn resolve_ids(&mut self, nicknames: &[String]) -> Result<Vec<(i64, String)>, StoreError> {
        let mut resolved = Vec::with_capacity(nicknames.len());
        for chunk in nicknames.chunks(CHUNK) {
            let sql = format!(
                "SELECT id, nickname FROM persons
                 WHERE user_id IS NULL AND nickname IN ({})
                 ORDER BY id",
                placeholders(chunk.len())
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                resolved.push(row?);
            }
        }
        Ok(resolved)
    }

    fn insert_associations(&mut self, rows: &[Association]) -> Result<usize, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO taggables (tag_id, taggable_type, taggable_id) VALUES (?1, ?2, ?3)",
        )?;
        let mut inserted = 0;
        for a in rows {
            inserted += stmt.execute(params![a.tag_id, a.subject_type, a.subject_id])?;
        }
        Ok(inserted)
    }

    fn delete_associations(
        &mut self,
        subject_type: &str,
        ids: &[i64],
    ) -> Result<usize, StoreError> {
        let mut deleted = 0;
        for chunk in ids.chunks(CHUNK) {
            // ?1 is the discriminator; ids start at ?2.
            let id_params = (2..=chunk.len() + 1)
                .map(|i| format!("?{i}"))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "DELETE FROM taggables WHERE taggable_type = ?1 AND taggable_id IN ({id_params})"
            );
            let mut values: Vec<rusqlite::types::Value> = Vec::with_capacity(chunk.len() + 1);
            values.push(subject_type.to_string().into());
            values.extend(chunk.iter().map(|id| rusqlite::types::Value::from(*id)));
            deleted += self.conn.execute(&sql, params_from_iter(values))?;
        }
        Ok(deleted)
    }

    fn delete_members(&mut self, nicknames: &[String]) -> Result<usize, StoreError> {
        let mut deleted = 0;
        for chunk in nicknames.chunks(CHUNK) {
            let sql = format!(
                "DELETE FROM persons WHERE user_id IS NULL AND nickname IN ({})",
                placeholders(chunk.len())
            );
            deleted += self.conn.execute(&sql, params_from_iter(chunk.iter()))?;
        }
        Ok(deleted)
    }
}
