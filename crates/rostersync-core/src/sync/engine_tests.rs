//! Tests for the sync engine against in-memory SQLite stores.

#[cfg(test)]
mod tests {
    use super::super::engine::*;
    use crate::error::SyncError;
    use crate::storage::source_db::SOURCE_SCHEMA;
    use crate::storage::{ActivityPredicate, SqliteSourceStore, SqliteTargetStore};
    use crate::sync::applier::MemberTag;
    use crate::sync::test_support::{FakeSource, FakeTarget};
    use chrono::{DateTime, TimeZone, Utc};
    use rusqlite::{params, Connection};

    const SUBJECT: &str = "Robert2\\API\\Models\\Person";
    const TAG: i64 = 7;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 9, 30, 0).unwrap()
    }

    fn tag() -> MemberTag {
        MemberTag::new(TAG, SUBJECT)
    }

    /// `(login, first, last, mail)`, all active at [`now`].
    fn source_store(rows: &[(&str, &str, &str, &str)]) -> SqliteSourceStore {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SOURCE_SCHEMA).unwrap();
        let end = now().timestamp() + 86_400;
        for (login, first, last, mail) in rows {
            conn.execute(
                "INSERT INTO etu_users (login, firstName, lastName, mail, bdeMembershipEnd)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![login, first, last, mail, end],
            )
            .unwrap();
        }
        SqliteSourceStore::from_connection(conn, ActivityPredicate::default())
    }

    fn target_store() -> SqliteTargetStore {
        SqliteTargetStore::open_memory().unwrap()
    }

    fn seed_person(store: &SqliteTargetStore, id: i64, nickname: &str, user_id: Option<i64>) {
        store
            .with_conn(|c| {
                c.execute(
                    "INSERT INTO persons (id, user_id, first_name, last_name, nickname)
                     VALUES (?1, ?2, 'First', 'Last', ?3)",
                    params![id, user_id, nickname],
                )
            })
            .unwrap();
    }

    fn seed_tag(store: &SqliteTargetStore, subject_type: &str, subject_id: i64) {
        store
            .with_conn(|c| {
                c.execute(
                    "INSERT INTO taggables (tag_id, taggable_type, taggable_id) VALUES (?1, ?2, ?3)",
                    params![TAG, subject_type, subject_id],
                )
            })
            .unwrap();
    }

    fn count(store: &SqliteTargetStore, sql: &str) -> i64 {
        store.with_conn(|c| c.query_row(sql, [], |r| r.get(0))).unwrap()
    }

    fn change_count(store: &SqliteTargetStore) -> i64 {
        store
            .with_conn(|c| c.query_row("SELECT total_changes()", [], |r| r.get(0)))
            .unwrap()
    }

    #[test]
    fn new_source_member_is_created_and_tagged() {
        let engine = SyncEngine::new(
            source_store(&[("alice", "Alice", "A", "a@x.com")]),
            target_store(),
            tag(),
        );

        let report = engine.run_once(now()).unwrap();
        assert_eq!(report.added, 1);
        assert_eq!(report.removed, 0);

        let (id, first, last, email, created): (i64, String, String, String, String) = engine
            .target()
            .with_conn(|c| {
                c.query_row(
                    "SELECT id, first_name, last_name, email, created_at
                     FROM persons WHERE nickname = 'alice' AND user_id IS NULL",
                    [],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
                )
            })
            .unwrap();
        assert_eq!((first.as_str(), last.as_str()), ("Alice", "A"));
        assert_eq!(email, "a@x.com");
        assert_eq!(created, now().to_rfc3339());

        let tags: Vec<(i64, String, i64)> = engine
            .target()
            .with_conn(|c| {
                let mut stmt =
                    c.prepare("SELECT tag_id, taggable_type, taggable_id FROM taggables")?;
                let rows = stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?;
                rows.collect()
            })
            .unwrap();
        assert_eq!(tags, vec![(TAG, SUBJECT.to_string(), id)]);
    }

    #[test]
    fn departed_member_is_removed_with_its_tags() {
        let target = target_store();
        seed_person(&target, 1, "bob", None);
        seed_tag(&target, SUBJECT, 1);
        let engine = SyncEngine::new(source_store(&[]), target, tag());

        let report = engine.run_once(now()).unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(count(engine.target(), "SELECT COUNT(*) FROM persons"), 0);
        assert_eq!(
            count(
                engine.target(),
                "SELECT COUNT(*) FROM taggables WHERE taggable_id = 1"
            ),
            0
        );
    }

    #[test]
    fn matching_rosters_write_nothing() {
        let target = target_store();
        seed_person(&target, 2, "carol", None);
        let engine = SyncEngine::new(
            source_store(&[("carol", "Carol", "C", "c@x.com")]),
            target,
            tag(),
        );

        let delta = engine.plan(now()).unwrap();
        assert!(delta.is_empty());

        let before = change_count(engine.target());
        let report = engine.run_once(now()).unwrap();
        assert_eq!((report.added, report.removed), (0, 0));
        assert_eq!(change_count(engine.target()), before);
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let target = target_store();
        seed_person(&target, 10, "gone", None);
        seed_tag(&target, SUBJECT, 10);
        let engine = SyncEngine::new(
            source_store(&[
                ("dan", "Dan", "D", "d@x.com"),
                ("eve", "Eve", "E", "e@x.com"),
            ]),
            target,
            tag(),
        );

        let first = engine.run_once(now()).unwrap();
        assert_eq!((first.added, first.removed), (2, 1));

        let second = engine.run_once(now()).unwrap();
        assert_eq!((second.added, second.removed), (0, 0));
        assert_eq!(second.target_count, 2);
        assert_eq!(
            count(engine.target(), "SELECT COUNT(*) FROM taggables"),
            2
        );
    }

    #[test]
    fn every_managed_member_has_exactly_one_tag() {
        let engine = SyncEngine::new(
            source_store(&[
                ("m1", "M", "1", "m1@x.com"),
                ("m2", "M", "2", "m2@x.com"),
                ("m3", "M", "3", "m3@x.com"),
            ]),
            target_store(),
            tag(),
        );
        engine.run_once(now()).unwrap();

        let untagged_or_doubled = count(
            engine.target(),
            "SELECT COUNT(*) FROM persons p
             WHERE (SELECT COUNT(*) FROM taggables t
                    WHERE t.taggable_id = p.id AND t.tag_id = 7
                      AND t.taggable_type = 'Robert2\\API\\Models\\Person') != 1",
        );
        assert_eq!(untagged_or_doubled, 0);
    }

    #[test]
    fn linked_members_are_never_removed() {
        let target = target_store();
        seed_person(&target, 3, "owned", Some(42));
        seed_tag(&target, SUBJECT, 3);
        let engine = SyncEngine::new(source_store(&[]), target, tag());

        let delta = engine.plan(now()).unwrap();
        assert!(delta.to_remove.is_empty());

        engine.run_once(now()).unwrap();
        assert_eq!(count(engine.target(), "SELECT COUNT(*) FROM persons"), 1);
        assert_eq!(count(engine.target(), "SELECT COUNT(*) FROM taggables"), 1);
    }

    #[test]
    fn unrelated_tags_on_a_removed_id_survive() {
        let target = target_store();
        seed_person(&target, 4, "frank", None);
        seed_tag(&target, SUBJECT, 4);
        seed_tag(&target, "Robert2\\API\\Models\\Event", 4);
        let engine = SyncEngine::new(source_store(&[]), target, tag());

        engine.run_once(now()).unwrap();
        let remaining: String = engine
            .target()
            .with_conn(|c| c.query_row("SELECT taggable_type FROM taggables", [], |r| r.get(0)))
            .unwrap();
        assert_eq!(remaining, "Robert2\\API\\Models\\Event");
    }

    #[test]
    fn keys_match_verbatim() {
        let target = target_store();
        seed_person(&target, 5, "Grace", None);
        let engine = SyncEngine::new(
            source_store(&[("grace", "Grace", "G", "g@x.com")]),
            target,
            tag(),
        );
        let delta = engine.plan(now()).unwrap();
        assert_eq!(delta.to_add.len(), 1);
        assert_eq!(delta.to_remove.len(), 1);
    }

    #[test]
    fn check_reports_the_failing_side() {
        let engine = SyncEngine::new(FakeSource::failing(), FakeTarget::with(vec![]), tag());
        assert!(matches!(engine.check(), Err(SyncError::SourceUnavailable(_))));

        let engine = SyncEngine::new(FakeSource::with(vec![]), FakeTarget::failing_reads(), tag());
        assert!(matches!(engine.check(), Err(SyncError::TargetUnavailable(_))));

        let engine = SyncEngine::new(source_store(&[]), target_store(), tag());
        assert!(engine.check().is_ok());
    }

    #[test]
    fn read_failure_aborts_before_any_write() {
        let target = FakeTarget::with(vec![]);
        let engine = SyncEngine::new(FakeSource::failing(), target, tag());
        assert!(matches!(
            engine.run_once(now()),
            Err(SyncError::SourceUnavailable(_))
        ));
        assert!(!engine.target().calls().contains(&"begin"));
    }

    #[test]
    fn failed_add_path_leaves_remove_path_unrun() {
        let target = target_store();
        seed_person(&target, 6, "henry", None);
        target
            .with_conn(|c| c.execute_batch("DROP TABLE taggables"))
            .unwrap();
        let engine = SyncEngine::new(
            source_store(&[("ivy", "Ivy", "I", "i@x.com")]),
            target,
            tag(),
        );

        let err = engine.run_once(now()).unwrap_err();
        assert!(matches!(err, SyncError::ApplyFailed { .. }));
        // insert rolled back, henry untouched
        let nicknames: Vec<String> = engine
            .target()
            .with_conn(|c| {
                let mut stmt = c.prepare("SELECT nickname FROM persons ORDER BY id")?;
                let rows = stmt.query_map([], |r| r.get(0))?;
                rows.collect()
            })
            .unwrap();
        assert_eq!(nicknames, vec!["henry".to_string()]);
        assert!(matches!(
            engine.check(),
            Err(SyncError::TargetUnavailable(_))
        ));
    }
}
