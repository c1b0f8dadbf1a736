mod common;

use lectern_core::db::migrations::{current_version, latest_version};
use lectern_core::db::{open_db, DbError, VerificationError};
use rusqlite::Connection;

#[test]
fn open_db_applies_all_migrations_and_records_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("KJV");
    common::write_translation(&path, "King James Version");

    let conn = open_db(&path).unwrap();

    assert_eq!(current_version(&conn).unwrap(), latest_version());
    assert_eq!(common::ledger_rows(&path), i64::from(latest_version()));
    assert_index_exists(&conn, "idx_verses_position");
    assert_index_exists(&conn, "idx_stories_position");
}

#[test]
fn opening_same_database_twice_does_not_duplicate_ledger_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("KJV");
    common::write_translation(&path, "King James Version");

    drop(open_db(&path).unwrap());
    let applied_at_first: String = Connection::open(&path)
        .unwrap()
        .query_row(
            "SELECT applied_at FROM schema_version WHERE version = 1;",
            [],
            |row| row.get(0),
        )
        .unwrap();

    let conn = open_db(&path).unwrap();
    assert_eq!(common::ledger_rows(&path), i64::from(latest_version()));
    let applied_at_second: String = conn
        .query_row(
            "SELECT applied_at FROM schema_version WHERE version = 1;",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(applied_at_first, applied_at_second);
}

#[test]
fn missing_auxiliary_tables_are_created_and_catalog_backfilled() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("MINI");
    common::write_minimal_translation(&path);

    let conn = open_db(&path).unwrap();

    let (count, present): (i64, i64) = conn
        .query_row(
            "SELECT COUNT(*), SUM(is_present) FROM books_all;",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!((count, present), (1, 1));
    let stories: i64 = conn
        .query_row("SELECT COUNT(*) FROM stories;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(stories, 0);
}

#[test]
fn empty_catalog_fails_verification() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("EMPTY");
    common::write_empty_translation(&path);

    let err = open_db(&path).unwrap_err();
    assert!(matches!(
        err,
        DbError::Verification(VerificationError::EmptyCatalog)
    ));
    // migrations ran before verification and stay recorded
    assert_eq!(common::ledger_rows(&path), i64::from(latest_version()));
}

#[test]
fn file_without_shipped_tables_fails_verification_before_migrating() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("BROKEN");
    Connection::open(&path)
        .unwrap()
        .execute_batch(
            "CREATE TABLE info (name TEXT, value TEXT);
             CREATE TABLE books (book_color TEXT, book_number NUMERIC, short_name TEXT, long_name TEXT);
             INSERT INTO books VALUES (NULL, 1, 'Gen', 'Genesis');",
        )
        .unwrap();

    let err = open_db(&path).unwrap_err();
    assert!(matches!(
        err,
        DbError::Verification(VerificationError::MissingTable("verses"))
    ));

    let conn = Connection::open(&path).unwrap();
    let ledger: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE name = 'schema_version';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(ledger, 0);
}

#[test]
fn missing_file_is_not_created() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ABSENT");

    assert!(matches!(open_db(&path), Err(DbError::Sqlite(_))));
    assert!(!path.exists());
}

fn assert_index_exists(conn: &Connection, name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'index' AND name = ?1
            );",
            [name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "index {name} does not exist");
}
