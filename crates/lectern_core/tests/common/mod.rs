#![allow(dead_code)]

use lectern_core::{DirectoryBundle, StoreConfig};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

pub const GENESIS_1: &[&str] = &[
    "In the beginning God created the heaven and the earth.",
    "And the earth was without form, and void.",
    "And God said, Let there be light: and there was light.",
    "And God saw the light, that it was good.",
    "And God called the light Day, and the darkness he called Night.",
    "Love is patient, love is kind.",
    "And God said, Let there be a firmament.",
];

pub struct Fixture {
    pub dir: TempDir,
    pub config: StoreConfig,
    pub bundle: Arc<DirectoryBundle>,
}

/// Bundle with `KJV` and `RST` full translations, `MINI` without auxiliary
/// tables and `EMPTY` with an empty catalog.
pub fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let bundle_root = dir.path().join("bundle");
    std::fs::create_dir_all(&bundle_root).unwrap();

    write_translation(&bundle_root.join("kjv.SQLite3"), "King James Version");
    write_translation(&bundle_root.join("rst.SQLite3"), "Russian Synodal Translation");
    write_minimal_translation(&bundle_root.join("mini.SQLite3"));
    write_empty_translation(&bundle_root.join("empty.SQLite3"));

    let bundle = DirectoryBundle::new(&bundle_root)
        .with_asset("KJV", "kjv.SQLite3")
        .with_asset("RST", "rst.SQLite3")
        .with_asset("MINI", "mini.SQLite3")
        .with_asset("EMPTY", "empty.SQLite3");

    let config = StoreConfig {
        retry_delay_ms: 1,
        page_size: 3,
        ..StoreConfig::new(dir.path().join("app"))
    };

    Fixture {
        dir,
        config,
        bundle: Arc::new(bundle),
    }
}

fn create_core_tables(conn: &Connection) {
    conn.execute_batch(
        "CREATE TABLE info (name TEXT, value TEXT);
         CREATE TABLE books (
             book_color TEXT,
             book_number NUMERIC,
             short_name TEXT,
             long_name TEXT
         );
         CREATE TABLE verses (
             book_number NUMERIC,
             chapter NUMERIC,
             verse NUMERIC,
             text TEXT
         );",
    )
    .unwrap();
}

pub fn write_translation(path: &Path, description: &str) {
    let conn = Connection::open(path).unwrap();
    create_core_tables(&conn);
    conn.execute_batch(
        "CREATE TABLE books_all (
             book_color TEXT,
             book_number NUMERIC,
             short_name TEXT,
             long_name TEXT,
             is_present NUMERIC
         );
         CREATE TABLE stories (
             book_number NUMERIC,
             chapter NUMERIC,
             verse NUMERIC,
             order_if_several NUMERIC,
             text TEXT
         );
         CREATE TABLE introductions (book_number NUMERIC, text TEXT);

         INSERT INTO books VALUES ('#ccccff', 1, 'Gen', 'Genesis');
         INSERT INTO books VALUES ('#ccccff', 2, 'Exo', 'Exodus');
         INSERT INTO books VALUES (NULL, 3, 'Lev', 'Leviticus');

         INSERT INTO books_all VALUES ('#ccccff', 1, 'Gen', 'Genesis', 1);
         INSERT INTO books_all VALUES ('#ccccff', 2, 'Exo', 'Exodus', 1);
         INSERT INTO books_all VALUES (NULL, 3, 'Lev', 'Leviticus', 1);
         INSERT INTO books_all VALUES (NULL, 4, 'Num', 'Numbers', 0);

         INSERT INTO stories VALUES (1, 1, 3, 1, 'Light');
         INSERT INTO stories VALUES (1, 1, 1, 1, 'The first day');
         INSERT INTO stories VALUES (1, 1, 1, 0, 'Creation');
         INSERT INTO stories VALUES (2, 1, 1, 0, 'Names');

         INSERT INTO introductions VALUES (1, 'The book of beginnings.');",
    )
    .unwrap();
    conn.execute(
        "INSERT INTO info (name, value) VALUES ('description', ?1);",
        [description],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO info (name, value) VALUES ('language', 'en');",
        [],
    )
    .unwrap();

    for (index, text) in GENESIS_1.iter().enumerate() {
        insert_verse(&conn, 1, 1, index as i64 + 1, text);
    }
    insert_verse(&conn, 1, 2, 1, "Thus the heavens and the earth were finished.");
    insert_verse(&conn, 1, 2, 2, "And on the seventh day God ended his work.");
    insert_verse(&conn, 1, 2, 3, "And God blessed the seventh day.");
    insert_verse(&conn, 2, 1, 1, "Now these are the names of the children of Israel.");
    insert_verse(&conn, 2, 1, 2, "Thou shalt LOVE thy neighbour as thyself.");
    insert_verse(&conn, 3, 1, 1, "And the LORD called unto Moses.");
}

pub fn write_minimal_translation(path: &Path) {
    let conn = Connection::open(path).unwrap();
    create_core_tables(&conn);
    conn.execute_batch(
        "INSERT INTO info VALUES ('description', 'Minimal');
         INSERT INTO books VALUES (NULL, 1, 'Gen', 'Genesis');",
    )
    .unwrap();
    insert_verse(&conn, 1, 1, 1, "In the beginning.");
}

pub fn write_empty_translation(path: &Path) {
    let conn = Connection::open(path).unwrap();
    create_core_tables(&conn);
}

pub fn insert_verse(conn: &Connection, book: i64, chapter: i64, verse: i64, text: &str) {
    conn.execute(
        "INSERT INTO verses (book_number, chapter, verse, text) VALUES (?1, ?2, ?3, ?4);",
        params![book, chapter, verse, text],
    )
    .unwrap();
}

pub fn ledger_rows(path: &Path) -> i64 {
    let conn = Connection::open(path).unwrap();
    conn.query_row("SELECT COUNT(*) FROM schema_version;", [], |row| row.get(0))
        .unwrap()
}
