//! Passage repository contracts and SQLite implementation.

use crate::db::migrations::current_version;
use crate::db::MigrationError;
use crate::model::passage::{
    Annotation, DatasetStats, Document, MetadataEntry, Passage, PassageRange, Preface,
};
use crate::search::substring::{search_passages, SearchOptions};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub(crate) const PASSAGE_SELECT_SQL: &str = "SELECT
    verses.book_number AS book_number,
    verses.chapter AS chapter,
    verses.verse AS verse,
    verses.text AS text,
    books.short_name AS short_name,
    books.book_color AS book_color
FROM verses
LEFT JOIN books ON books.book_number = verses.book_number";

const PASSAGE_ORDER_SQL: &str = " ORDER BY verses.book_number, verses.chapter, verses.verse";

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug)]
pub enum RepoError {
    Sqlite(rusqlite::Error),
    InvalidArgument(String),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::InvalidArgument(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Read contract for one translation dataset.
pub trait PassageRepository {
    fn documents(&self) -> RepoResult<Vec<Document>>;
    fn universal_documents(&self) -> RepoResult<Vec<Document>>;
    fn document(&self, ordinal: i64) -> RepoResult<Option<Document>>;
    fn passages(&self, document: i64, section: i64) -> RepoResult<Vec<Passage>>;
    fn passage(&self, document: i64, section: i64, item: i64) -> RepoResult<Option<Passage>>;
    fn passage_range(&self, range: &PassageRange) -> RepoResult<Vec<Passage>>;
    fn passage_page(
        &self,
        document: i64,
        section: i64,
        limit: u32,
        offset: u64,
    ) -> RepoResult<Vec<Passage>>;
    fn section_count(&self, document: i64) -> RepoResult<u64>;
    fn item_count(&self, document: i64, section: i64) -> RepoResult<u64>;
    fn annotations(&self, document: i64, section: i64) -> RepoResult<Vec<Annotation>>;
    fn preface(&self, document: i64) -> RepoResult<Option<Preface>>;
    fn search(&self, text: &str, options: &SearchOptions) -> RepoResult<Vec<Passage>>;
    fn metadata(&self) -> RepoResult<Vec<MetadataEntry>>;
    fn metadata_value(&self, name: &str) -> RepoResult<Option<String>>;
    fn stats(&self) -> RepoResult<DatasetStats>;
}

/// SQLite-backed passage repository.
pub struct SqlitePassageRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqlitePassageRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn collect_passages(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> RepoResult<Vec<Passage>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut passages = Vec::new();
        while let Some(row) = rows.next()? {
            passages.push(parse_passage_row(row)?);
        }
        Ok(passages)
    }

    fn collect_documents(&self, sql: &str) -> RepoResult<Vec<Document>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([])?;
        let mut documents = Vec::new();
        while let Some(row) = rows.next()? {
            documents.push(parse_document_row(row)?);
        }
        Ok(documents)
    }

    fn count(&self, sql: &str, params: impl rusqlite::Params) -> RepoResult<u64> {
        let count: i64 = self.conn.query_row(sql, params, |row| row.get(0))?;
        u64::try_from(count).map_err(|_| RepoError::InvalidData(format!("negative count {count}")))
    }
}

impl PassageRepository for SqlitePassageRepository<'_> {
    fn documents(&self) -> RepoResult<Vec<Document>> {
        self.collect_documents(
            "SELECT book_number, short_name, long_name, book_color, 1 AS is_present
             FROM books
             ORDER BY book_number;",
        )
    }

    fn universal_documents(&self) -> RepoResult<Vec<Document>> {
        self.collect_documents(
            "SELECT book_number, short_name, long_name, book_color, is_present
             FROM books_all
             ORDER BY book_number;",
        )
    }

    fn document(&self, ordinal: i64) -> RepoResult<Option<Document>> {
        let mut stmt = self.conn.prepare(
            "SELECT book_number, short_name, long_name, book_color, 1 AS is_present
             FROM books
             WHERE book_number = ?1;",
        )?;
        let mut rows = stmt.query([ordinal])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_document_row(row)?));
        }
        Ok(None)
    }

    fn passages(&self, document: i64, section: i64) -> RepoResult<Vec<Passage>> {
        self.collect_passages(
            &format!(
                "{PASSAGE_SELECT_SQL}
                 WHERE verses.book_number = ?1 AND verses.chapter = ?2{PASSAGE_ORDER_SQL};"
            ),
            params![document, section],
        )
    }

    fn passage(&self, document: i64, section: i64, item: i64) -> RepoResult<Option<Passage>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PASSAGE_SELECT_SQL}
             WHERE verses.book_number = ?1 AND verses.chapter = ?2 AND verses.verse = ?3;"
        ))?;
        let mut rows = stmt.query(params![document, section, item])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_passage_row(row)?));
        }
        Ok(None)
    }

    fn passage_range(&self, range: &PassageRange) -> RepoResult<Vec<Passage>> {
        if range.start > range.end {
            return Err(RepoError::InvalidArgument(format!(
                "range start {} is after end {}",
                range.start, range.end
            )));
        }
        self.collect_passages(
            &format!(
                "{PASSAGE_SELECT_SQL}
                 WHERE verses.book_number = ?1
                   AND verses.chapter = ?2
                   AND verses.verse BETWEEN ?3 AND ?4{PASSAGE_ORDER_SQL};"
            ),
            params![range.document, range.section, range.start, range.end],
        )
    }

    fn passage_page(
        &self,
        document: i64,
        section: i64,
        limit: u32,
        offset: u64,
    ) -> RepoResult<Vec<Passage>> {
        let offset = i64::try_from(offset)
            .map_err(|_| RepoError::InvalidArgument(format!("offset {offset} too large")))?;
        self.collect_passages(
            &format!(
                "{PASSAGE_SELECT_SQL}
                 WHERE verses.book_number = ?1 AND verses.chapter = ?2{PASSAGE_ORDER_SQL}
                 LIMIT ?3 OFFSET ?4;"
            ),
            params![document, section, i64::from(limit), offset],
        )
    }

    fn section_count(&self, document: i64) -> RepoResult<u64> {
        self.count(
            "SELECT COUNT(DISTINCT chapter) FROM verses WHERE book_number = ?1;",
            [document],
        )
    }

    fn item_count(&self, document: i64, section: i64) -> RepoResult<u64> {
        self.count(
            "SELECT COUNT(*) FROM verses WHERE book_number = ?1 AND chapter = ?2;",
            [document, section],
        )
    }

    fn annotations(&self, document: i64, section: i64) -> RepoResult<Vec<Annotation>> {
        let mut stmt = self.conn.prepare(
            "SELECT book_number, chapter, verse, order_if_several, text
             FROM stories
             WHERE book_number = ?1 AND chapter = ?2
             ORDER BY verse, order_if_several;",
        )?;
        let mut rows = stmt.query([document, section])?;
        let mut annotations = Vec::new();
        while let Some(row) = rows.next()? {
            annotations.push(Annotation {
                document: row.get("book_number")?,
                section: row.get("chapter")?,
                item: row.get("verse")?,
                order_if_several: row.get("order_if_several")?,
                text: row.get("text")?,
            });
        }
        Ok(annotations)
    }

    fn preface(&self, document: i64) -> RepoResult<Option<Preface>> {
        let text = self
            .conn
            .query_row(
                "SELECT text FROM introductions WHERE book_number = ?1 LIMIT 1;",
                [document],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(text.map(|text| Preface { document, text }))
    }

    fn search(&self, text: &str, options: &SearchOptions) -> RepoResult<Vec<Passage>> {
        search_passages(self.conn, text, options)
    }

    fn metadata(&self) -> RepoResult<Vec<MetadataEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, value FROM info ORDER BY name;")?;
        let mut rows = stmt.query([])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(MetadataEntry {
                name: row.get("name")?,
                value: row.get::<_, Option<String>>("value")?.unwrap_or_default(),
            });
        }
        Ok(entries)
    }

    fn metadata_value(&self, name: &str) -> RepoResult<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM info WHERE name = ?1;", [name], |row| {
                row.get::<_, Option<String>>(0)
            })
            .optional()?;
        Ok(value.flatten())
    }

    fn stats(&self) -> RepoResult<DatasetStats> {
        let schema_version = current_version(self.conn).map_err(|err| match err {
            MigrationError::Ledger(source) => RepoError::Sqlite(source),
            other => RepoError::InvalidData(other.to_string()),
        })?;
        Ok(DatasetStats {
            documents: self.count("SELECT COUNT(*) FROM books;", [])?,
            passages: self.count("SELECT COUNT(*) FROM verses;", [])?,
            annotations: self.count("SELECT COUNT(*) FROM stories;", [])?,
            prefaces: self.count("SELECT COUNT(*) FROM introductions;", [])?,
            schema_version,
        })
    }
}

pub(crate) fn parse_passage_row(row: &Row<'_>) -> RepoResult<Passage> {
    Ok(Passage {
        document: row.get("book_number")?,
        section: row.get("chapter")?,
        item: row.get("verse")?,
        text: row.get::<_, Option<String>>("text")?.unwrap_or_default(),
        document_short_name: row.get("short_name")?,
        document_color: row.get("book_color")?,
    })
}

fn parse_document_row(row: &Row<'_>) -> RepoResult<Document> {
    let is_present = match row.get::<_, i64>("is_present")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid is_present value `{other}` in books_all.is_present"
            )));
        }
    };

    Ok(Document {
        ordinal: row.get("book_number")?,
        short_name: row.get("short_name")?,
        long_name: row.get("long_name")?,
        color: row.get("book_color")?,
        is_present,
    })
}
