//! Substring search over `verses.text`.
//!
//! # Invariants
//! - Results are ordered by document, section, item ascending.
//! - Blank queries and `limit = 0` return no rows without touching SQLite.

use crate::model::passage::Passage;
use crate::repo::passage_repo::{parse_passage_row, RepoError, RepoResult, PASSAGE_SELECT_SQL};
use regex::{Regex, RegexBuilder};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

const DEFAULT_LIMIT: u32 = 100;

/// Options for [`search_passages`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    pub limit: u32,
    /// Compare the whole passage text instead of looking for a substring.
    pub exact_match: bool,
    /// When false, ASCII queries fold case in SQLite and other queries fold
    /// Unicode case in a regex pass.
    pub case_sensitive: bool,
    /// Only keep hits where the query is bounded by word boundaries.
    pub whole_words: bool,
    pub document_filter: Option<i64>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            exact_match: false,
            case_sensitive: false,
            whole_words: false,
            document_filter: None,
        }
    }
}

impl SearchOptions {
    pub fn with_limit(limit: u32) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }
}

/// Searches passage text and returns at most `options.limit` hits.
///
/// SQLite folds ASCII case only, so a case-insensitive query containing
/// non-ASCII characters is matched with a Unicode-aware regex after the
/// fetch instead of `LIKE`/`COLLATE NOCASE`.
pub fn search_passages(
    conn: &Connection,
    text: &str,
    options: &SearchOptions,
) -> RepoResult<Vec<Passage>> {
    let needle = text.trim();
    if needle.is_empty() || options.limit == 0 {
        return Ok(Vec::new());
    }

    let unicode_fold = !options.case_sensitive && !needle.is_ascii();
    let escaped = regex::escape(needle);
    let text_filter = match (options.exact_match, options.whole_words) {
        (false, true) => Some(needle_regex(&format!(r"\b{escaped}\b"), options.case_sensitive)?),
        (true, _) if unicode_fold => Some(needle_regex(&format!("^{escaped}$"), false)?),
        (false, false) if unicode_fold => Some(needle_regex(&escaped, false)?),
        _ => None,
    };

    let mut conditions = Vec::new();
    let mut bind_values: Vec<Value> = Vec::new();

    if !unicode_fold {
        let (predicate, bound) = match (options.exact_match, options.case_sensitive) {
            (true, true) => ("verses.text = ?", needle.to_string()),
            (true, false) => ("verses.text = ? COLLATE NOCASE", needle.to_string()),
            (false, true) => ("instr(verses.text, ?) > 0", needle.to_string()),
            (false, false) => (
                "verses.text LIKE ? ESCAPE '\\'",
                format!("%{}%", escape_like(needle)),
            ),
        };
        conditions.push(predicate);
        bind_values.push(Value::Text(bound));
    }

    if let Some(document) = options.document_filter {
        conditions.push("verses.book_number = ?");
        bind_values.push(Value::Integer(document));
    }

    let mut sql = PASSAGE_SELECT_SQL.to_string();
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    sql.push_str(" ORDER BY verses.book_number, verses.chapter, verses.verse");

    // Regex filtering happens after the fetch, so the limit must too.
    if text_filter.is_none() {
        sql.push_str(" LIMIT ?");
        bind_values.push(Value::Integer(i64::from(options.limit)));
    }

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let limit = options.limit as usize;
    let mut hits = Vec::new();

    while let Some(row) = rows.next()? {
        let passage = parse_passage_row(row)?;
        if let Some(filter) = &text_filter {
            if !filter.is_match(&passage.text) {
                continue;
            }
        }
        hits.push(passage);
        if hits.len() == limit {
            break;
        }
    }

    Ok(hits)
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn needle_regex(pattern: &str, case_sensitive: bool) -> RepoResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|err| RepoError::InvalidArgument(format!("unusable search text: {err}")))
}

#[cfg(test)]
mod tests {
    use super::{escape_like, search_passages, SearchOptions};
    use rusqlite::Connection;

    fn seeded() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE books (book_number NUMERIC, short_name TEXT, long_name TEXT, book_color TEXT);
             CREATE TABLE verses (book_number NUMERIC, chapter NUMERIC, verse NUMERIC, text TEXT);
             INSERT INTO books VALUES (10, 'Gen', 'Genesis', '#ccccff');
             INSERT INTO books VALUES (20, 'Exo', 'Exodus', NULL);
             INSERT INTO verses VALUES (20, 1, 1, 'Love your neighbour');
             INSERT INTO verses VALUES (10, 2, 1, 'beloved and lovely');
             INSERT INTO verses VALUES (10, 1, 2, 'the love of God');
             INSERT INTO verses VALUES (10, 1, 3, '100% sure_thing');
             INSERT INTO verses VALUES (20, 2, 1, 'Любовь долготерпит, милосердствует');",
        )
        .unwrap();
        conn
    }

    fn keys(hits: &[crate::model::passage::Passage]) -> Vec<(i64, i64, i64)> {
        hits.iter()
            .map(|p| (p.document, p.section, p.item))
            .collect()
    }

    #[test]
    fn substring_search_is_case_insensitive_and_ordered() {
        let conn = seeded();
        let hits = search_passages(&conn, "love", &SearchOptions::default()).unwrap();
        assert_eq!(keys(&hits), vec![(10, 1, 2), (10, 2, 1), (20, 1, 1)]);
        assert_eq!(hits[0].document_short_name.as_deref(), Some("Gen"));
        assert_eq!(hits[0].document_color.as_deref(), Some("#ccccff"));
    }

    #[test]
    fn case_sensitive_search_skips_other_casing() {
        let conn = seeded();
        let options = SearchOptions {
            case_sensitive: true,
            ..SearchOptions::default()
        };
        let hits = search_passages(&conn, "Love", &options).unwrap();
        assert_eq!(keys(&hits), vec![(20, 1, 1)]);
    }

    #[test]
    fn whole_words_filters_before_limit() {
        let conn = seeded();
        let options = SearchOptions {
            whole_words: true,
            limit: 1,
            ..SearchOptions::default()
        };
        let hits = search_passages(&conn, "love", &options).unwrap();
        assert_eq!(keys(&hits), vec![(10, 1, 2)]);

        let all = search_passages(
            &conn,
            "love",
            &SearchOptions {
                whole_words: true,
                ..SearchOptions::default()
            },
        )
        .unwrap();
        assert_eq!(keys(&all), vec![(10, 1, 2), (20, 1, 1)]);
    }

    #[test]
    fn exact_match_compares_whole_text() {
        let conn = seeded();
        let options = SearchOptions {
            exact_match: true,
            ..SearchOptions::default()
        };
        let hits = search_passages(&conn, "THE LOVE OF GOD", &options).unwrap();
        assert_eq!(keys(&hits), vec![(10, 1, 2)]);
        assert!(search_passages(&conn, "love", &options).unwrap().is_empty());
    }

    #[test]
    fn document_filter_and_limit_apply() {
        let conn = seeded();
        let options = SearchOptions {
            document_filter: Some(20),
            ..SearchOptions::default()
        };
        assert_eq!(
            keys(&search_passages(&conn, "love", &options).unwrap()),
            vec![(20, 1, 1)]
        );
        assert_eq!(
            search_passages(&conn, "love", &SearchOptions::with_limit(2))
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn like_wildcards_are_literal() {
        let conn = seeded();
        let hits = search_passages(&conn, "0%", &SearchOptions::default()).unwrap();
        assert_eq!(keys(&hits), vec![(10, 1, 3)]);
        assert!(search_passages(&conn, "d_a", &SearchOptions::default())
            .unwrap()
            .is_empty());
        assert_eq!(escape_like("a%b_c\\"), "a\\%b\\_c\\\\");
    }

    #[test]
    fn blank_query_and_zero_limit_return_nothing() {
        let conn = seeded();
        assert!(search_passages(&conn, "   ", &SearchOptions::default())
            .unwrap()
            .is_empty());
        assert!(search_passages(&conn, "love", &SearchOptions::with_limit(0))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn non_ascii_queries_fold_unicode_case() {
        let conn = seeded();
        let hits = search_passages(&conn, "любовь", &SearchOptions::default()).unwrap();
        assert_eq!(keys(&hits), vec![(20, 2, 1)]);

        let words = SearchOptions {
            whole_words: true,
            ..SearchOptions::default()
        };
        assert_eq!(
            keys(&search_passages(&conn, "ЛЮБОВЬ", &words).unwrap()),
            vec![(20, 2, 1)]
        );
        assert!(search_passages(&conn, "любов", &words).unwrap().is_empty());

        let exact = SearchOptions {
            exact_match: true,
            ..SearchOptions::default()
        };
        assert_eq!(
            keys(&search_passages(&conn, "любовь долготерпит, МИЛОСЕРДСТВУЕТ", &exact).unwrap()),
            vec![(20, 2, 1)]
        );

        let sensitive = SearchOptions {
            case_sensitive: true,
            ..SearchOptions::default()
        };
        assert!(search_passages(&conn, "любовь", &sensitive).unwrap().is_empty());
    }
}
