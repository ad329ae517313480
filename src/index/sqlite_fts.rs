//! SQLite FTS5 search index

use super::{document_id, IndexDocument, IndexError, IndexResult, SearchHit, SearchIndex, SearchResults};
use crate::storage::to_db_time;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

const INDEX_SCHEMA: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS documents USING fts5(
    doc_id UNINDEXED,
    url UNINDEXED,
    title,
    content,
    page_id UNINDEXED,
    crawled_at UNINDEXED
);
"#;

/// Column weights for bm25(), in table column order; title counts double
const RANK_EXPR: &str = "bm25(documents, 0.0, 0.0, 2.0, 1.0, 0.0, 0.0)";

/// Search index stored in an SQLite FTS5 virtual table
pub struct SqliteSearchIndex {
    conn: Mutex<Connection>,
}

impl SqliteSearchIndex {
    /// Opens or creates an index database at `path`
    pub fn open(path: &Path) -> IndexResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")?;
        Self::with_connection(conn)
    }

    /// Creates an in-memory index
    pub fn open_in_memory() -> IndexResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> IndexResult<Self> {
        conn.execute_batch(INDEX_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> IndexResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| IndexError::Poisoned)
    }
}

/// Turns free text into an FTS5 query: alphanumeric terms, quoted and OR-ed
///
/// Returns `None` when the text holds no searchable term.
fn match_expression(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t.to_lowercase()))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

#[async_trait]
impl SearchIndex for SqliteSearchIndex {
    async fn index(&self, doc: IndexDocument) -> IndexResult<String> {
        let doc_id = document_id(&doc.url);
        let mut conn = self.conn()?;

        let tx = conn.transaction()?;
        tx.execute("DELETE FROM documents WHERE doc_id = ?1", params![doc_id])?;
        tx.execute(
            "INSERT INTO documents (doc_id, url, title, content, page_id, crawled_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                doc_id,
                doc.url,
                doc.title,
                doc.content,
                doc.page_id,
                to_db_time(&doc.crawled_at)
            ],
        )?;
        tx.commit()?;

        debug!(url = %doc.url, doc_id = %doc_id, "Indexed document");
        Ok(doc_id)
    }

    async fn delete(&self, doc_id: &str) -> IndexResult<()> {
        self.conn()?
            .execute("DELETE FROM documents WHERE doc_id = ?1", params![doc_id])?;
        Ok(())
    }

    async fn search(&self, query: &str, size: usize, offset: usize) -> IndexResult<SearchResults> {
        let Some(expression) = match_expression(query) else {
            return Ok(SearchResults::default());
        };

        let conn = self.conn()?;

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE documents MATCH ?1",
            params![expression],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT url, title, {rank} AS weighted_rank FROM documents
             WHERE documents MATCH ?1
             ORDER BY weighted_rank ASC
             LIMIT ?2 OFFSET ?3",
            rank = RANK_EXPR
        ))?;

        let hits = stmt
            .query_map(params![expression, size as i64, offset as i64], |row| {
                let rank: f64 = row.get(2)?;
                Ok(SearchHit {
                    url: row.get(0)?,
                    title: row.get(1)?,
                    // bm25() is lower-is-better; flip it so higher scores rank first
                    score: -rank,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SearchResults {
            total: total as u64,
            hits,
        })
    }

    async fn refresh(&self) -> IndexResult<()> {
        self.conn()?
            .execute("INSERT INTO documents (documents) VALUES ('optimize')", [])?;
        Ok(())
    }
}
