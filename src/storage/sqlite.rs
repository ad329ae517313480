//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::state::JobStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    from_db_time, to_db_time, JobRecord, NewJob, PageCounts, PageCrawl, PageRecord,
};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

const JOB_COLUMNS: &str =
    "id, url, status, requested_at, started_at, finished_at, max_depth, max_pages";

const PAGE_COLUMNS: &str =
    "id, job_id, url, last_crawled_at, http_status, storage_key_raw, search_index_key, error";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database at `path` and applies the schema
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn require_job(&self, job_id: Uuid) -> StorageResult<JobRecord> {
        self.get_job(job_id)?
            .ok_or(StorageError::JobNotFound(job_id))
    }

    fn query_jobs(&self, sql: &str, cutoff: &str) -> StorageResult<Vec<JobRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let jobs = stmt
            .query_map(params![cutoff], job_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    from_db_time(&raw).map_err(|e| conversion_error(idx, e))
}

fn optional_time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| from_db_time(&raw).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<JobRecord> {
    let status_raw: String = row.get(2)?;
    let status = JobStatus::from_db_string(&status_raw).ok_or_else(|| {
        conversion_error(2, StorageError::Corrupt(format!("job status '{}'", status_raw)))
    })?;
    let id = uuid_column(row, 0)?.ok_or(rusqlite::Error::InvalidColumnType(
        0,
        "id".to_string(),
        Type::Null,
    ))?;

    Ok(JobRecord {
        id,
        url: row.get(1)?,
        status,
        requested_at: time_column(row, 3)?,
        started_at: optional_time_column(row, 4)?,
        finished_at: optional_time_column(row, 5)?,
        max_depth: row.get(6)?,
        max_pages: row.get(7)?,
    })
}

fn page_from_row(row: &Row<'_>) -> rusqlite::Result<PageRecord> {
    Ok(PageRecord {
        id: row.get(0)?,
        job_id: uuid_column(row, 1)?,
        url: row.get(2)?,
        last_crawled_at: optional_time_column(row, 3)?,
        http_status: row.get(4)?,
        storage_key_raw: row.get(5)?,
        search_index_key: row.get(6)?,
        error: row.get(7)?,
    })
}

impl Storage for SqliteStorage {
    // ===== Job Management =====

    fn create_job(&mut self, job: &NewJob) -> StorageResult<JobRecord> {
        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO jobs (id, url, status, requested_at, max_depth, max_pages)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id.to_string(),
                job.url,
                JobStatus::Queued.to_db_string(),
                to_db_time(&job.requested_at),
                job.max_depth,
                job.max_pages
            ],
        )?;
        self.require_job(id)
    }

    fn get_job(&self, job_id: Uuid) -> StorageResult<Option<JobRecord>> {
        let job = self
            .conn
            .query_row(
                &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
                params![job_id.to_string()],
                job_from_row,
            )
            .optional()?;
        Ok(job)
    }

    fn mark_job_running(&mut self, job_id: Uuid, at: DateTime<Utc>) -> StorageResult<JobRecord> {
        let job = self.require_job(job_id)?;
        match job.status {
            JobStatus::Running => Ok(job),
            JobStatus::Queued => {
                self.conn.execute(
                    "UPDATE jobs SET status = ?1, started_at = ?2 WHERE id = ?3 AND status = ?4",
                    params![
                        JobStatus::Running.to_db_string(),
                        to_db_time(&at),
                        job_id.to_string(),
                        JobStatus::Queued.to_db_string()
                    ],
                )?;
                self.require_job(job_id)
            }
            from => Err(StorageError::InvalidTransition {
                from,
                to: JobStatus::Running,
            }),
        }
    }

    fn finish_job(
        &mut self,
        job_id: Uuid,
        status: JobStatus,
        at: DateTime<Utc>,
    ) -> StorageResult<JobRecord> {
        let job = self.require_job(job_id)?;
        if !job.status.can_transition_to(status) || !status.is_terminal() {
            return Err(StorageError::InvalidTransition {
                from: job.status,
                to: status,
            });
        }

        let updated = self.conn.execute(
            "UPDATE jobs SET status = ?1, finished_at = ?2 WHERE id = ?3 AND status = ?4",
            params![
                status.to_db_string(),
                to_db_time(&at),
                job_id.to_string(),
                job.status.to_db_string()
            ],
        )?;

        // Another writer moved the job between the read and the update
        if updated == 0 {
            let current = self.require_job(job_id)?;
            return Err(StorageError::InvalidTransition {
                from: current.status,
                to: status,
            });
        }

        self.require_job(job_id)
    }

    fn find_sla_breach(&self, cutoff: DateTime<Utc>) -> StorageResult<Option<JobRecord>> {
        let job = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM jobs
                     WHERE status IN (?1, ?2) AND requested_at < ?3
                     ORDER BY requested_at ASC LIMIT 1",
                    JOB_COLUMNS
                ),
                params![
                    JobStatus::Queued.to_db_string(),
                    JobStatus::Running.to_db_string(),
                    to_db_time(&cutoff)
                ],
                job_from_row,
            )
            .optional()?;
        Ok(job)
    }

    fn jobs_requested_before(&self, cutoff: DateTime<Utc>) -> StorageResult<Vec<JobRecord>> {
        self.query_jobs(
            &format!(
                "SELECT {} FROM jobs WHERE requested_at < ?1 ORDER BY requested_at ASC",
                JOB_COLUMNS
            ),
            &to_db_time(&cutoff),
        )
    }

    fn delete_job(&mut self, job_id: Uuid) -> StorageResult<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM jobs WHERE id = ?1", params![job_id.to_string()])?;
        if deleted == 0 {
            return Err(StorageError::JobNotFound(job_id));
        }
        Ok(())
    }

    fn count_jobs_by_status(&self) -> StorageResult<HashMap<JobStatus, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (status_raw, count) = row?;
            let status = JobStatus::from_db_string(&status_raw)
                .ok_or_else(|| StorageError::Corrupt(format!("job status '{}'", status_raw)))?;
            counts.insert(status, count as u64);
        }

        Ok(counts)
    }

    // ===== Page Management =====

    fn find_most_recent_page(&self, url: &str) -> StorageResult<Option<PageRecord>> {
        let page = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM pages WHERE url = ?1
                     ORDER BY last_crawled_at IS NULL, last_crawled_at DESC, id DESC
                     LIMIT 1",
                    PAGE_COLUMNS
                ),
                params![url],
                page_from_row,
            )
            .optional()?;
        Ok(page)
    }

    fn find_page(&self, job_id: Uuid, url: &str) -> StorageResult<Option<PageRecord>> {
        let page = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM pages WHERE job_id = ?1 AND url = ?2",
                    PAGE_COLUMNS
                ),
                params![job_id.to_string(), url],
                page_from_row,
            )
            .optional()?;
        Ok(page)
    }

    fn create_page(&mut self, job_id: Uuid, url: &str) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO pages (job_id, url) VALUES (?1, ?2)",
            params![job_id.to_string(), url],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn record_page_success(&mut self, page_id: i64, crawl: &PageCrawl) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE pages SET last_crawled_at = ?1, http_status = ?2, storage_key_raw = ?3,
             search_index_key = ?4, error = NULL WHERE id = ?5",
            params![
                to_db_time(&crawl.crawled_at),
                crawl.http_status,
                crawl.storage_key_raw,
                crawl.search_index_key,
                page_id
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::PageNotFound(page_id));
        }
        Ok(())
    }

    fn record_page_error(&mut self, page_id: i64, error: &str) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE pages SET error = ?1 WHERE id = ?2",
            params![error, page_id],
        )?;
        if updated == 0 {
            return Err(StorageError::PageNotFound(page_id));
        }
        Ok(())
    }

    fn get_page(&self, page_id: i64) -> StorageResult<Option<PageRecord>> {
        let page = self
            .conn
            .query_row(
                &format!("SELECT {} FROM pages WHERE id = ?1", PAGE_COLUMNS),
                params![page_id],
                page_from_row,
            )
            .optional()?;
        Ok(page)
    }

    fn delete_page(&mut self, page_id: i64) -> StorageResult<()> {
        self.conn
            .execute("DELETE FROM pages WHERE id = ?1", params![page_id])?;
        Ok(())
    }

    fn pages_for_job(&self, job_id: Uuid) -> StorageResult<Vec<PageRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM pages WHERE job_id = ?1 ORDER BY id ASC",
            PAGE_COLUMNS
        ))?;

        let pages = stmt
            .query_map(params![job_id.to_string()], page_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(pages)
    }

    fn count_crawled_pages(&self, job_id: Uuid) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM pages WHERE job_id = ?1 AND last_crawled_at IS NOT NULL",
            params![job_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_pages(&self) -> StorageResult<PageCounts> {
        let (total, crawled, failed): (i64, i64, i64) = self.conn.query_row(
            "SELECT COUNT(*),
                    COUNT(last_crawled_at),
                    COALESCE(SUM(CASE WHEN error IS NOT NULL THEN 1 ELSE 0 END), 0)
             FROM pages",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        Ok(PageCounts {
            total: total as u64,
            crawled: crawled as u64,
            failed: failed as u64,
        })
    }
}
