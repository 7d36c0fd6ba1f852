//! SQLite-backed job queue and status table.
//!
//! Queue state lives in the same row as the job record:
//! - ready: `resolved = 0`, no lease, `available_at` in the past
//! - leased: `resolved = 0`, lease token set; redeliverable once the lease expires
//! - resolved: `resolved = 1`, never delivered again

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::config::QueueConfig;
use super::error::QueueError;
use super::traits::{Delivery, JobQueue, JobStore, Lease};
use crate::failure::{Failure, RetryConfig};
use crate::job::{EnqueueRequest, Job, JobFilter, JobStatus};
use crate::metrics;

const JOB_COLUMNS: &str = "id, input_location, output_location, status, progress, attempt, \
     last_error, failure_class, resolved, created_at, updated_at, completed_at";

/// SQLite-backed durable queue.
///
/// The async queue operations run their statements on the blocking pool;
/// the `JobStore` methods are single short statements run in place.
pub struct SqliteJobQueue {
    conn: Arc<Mutex<Connection>>,
    config: QueueConfig,
    retry: RetryConfig,
    notify: Notify,
}

impl SqliteJobQueue {
    /// Opens (or creates) the queue database at `path`.
    pub fn new(path: &Path, config: QueueConfig) -> Result<Self, QueueError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self::from_connection(conn, config))
    }

    /// Create an in-memory queue (useful for testing).
    pub fn in_memory(config: QueueConfig) -> Result<Self, QueueError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self::from_connection(conn, config))
    }

    fn from_connection(conn: Connection, config: QueueConfig) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            config,
            retry: RetryConfig::default(),
            notify: Notify::new(),
        }
    }

    /// Sets the backoff policy applied to requeued jobs.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn initialize_schema(conn: &Connection) -> Result<(), QueueError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                input_location TEXT NOT NULL,
                output_location TEXT NOT NULL,
                status TEXT NOT NULL,
                progress INTEGER NOT NULL DEFAULT 0,
                attempt INTEGER NOT NULL DEFAULT 1,
                last_error TEXT,
                failure_class TEXT,
                resolved INTEGER NOT NULL DEFAULT 0,
                delivered INTEGER NOT NULL DEFAULT 0,
                available_at INTEGER NOT NULL,
                lease_token TEXT,
                lease_owner TEXT,
                lease_expires_at INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                completed_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_claim ON jobs(resolved, available_at);
            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, QueueError> {
        lock(&self.conn)
    }

    /// Runs `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, QueueError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, QueueError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || f(&mut *lock(&conn)?))
            .await
            .map_err(|e| QueueError::Database(format!("queue task failed: {}", e)))?
    }

    fn visibility_ms(&self) -> i64 {
        (self.config.visibility_timeout_secs as i64).saturating_mul(1000)
    }

    /// Claims the oldest available job in one immediate transaction.
    fn claim_next(
        conn: &mut Connection,
        worker_id: &str,
        visibility_ms: i64,
    ) -> Result<Option<Delivery>, QueueError> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let now = Utc::now();
        let now_ms = now.timestamp_millis();

        let candidate: Option<(String, bool)> = tx
            .query_row(
                "SELECT id, lease_token IS NOT NULL FROM jobs
                 WHERE resolved = 0
                   AND ((lease_token IS NULL AND available_at <= ?1)
                     OR (lease_token IS NOT NULL AND lease_expires_at <= ?1))
                 ORDER BY rowid ASC
                 LIMIT 1",
                params![now_ms],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((id, lease_expired)) = candidate else {
            return Ok(None);
        };

        let token = uuid::Uuid::new_v4().to_string();
        let expires_ms = now_ms.saturating_add(visibility_ms);
        let expires_at = DateTime::from_timestamp_millis(expires_ms).unwrap_or(now);

        tx.execute(
            "UPDATE jobs SET
                status = ?1,
                progress = 0,
                last_error = NULL,
                failure_class = NULL,
                completed_at = NULL,
                attempt = CASE WHEN delivered = 0 THEN attempt ELSE attempt + 1 END,
                delivered = 1,
                lease_token = ?2,
                lease_owner = ?3,
                lease_expires_at = ?4,
                updated_at = ?5
             WHERE id = ?6",
            params![
                JobStatus::Processing.as_str(),
                token,
                worker_id,
                expires_ms,
                now.to_rfc3339(),
                id,
            ],
        )?;

        let job = tx.query_row(
            &format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS),
            params![id],
            Self::row_to_job,
        )?;
        tx.commit()?;

        if lease_expired {
            warn!(
                job_id = %id,
                worker_id = %worker_id,
                attempt = job.attempt,
                "Redelivering job after lease expiry"
            );
            metrics::LEASE_EXPIRIES.inc();
        } else {
            debug!(job_id = %id, worker_id = %worker_id, attempt = job.attempt, "Job leased");
        }
        metrics::JOBS_DEQUEUED.inc();

        Ok(Some(Delivery {
            job,
            lease: Lease {
                job_id: id,
                token,
                expires_at,
            },
        }))
    }

    fn build_where_clause(filter: &JobFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status.as_str()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn fetch(conn: &Connection, id: &str) -> Result<Option<Job>, QueueError> {
        let job = conn
            .query_row(
                &format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS),
                params![id],
                Self::row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
        let status_str: String = row.get(3)?;
        let failure_class_str: Option<String> = row.get(7)?;
        let created_at_str: String = row.get(9)?;
        let updated_at_str: String = row.get(10)?;
        let completed_at_str: Option<String> = row.get(11)?;

        let failure_class = failure_class_str
            .map(|s| parse_column(7, &s))
            .transpose()?;

        Ok(Job {
            id: row.get(0)?,
            input_location: row.get(1)?,
            output_location: row.get(2)?,
            status: parse_column(3, &status_str)?,
            progress_percent: row.get(4)?,
            attempt: row.get(5)?,
            last_error: row.get(6)?,
            failure_class,
            resolved: row.get(8)?,
            created_at: parse_timestamp(&created_at_str),
            updated_at: parse_timestamp(&updated_at_str),
            completed_at: completed_at_str.as_deref().map(parse_timestamp),
        })
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, QueueError> {
    conn.lock()
        .map_err(|e| QueueError::Database(format!("connection lock poisoned: {}", e)))
}

fn parse_column<T: FromStr<Err = String>>(idx: usize, value: &str) -> rusqlite::Result<T> {
    value.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

// Timestamps are always written by this module as RFC 3339.
fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[async_trait]
impl JobQueue for SqliteJobQueue {
    async fn enqueue(&self, request: EnqueueRequest) -> Result<Job, QueueError> {
        if request.input_location.trim().is_empty() {
            return Err(QueueError::Invalid("input_location must not be empty".into()));
        }
        if request.output_location.trim().is_empty() {
            return Err(QueueError::Invalid("output_location must not be empty".into()));
        }
        let id = match request.id {
            Some(id) if id.trim().is_empty() => {
                return Err(QueueError::Invalid("id must not be empty".into()));
            }
            Some(id) => id,
            None => uuid::Uuid::new_v4().to_string(),
        };

        let now = Utc::now();
        let job = Job {
            id,
            input_location: request.input_location,
            output_location: request.output_location,
            status: JobStatus::Queued,
            progress_percent: 0,
            attempt: 1,
            last_error: None,
            failure_class: None,
            resolved: false,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        let row = job.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO jobs (id, input_location, output_location, status, available_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    row.id,
                    row.input_location,
                    row.output_location,
                    JobStatus::Queued.as_str(),
                    row.created_at.timestamp_millis(),
                    row.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    QueueError::Duplicate(row.id.clone())
                } else {
                    e.into()
                }
            })
        })
        .await?;

        self.notify.notify_one();
        metrics::JOBS_ENQUEUED.inc();
        info!(job_id = %job.id, input = %job.input_location, "Job enqueued");

        Ok(job)
    }

    async fn dequeue(
        &self,
        worker_id: &str,
        wait: Duration,
    ) -> Result<Option<Delivery>, QueueError> {
        let deadline = tokio::time::Instant::now() + wait;
        let visibility_ms = self.visibility_ms();
        loop {
            let owner = worker_id.to_string();
            let claimed = self
                .with_conn(move |conn| Self::claim_next(conn, &owner, visibility_ms))
                .await?;
            if let Some(delivery) = claimed {
                return Ok(Some(delivery));
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let nap = (deadline - now).min(self.config.poll_interval());

            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(nap) => {}
            }
        }
    }

    async fn ack(&self, lease: &Lease) -> Result<(), QueueError> {
        let owned = lease.clone();
        let updated = self
            .with_conn(move |conn| {
                Ok(conn.execute(
                    "UPDATE jobs SET resolved = 1, lease_token = NULL, lease_owner = NULL,
                        lease_expires_at = NULL, updated_at = ?1
                     WHERE id = ?2 AND lease_token = ?3 AND resolved = 0",
                    params![Utc::now().to_rfc3339(), owned.job_id, owned.token],
                )?)
            })
            .await?;

        if updated == 0 {
            return Err(QueueError::lease_lost(&lease.job_id));
        }
        debug!(job_id = %lease.job_id, "Job acked");
        Ok(())
    }

    async fn nack(&self, lease: &Lease, requeue: bool) -> Result<(), QueueError> {
        let owned = lease.clone();
        let retry = self.retry.clone();
        self.with_conn(move |conn| {
            let lease = owned;
            let now = Utc::now();
            let attempt: Option<u32> = conn
                .query_row(
                    "SELECT attempt FROM jobs WHERE id = ?1 AND lease_token = ?2 AND resolved = 0",
                    params![lease.job_id, lease.token],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(attempt) = attempt else {
                return Err(QueueError::lease_lost(&lease.job_id));
            };

            if !requeue {
                conn.execute(
                    "UPDATE jobs SET resolved = 1, lease_token = NULL, lease_owner = NULL,
                        lease_expires_at = NULL, updated_at = ?1
                     WHERE id = ?2 AND lease_token = ?3",
                    params![now.to_rfc3339(), lease.job_id, lease.token],
                )?;
                debug!(job_id = %lease.job_id, attempt, "Job nacked without requeue");
                return Ok(());
            }

            let delay = retry.backoff(attempt);
            let available_at = now
                .timestamp_millis()
                .saturating_add(delay.as_millis() as i64);

            conn.execute(
                "UPDATE jobs SET
                    status = CASE WHEN status = 'processing' THEN 'queued' ELSE status END,
                    lease_token = NULL,
                    lease_owner = NULL,
                    lease_expires_at = NULL,
                    available_at = ?1,
                    updated_at = ?2
                 WHERE id = ?3 AND lease_token = ?4",
                params![available_at, now.to_rfc3339(), lease.job_id, lease.token],
            )?;
            info!(
                job_id = %lease.job_id,
                attempt,
                delay_secs = delay.as_secs_f64(),
                "Job requeued"
            );
            Ok(())
        })
        .await?;

        if requeue {
            self.notify.notify_one();
        }
        Ok(())
    }

    async fn extend_lease(&self, lease: &Lease) -> Result<Lease, QueueError> {
        let now = Utc::now();
        let expires_ms = now.timestamp_millis().saturating_add(self.visibility_ms());

        let owned = lease.clone();
        let updated = self
            .with_conn(move |conn| {
                Ok(conn.execute(
                    "UPDATE jobs SET lease_expires_at = ?1, updated_at = ?2
                     WHERE id = ?3 AND lease_token = ?4 AND resolved = 0",
                    params![expires_ms, now.to_rfc3339(), owned.job_id, owned.token],
                )?)
            })
            .await?;

        if updated == 0 {
            return Err(QueueError::lease_lost(&lease.job_id));
        }

        Ok(Lease {
            job_id: lease.job_id.clone(),
            token: lease.token.clone(),
            expires_at: DateTime::from_timestamp_millis(expires_ms).unwrap_or(now),
        })
    }
}

impl JobStore for SqliteJobQueue {
    fn get(&self, id: &str) -> Result<Option<Job>, QueueError> {
        let conn = self.conn()?;
        Self::fetch(&conn, id)
    }

    fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, QueueError> {
        let conn = self.conn()?;
        let (where_clause, mut params) = Self::build_where_clause(filter);

        let mut sql = format!(
            "SELECT {} FROM jobs {} ORDER BY rowid DESC",
            JOB_COLUMNS, where_clause
        );
        match (filter.limit, filter.offset) {
            (Some(limit), offset) => {
                sql.push_str(" LIMIT ? OFFSET ?");
                params.push(Box::new(limit as i64));
                params.push(Box::new(offset.unwrap_or(0) as i64));
            }
            (None, Some(offset)) => {
                sql.push_str(" LIMIT -1 OFFSET ?");
                params.push(Box::new(offset as i64));
            }
            (None, None) => {}
        }

        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let jobs = stmt
            .query_map(param_refs.as_slice(), Self::row_to_job)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(jobs)
    }

    fn count(&self, filter: &JobFilter) -> Result<i64, QueueError> {
        let conn = self.conn()?;
        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!("SELECT COUNT(*) FROM jobs {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let count: i64 = conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?;

        Ok(count)
    }

    fn record_progress(&self, lease: &Lease, percent: u8) -> Result<bool, QueueError> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE jobs SET progress = MAX(progress, ?1), updated_at = ?2
             WHERE id = ?3 AND lease_token = ?4 AND status = 'processing'",
            params![
                percent.min(100),
                Utc::now().to_rfc3339(),
                lease.job_id,
                lease.token
            ],
        )?;
        Ok(updated > 0)
    }

    fn mark_completed(&self, lease: &Lease, output_location: &str) -> Result<Job, QueueError> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        let updated = conn.execute(
            "UPDATE jobs SET status = ?1, progress = 100, output_location = ?2,
                last_error = NULL, failure_class = NULL, completed_at = ?3, updated_at = ?3
             WHERE id = ?4 AND lease_token = ?5",
            params![
                JobStatus::Completed.as_str(),
                output_location,
                now,
                lease.job_id,
                lease.token
            ],
        )?;

        if updated == 0 {
            return Err(QueueError::lease_lost(&lease.job_id));
        }
        Self::fetch(&conn, &lease.job_id)?.ok_or_else(|| QueueError::NotFound(lease.job_id.clone()))
    }

    fn mark_failed(&self, lease: &Lease, failure: &Failure) -> Result<Job, QueueError> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        let updated = conn.execute(
            "UPDATE jobs SET status = ?1, last_error = ?2, failure_class = ?3,
                completed_at = ?4, updated_at = ?4
             WHERE id = ?5 AND lease_token = ?6",
            params![
                JobStatus::Failed.as_str(),
                failure.reason,
                failure.class.as_str(),
                now,
                lease.job_id,
                lease.token
            ],
        )?;

        if updated == 0 {
            return Err(QueueError::lease_lost(&lease.job_id));
        }
        Self::fetch(&conn, &lease.job_id)?.ok_or_else(|| QueueError::NotFound(lease.job_id.clone()))
    }
}
