//! Job store implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use tracing::debug;

use tasker_core::{Error, Job, JobStatus, JobStore, NewJob, QueueStats, Result};

/// PostgreSQL implementation of [`JobStore`].
#[derive(Clone)]
pub struct PgJobStore {
    pool: Pool<Postgres>,
}

impl PgJobStore {
    /// Create a new PgJobStore with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Convert JobStatus to string for database.
    fn job_status_to_str(status: JobStatus) -> &'static str {
        match status {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
        }
    }

    /// Convert string from database to JobStatus.
    fn str_to_job_status(s: &str) -> JobStatus {
        match s {
            "pending" => JobStatus::Pending,
            "processing" => JobStatus::Processing,
            "finished" => JobStatus::Finished,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Pending, // fallback
        }
    }

    /// Parse a job row into a Job struct.
    fn parse_job_row(row: sqlx::postgres::PgRow) -> Job {
        Job {
            id: row.get("id"),
            job_type: row.get("type"),
            payload: row.get("payload"),
            status: Self::str_to_job_status(row.get("status")),
            scheduled_at: row.get("scheduled_at"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, job: NewJob) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO job (type, payload, status, scheduled_at)
             VALUES ($1, $2, 'pending', $3)
             RETURNING id",
        )
        .bind(&job.job_type)
        .bind(&job.payload)
        .bind(job.scheduled_at)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(id)
    }

    async fn insert_batch(&self, jobs: &[NewJob]) -> Result<Vec<i64>> {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }

        let types: Vec<&str> = jobs.iter().map(|j| j.job_type.as_str()).collect();
        let payloads: Vec<&str> = jobs.iter().map(|j| j.payload.as_str()).collect();
        let scheduled: Vec<DateTime<Utc>> = jobs.iter().map(|j| j.scheduled_at).collect();

        let ids: Vec<i64> = sqlx::query_scalar(
            "INSERT INTO job (type, payload, status, scheduled_at)
             SELECT u.type, u.payload, 'pending', u.scheduled_at
             FROM UNNEST($1::text[], $2::text[], $3::timestamptz[])
                  AS u(type, payload, scheduled_at)
             RETURNING id",
        )
        .bind(&types)
        .bind(&payloads)
        .bind(&scheduled)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "job_store",
            op = "insert_batch",
            batch_size = ids.len(),
            "Bulk-inserted jobs"
        );
        Ok(ids)
    }

    async fn select_due(&self, now: DateTime<Utc>) -> Result<Vec<Job>> {
        let rows = sqlx::query(
            "SELECT id, type, payload, status, scheduled_at, created_at
             FROM job
             WHERE status = 'pending' AND scheduled_at <= $1
             ORDER BY scheduled_at, id",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_job_row).collect())
    }

    async fn claim(&self, ids: &[i64]) -> Result<Vec<i64>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        // Compare-and-set on status: a job already claimed by a
        // concurrent tick (or already terminal) is skipped, so no job
        // is ever dispatched twice from the same pending state.
        let claimed: Vec<i64> = sqlx::query_scalar(
            "UPDATE job
             SET status = 'processing'
             WHERE id = ANY($1) AND status = 'pending'
             RETURNING id",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(claimed)
    }

    async fn update_status_batch(&self, updates: &[(i64, JobStatus)]) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        if let Some((id, status)) = updates.iter().find(|(_, s)| !s.is_terminal()) {
            return Err(Error::Job(format!(
                "update_status_batch only writes terminal statuses, got {:?} for job {}",
                status, id
            )));
        }

        let ids: Vec<i64> = updates.iter().map(|(id, _)| *id).collect();
        let statuses: Vec<&str> = updates
            .iter()
            .map(|(_, s)| Self::job_status_to_str(*s))
            .collect();

        // Only processing rows transition: re-applying a terminal batch
        // is a no-op and a terminal status never regresses.
        sqlx::query(
            "UPDATE job
             SET status = u.status
             FROM UNNEST($1::bigint[], $2::text[]) AS u(id, status)
             WHERE job.id = u.id AND job.status = 'processing'",
        )
        .bind(&ids)
        .bind(&statuses)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }

    async fn release(&self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        sqlx::query(
            "UPDATE job
             SET status = 'pending'
             WHERE id = ANY($1) AND status = 'processing'",
        )
        .bind(ids)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Option<Job>> {
        let row = sqlx::query(
            "SELECT id, type, payload, status, scheduled_at, created_at
             FROM job WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_job_row))
    }

    async fn pending_count(&self) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM job WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(count)
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        let row = sqlx::query(
            "SELECT
                COUNT(*) FILTER (WHERE status = 'pending') as pending,
                COUNT(*) FILTER (WHERE status = 'processing') as processing,
                COUNT(*) FILTER (WHERE status = 'finished') as finished,
                COUNT(*) FILTER (WHERE status = 'failed') as failed,
                COUNT(*) as total
             FROM job",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(QueueStats {
            pending: row.get::<i64, _>("pending"),
            processing: row.get::<i64, _>("processing"),
            finished: row.get::<i64, _>("finished"),
            failed: row.get::<i64, _>("failed"),
            total: row.get::<i64, _>("total"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_to_str_all_variants() {
        assert_eq!(PgJobStore::job_status_to_str(JobStatus::Pending), "pending");
        assert_eq!(
            PgJobStore::job_status_to_str(JobStatus::Processing),
            "processing"
        );
        assert_eq!(
            PgJobStore::job_status_to_str(JobStatus::Finished),
            "finished"
        );
        assert_eq!(PgJobStore::job_status_to_str(JobStatus::Failed), "failed");
    }

    #[test]
    fn test_str_to_job_status_all_variants() {
        assert_eq!(PgJobStore::str_to_job_status("pending"), JobStatus::Pending);
        assert_eq!(
            PgJobStore::str_to_job_status("processing"),
            JobStatus::Processing
        );
        assert_eq!(
            PgJobStore::str_to_job_status("finished"),
            JobStatus::Finished
        );
        assert_eq!(PgJobStore::str_to_job_status("failed"), JobStatus::Failed);
    }

    #[test]
    fn test_str_to_job_status_unknown_fallback() {
        assert_eq!(
            PgJobStore::str_to_job_status("unknown_status"),
            JobStatus::Pending
        );
        assert_eq!(PgJobStore::str_to_job_status(""), JobStatus::Pending);
    }

    #[test]
    fn test_job_status_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Finished,
            JobStatus::Failed,
        ] {
            let s = PgJobStore::job_status_to_str(status);
            assert_eq!(PgJobStore::str_to_job_status(s), status);
        }
    }

    #[test]
    fn test_job_status_strings_are_unique() {
        let statuses = [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Finished,
            JobStatus::Failed,
        ];
        let mut strings: Vec<&str> = statuses
            .iter()
            .map(|s| PgJobStore::job_status_to_str(*s))
            .collect();
        strings.sort();
        strings.dedup();
        assert_eq!(strings.len(), statuses.len());
    }
}
