use anyhow::Context;
use sqlx::pool::PoolConnection;
use sqlx::Postgres;

// Advisory locks are scoped to the Postgres session, so the lock keeps hold of
// the connection it was taken on and unlocks on that same connection.
const LOCK_NAMESPACE: i64 = 0x434F_484F_4C44; // "COHOLD"

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    WalletSimilarity,
}

impl JobKind {
    fn lock_key(self) -> i64 {
        match self {
            JobKind::WalletSimilarity => LOCK_NAMESPACE ^ 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            JobKind::WalletSimilarity => "wallet_similarity",
        }
    }
}

pub struct JobLock {
    conn: Option<PoolConnection<Postgres>>,
    key: i64,
}

/// Returns `None` when another session already holds the lock for `job`.
pub async fn try_acquire_job_lock(
    pool: &sqlx::PgPool,
    job: JobKind,
) -> anyhow::Result<Option<JobLock>> {
    let key = job.lock_key();
    let mut conn = pool
        .acquire()
        .await
        .context("acquire connection for advisory lock failed")?;

    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(key)
        .fetch_one(&mut *conn)
        .await
        .with_context(|| format!("failed to acquire advisory lock (key={key})"))?;

    if !acquired.0 {
        return Ok(None);
    }

    Ok(Some(JobLock {
        conn: Some(conn),
        key,
    }))
}

impl JobLock {
    pub async fn release(mut self) -> anyhow::Result<()> {
        let key = self.key;
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };
        let res = sqlx::query("SELECT pg_advisory_unlock($1)")
            .persistent(false)
            .bind(key)
            .execute(&mut *conn)
            .await;
        if res.is_err() {
            drop(conn.detach());
        }
        res.with_context(|| format!("failed to release advisory lock (key={key})"))?;
        Ok(())
    }
}

impl Drop for JobLock {
    fn drop(&mut self) {
        // Not released (error path or cancelled task): close the session instead
        // of handing a locked connection back to the pool.
        if let Some(conn) = self.conn.take() {
            drop(conn.detach());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_key_stays_in_namespace() {
        let key = JobKind::WalletSimilarity.lock_key();
        assert_ne!(key, 0);
        assert_eq!(key & !0xFF, LOCK_NAMESPACE & !0xFF);
    }
}
