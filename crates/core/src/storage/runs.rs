use crate::domain::recommendation::RunResult;
use crate::pipeline::RunError;
use anyhow::Context;
use chrono::{DateTime, Utc};
use uuid::Uuid;

fn as_int(n: impl TryInto<i32>) -> i32 {
    n.try_into().unwrap_or(i32::MAX)
}

/// Appends one audit row for a finished run.
pub async fn record_run(
    pool: &sqlx::PgPool,
    started_at: DateTime<Utc>,
    outcome: &Result<RunResult, RunError>,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    let finished_at = Utc::now();

    let (status, error_kind, error, counts) = match outcome {
        Ok(result) => ("success", None, None, *result),
        Err(err) => (
            "error",
            Some(err.kind()),
            Some(err.to_string()),
            RunResult::default(),
        ),
    };

    sqlx::query(
        "INSERT INTO recommendation_runs (id, started_at, finished_at, status, error_kind, error, \
         wallets_analyzed, pairs_analyzed, recommendations_generated, recommendations_saved) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .persistent(false)
    .bind(id)
    .bind(started_at)
    .bind(finished_at)
    .bind(status)
    .bind(error_kind)
    .bind(error)
    .bind(as_int(counts.wallets_analyzed))
    .bind(as_int(counts.pairs_analyzed))
    .bind(as_int(counts.recommendations_generated))
    .bind(as_int(counts.recommendations_saved))
    .execute(pool)
    .await
    .context("insert recommendation_runs failed")?;

    Ok(id)
}
