use crate::domain::recommendation::{round_to, Recommendation};
use crate::pipeline::RecommendationSink;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

const RATIO_SCALE: i32 = 4;
const PERCENT_SCALE: i32 = 2;

/// A recommendation as read back from `asset_recommendations`.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct StoredRecommendation {
    pub id: Uuid,
    pub base_asset: String,
    pub recommended_asset: String,
    pub similarity_score: f64,
    pub support: f64,
    pub confidence: f64,
    pub users_with_both: i32,
    pub users_with_base: i32,
    pub percentage_also_invest: f64,
    pub recommendation_strength: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Column values for one insert, already rounded to the column scale.
#[derive(Debug, Clone, PartialEq)]
struct InsertRow<'a> {
    id: Uuid,
    base_asset: &'a str,
    recommended_asset: &'a str,
    similarity_score: f64,
    support: f64,
    confidence: f64,
    users_with_both: i32,
    users_with_base: i32,
    percentage_also_invest: f64,
    recommendation_strength: f64,
}

impl<'a> InsertRow<'a> {
    fn from_recommendation(r: &'a Recommendation) -> anyhow::Result<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            base_asset: &r.base_asset,
            recommended_asset: &r.recommended_asset,
            similarity_score: round_to(r.similarity_score, RATIO_SCALE),
            support: round_to(r.support, RATIO_SCALE),
            confidence: round_to(r.confidence, RATIO_SCALE),
            users_with_both: i32::try_from(r.users_with_both)
                .context("users_with_both does not fit INTEGER")?,
            users_with_base: i32::try_from(r.users_with_base)
                .context("users_with_base does not fit INTEGER")?,
            percentage_also_invest: round_to(r.percentage_also_invest, PERCENT_SCALE),
            recommendation_strength: round_to(r.strength, RATIO_SCALE),
        })
    }
}

/// Deletes every stored recommendation and inserts `recommendations` in one
/// transaction. An error at any point drops the transaction, which rolls back
/// the delete as well.
pub async fn replace_all(
    pool: &sqlx::PgPool,
    recommendations: &[Recommendation],
    batch_size: usize,
) -> anyhow::Result<u64> {
    anyhow::ensure!(batch_size >= 1, "batch_size must be >= 1");

    let rows = recommendations
        .iter()
        .map(InsertRow::from_recommendation)
        .collect::<anyhow::Result<Vec<_>>>()?;
    let now = Utc::now();

    let mut tx = pool.begin().await.context("begin transaction failed")?;

    let deleted = sqlx::query("DELETE FROM asset_recommendations")
        .persistent(false)
        .execute(&mut *tx)
        .await
        .context("delete asset_recommendations failed")?
        .rows_affected();

    let mut inserted: u64 = 0;
    for (batch_idx, chunk) in rows.chunks(batch_size).enumerate() {
        let t0 = std::time::Instant::now();
        let mut qb = sqlx::QueryBuilder::new(
            "INSERT INTO asset_recommendations (id, base_asset, recommended_asset, similarity_score, \
             support, confidence, users_with_both, users_with_base, percentage_also_invest, \
             recommendation_strength, created_at, updated_at) ",
        );
        qb.push_values(chunk, |mut b, row| {
            b.push_bind(row.id)
                .push_bind(row.base_asset)
                .push_bind(row.recommended_asset)
                .push_bind(row.similarity_score)
                .push_bind(row.support)
                .push_bind(row.confidence)
                .push_bind(row.users_with_both)
                .push_bind(row.users_with_base)
                .push_bind(row.percentage_also_invest)
                .push_bind(row.recommendation_strength)
                .push_bind(now)
                .push_bind(now);
        });

        let res = qb
            .build()
            .persistent(false)
            .execute(&mut *tx)
            .await
            .context("batch insert asset_recommendations failed")?;
        inserted += res.rows_affected();

        tracing::debug!(
            batch_idx,
            batch_size = chunk.len(),
            elapsed_ms = t0.elapsed().as_millis(),
            "asset_recommendations batch insert"
        );
    }

    tx.commit().await.context("commit transaction failed")?;
    tracing::debug!(deleted, inserted, "asset_recommendations replaced");
    Ok(inserted)
}

#[derive(Debug, Clone)]
pub struct PgRecommendationSink {
    pool: sqlx::PgPool,
}

impl PgRecommendationSink {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RecommendationSink for PgRecommendationSink {
    async fn replace_all(
        &self,
        recommendations: &[Recommendation],
        batch_size: usize,
    ) -> anyhow::Result<u64> {
        replace_all(&self.pool, recommendations, batch_size).await
    }
}

const SELECT_STORED: &str = "SELECT id, base_asset, recommended_asset, \
     similarity_score::float8 AS similarity_score, support::float8 AS support, \
     confidence::float8 AS confidence, users_with_both, users_with_base, \
     percentage_also_invest::float8 AS percentage_also_invest, \
     recommendation_strength::float8 AS recommendation_strength, created_at, updated_at \
     FROM asset_recommendations ";

const ORDER_BY_STRENGTH: &str =
    " ORDER BY recommendation_strength DESC, base_asset ASC, recommended_asset ASC LIMIT ";

/// Strongest recommendations, optionally for one base asset.
pub async fn list_recommendations(
    pool: &sqlx::PgPool,
    base_asset: Option<&str>,
    min_confidence: f64,
    limit: i64,
) -> anyhow::Result<Vec<StoredRecommendation>> {
    let mut qb = sqlx::QueryBuilder::new(SELECT_STORED);
    qb.push("WHERE confidence >= ").push_bind(min_confidence);
    if let Some(base) = base_asset {
        qb.push(" AND base_asset = ").push_bind(base);
    }
    qb.push(ORDER_BY_STRENGTH).push_bind(limit);

    qb.build_query_as::<StoredRecommendation>()
        .fetch_all(pool)
        .await
        .context("select asset_recommendations failed")
}

/// Recommendations based on assets in `held`, excluding anything already in
/// `held`.
pub async fn list_for_holdings(
    pool: &sqlx::PgPool,
    held: &[String],
    min_confidence: f64,
    limit: i64,
) -> anyhow::Result<Vec<StoredRecommendation>> {
    if held.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb = sqlx::QueryBuilder::new(SELECT_STORED);
    qb.push("WHERE confidence >= ")
        .push_bind(min_confidence)
        .push(" AND base_asset = ANY(")
        .push_bind(held.to_vec())
        .push(") AND NOT (recommended_asset = ANY(")
        .push_bind(held.to_vec())
        .push("))");
    qb.push(ORDER_BY_STRENGTH).push_bind(limit);

    qb.build_query_as::<StoredRecommendation>()
        .fetch_all(pool)
        .await
        .context("select personalized asset_recommendations failed")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetCount {
    pub asset: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationStats {
    pub total: i64,
    pub top: Vec<StoredRecommendation>,
    pub average_similarity_score: f64,
    pub average_confidence: f64,
    pub most_recommended_assets: Vec<AssetCount>,
}

pub async fn stats(pool: &sqlx::PgPool) -> anyhow::Result<RecommendationStats> {
    let (total, average_similarity_score, average_confidence): (i64, Option<f64>, Option<f64>) =
        sqlx::query_as(
            "SELECT COUNT(*), AVG(similarity_score)::float8, AVG(confidence)::float8 \
             FROM asset_recommendations",
        )
        .fetch_one(pool)
        .await
        .context("aggregate asset_recommendations failed")?;

    let top = list_recommendations(pool, None, 0.0, 5).await?;

    let most_recommended_assets = sqlx::query_as::<_, (String, i64)>(
        "SELECT recommended_asset, COUNT(*) AS n \
         FROM asset_recommendations \
         GROUP BY recommended_asset \
         ORDER BY n DESC, recommended_asset ASC \
         LIMIT 10",
    )
    .fetch_all(pool)
    .await
    .context("select most recommended assets failed")?
    .into_iter()
    .map(|(asset, count)| AssetCount { asset, count })
    .collect();

    Ok(RecommendationStats {
        total,
        top,
        average_similarity_score: average_similarity_score.unwrap_or(0.0),
        average_confidence: average_confidence.unwrap_or(0.0),
        most_recommended_assets,
    })
}
