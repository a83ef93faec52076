use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use coholding_core::domain::portfolio::normalize_ticker;
use coholding_core::domain::recommendation::also_invest_message;
use coholding_core::storage::recommendations::{self, AssetCount, StoredRecommendation};

const DEFAULT_MIN_CONFIDENCE: f64 = 0.1;
const DEFAULT_LIMIT: i64 = 10;
const DEFAULT_PERSONALIZED_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = coholding_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();
    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match coholding_core::storage::connect(db_url, 5).await {
            Ok(pool) => match coholding_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                sentry_anyhow::capture_anyhow(&e);
                tracing::error!(error = %e, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let app = router(AppState { pool });

    let port = settings.port.unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/recommendations", get(get_recommendations))
        .route("/recommendations/stats", get(get_stats))
        .route(
            "/users/:user_id/recommendations",
            get(get_personalized_recommendations),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Clone)]
struct AppState {
    pool: Option<PgPool>,
}

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    base_asset: Option<String>,
    limit: Option<i64>,
    min_confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct Filters {
    limit: i64,
    min_confidence: f64,
}

impl Filters {
    fn resolve(limit: Option<i64>, min_confidence: Option<f64>, default_limit: i64) -> Self {
        Self {
            limit: limit.unwrap_or(default_limit).clamp(1, MAX_LIMIT),
            min_confidence: min_confidence
                .filter(|c| c.is_finite())
                .unwrap_or(DEFAULT_MIN_CONFIDENCE)
                .clamp(0.0, 1.0),
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiRecommendation {
    id: Uuid,
    base_asset: String,
    recommended_asset: String,
    similarity_score: f64,
    support: f64,
    confidence: f64,
    users_with_both: i32,
    users_with_base: i32,
    percentage_also_invest: f64,
    recommendation_strength: f64,
    message: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<StoredRecommendation> for ApiRecommendation {
    fn from(r: StoredRecommendation) -> Self {
        let message =
            also_invest_message(r.percentage_also_invest, &r.base_asset, &r.recommended_asset);
        Self {
            id: r.id,
            base_asset: r.base_asset,
            recommended_asset: r.recommended_asset,
            similarity_score: r.similarity_score,
            support: r.support,
            confidence: r.confidence,
            users_with_both: r.users_with_both,
            users_with_base: r.users_with_base,
            percentage_also_invest: r.percentage_also_invest,
            recommendation_strength: r.recommendation_strength,
            message,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiRecommendationList {
    recommendations: Vec<ApiRecommendation>,
    total: usize,
    base_asset: Option<String>,
    filters: Filters,
}

fn internal_error(e: anyhow::Error) -> StatusCode {
    sentry_anyhow::capture_anyhow(&e);
    tracing::error!(error = %format!("{e:#}"), "request failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn get_recommendations(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ApiRecommendationList>, StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let filters = Filters::resolve(params.limit, params.min_confidence, DEFAULT_LIMIT);
    let base_asset = params.base_asset.as_deref().and_then(normalize_ticker);

    let rows = recommendations::list_recommendations(
        pool,
        base_asset.as_deref(),
        filters.min_confidence,
        filters.limit,
    )
    .await
    .map_err(internal_error)?;

    let recommendations: Vec<ApiRecommendation> = rows.into_iter().map(Into::into).collect();
    Ok(Json(ApiRecommendationList {
        total: recommendations.len(),
        recommendations,
        base_asset,
        filters,
    }))
}

#[derive(Debug, Serialize)]
struct ApiStats {
    total_recommendations: i64,
    top_recommendations: Vec<ApiRecommendation>,
    average_similarity_score: f64,
    average_confidence: f64,
    most_recommended_assets: Vec<AssetCount>,
    generated_at: DateTime<Utc>,
}

async fn get_stats(State(state): State<AppState>) -> Result<Json<ApiStats>, StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let stats = recommendations::stats(pool).await.map_err(internal_error)?;

    Ok(Json(ApiStats {
        total_recommendations: stats.total,
        top_recommendations: stats.top.into_iter().map(Into::into).collect(),
        average_similarity_score: stats.average_similarity_score,
        average_confidence: stats.average_confidence,
        most_recommended_assets: stats.most_recommended_assets,
        generated_at: Utc::now(),
    }))
}

#[derive(Debug, Default, Deserialize)]
struct PersonalizedParams {
    limit: Option<i64>,
    min_confidence: Option<f64>,
}

#[derive(Debug, Serialize)]
struct ApiPersonalized {
    recommendations: Vec<ApiRecommendation>,
    total: usize,
    user_assets: Vec<String>,
    filters: Filters,
}

async fn get_personalized_recommendations(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<PersonalizedParams>,
) -> Result<Json<ApiPersonalized>, StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let filters = Filters::resolve(
        params.limit,
        params.min_confidence,
        DEFAULT_PERSONALIZED_LIMIT,
    );

    let user_assets = coholding_core::storage::portfolios::user_tickers(pool, &user_id)
        .await
        .map_err(internal_error)?;

    let rows = recommendations::list_for_holdings(
        pool,
        &user_assets,
        filters.min_confidence,
        filters.limit,
    )
    .await
    .map_err(internal_error)?;

    let recommendations: Vec<ApiRecommendation> = rows.into_iter().map(Into::into).collect();
    Ok(Json(ApiPersonalized {
        total: recommendations.len(),
        recommendations,
        user_assets,
        filters,
    }))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &coholding_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
