use anyhow::Context;
use clap::Parser;
use coholding_core::engine::config::EngineConfig;
use coholding_core::pipeline::RecommendationJob;
use coholding_core::storage::lock::{self, JobKind};
use coholding_core::storage::portfolios::PgPortfolioSource;
use coholding_core::storage::recommendations::PgRecommendationSink;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type Job = RecommendationJob<PgPortfolioSource, PgRecommendationSink>;

#[derive(Debug, Parser)]
#[command(name = "coholding_worker")]
struct Args {
    /// Compute and log recommendations without writing to the database.
    #[arg(long)]
    dry_run: bool,

    /// Keep running, one job every N hours. Without it the job runs once.
    #[arg(long, value_parser = parse_interval_hours)]
    interval_hours: Option<f64>,
}

fn parse_interval_hours(s: &str) -> Result<f64, String> {
    let hours: f64 = s.parse().map_err(|_| format!("not a number: {s}"))?;
    if hours.is_finite() && hours > 0.0 {
        Ok(hours)
    } else {
        Err(format!("interval must be a positive number of hours (got {s})"))
    }
}

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

    let args = Args::parse();
    let config = EngineConfig::from_env()?;
    tracing::info!(?config, dry_run = args.dry_run, "engine config");

    let db_url = settings.require_database_url()?;
    let pool = coholding_core::storage::connect(db_url, 5).await?;

    if !args.dry_run {
        coholding_core::storage::migrate(&pool).await?;
    }

    let job = RecommendationJob::new(
        PgPortfolioSource::new(pool.clone()),
        PgRecommendationSink::new(pool.clone()),
        config,
    )
    .dry_run(args.dry_run);

    let Some(hours) = args.interval_hours else {
        return run_once(&pool, &job, args.dry_run).await;
    };

    let period = Duration::from_secs_f64(hours * 3600.0);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tracing::info!(interval_hours = hours, "scheduler started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => break,
        }

        // Ctrl-C mid-run drops the run; an open transaction rolls back.
        tokio::select! {
            // Already reported; the next tick is the retry.
            _ = run_once(&pool, &job, args.dry_run) => {}
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    tracing::info!("scheduler stopped");
    Ok(())
}

/// One locked run. Failures go to Sentry and the error log before being
/// returned, in both run-once and interval mode.
async fn run_once(pool: &sqlx::PgPool, job: &Job, dry_run: bool) -> anyhow::Result<()> {
    let res = execute_run(pool, job, dry_run).await;
    if let Err(err) = &res {
        report_run_failure(err);
    }
    res
}

fn report_run_failure(err: &anyhow::Error) {
    sentry_anyhow::capture_anyhow(err);
    tracing::error!(error = %format!("{err:#}"), "recommendation run failed");
}

async fn execute_run(pool: &sqlx::PgPool, job: &Job, dry_run: bool) -> anyhow::Result<()> {
    let kind = JobKind::WalletSimilarity;
    let Some(job_lock) = lock::try_acquire_job_lock(pool, kind).await? else {
        tracing::warn!(job = kind.name(), "job lock not acquired; another run in progress");
        return Ok(());
    };

    let started_at = chrono::Utc::now();
    let outcome = job.run().await;

    if !dry_run {
        if let Err(err) =
            coholding_core::storage::runs::record_run(pool, started_at, &outcome).await
        {
            tracing::warn!(error = %format!("{err:#}"), "failed to record run");
        }
    }

    if let Err(err) = job_lock.release().await {
        tracing::warn!(error = %format!("{err:#}"), "failed to release job lock");
    }

    let result = outcome
        .map_err(anyhow::Error::new)
        .with_context(|| format!("{} run failed", kind.name()))?;

    tracing::info!(
        job = kind.name(),
        wallets_analyzed = result.wallets_analyzed,
        pairs_analyzed = result.pairs_analyzed,
        recommendations_generated = result.recommendations_generated,
        recommendations_saved = result.recommendations_saved,
        elapsed_ms = (chrono::Utc::now() - started_at).num_milliseconds(),
        "recommendation run finished"
    );
    Ok(())
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
