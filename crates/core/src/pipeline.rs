use crate::domain::portfolio::Wallet;
use crate::domain::recommendation::{Recommendation, RunResult};
use crate::engine::{self, config::EngineConfig};
use std::sync::Arc;

/// Supplies the current snapshot of wallets with positive-quantity holdings.
#[async_trait::async_trait]
pub trait PortfolioSource: Send + Sync {
    async fn load_wallets(&self) -> anyhow::Result<Vec<Wallet>>;
}

/// Atomically replaces the stored recommendation set with `recommendations`.
/// Either the whole list is visible afterwards or the previous set is.
#[async_trait::async_trait]
pub trait RecommendationSink: Send + Sync {
    async fn replace_all(
        &self,
        recommendations: &[Recommendation],
        batch_size: usize,
    ) -> anyhow::Result<u64>;
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("load failure: {0:#}")]
    Load(anyhow::Error),

    #[error("computation aborted: {0}")]
    Aborted(String),

    #[error("persist failure: {0:#}")]
    Persist(anyhow::Error),
}

impl RunError {
    pub fn kind(&self) -> &'static str {
        match self {
            RunError::Load(_) => "load",
            RunError::Aborted(_) => "aborted",
            RunError::Persist(_) => "persist",
        }
    }
}

pub struct RecommendationJob<S, K> {
    source: S,
    sink: K,
    config: Arc<EngineConfig>,
    dry_run: bool,
}

impl<S, K> RecommendationJob<S, K>
where
    S: PortfolioSource,
    K: RecommendationSink,
{
    pub fn new(source: S, sink: K, config: EngineConfig) -> Self {
        Self {
            source,
            sink,
            config: Arc::new(config),
            dry_run: false,
        }
    }

    /// Compute and log, but never call the sink.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub async fn run(&self) -> Result<RunResult, RunError> {
        let wallets = self.source.load_wallets().await.map_err(RunError::Load)?;
        tracing::info!(wallets = wallets.len(), "loaded portfolio snapshot");

        let config = Arc::clone(&self.config);
        let computation = tokio::task::spawn_blocking(move || engine::compute(&wallets, &config))
            .await
            .map_err(|e| RunError::Aborted(e.to_string()))?;

        tracing::info!(
            wallets_analyzed = computation.wallets_analyzed,
            pairs_analyzed = computation.pairs_analyzed,
            recommendations = computation.recommendations.len(),
            "computed co-holding recommendations"
        );
        log_top(&computation.recommendations, 5);

        let mut result = RunResult {
            wallets_analyzed: computation.wallets_analyzed,
            pairs_analyzed: computation.pairs_analyzed,
            recommendations_generated: computation.recommendations.len(),
            recommendations_saved: 0,
        };

        if self.dry_run {
            tracing::info!(dry_run = true, "skipping persistence");
            return Ok(result);
        }

        result.recommendations_saved = self
            .sink
            .replace_all(&computation.recommendations, self.config.batch_size())
            .await
            .map_err(RunError::Persist)?;

        tracing::info!(saved = result.recommendations_saved, "replaced stored recommendations");
        Ok(result)
    }
}

fn log_top(recommendations: &[Recommendation], n: usize) {
    for (i, r) in recommendations.iter().take(n).enumerate() {
        tracing::info!(
            rank = i + 1,
            strength = r.strength,
            "{} ({}/{} users)",
            r.message(),
            r.users_with_both,
            r.users_with_base
        );
    }
}
