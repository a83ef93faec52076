use anyhow::Context;
use std::str::FromStr;

const DEFAULT_MIN_SIMILARITY_THRESHOLD: f64 = 0.05;
const DEFAULT_MIN_USERS_FOR_RECOMMENDATION: usize = 5;
const DEFAULT_BATCH_SIZE: usize = 1000;
const DEFAULT_SHARD_SIZE: usize = 2048;

/// Immutable knobs for one recommendation run. Only obtainable through
/// [`EngineConfig::new`] (or [`EngineConfig::from_env`]), so every value seen
/// by the engine has been validated.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    min_similarity_threshold: f64,
    min_users_for_recommendation: usize,
    max_recommendations_per_asset: Option<usize>,
    batch_size: usize,
    shard_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_similarity_threshold: DEFAULT_MIN_SIMILARITY_THRESHOLD,
            min_users_for_recommendation: DEFAULT_MIN_USERS_FOR_RECOMMENDATION,
            max_recommendations_per_asset: None,
            batch_size: DEFAULT_BATCH_SIZE,
            shard_size: DEFAULT_SHARD_SIZE,
        }
    }
}

impl EngineConfig {
    pub fn new(
        min_similarity_threshold: f64,
        min_users_for_recommendation: usize,
        max_recommendations_per_asset: Option<usize>,
        batch_size: usize,
        shard_size: usize,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(
            (0.0..=1.0).contains(&min_similarity_threshold),
            "min_similarity_threshold must be between 0 and 1 (got {min_similarity_threshold})"
        );
        anyhow::ensure!(
            min_users_for_recommendation >= 1,
            "min_users_for_recommendation must be >= 1"
        );
        if let Some(n) = max_recommendations_per_asset {
            anyhow::ensure!(n >= 1, "max_recommendations_per_asset must be >= 1 when set");
        }
        anyhow::ensure!(batch_size >= 1, "batch_size must be >= 1");
        anyhow::ensure!(shard_size >= 1, "shard_size must be >= 1");

        Ok(Self {
            min_similarity_threshold,
            min_users_for_recommendation,
            max_recommendations_per_asset,
            batch_size,
            shard_size,
        })
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        Self::new(
            env_or("MIN_SIMILARITY_THRESHOLD", defaults.min_similarity_threshold)?,
            env_or(
                "MIN_USERS_FOR_RECOMMENDATION",
                defaults.min_users_for_recommendation,
            )?,
            env_opt("MAX_RECOMMENDATIONS_PER_ASSET")?,
            env_or("RECOMMENDATION_BATCH_SIZE", defaults.batch_size)?,
            env_or("COOCCURRENCE_SHARD_SIZE", defaults.shard_size)?,
        )
    }

    pub fn min_similarity_threshold(&self) -> f64 {
        self.min_similarity_threshold
    }

    pub fn min_users_for_recommendation(&self) -> usize {
        self.min_users_for_recommendation
    }

    /// Per-base-asset cap applied after global ranking. `None` leaves the
    /// ranked list untouched.
    pub fn max_recommendations_per_asset(&self) -> Option<usize> {
        self.max_recommendations_per_asset
    }

    /// Insert chunk size for the sink. Does not affect computed output.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Wallets per co-occurrence shard. Does not affect computed output.
    pub fn shard_size(&self) -> usize {
        self.shard_size
    }
}

fn env_opt<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(s) if !s.trim().is_empty() => {
            let v = s
                .trim()
                .parse::<T>()
                .with_context(|| format!("{key} is not valid: {s:?}"))?;
            Ok(Some(v))
        }
        _ => Ok(None),
    }
}

fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    Ok(env_opt(key)?.unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let d = EngineConfig::default();
        let rebuilt = EngineConfig::new(
            d.min_similarity_threshold(),
            d.min_users_for_recommendation(),
            d.max_recommendations_per_asset(),
            d.batch_size(),
            d.shard_size(),
        )
        .unwrap();
        assert_eq!(rebuilt, d);
        assert_eq!(d.max_recommendations_per_asset(), None);
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        assert!(EngineConfig::new(1.5, 1, None, 10, 10).is_err());
        assert!(EngineConfig::new(-0.1, 1, None, 10, 10).is_err());
        assert!(EngineConfig::new(f64::NAN, 1, None, 10, 10).is_err());
    }

    #[test]
    fn rejects_zero_counts() {
        assert!(EngineConfig::new(0.1, 0, None, 10, 10).is_err());
        assert!(EngineConfig::new(0.1, 1, Some(0), 10, 10).is_err());
        assert!(EngineConfig::new(0.1, 1, None, 0, 10).is_err());
        assert!(EngineConfig::new(0.1, 1, None, 10, 0).is_err());
    }

    #[test]
    fn accepts_boundaries() {
        assert!(EngineConfig::new(0.0, 1, Some(1), 1, 1).is_ok());
        assert!(EngineConfig::new(1.0, 1, None, 1, 1).is_ok());
    }
}
