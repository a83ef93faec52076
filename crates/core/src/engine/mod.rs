pub mod config;
pub mod cooccurrence;
pub mod generate;
pub mod rank;
pub mod scoring;

use crate::domain::portfolio::Wallet;
use crate::domain::recommendation::Recommendation;
use config::EngineConfig;
use cooccurrence::CooccurrenceIndex;

#[derive(Debug, Clone, PartialEq)]
pub struct Computation {
    pub wallets_analyzed: usize,
    pub pairs_analyzed: usize,
    pub recommendations: Vec<Recommendation>,
}

/// Pure snapshot → ranked recommendations transform.
pub fn compute(wallets: &[Wallet], config: &EngineConfig) -> Computation {
    let index = CooccurrenceIndex::from_wallets_sharded(wallets, config.shard_size());
    let stats = scoring::score_pairs(&index);
    let mut ranked = rank::rank(generate::generate(&stats, config));
    if let Some(max) = config.max_recommendations_per_asset() {
        ranked = rank::truncate_per_asset(ranked, max);
    }

    Computation {
        wallets_analyzed: index.wallet_count(),
        pairs_analyzed: index.pair_count(),
        recommendations: ranked,
    }
}
