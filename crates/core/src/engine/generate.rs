use crate::domain::recommendation::{round_to, Recommendation};
use crate::engine::config::EngineConfig;
use crate::engine::scoring::PairStats;

const SIMILARITY_WEIGHT: f64 = 0.4;
const SUPPORT_WEIGHT: f64 = 0.3;
const CONFIDENCE_WEIGHT: f64 = 0.3;

pub fn strength(similarity: f64, support: f64, confidence: f64) -> f64 {
    similarity * SIMILARITY_WEIGHT + support * SUPPORT_WEIGHT + confidence * CONFIDENCE_WEIGHT
}

fn passes_thresholds(stats: &PairStats, config: &EngineConfig) -> bool {
    stats.jaccard >= config.min_similarity_threshold()
        && stats.users_with_both >= config.min_users_for_recommendation()
}

fn directional(
    stats: &PairStats,
    base: &str,
    recommended: &str,
    users_with_base: usize,
    confidence: f64,
) -> Option<Recommendation> {
    if confidence <= 0.0 {
        return None;
    }

    Some(Recommendation {
        base_asset: base.to_string(),
        recommended_asset: recommended.to_string(),
        similarity_score: stats.jaccard,
        support: stats.support,
        confidence,
        users_with_both: stats.users_with_both,
        users_with_base,
        percentage_also_invest: round_to(confidence * 100.0, 2),
        strength: strength(stats.jaccard, stats.support, confidence),
    })
}

/// Emits up to two directional recommendations per pair that clears both
/// thresholds. Output order follows the input; ranking happens separately.
pub fn generate(stats: &[PairStats], config: &EngineConfig) -> Vec<Recommendation> {
    let mut out = Vec::new();

    for s in stats.iter().filter(|s| passes_thresholds(s, config)) {
        let (first, second) = (s.pair.first(), s.pair.second());
        out.extend(directional(
            s,
            first,
            second,
            s.holders_first,
            s.confidence_first_to_second,
        ));
        out.extend(directional(
            s,
            second,
            first,
            s.holders_second,
            s.confidence_second_to_first,
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::cooccurrence::TickerPair;

    fn stats(both: usize, h1: usize, h2: usize, total: usize) -> PairStats {
        let union = h1 + h2 - both;
        PairStats {
            pair: TickerPair::new("AAA", "BBB"),
            users_with_both: both,
            holders_first: h1,
            holders_second: h2,
            jaccard: both as f64 / union as f64,
            support: both as f64 / total as f64,
            confidence_first_to_second: both as f64 / h1 as f64,
            confidence_second_to_first: both as f64 / h2 as f64,
        }
    }

    fn config(threshold: f64, min_users: usize) -> EngineConfig {
        EngineConfig::new(threshold, min_users, None, 100, 100).unwrap()
    }

    #[test]
    fn strength_weights() {
        assert!((strength(1.0, 1.0, 1.0) - 1.0).abs() < 1e-12);
        assert!((strength(0.5, 0.0, 0.0) - 0.2).abs() < 1e-12);
        assert!((strength(0.0, 0.5, 0.5) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn emits_both_directions() {
        let s = stats(2, 3, 2, 3);
        let recs = generate(&[s], &config(0.5, 2));
        assert_eq!(recs.len(), 2);

        assert_eq!(recs[0].base_asset, "AAA");
        assert_eq!(recs[0].recommended_asset, "BBB");
        assert_eq!(recs[0].users_with_base, 3);
        assert_eq!(recs[0].percentage_also_invest, 66.67);

        assert_eq!(recs[1].base_asset, "BBB");
        assert_eq!(recs[1].recommended_asset, "AAA");
        assert_eq!(recs[1].users_with_base, 2);
        assert_eq!(recs[1].percentage_also_invest, 100.0);
        assert!(recs[1].strength > recs[0].strength);
    }

    #[test]
    fn percentage_rounds_exact_ties_to_even() {
        // confidence(AAA -> BBB) = 1/32, so the percentage is exactly 3.125.
        let s = stats(1, 32, 1, 32);
        let recs = generate(&[s], &config(0.0, 1));
        assert_eq!(recs[0].base_asset, "AAA");
        assert_eq!(recs[0].percentage_also_invest, 3.12);
    }

    #[test]
    fn threshold_is_inclusive() {
        // jaccard = 1 / (2 + 1 - 1) = 0.5
        let s = stats(1, 2, 1, 4);
        assert_eq!(s.jaccard, 0.5);

        assert_eq!(generate(&[s.clone()], &config(0.5, 1)).len(), 2);
        assert!(generate(&[s], &config(0.5 + 1e-9, 1)).is_empty());
    }

    #[test]
    fn min_users_is_inclusive() {
        let s = stats(3, 4, 5, 10);
        assert_eq!(generate(&[s.clone()], &config(0.0, 3)).len(), 2);
        assert!(generate(&[s], &config(0.0, 4)).is_empty());
    }

    #[test]
    fn zero_confidence_direction_is_skipped() {
        let mut s = stats(1, 1, 1, 1);
        s.confidence_second_to_first = 0.0;
        let recs = generate(&[s], &config(0.0, 1));
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].base_asset, "AAA");
    }

    #[test]
    fn never_recommends_an_asset_for_itself() {
        let pairs = [
            stats(2, 3, 2, 3),
            PairStats {
                pair: TickerPair::new("ZZZ", "CCC"),
                ..stats(1, 1, 2, 3)
            },
        ];
        for r in generate(&pairs, &config(0.0, 1)) {
            assert_ne!(r.base_asset, r.recommended_asset);
        }
    }
}
