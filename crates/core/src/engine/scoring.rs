use crate::engine::cooccurrence::{CooccurrenceIndex, TickerPair};

/// Similarity and association metrics for one canonical ticker pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PairStats {
    pub pair: TickerPair,
    pub users_with_both: usize,
    pub holders_first: usize,
    pub holders_second: usize,
    pub jaccard: f64,
    pub support: f64,
    pub confidence_first_to_second: f64,
    pub confidence_second_to_first: f64,
}

/// `part / whole`, or 0 when `whole` is 0.
fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

pub fn score_pairs(index: &CooccurrenceIndex) -> Vec<PairStats> {
    let total_wallets = index.wallet_count();

    index
        .pairs()
        .map(|(pair, both)| {
            let union = match (index.holders(pair.first()), index.holders(pair.second())) {
                (Some(a), Some(b)) => a.union(b).count(),
                (Some(a), None) | (None, Some(a)) => a.len(),
                (None, None) => 0,
            };
            let holders_first = index.holder_count(pair.first());
            let holders_second = index.holder_count(pair.second());
            let users_with_both = both.len();

            PairStats {
                pair: pair.clone(),
                users_with_both,
                holders_first,
                holders_second,
                jaccard: ratio(users_with_both, union),
                support: ratio(users_with_both, total_wallets),
                confidence_first_to_second: ratio(users_with_both, holders_first),
                confidence_second_to_first: ratio(users_with_both, holders_second),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::portfolio::wallet;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    fn mixed_wallets() -> Vec<crate::domain::portfolio::Wallet> {
        vec![
            wallet("1", &["PETR4", "VALE3", "ITUB4"]),
            wallet("2", &["PETR4", "VALE3"]),
            wallet("3", &["PETR4", "BBAS3"]),
            wallet("4", &["ITUB4", "BBAS3", "VALE3"]),
            wallet("5", &["WEGE3"]),
        ]
    }

    #[test]
    fn scores_reference_scenario() {
        let index = CooccurrenceIndex::from_wallets(&[
            wallet("1", &["PETR4", "VALE3"]),
            wallet("2", &["PETR4", "VALE3"]),
            wallet("3", &["PETR4"]),
        ]);
        let stats = score_pairs(&index);
        assert_eq!(stats.len(), 1);

        let s = &stats[0];
        assert_eq!(s.pair, TickerPair::new("PETR4", "VALE3"));
        assert_eq!(s.users_with_both, 2);
        assert_eq!(s.holders_first, 3);
        assert_eq!(s.holders_second, 2);
        assert!(close(s.jaccard, 2.0 / 3.0));
        assert!(close(s.support, 2.0 / 3.0));
        assert!(close(s.confidence_first_to_second, 2.0 / 3.0));
        assert!(close(s.confidence_second_to_first, 1.0));
    }

    #[test]
    fn jaccard_is_symmetric_and_bounded() {
        let wallets = mixed_wallets();
        let forward = score_pairs(&CooccurrenceIndex::from_wallets(&wallets));

        // Same wallets with every holding list reversed.
        let reversed: Vec<_> = wallets
            .iter()
            .map(|w| {
                let mut w = w.clone();
                w.holdings.reverse();
                w
            })
            .collect();
        let backward = score_pairs(&CooccurrenceIndex::from_wallets(&reversed));

        assert_eq!(forward, backward);
        for s in &forward {
            assert!((0.0..=1.0).contains(&s.jaccard), "{s:?}");
        }
    }

    #[test]
    fn support_recovers_co_holder_count() {
        let index = CooccurrenceIndex::from_wallets(&mixed_wallets());
        let total = index.wallet_count() as f64;
        for s in score_pairs(&index) {
            assert_eq!((s.support * total).round() as usize, s.users_with_both);
        }
    }

    #[test]
    fn confidence_is_a_probability() {
        for s in score_pairs(&CooccurrenceIndex::from_wallets(&mixed_wallets())) {
            assert!((0.0..=1.0).contains(&s.confidence_first_to_second), "{s:?}");
            assert!((0.0..=1.0).contains(&s.confidence_second_to_first), "{s:?}");
        }
    }

    #[test]
    fn zero_denominators_are_zero() {
        assert_eq!(ratio(0, 0), 0.0);
        assert_eq!(ratio(3, 0), 0.0);
        assert_eq!(ratio(1, 4), 0.25);
    }

    #[test]
    fn no_pairs_without_co_holding() {
        let index = CooccurrenceIndex::from_wallets(&[wallet("1", &["A"]), wallet("2", &["B"])]);
        assert!(score_pairs(&index).is_empty());
    }
}
