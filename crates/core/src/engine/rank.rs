use crate::domain::recommendation::Recommendation;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Strength descending, then base asset and recommended asset ascending, so
/// equal-strength entries always come out in the same order.
fn ranking(a: &Recommendation, b: &Recommendation) -> Ordering {
    b.strength
        .total_cmp(&a.strength)
        .then_with(|| a.base_asset.cmp(&b.base_asset))
        .then_with(|| a.recommended_asset.cmp(&b.recommended_asset))
}

pub fn rank(mut recommendations: Vec<Recommendation>) -> Vec<Recommendation> {
    recommendations.sort_by(ranking);
    recommendations
}

/// Keeps at most `max_per_asset` entries per base asset from an already
/// ranked list, preserving the global order.
pub fn truncate_per_asset(
    ranked: Vec<Recommendation>,
    max_per_asset: usize,
) -> Vec<Recommendation> {
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    ranked
        .into_iter()
        .filter(|r| {
            let n = seen.entry(r.base_asset.clone()).or_insert(0);
            *n += 1;
            *n <= max_per_asset
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(base: &str, recommended: &str, strength: f64) -> Recommendation {
        Recommendation {
            base_asset: base.to_string(),
            recommended_asset: recommended.to_string(),
            similarity_score: 0.0,
            support: 0.0,
            confidence: 0.0,
            users_with_both: 0,
            users_with_base: 0,
            percentage_also_invest: 0.0,
            strength,
        }
    }

    fn keys(recs: &[Recommendation]) -> Vec<(&str, &str)> {
        recs.iter()
            .map(|r| (r.base_asset.as_str(), r.recommended_asset.as_str()))
            .collect()
    }

    #[test]
    fn orders_by_strength_then_assets() {
        let ranked = rank(vec![
            rec("B", "A", 0.5),
            rec("A", "C", 0.5),
            rec("C", "A", 0.9),
            rec("A", "B", 0.5),
        ]);
        assert_eq!(
            keys(&ranked),
            vec![("C", "A"), ("A", "B"), ("A", "C"), ("B", "A")]
        );
    }

    #[test]
    fn input_order_does_not_leak() {
        let items = vec![
            rec("A", "B", 0.3),
            rec("B", "A", 0.3),
            rec("C", "D", 0.7),
            rec("D", "C", 0.1),
        ];
        let mut reversed = items.clone();
        reversed.reverse();
        assert_eq!(rank(items), rank(reversed));
    }

    #[test]
    fn truncates_per_base_asset() {
        let ranked = rank(vec![
            rec("A", "B", 0.9),
            rec("A", "C", 0.8),
            rec("B", "A", 0.7),
            rec("A", "D", 0.6),
        ]);
        let capped = truncate_per_asset(ranked, 2);
        assert_eq!(keys(&capped), vec![("A", "B"), ("A", "C"), ("B", "A")]);
    }
}
