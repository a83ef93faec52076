use serde::{Deserialize, Serialize};

/// "Holders of `base_asset` also hold `recommended_asset`".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub base_asset: String,
    pub recommended_asset: String,
    pub similarity_score: f64,
    pub support: f64,
    pub confidence: f64,
    pub users_with_both: usize,
    pub users_with_base: usize,
    pub percentage_also_invest: f64,
    pub strength: f64,
}

impl Recommendation {
    pub fn message(&self) -> String {
        also_invest_message(
            self.percentage_also_invest,
            &self.base_asset,
            &self.recommended_asset,
        )
    }
}

pub fn also_invest_message(percentage: f64, base_asset: &str, recommended_asset: &str) -> String {
    format!("{percentage:.1}% of holders of {base_asset} also hold {recommended_asset}")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub wallets_analyzed: usize,
    pub pairs_analyzed: usize,
    pub recommendations_generated: usize,
    pub recommendations_saved: u64,
}

/// Rounds to `places` decimal digits, ties to even.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round_ties_even() / factor
}
