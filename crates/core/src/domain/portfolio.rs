use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub ticker: String,
    pub asset_type: String,
    pub quantity: f64,
    pub average_price: f64,
}

/// One user's portfolio at snapshot time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub wallet_id: String,
    pub user_id: String,
    pub holdings: Vec<Holding>,
}

/// Canonical ticker form: trimmed and upper-cased. `None` for blank input.
pub fn normalize_ticker(raw: &str) -> Option<String> {
    let t = raw.trim().to_ascii_uppercase();
    (!t.is_empty()).then_some(t)
}

impl Wallet {
    /// Tickers held by this wallet, each at most once, in ascending order.
    pub fn distinct_tickers(&self) -> Vec<&str> {
        let mut tickers: Vec<&str> = self.holdings.iter().map(|h| h.ticker.as_str()).collect();
        tickers.sort_unstable();
        tickers.dedup();
        tickers
    }
}

#[cfg(test)]
pub(crate) fn wallet(user_id: &str, tickers: &[&str]) -> Wallet {
    Wallet {
        wallet_id: format!("w-{user_id}"),
        user_id: user_id.to_string(),
        holdings: tickers
            .iter()
            .map(|t| Holding {
                ticker: t.to_string(),
                asset_type: "STOCK".to_string(),
                quantity: 1.0,
                average_price: 10.0,
            })
            .collect(),
    }
}
