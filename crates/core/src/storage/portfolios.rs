use crate::domain::portfolio::{normalize_ticker, Holding, Wallet};
use crate::pipeline::PortfolioSource;
use anyhow::Context;
use std::collections::BTreeMap;

/// One `wallets ⨝ assets` row.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct HoldingRow {
    pub wallet_id: String,
    pub user_id: String,
    pub ticker: String,
    pub asset_type: String,
    pub quantity: f64,
    pub average_price: f64,
}

/// Groups holding rows by wallet, rejecting rows a well-formed snapshot
/// cannot contain. Wallets come out ordered by id.
pub fn group_rows(rows: Vec<HoldingRow>) -> anyhow::Result<Vec<Wallet>> {
    let mut wallets: BTreeMap<String, Wallet> = BTreeMap::new();

    for row in rows {
        let ticker = normalize_ticker(&row.ticker)
            .with_context(|| format!("empty ticker in wallet {}", row.wallet_id))?;
        anyhow::ensure!(
            row.quantity.is_finite() && row.quantity > 0.0,
            "non-positive quantity {} for {ticker} in wallet {}",
            row.quantity,
            row.wallet_id
        );
        anyhow::ensure!(
            !row.user_id.trim().is_empty(),
            "wallet {} has no owning user",
            row.wallet_id
        );

        let wallet = wallets
            .entry(row.wallet_id.clone())
            .or_insert_with(|| Wallet {
                wallet_id: row.wallet_id.clone(),
                user_id: row.user_id.clone(),
                holdings: Vec::new(),
            });
        anyhow::ensure!(
            wallet.user_id == row.user_id,
            "wallet {} has rows for users {} and {}",
            row.wallet_id,
            wallet.user_id,
            row.user_id
        );

        wallet.holdings.push(Holding {
            ticker,
            asset_type: row.asset_type,
            quantity: row.quantity,
            average_price: row.average_price,
        });
    }

    Ok(wallets.into_values().collect())
}

pub async fn load_holding_rows(pool: &sqlx::PgPool) -> anyhow::Result<Vec<HoldingRow>> {
    sqlx::query_as::<_, HoldingRow>(
        "SELECT w.id::text AS wallet_id, w.\"userId\"::text AS user_id, a.ticker, \
                a.type::text AS asset_type, a.quantity::float8 AS quantity, \
                a.\"averagePrice\"::float8 AS average_price \
         FROM wallets w \
         JOIN assets a ON w.id = a.\"walletId\" \
         WHERE a.quantity > 0 \
         ORDER BY w.id",
    )
    .persistent(false)
    .fetch_all(pool)
    .await
    .context("select wallet holdings failed")
}

/// Normalized, distinct, ascending. Blank tickers are dropped.
pub fn normalize_tickers(raw: Vec<String>) -> Vec<String> {
    let mut tickers: Vec<String> = raw.iter().filter_map(|t| normalize_ticker(t)).collect();
    tickers.sort_unstable();
    tickers.dedup();
    tickers
}

/// Tickers currently held (quantity > 0) by `user_id`, in the same form the
/// loader stores them.
pub async fn user_tickers(pool: &sqlx::PgPool, user_id: &str) -> anyhow::Result<Vec<String>> {
    let raw = sqlx::query_scalar::<_, String>(
        "SELECT a.ticker \
         FROM wallets w \
         JOIN assets a ON w.id = a.\"walletId\" \
         WHERE w.\"userId\"::text = $1 AND a.quantity > 0",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("select tickers for user {user_id} failed"))?;

    Ok(normalize_tickers(raw))
}

#[derive(Debug, Clone)]
pub struct PgPortfolioSource {
    pool: sqlx::PgPool,
}

impl PgPortfolioSource {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PortfolioSource for PgPortfolioSource {
    async fn load_wallets(&self) -> anyhow::Result<Vec<Wallet>> {
        let rows = load_holding_rows(&self.pool).await?;
        let row_count = rows.len();
        let wallets = group_rows(rows)?;
        tracing::debug!(row_count, wallets = wallets.len(), "grouped holding rows");
        Ok(wallets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(wallet_id: &str, user_id: &str, ticker: &str, quantity: f64) -> HoldingRow {
        HoldingRow {
            wallet_id: wallet_id.to_string(),
            user_id: user_id.to_string(),
            ticker: ticker.to_string(),
            asset_type: "STOCK".to_string(),
            quantity,
            average_price: 25.5,
        }
    }

    #[test]
    fn groups_rows_by_wallet() {
        let wallets = group_rows(vec![
            row("w2", "u2", "VALE3", 10.0),
            row("w1", "u1", "PETR4", 1.0),
            row("w1", "u1", " VALE3 ", 3.0),
        ])
        .unwrap();

        assert_eq!(wallets.len(), 2);
        assert_eq!(wallets[0].wallet_id, "w1");
        assert_eq!(wallets[0].user_id, "u1");
        assert_eq!(wallets[0].distinct_tickers(), vec!["PETR4", "VALE3"]);
        assert_eq!(wallets[0].holdings[1].ticker, "VALE3");
        assert_eq!(wallets[1].wallet_id, "w2");
        assert_eq!(wallets[1].holdings.len(), 1);
    }

    #[test]
    fn loader_and_user_lookup_agree_on_ticker_form() {
        let wallets = group_rows(vec![
            row("w1", "u1", " petr4", 1.0),
            row("w1", "u1", "Vale3 ", 2.0),
        ])
        .unwrap();
        let loaded: Vec<String> = wallets[0]
            .distinct_tickers()
            .into_iter()
            .map(String::from)
            .collect();

        let looked_up = normalize_tickers(vec![
            "Vale3 ".to_string(),
            " petr4".to_string(),
            "PETR4".to_string(),
            "   ".to_string(),
        ]);

        assert_eq!(loaded, vec!["PETR4", "VALE3"]);
        assert_eq!(looked_up, loaded);
    }

    #[test]
    fn no_rows_is_no_wallets() {
        assert!(group_rows(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn rejects_empty_ticker() {
        assert!(group_rows(vec![row("w1", "u1", "  ", 1.0)]).is_err());
    }

    #[test]
    fn rejects_non_positive_quantity() {
        assert!(group_rows(vec![row("w1", "u1", "PETR4", 0.0)]).is_err());
        assert!(group_rows(vec![row("w1", "u1", "PETR4", -2.0)]).is_err());
        assert!(group_rows(vec![row("w1", "u1", "PETR4", f64::NAN)]).is_err());
    }

    #[test]
    fn rejects_wallet_with_two_owners() {
        let res = group_rows(vec![
            row("w1", "u1", "PETR4", 1.0),
            row("w1", "u2", "VALE3", 1.0),
        ]);
        assert!(res.is_err());
    }
}
