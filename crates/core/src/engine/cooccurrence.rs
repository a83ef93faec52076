use crate::domain::portfolio::Wallet;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

pub type UserSet = BTreeSet<String>;

/// Unordered ticker pair stored with `first <= second`, so (A,B) and (B,A)
/// are the same key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TickerPair {
    first: String,
    second: String,
}

impl TickerPair {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    pub fn first(&self) -> &str {
        &self.first
    }

    pub fn second(&self) -> &str {
        &self.second
    }
}

/// Holder sets per ticker and co-holder sets per pair for a set of wallets.
///
/// Partial indexes built over disjoint wallet shards combine with
/// [`CooccurrenceIndex::merge`]; merging is a set union, so the result does
/// not depend on how wallets were partitioned or in which order shards merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CooccurrenceIndex {
    wallet_count: usize,
    holders: BTreeMap<String, UserSet>,
    pairs: BTreeMap<TickerPair, UserSet>,
}

impl CooccurrenceIndex {
    pub fn from_wallets(wallets: &[Wallet]) -> Self {
        let mut index = Self::default();
        for wallet in wallets {
            index.add_wallet(wallet);
        }
        index
    }

    /// Builds one partial index per `shard_size` chunk in parallel and reduces
    /// them into a single index.
    pub fn from_wallets_sharded(wallets: &[Wallet], shard_size: usize) -> Self {
        wallets
            .par_chunks(shard_size.max(1))
            .map(Self::from_wallets)
            .reduce(Self::default, Self::merge)
    }

    fn add_wallet(&mut self, wallet: &Wallet) {
        self.wallet_count += 1;

        // A position split across several rows still counts once.
        let tickers = wallet.distinct_tickers();

        for ticker in &tickers {
            self.holders
                .entry((*ticker).to_string())
                .or_default()
                .insert(wallet.user_id.clone());
        }

        for (i, t1) in tickers.iter().enumerate() {
            for t2 in &tickers[i + 1..] {
                self.pairs
                    .entry(TickerPair::new(*t1, *t2))
                    .or_default()
                    .insert(wallet.user_id.clone());
            }
        }
    }

    pub fn merge(mut self, other: Self) -> Self {
        self.wallet_count += other.wallet_count;
        for (ticker, users) in other.holders {
            self.holders.entry(ticker).or_default().extend(users);
        }
        for (pair, users) in other.pairs {
            self.pairs.entry(pair).or_default().extend(users);
        }
        self
    }

    pub fn wallet_count(&self) -> usize {
        self.wallet_count
    }

    /// Users holding `ticker`. Unknown tickers have no holders.
    pub fn holders(&self, ticker: &str) -> Option<&UserSet> {
        self.holders.get(ticker)
    }

    pub fn holder_count(&self, ticker: &str) -> usize {
        self.holders.get(ticker).map_or(0, BTreeSet::len)
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&TickerPair, &UserSet)> {
        self.pairs.iter()
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }
}
