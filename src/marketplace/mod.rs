use std::collections::HashMap;
use std::future::Future;

use rust_decimal::Decimal;

use crate::errors::PriceError;

pub mod coincap;

/// Spot prices of every asset returned by one fetch.
///
/// A symbol missing from the snapshot means the price is unknown, never zero.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PriceSnapshot {
    prices: HashMap<String, Decimal>,
}

impl PriceSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a price unless the symbol is already present; the first
    /// record for a symbol wins.
    pub fn insert(&mut self, symbol: impl Into<String>, price: Decimal) {
        self.prices.entry(symbol.into()).or_insert(price);
    }

    pub fn get(&self, symbol: &str) -> Option<Decimal> {
        self.prices.get(symbol).copied()
    }

    pub fn lookup_price(&self, symbol: &str) -> Result<Decimal, PriceError> {
        self.get(symbol)
            .ok_or_else(|| PriceError::NotFound(symbol.to_string()))
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, Decimal)> for PriceSnapshot {
    fn from_iter<T: IntoIterator<Item = (S, Decimal)>>(iter: T) -> Self {
        let mut snapshot = PriceSnapshot::new();
        for (symbol, price) in iter {
            snapshot.insert(symbol, price);
        }
        snapshot
    }
}

/// A market-data provider. Every call is a fresh full-catalog fetch.
pub trait PriceSource {
    fn fetch_prices(&self) -> impl Future<Output = Result<PriceSnapshot, PriceError>> + Send;
}

/// Fetches a snapshot and resolves one symbol in it.
pub async fn fetch_price<P: PriceSource>(source: &P, symbol: &str) -> Result<Decimal, PriceError> {
    let snapshot = source.fetch_prices().await?;
    snapshot.lookup_price(symbol)
}
