use std::collections::HashMap;

use itertools::Itertools;
use rust_decimal::Decimal;
use tracing::debug;

use crate::errors::PriceError;
use crate::marketplace::{PriceSnapshot, PriceSource};
use crate::portfolio::Holding;

/// Sums quantities per symbol. Records sharing a symbol add up.
pub fn group_holdings<I>(holdings: I) -> Result<HashMap<String, Decimal>, PriceError>
where
    I: IntoIterator<Item = Holding>,
{
    holdings
        .into_iter()
        .map(|holding| (holding.symbol, holding.quantity))
        .into_grouping_map()
        .fold(Some(Decimal::ZERO), |sum, _symbol, quantity| {
            sum.and_then(|sum| sum.checked_add(quantity))
        })
        .into_iter()
        .map(|(symbol, sum)| match sum {
            Some(sum) => Ok((symbol, sum)),
            None => Err(PriceError::Overflow(symbol)),
        })
        .collect()
}

/// Values grouped quantities against one snapshot. Any unknown symbol fails
/// the whole valuation.
pub fn value_at(
    quantities: &HashMap<String, Decimal>,
    snapshot: &PriceSnapshot,
) -> Result<Decimal, PriceError> {
    quantities
        .iter()
        .sorted_by(|a, b| a.0.cmp(b.0))
        .try_fold(Decimal::ZERO, |total, (symbol, quantity)| {
            let price = snapshot.lookup_price(symbol)?;
            price
                .checked_mul(*quantity)
                .and_then(|value| total.checked_add(value))
                .ok_or_else(|| PriceError::Overflow(symbol.clone()))
        })
}

/// Computes the reference-currency value of a set of holdings.
#[derive(Clone, Debug)]
pub struct Valuator<P> {
    source: P,
}

impl<P: PriceSource> Valuator<P> {
    pub fn new(source: P) -> Self {
        Self { source }
    }

    /// One catalog fetch per call, shared by every symbol in `holdings`.
    pub async fn valuate(&self, holdings: &[Holding]) -> Result<Decimal, PriceError> {
        let quantities = group_holdings(holdings.iter().cloned())?;
        if quantities.is_empty() {
            return Ok(Decimal::ZERO);
        }
        let snapshot = self.source.fetch_prices().await?;
        let total = value_at(&quantities, &snapshot)?;
        debug!(
            "Valued {} holdings over {} symbols at {}",
            holdings.len(),
            quantities.len(),
            total
        );
        Ok(total)
    }
}
