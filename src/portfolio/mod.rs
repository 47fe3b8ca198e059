use std::future::Future;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::StoreError;

pub mod memory;
pub mod sqlite;

/// Quantity of one asset, as consumed by valuation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Holding {
    pub symbol: String,
    pub quantity: Decimal,
}

impl Holding {
    pub fn new(symbol: &str, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            quantity,
        }
    }
}

/// Body of an add-holding request.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NewHolding {
    pub user_id: i64,
    pub symbol: String,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub amount: Decimal,
}

/// One ledger row.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HoldingRecord {
    pub id: i64,
    pub user_id: i64,
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&HoldingRecord> for Holding {
    fn from(record: &HoldingRecord) -> Self {
        Holding {
            symbol: record.symbol.clone(),
            quantity: record.amount,
        }
    }
}

/// The holdings ledger, injected wherever holdings are read or written.
pub trait HoldingStore {
    fn insert_holding(
        &self,
        holding: NewHolding,
    ) -> impl Future<Output = Result<HoldingRecord, StoreError>> + Send;

    fn list_all_holdings(&self) -> impl Future<Output = Result<Vec<HoldingRecord>, StoreError>> + Send;
}

pub fn to_holdings(records: &[HoldingRecord]) -> Vec<Holding> {
    records.iter().map(Holding::from).collect()
}
