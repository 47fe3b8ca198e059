use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::errors::StoreError;

use super::{HoldingRecord, HoldingStore, NewHolding};

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<Vec<HoldingRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HoldingStore for MemoryStore {
    async fn insert_holding(&self, holding: NewHolding) -> Result<HoldingRecord, StoreError> {
        let mut records = self.records.write().await;
        let record = HoldingRecord {
            id: records.len() as i64 + 1,
            user_id: holding.user_id,
            symbol: holding.symbol,
            amount: holding.amount,
            created_at: Utc::now(),
            updated_at: None,
        };
        records.push(record.clone());
        Ok(record)
    }

    async fn list_all_holdings(&self) -> Result<Vec<HoldingRecord>, StoreError> {
        Ok(self.records.read().await.clone())
    }
}
