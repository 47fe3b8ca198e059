//! SQLite-backed holdings ledger.
//!
//! Amounts are kept as decimal text so a quantity reads back exactly as it
//! was written.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use tracing::{debug, info};

use crate::errors::StoreError;

use super::{HoldingRecord, HoldingStore, NewHolding};

const CREATE_PORTFOLIO_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS portfolio (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        symbol TEXT NOT NULL,
        amount TEXT NOT NULL,
        created_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP
    )
"#;

#[derive(FromRow, Debug)]
struct HoldingRow {
    id: i64,
    user_id: i64,
    symbol: String,
    amount: String,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<HoldingRow> for HoldingRecord {
    type Error = StoreError;

    fn try_from(row: HoldingRow) -> Result<Self, Self::Error> {
        let amount = Decimal::from_str(&row.amount).map_err(|e| {
            StoreError::Corrupt(format!("row {} has amount '{}': {}", row.id, row.amount, e))
        })?;
        Ok(HoldingRecord {
            id: row.id,
            user_id: row.user_id,
            symbol: row.symbol,
            amount,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `url`, e.g. `sqlite://portfolio.db`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        info!("Opened holdings database {}", url);
        Self::with_pool(pool).await
    }

    /// A private database living as long as the store. Used by tests.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // every connection to :memory: is its own database, so keep exactly one alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::query(CREATE_PORTFOLIO_TABLE).execute(&pool).await?;
        Ok(Self { pool })
    }
}

impl HoldingStore for SqliteStore {
    async fn insert_holding(&self, holding: NewHolding) -> Result<HoldingRecord, StoreError> {
        let row = sqlx::query_as::<_, HoldingRow>(
            r#"
            INSERT INTO portfolio (user_id, symbol, amount, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id, user_id, symbol, amount, created_at, updated_at
            "#,
        )
        .bind(holding.user_id)
        .bind(&holding.symbol)
        .bind(holding.amount.to_string())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        debug!(
            "Inserted holding {} {} for user {}",
            row.amount, row.symbol, row.user_id
        );

        row.try_into()
    }

    async fn list_all_holdings(&self) -> Result<Vec<HoldingRecord>, StoreError> {
        let rows = sqlx::query_as::<_, HoldingRow>(
            r#"
            SELECT id, user_id, symbol, amount, created_at, updated_at
            FROM portfolio
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(HoldingRecord::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[tokio::test]
    async fn test_insert_and_list() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(store.list_all_holdings().await.unwrap().is_empty());

        let inserted = store
            .insert_holding(NewHolding {
                user_id: 7,
                symbol: "BTC".into(),
                amount: dec!(0.12345678901234),
            })
            .await
            .unwrap();
        store
            .insert_holding(NewHolding {
                user_id: 7,
                symbol: "ETH".into(),
                amount: dec!(2),
            })
            .await
            .unwrap();

        let records = store.list_all_holdings().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, inserted.id);
        assert_eq!(records[0].symbol, "BTC");
        assert_eq!(records[0].amount, dec!(0.12345678901234));
        assert_eq!(records[0].user_id, 7);
        assert!(records[0].updated_at.is_none());
        assert_eq!(records[1].symbol, "ETH");
        assert!(records[1].id > records[0].id);
    }

    #[tokio::test]
    async fn test_corrupt_amount() {
        let store = SqliteStore::in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO portfolio (user_id, symbol, amount, created_at) VALUES (1, 'BTC', 'lots', ?)",
        )
        .bind(Utc::now())
        .execute(&store.pool)
        .await
        .unwrap();
        assert!(matches!(
            store.list_all_holdings().await,
            Err(StoreError::Corrupt(_))
        ));
    }
}
