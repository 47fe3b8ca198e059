use std::str::FromStr;
use std::time::Duration;

use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::PriceError;
use crate::marketplace::{PriceSnapshot, PriceSource};

pub const COINCAP_ENDPOINT: &str = "https://api.coincap.io/v2/assets";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Deserialize, Debug)]
struct AssetsResponse {
    data: Vec<AssetRecord>,
}

#[derive(Deserialize, Debug)]
#[allow(dead_code)]
struct AssetRecord {
    id: String,
    symbol: String,
    #[serde(rename = "priceUsd")]
    price_usd: String,
}

/// CoinCap REST client. Cloning shares the underlying connection pool.
#[derive(Debug, Clone)]
pub struct CoinCap {
    client: Client,
    endpoint: String,
}

impl CoinCap {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, PriceError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

impl PriceSource for CoinCap {
    async fn fetch_prices(&self) -> Result<PriceSnapshot, PriceError> {
        let response = self.client.get(&self.endpoint).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PriceError::Status(status));
        }
        let body = response.text().await?;
        let snapshot = parse_snapshot(&body)?;
        if snapshot.is_empty() {
            warn!("Market data endpoint {} returned no assets", self.endpoint);
        } else {
            debug!("Fetched {} prices from {}", snapshot.len(), self.endpoint);
        }
        Ok(snapshot)
    }
}

/// Parses an `/assets` payload. One bad price string fails the whole payload.
pub fn parse_snapshot(body: &str) -> Result<PriceSnapshot, PriceError> {
    let response: AssetsResponse = serde_json::from_str(body)?;
    let mut snapshot = PriceSnapshot::new();
    for record in response.data {
        let price = parse_price(&record.price_usd).ok_or_else(|| PriceError::Parse {
            symbol: record.symbol.clone(),
            value: record.price_usd.clone(),
        })?;
        snapshot.insert(record.symbol, price);
    }
    Ok(snapshot)
}

fn parse_price(value: &str) -> Option<Decimal> {
    let value = value.trim();
    if value.contains(['e', 'E']) {
        return Decimal::from_scientific(value).ok();
    }
    Decimal::from_str(value).ok()
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, routing::get, Json, Router};
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{}/v2/assets", address)
    }

    #[test]
    fn test_parse_snapshot() {
        let body = json!({
            "data": [
                {"id": "bitcoin", "symbol": "BTC", "priceUsd": "1234.56"},
                {"id": "ethereum", "symbol": "ETH", "priceUsd": "3000.0000000000000000"},
                {"id": "shiba-inu", "symbol": "SHIB", "priceUsd": "1.2e-5"}
            ],
            "timestamp": 1700000000000_u64
        })
        .to_string();
        let snapshot = parse_snapshot(&body).unwrap();
        assert_eq!(snapshot.lookup_price("BTC").unwrap(), dec!(1234.56));
        assert_eq!(snapshot.lookup_price("ETH").unwrap(), dec!(3000));
        assert_eq!(snapshot.lookup_price("SHIB").unwrap(), dec!(0.000012));
    }

    #[test]
    fn test_bad_price_fails_whole_snapshot() {
        let body = json!({
            "data": [
                {"id": "bitcoin", "symbol": "BTC", "priceUsd": "1234.56"},
                {"id": "broken", "symbol": "BRK", "priceUsd": "n/a"}
            ]
        })
        .to_string();
        match parse_snapshot(&body) {
            Err(PriceError::Parse { symbol, value }) => {
                assert_eq!(symbol, "BRK");
                assert_eq!(value, "n/a");
            }
            other => panic!("expected Parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_payload() {
        assert!(matches!(
            parse_snapshot(r#"{"assets": []}"#),
            Err(PriceError::Decode(_))
        ));
        assert!(matches!(
            parse_snapshot("<html>"),
            Err(PriceError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_prices() {
        let router = Router::new().route(
            "/v2/assets",
            get(|| async {
                Json(json!({
                    "data": [
                        {"id": "bitcoin", "symbol": "BTC", "priceUsd": "50000"},
                        {"id": "ethereum", "symbol": "ETH", "priceUsd": "3000"}
                    ]
                }))
            }),
        );
        let endpoint = serve(router).await;
        let coincap = CoinCap::new(endpoint).unwrap();
        let snapshot = coincap.fetch_prices().await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get("BTC"), Some(dec!(50000)));
    }

    #[tokio::test]
    async fn test_fetch_error_status() {
        let router = Router::new().route(
            "/v2/assets",
            get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        );
        let endpoint = serve(router).await;
        let coincap = CoinCap::new(endpoint).unwrap();
        assert!(matches!(
            coincap.fetch_prices().await,
            Err(PriceError::Status(status)) if status == StatusCode::SERVICE_UNAVAILABLE
        ));
    }

    #[tokio::test]
    async fn test_fetch_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);
        let coincap = CoinCap::new(format!("http://{}/v2/assets", address)).unwrap();
        assert!(matches!(
            coincap.fetch_prices().await,
            Err(PriceError::Fetch(_))
        ));
    }
}
