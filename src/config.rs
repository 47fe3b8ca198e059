use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// One monitored asset as listed in the watch-list file.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AssetWatchConfig {
    pub name: String,
    pub symbol: String,
    pub threshold: Decimal,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct WatchList {
    pub tokens: Vec<AssetWatchConfig>,
}

impl WatchList {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let watch_list =
            serde_json::from_str::<WatchList>(&content).map_err(|source| ConfigError::Format {
                path: path.to_path_buf(),
                source,
            })?;
        watch_list.validate()?;
        Ok(watch_list)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for token in &self.tokens {
            if token.symbol.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "token '{}' has an empty symbol",
                    token.name
                )));
            }
            if token.threshold.is_sign_negative() {
                return Err(ConfigError::Invalid(format!(
                    "token '{}' has a negative threshold",
                    token.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    async fn write_tmp(name: &str, content: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("tracker-{}-{}.json", name, std::process::id()));
        tokio::fs::write(&path, content).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_load_watch_list() {
        let path = write_tmp(
            "watch-ok",
            r#"{"tokens": [
                {"name": "Bitcoin", "symbol": "BTC", "threshold": 65000.5},
                {"name": "Ether", "symbol": "ETH", "threshold": "3000"}
            ]}"#,
        )
        .await;
        let watch_list = WatchList::load(&path).await.unwrap();
        assert_eq!(watch_list.tokens.len(), 2);
        assert_eq!(watch_list.tokens[0].symbol, "BTC");
        assert_eq!(watch_list.tokens[0].threshold, dec!(65000.5));
        assert_eq!(watch_list.tokens[1].threshold, dec!(3000));
        let _ = tokio::fs::remove_file(path).await;
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let res = WatchList::load("/definitely/not/here/config.json").await;
        assert!(matches!(res, Err(ConfigError::Io { .. })));
    }

    #[tokio::test]
    async fn test_malformed_file_is_format_error() {
        let path = write_tmp("watch-bad", r#"{"tokens": [{"name": "Bitcoin"}]}"#).await;
        let res = WatchList::load(&path).await;
        assert!(matches!(res, Err(ConfigError::Format { .. })));
        let _ = tokio::fs::remove_file(path).await;
    }

    #[tokio::test]
    async fn test_negative_threshold_rejected() {
        let path = write_tmp(
            "watch-negative",
            r#"{"tokens": [{"name": "Bitcoin", "symbol": "BTC", "threshold": -1}]}"#,
        )
        .await;
        let res = WatchList::load(&path).await;
        assert!(matches!(res, Err(ConfigError::Invalid(_))));
        let _ = tokio::fs::remove_file(path).await;
    }

    #[tokio::test]
    async fn test_empty_symbol_rejected() {
        let path = write_tmp(
            "watch-empty",
            r#"{"tokens": [{"name": "Nothing", "symbol": " ", "threshold": 1}]}"#,
        )
        .await;
        let res = WatchList::load(&path).await;
        assert!(matches!(res, Err(ConfigError::Invalid(_))));
        let _ = tokio::fs::remove_file(path).await;
    }
}
