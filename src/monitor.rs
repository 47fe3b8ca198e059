use std::fmt::Display;
use std::time::Duration;

use colored::Colorize;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display as StrumDisplay, EnumString};
use tokio::sync::{broadcast::Sender, watch};
use tracing::{debug, error, info, warn};

use crate::config::AssetWatchConfig;
use crate::errors::PriceError;
use crate::marketplace::{fetch_price, PriceSource};
use crate::AppEvent;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Raised when a polled price is strictly above its threshold.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AlertEvent {
    pub asset_name: String,
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub current_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub threshold: Decimal,
}

impl Display for AlertEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} price (${:.2}) is above threshold (${:.2})!",
            self.asset_name,
            self.current_price.round_dp(2),
            self.threshold.round_dp(2)
        )
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, StrumDisplay, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum AlertMode {
    /// Alert on every poll that finds the price above threshold.
    #[default]
    Repeat,
    /// Alert only when the price crosses above the threshold.
    Edge,
}

#[derive(Clone, Copy, Debug)]
pub struct MonitorSettings {
    pub interval: Duration,
    pub mode: AlertMode,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            mode: AlertMode::default(),
        }
    }
}

/// Polls one asset's price forever and broadcasts threshold breaches.
#[derive(Debug)]
pub struct AssetMonitor<P> {
    config: AssetWatchConfig,
    source: P,
    settings: MonitorSettings,
    alerts: Sender<AppEvent>,
    breached: bool,
}

impl<P: PriceSource> AssetMonitor<P> {
    pub fn new(
        config: AssetWatchConfig,
        source: P,
        settings: MonitorSettings,
        alerts: Sender<AppEvent>,
    ) -> Self {
        Self {
            config,
            source,
            settings,
            alerts,
            breached: false,
        }
    }

    /// One fetch and comparison. Returns the alert to raise, if any.
    pub async fn poll(&mut self) -> Result<Option<AlertEvent>, PriceError> {
        let price = fetch_price(&self.source, &self.config.symbol).await?;
        let breached = price > self.config.threshold;
        let was_breached = std::mem::replace(&mut self.breached, breached);

        if !breached || (self.settings.mode == AlertMode::Edge && was_breached) {
            debug!("{} price {} (threshold {})", self.config.name, price, self.config.threshold);
            return Ok(None);
        }

        Ok(Some(AlertEvent {
            asset_name: self.config.name.clone(),
            symbol: self.config.symbol.clone(),
            current_price: price,
            threshold: self.config.threshold,
        }))
    }

    /// Runs the polling loop. Only returns once `shutdown` carries `true`;
    /// without a shutdown channel it never returns.
    pub async fn run(mut self, mut shutdown: Option<watch::Receiver<bool>>) {
        info!(
            "Monitoring {} ({}) above {} every {:?}",
            self.config.name, self.config.symbol, self.config.threshold, self.settings.interval
        );
        loop {
            match self.poll().await {
                Ok(Some(alert)) => self.emit(alert),
                Ok(None) => {}
                Err(err) => error!("Error retrieving {} price : {}", self.config.name, err),
            }

            if !wait_interval(self.settings.interval, &mut shutdown).await {
                info!("Stopped monitoring {}", self.config.name);
                return;
            }
        }
    }

    fn emit(&self, alert: AlertEvent) {
        warn!("{}", alert.to_string().yellow());
        if self.alerts.send(AppEvent::Alert(alert)).is_err() {
            debug!("No alert subscribers for {}", self.config.name);
        }
    }
}

/// Sleeps one full interval. Returns false if shutdown was signalled meanwhile.
async fn wait_interval(interval: Duration, shutdown: &mut Option<watch::Receiver<bool>>) -> bool {
    let sleep = tokio::time::sleep(interval);
    tokio::pin!(sleep);
    loop {
        let Some(rx) = shutdown.as_mut() else {
            sleep.as_mut().await;
            return true;
        };
        let changed = tokio::select! {
            _ = sleep.as_mut() => return true,
            changed = rx.changed() => changed,
        };
        match changed {
            Ok(()) if *rx.borrow() => return false,
            Ok(()) => {}
            // sender gone, nobody can stop us anymore
            Err(_) => *shutdown = None,
        }
    }
}
