use tokio::sync::{broadcast::Sender, watch};
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::config::AssetWatchConfig;
use crate::marketplace::PriceSource;
use crate::monitor::{AssetMonitor, MonitorSettings};
use crate::AppEvent;

/// Owns one task per monitored asset.
pub struct MonitorSupervisor {
    tasks: JoinSet<()>,
    shutdown: watch::Sender<bool>,
}

impl MonitorSupervisor {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            tasks: JoinSet::new(),
            shutdown,
        }
    }

    /// Starts one monitor per config, all sharing `source`.
    pub fn start<P>(
        configs: Vec<AssetWatchConfig>,
        source: P,
        settings: MonitorSettings,
        alerts: Sender<AppEvent>,
    ) -> Self
    where
        P: PriceSource + Clone + Send + Sync + 'static,
    {
        let mut supervisor = Self::new();
        for config in configs {
            let monitor = AssetMonitor::new(config, source.clone(), settings, alerts.clone());
            supervisor.spawn(monitor);
        }
        info!("Started {} monitors", supervisor.len());
        supervisor
    }

    pub fn spawn<P>(&mut self, monitor: AssetMonitor<P>)
    where
        P: PriceSource + Send + Sync + 'static,
    {
        let mut shutdown = self.shutdown.subscribe();
        if *self.shutdown.borrow() {
            // subscribing marks the current value seen, so a late monitor would miss it
            shutdown.mark_changed();
        }
        self.tasks.spawn(monitor.run(Some(shutdown)));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Asks every monitor to stop after its current cycle.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Waits until every monitor has exited.
    pub async fn join(&mut self) {
        while let Some(res) = self.tasks.join_next().await {
            if let Err(err) = res {
                error!("Monitor task failed : {}", err);
            }
        }
    }
}

impl Default for MonitorSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
