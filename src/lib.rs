use monitor::AlertEvent;
use portfolio::HoldingRecord;
use serde::{Deserialize, Serialize};

pub mod config;
pub mod errors;
pub mod marketplace;
pub mod monitor;
pub mod portfolio;
pub mod server;
pub mod supervisor;
pub mod valuation;

/// Events pushed to live subscribers of the `/ws` endpoint.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum AppEvent {
    Alert(AlertEvent),
    HoldingAdded(HoldingRecord),
}
