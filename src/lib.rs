//! Bourse - portfolio ledger and trade execution server
//!
//! Tracks per-user investment portfolios (cash, open positions, an
//! immutable trade ledger) and exposes operations to value a portfolio,
//! validate and execute orders, and derive allocation/risk/rebalancing
//! analytics. Order execution is atomic: the position, trade, and
//! portfolio writes for one order commit or roll back together.

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod sources;
pub mod types;

use std::sync::Arc;

use config::Config;
use services::LedgerService;
use sources::PriceCache;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub ledger: LedgerService,
    pub prices: Arc<PriceCache>,
}
