//! Orchestration Service
//!
//! Composes the rule engine with the persistence gateway. Each order is
//! executed end-to-end under a per-portfolio lock and committed inside a
//! single transaction, so a reader never observes a trade without its
//! corresponding position/portfolio update, and two concurrent orders
//! against the same portfolio can never both validate against stale state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::error::{LedgerError, Result};
use crate::services::{engine, store, LedgerStore};
use crate::types::{
    Portfolio, Position, PortfolioSummary, RebalanceRecommendation, RiskMetrics, Trade,
};

/// Portfolio ledger service.
#[derive(Clone)]
pub struct LedgerService {
    store: Arc<LedgerStore>,
    /// Per-portfolio execution locks. Orders for one portfolio are
    /// serialized through its entry; orders for different portfolios do not
    /// contend.
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl LedgerService {
    /// Create a new ledger service backed by the given store.
    pub fn new(store: Arc<LedgerStore>) -> Self {
        Self {
            store,
            locks: Arc::new(DashMap::new()),
        }
    }

    fn portfolio_lock(&self, portfolio_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(portfolio_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // ==========================================================================
    // Portfolio Management
    // ==========================================================================

    /// Create a new portfolio funded with an initial cash deposit.
    pub fn create_portfolio(&self, user_id: &str, initial_cash: Decimal) -> Result<Portfolio> {
        if initial_cash <= Decimal::ZERO {
            return Err(LedgerError::InvalidPrice(initial_cash));
        }

        let portfolio = Portfolio::new(user_id.to_string(), initial_cash);
        self.store.create_portfolio(&portfolio)?;

        info!(
            "Created portfolio {} for user {} with {} cash",
            portfolio.id, user_id, initial_cash
        );
        Ok(portfolio)
    }

    /// Get a portfolio by ID, positions included.
    pub fn get_portfolio(&self, id: &str) -> Result<Portfolio> {
        self.store.get_portfolio(id)
    }

    /// List all portfolios owned by a user.
    pub fn list_portfolios(&self, user_id: &str) -> Result<Vec<Portfolio>> {
        self.store.get_user_portfolios(user_id)
    }

    /// Delete a portfolio and all of its positions. The trade ledger is kept.
    pub fn delete_portfolio(&self, id: &str) -> Result<()> {
        let lock = self.portfolio_lock(id);
        let _guard = lock.lock().unwrap();
        self.store.delete_portfolio(id)?;
        self.locks.remove(id);
        Ok(())
    }

    /// Deposit into or withdraw from a portfolio's cash balance.
    pub fn adjust_cash(&self, portfolio_id: &str, amount: Decimal) -> Result<Portfolio> {
        let lock = self.portfolio_lock(portfolio_id);
        let _guard = lock.lock().unwrap();

        let mut portfolio = self.store.get_portfolio(portfolio_id)?;
        let new_cash = portfolio.cash + amount;
        if new_cash < Decimal::ZERO {
            return Err(LedgerError::InsufficientFunds {
                needed: -amount,
                available: portfolio.cash,
            });
        }
        portfolio.cash = new_cash;
        portfolio.updated_at = chrono::Utc::now().timestamp_millis();
        self.store.update_portfolio(&portfolio)?;

        info!(
            "Adjusted cash for portfolio {} by {} (now {})",
            portfolio_id, amount, portfolio.cash
        );
        Ok(portfolio)
    }

    // ==========================================================================
    // Trade Execution
    // ==========================================================================

    /// Execute one order end-to-end with atomicity across position, trade,
    /// and portfolio mutations.
    ///
    /// Validation runs against state loaded under the portfolio lock; on
    /// failure nothing is written. On success the position upsert/delete,
    /// the trade insert, and the portfolio update commit as one unit; any
    /// failure rolls all of them back.
    pub fn execute_trade(
        &self,
        portfolio_id: &str,
        mut trade: Trade,
        exec_price: Decimal,
    ) -> Result<(Trade, Option<Position>)> {
        let lock = self.portfolio_lock(portfolio_id);
        let _guard = lock.lock().unwrap();

        let mut portfolio = self.store.get_portfolio(portfolio_id)?;

        if let Err(e) = engine::validate_order(&trade, &portfolio, exec_price) {
            warn!(
                "Trade validation failed for portfolio {}: {} {} x{}: {}",
                portfolio_id, trade.side, trade.symbol, trade.quantity, e
            );
            return Err(e);
        }

        // The id of the position this trade affects, captured before a full
        // close removes it from the snapshot.
        let prior_position_id = portfolio.position(&trade.symbol).map(|p| p.id.clone());

        let position = engine::execute_order(&mut trade, &mut portfolio, exec_price)?;

        self.store.with_transaction(|tx| {
            match &position {
                Some(position) => {
                    trade.position_id = Some(position.id.clone());
                    store::upsert_position(tx, position)?;
                }
                None => {
                    // Full close: remove the row, keep the reference on the
                    // trade so the ledger stays reconstructible.
                    trade.position_id = prior_position_id.clone();
                    if let Some(id) = &prior_position_id {
                        store::delete_position(tx, id)?;
                    }
                }
            }
            store::insert_trade(tx, &trade)?;
            store::update_portfolio(tx, &portfolio)?;
            Ok(())
        })?;

        info!(
            "Executed trade {} for portfolio {}: {} {} x{} @ {} (fee {})",
            trade.id, portfolio_id, trade.side, trade.symbol, trade.quantity, trade.price,
            trade.fee
        );
        Ok((trade, position))
    }

    // ==========================================================================
    // Positions & Trade History
    // ==========================================================================

    /// All open positions for a portfolio.
    pub fn get_positions(&self, portfolio_id: &str) -> Result<Vec<Position>> {
        self.store.get_portfolio_positions(portfolio_id)
    }

    /// Open position for a (user, symbol) pair, if any.
    pub fn get_position(&self, user_id: &str, symbol: &str) -> Result<Option<Position>> {
        self.store.find_position(user_id, symbol)
    }

    /// Distinct symbols held across all portfolios.
    pub fn open_symbols(&self) -> Result<Vec<String>> {
        self.store.open_symbols()
    }

    /// Trade history for a user, newest first, optionally symbol-filtered.
    pub fn trade_history(
        &self,
        user_id: &str,
        symbol: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Trade>> {
        self.store.get_trades(user_id, symbol, limit, offset)
    }

    // ==========================================================================
    // Analytics
    // ==========================================================================

    /// Portfolio summary against current and previous-close prices.
    pub fn summary(
        &self,
        portfolio_id: &str,
        prices: &HashMap<String, Decimal>,
        previous_closes: &HashMap<String, Decimal>,
    ) -> Result<PortfolioSummary> {
        let portfolio = self.store.get_portfolio(portfolio_id)?;
        Ok(engine::summary(&portfolio, prices, previous_closes))
    }

    /// Allocation percentages keyed by symbol, plus "CASH".
    pub fn allocation(
        &self,
        portfolio_id: &str,
        prices: &HashMap<String, Decimal>,
    ) -> Result<HashMap<String, Decimal>> {
        let portfolio = self.store.get_portfolio(portfolio_id)?;
        Ok(engine::allocation(&portfolio, prices))
    }

    /// Concentration and diversification metrics.
    pub fn risk_metrics(
        &self,
        portfolio_id: &str,
        prices: &HashMap<String, Decimal>,
    ) -> Result<RiskMetrics> {
        let portfolio = self.store.get_portfolio(portfolio_id)?;
        Ok(engine::risk_metrics(&portfolio, prices))
    }

    /// Rebalancing recommendations against target allocations.
    pub fn rebalance_recommendations(
        &self,
        portfolio_id: &str,
        targets: &HashMap<String, Decimal>,
        prices: &HashMap<String, Decimal>,
    ) -> Result<Vec<RebalanceRecommendation>> {
        let portfolio = self.store.get_portfolio(portfolio_id)?;
        Ok(engine::rebalance_recommendations(&portfolio, targets, prices))
    }

    /// Mark positions to market and persist the refreshed cached totals.
    pub fn refresh_market_data(
        &self,
        portfolio_id: &str,
        prices: &HashMap<String, Decimal>,
    ) -> Result<Portfolio> {
        let lock = self.portfolio_lock(portfolio_id);
        let _guard = lock.lock().unwrap();

        let mut portfolio = self.store.get_portfolio(portfolio_id)?;
        engine::refresh_market_data(&mut portfolio, prices);

        self.store.with_transaction(|tx| {
            for position in &portfolio.positions {
                store::upsert_position(tx, position)?;
            }
            store::update_portfolio(tx, &portfolio)?;
            Ok(())
        })?;

        Ok(portfolio)
    }
}
