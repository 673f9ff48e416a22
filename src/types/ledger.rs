//! Ledger Types
//!
//! Core data model for the portfolio ledger: portfolios, positions, and the
//! immutable trade record. Pure data, no behavior beyond constructors and
//! small accessors.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;

/// Fraction of the cash balance reserved as available margin at creation.
pub const MARGIN_RESERVATION: Decimal = dec!(0.5);

// =============================================================================
// Enums
// =============================================================================

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }

    /// Parse a raw side value. Anything other than "buy"/"sell" is rejected.
    pub fn parse(s: &str) -> Result<Self, LedgerError> {
        match s {
            "buy" => Ok(Side::Buy),
            "sell" => Ok(Side::Sell),
            other => Err(LedgerError::InvalidSide(other.to_string())),
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Execute at the current market price
    Market,
    /// Execute at the supplied limit price
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "market" => Some(OrderType::Market),
            "limit" => Some(OrderType::Limit),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Trade status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    /// Created but not yet executed
    Pending,
    /// Executed and recorded in the ledger
    Filled,
    /// Rejected before execution
    Cancelled,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Pending => "pending",
            TradeStatus::Filled => "filled",
            TradeStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TradeStatus::Pending),
            "filled" => Some(TradeStatus::Filled),
            "cancelled" => Some(TradeStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Portfolio
// =============================================================================

/// A user's portfolio: cash plus open positions.
///
/// Mutated only through trade execution or an explicit cash adjustment.
/// `total_value` and `unrealized_pnl` are cached figures recomputed from
/// market data on demand; the ledger truth is cash, positions, and trades.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    /// Unique portfolio ID
    pub id: String,
    /// Owner's user ID
    pub user_id: String,
    /// Current cash balance (never negative)
    pub cash: Decimal,
    /// Margin currently in use (always zero in this long-only engine)
    pub margin_used: Decimal,
    /// Margin reserved at creation (fixed fraction of initial cash)
    pub margin_available: Decimal,
    /// Cached total value (cash + marked positions)
    pub total_value: Decimal,
    /// Cached unrealized P&L across open positions
    pub unrealized_pnl: Decimal,
    /// Realized P&L accumulated from closing sells
    pub realized_pnl: Decimal,
    /// Day P&L derived from previous-close price deltas
    pub day_pnl: Decimal,
    /// Open positions owned by this portfolio
    #[serde(default)]
    pub positions: Vec<Position>,
    /// When portfolio was created (ms)
    pub created_at: i64,
    /// When portfolio was last updated (ms)
    pub updated_at: i64,
}

impl Portfolio {
    /// Create a new portfolio funded with an initial cash deposit.
    pub fn new(user_id: String, initial_cash: Decimal) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            cash: initial_cash,
            margin_used: Decimal::ZERO,
            margin_available: initial_cash * MARGIN_RESERVATION,
            total_value: initial_cash,
            unrealized_pnl: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            day_pnl: Decimal::ZERO,
            positions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Find the open position for a symbol, if any.
    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.symbol == symbol)
    }

    /// Symbols of all open positions.
    pub fn symbols(&self) -> Vec<String> {
        self.positions.iter().map(|p| p.symbol.clone()).collect()
    }
}

// =============================================================================
// Position
// =============================================================================

/// Position direction. The engine is long-only; the field exists so the
/// ledger format does not change if shorts are ever added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    #[default]
    Long,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        "long"
    }
}

/// Net open exposure to one symbol within one portfolio.
///
/// Quantity is strictly positive while the row exists; a position that
/// reaches exactly zero is deleted, never retained.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    /// Unique position ID
    pub id: String,
    /// Portfolio this position belongs to
    pub portfolio_id: String,
    /// Owner's user ID
    pub user_id: String,
    /// Symbol (e.g., "AAPL")
    pub symbol: String,
    /// Shares held, always > 0
    pub quantity: i64,
    /// Long or short (long-only for now)
    pub side: PositionSide,
    /// Weighted-average cost basis, recomputed on every buy
    pub entry_price: Decimal,
    /// Last observed market price
    pub current_price: Decimal,
    /// (current_price - entry_price) * quantity
    pub unrealized_pnl: Decimal,
    /// P&L accumulated from partial closes of this position
    pub realized_pnl: Decimal,
    /// When position was opened (ms)
    pub created_at: i64,
    /// When position was last updated (ms)
    pub updated_at: i64,
}

impl Position {
    /// Open a new position from the first buy of a symbol.
    pub fn open(
        portfolio_id: String,
        user_id: String,
        symbol: String,
        quantity: i64,
        entry_price: Decimal,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: Uuid::new_v4().to_string(),
            portfolio_id,
            user_id,
            symbol,
            quantity,
            side: PositionSide::Long,
            entry_price,
            current_price: entry_price,
            unrealized_pnl: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Market value at the given price.
    pub fn market_value(&self, price: Decimal) -> Decimal {
        Decimal::from(self.quantity) * price
    }
}

// =============================================================================
// Trade
// =============================================================================

/// An immutable ledger entry recording one executed order.
///
/// Once persisted a trade is never mutated or deleted. Symbol, side, and
/// price are denormalized onto the record so the ledger stays readable after
/// the referenced position is closed and removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    /// Unique trade ID
    pub id: String,
    /// Portfolio this trade belongs to
    pub portfolio_id: String,
    /// Owner's user ID
    pub user_id: String,
    /// Position this trade affected, as it existed at execution time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_id: Option<String>,
    /// Symbol traded
    pub symbol: String,
    /// Shares traded, always > 0
    pub quantity: i64,
    /// Execution price
    pub price: Decimal,
    /// Buy or sell
    pub side: Side,
    /// Market or limit
    pub order_type: OrderType,
    /// Trade status
    pub status: TradeStatus,
    /// Commission charged
    pub fee: Decimal,
    /// Realized P&L, set on closing sells
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realized_pnl: Option<Decimal>,
    /// When the trade was executed (ms)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<i64>,
    /// When the record was created (ms)
    pub created_at: i64,
}

impl Trade {
    /// Create a pending trade awaiting validation and execution.
    pub fn new(
        portfolio_id: String,
        user_id: String,
        symbol: String,
        side: Side,
        quantity: i64,
        order_type: OrderType,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            portfolio_id,
            user_id,
            position_id: None,
            symbol,
            quantity,
            price: Decimal::ZERO,
            side,
            order_type,
            status: TradeStatus::Pending,
            fee: Decimal::ZERO,
            realized_pnl: None,
            executed_at: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

// =============================================================================
// Request payloads
// =============================================================================

/// Request body for creating a portfolio.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePortfolioRequest {
    pub user_id: String,
    pub initial_cash: Decimal,
}

/// Request body for executing a trade.
///
/// The side arrives as a raw string so that unknown values surface as an
/// `InvalidSide` error instead of a generic deserialization failure.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteTradeRequest {
    pub symbol: String,
    pub side: String,
    pub quantity: i64,
    #[serde(default)]
    pub order_type: Option<OrderType>,
    /// Required for limit orders; ignored for market orders
    #[serde(default)]
    pub limit_price: Option<Decimal>,
}

/// Request body for an explicit cash adjustment (deposit or withdrawal).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashAdjustmentRequest {
    /// Positive to deposit, negative to withdraw
    pub amount: Decimal,
}

/// Request body for rebalance recommendations.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceRequest {
    /// Target allocation percentages keyed by symbol
    pub target_allocations: std::collections::HashMap<String, Decimal>,
}
