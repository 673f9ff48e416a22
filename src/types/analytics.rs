//! Analytics result types.
//!
//! Explicit structs for summary, risk, and rebalancing output so every field
//! has a name and a fixed type on the wire.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// High-level view of portfolio performance against current market data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSummary {
    pub portfolio_id: String,
    pub total_value: Decimal,
    pub cash: Decimal,
    pub positions_value: Decimal,
    pub unrealized_pnl: Decimal,
    pub realized_pnl: Decimal,
    /// P&L versus previous close, derived, not ledger truth
    pub day_pnl: Decimal,
    pub day_return_pct: Decimal,
    pub total_return_pct: Decimal,
    pub position_count: usize,
}

/// Detailed metrics for a single position at a given mark.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSummary {
    pub symbol: String,
    pub quantity: i64,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub market_value: Decimal,
    pub unrealized_pnl: Decimal,
    pub unrealized_return_pct: Decimal,
}

/// Concentration and diversification metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskMetrics {
    pub total_value: Decimal,
    pub position_count: usize,
    /// Largest single position as a percentage of total value
    pub max_position_pct: Decimal,
    pub cash_pct: Decimal,
    /// (1 - Herfindahl index of position weights) * 100; 0 for <= 1 position
    pub diversification_score: Decimal,
}

/// Suggested action for one rebalance recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceAction {
    Buy,
    Sell,
    Hold,
}

/// One per-symbol rebalancing delta against a target allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceRecommendation {
    pub symbol: String,
    pub current_pct: Decimal,
    pub target_pct: Decimal,
    /// target_pct - current_pct, in percentage points
    pub difference: Decimal,
    pub current_value: Decimal,
    pub target_value: Decimal,
    /// Whole shares to move, truncated toward zero; negative means sell
    pub estimated_shares: i64,
    pub action: RebalanceAction,
}
