//! Valuation & Rule Engine
//!
//! Pure, side-effect-free functions over portfolio snapshots plus a
//! symbol -> price map. Validation and execution are split so the caller can
//! re-check preconditions against fresh state before committing: these
//! functions never touch storage.
//!
//! Positions whose symbol is absent from the price map contribute zero to
//! valuations. That is a signal of stale market data, not a fatal error.

use std::collections::HashMap;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::{LedgerError, Result};
use crate::types::{
    Portfolio, Position, PortfolioSummary, PositionSummary, RebalanceAction,
    RebalanceRecommendation, RiskMetrics, Side, Trade, TradeStatus,
};

/// Minimum commission per trade.
pub const MIN_COMMISSION: Decimal = dec!(1.00);

/// Commission rate on trade notional.
pub const COMMISSION_RATE: Decimal = dec!(0.001);

/// Rebalance deltas at or below this many percentage points are ignored.
const REBALANCE_THRESHOLD: Decimal = dec!(1.0);

/// Commission for a trade: max(1.00, 0.1% of notional). Charged on both
/// buys and sells.
pub fn commission(notional: Decimal) -> Decimal {
    let fee = notional * COMMISSION_RATE;
    if fee < MIN_COMMISSION {
        MIN_COMMISSION
    } else {
        fee
    }
}

/// Total portfolio value: cash plus every position marked at its current
/// price. Unpriced positions contribute zero.
pub fn portfolio_value(portfolio: &Portfolio, prices: &HashMap<String, Decimal>) -> Decimal {
    let mut total = portfolio.cash;
    for position in &portfolio.positions {
        if let Some(price) = prices.get(&position.symbol) {
            total += position.market_value(*price);
        }
    }
    total
}

/// Unrealized P&L summed over positions with a known price.
pub fn unrealized_pnl(positions: &[Position], prices: &HashMap<String, Decimal>) -> Decimal {
    let mut total = Decimal::ZERO;
    for position in positions {
        if let Some(price) = prices.get(&position.symbol) {
            total += (*price - position.entry_price) * Decimal::from(position.quantity);
        }
    }
    total
}

/// Detailed metrics for one position at the given mark.
pub fn position_summary(position: &Position, price: Decimal) -> PositionSummary {
    let market_value = position.market_value(price);
    let unrealized = (price - position.entry_price) * Decimal::from(position.quantity);
    let cost_basis = position.entry_price * Decimal::from(position.quantity);
    let unrealized_return_pct = if cost_basis > Decimal::ZERO {
        unrealized / cost_basis * dec!(100)
    } else {
        Decimal::ZERO
    };

    PositionSummary {
        symbol: position.symbol.clone(),
        quantity: position.quantity,
        entry_price: position.entry_price,
        current_price: price,
        market_value,
        unrealized_pnl: unrealized,
        unrealized_return_pct,
    }
}

/// Validate an order against a portfolio snapshot.
///
/// Precondition check only: no state is touched. Must be re-evaluated
/// against fresh state at execution time.
pub fn validate_order(trade: &Trade, portfolio: &Portfolio, exec_price: Decimal) -> Result<()> {
    if trade.quantity <= 0 {
        return Err(LedgerError::InvalidQuantity(trade.quantity));
    }
    if exec_price <= Decimal::ZERO {
        return Err(LedgerError::InvalidPrice(exec_price));
    }

    match trade.side {
        Side::Buy => {
            let notional = Decimal::from(trade.quantity) * exec_price;
            let total_cost = notional + commission(notional);
            if portfolio.cash < total_cost {
                return Err(LedgerError::InsufficientFunds {
                    needed: total_cost,
                    available: portfolio.cash,
                });
            }
        }
        Side::Sell => {
            // A missing position and a too-small one are the same business
            // outcome: not enough shares.
            let available = portfolio
                .position(&trade.symbol)
                .map(|p| p.quantity)
                .unwrap_or(0);
            if available < trade.quantity {
                return Err(LedgerError::InsufficientShares {
                    needed: trade.quantity,
                    available,
                });
            }
        }
    }

    Ok(())
}

/// Execute a validated order against an in-memory snapshot.
///
/// Assumes `validate_order` passed against the *same* snapshot. Stamps the
/// trade, adjusts cash, and applies the position lifecycle:
/// - buy, no position: open one at the execution price;
/// - buy, existing position: recompute the quantity-weighted average entry;
/// - sell: decrement quantity, accumulate realized P&L; a quantity of
///   exactly zero removes the position and returns `None`.
pub fn execute_order(
    trade: &mut Trade,
    portfolio: &mut Portfolio,
    exec_price: Decimal,
) -> Result<Option<Position>> {
    let now = chrono::Utc::now().timestamp_millis();
    let notional = Decimal::from(trade.quantity) * exec_price;

    trade.price = exec_price;
    trade.fee = commission(notional);
    trade.status = TradeStatus::Filled;
    trade.executed_at = Some(now);

    let result = match trade.side {
        Side::Buy => {
            portfolio.cash -= notional + trade.fee;

            if let Some(position) = portfolio
                .positions
                .iter_mut()
                .find(|p| p.symbol == trade.symbol)
            {
                let total_cost =
                    position.entry_price * Decimal::from(position.quantity) + notional;
                let total_quantity = position.quantity + trade.quantity;
                position.entry_price = total_cost / Decimal::from(total_quantity);
                position.quantity = total_quantity;
                position.current_price = exec_price;
                position.unrealized_pnl =
                    (exec_price - position.entry_price) * Decimal::from(total_quantity);
                position.updated_at = now;
                Some(position.clone())
            } else {
                let position = Position::open(
                    portfolio.id.clone(),
                    trade.user_id.clone(),
                    trade.symbol.clone(),
                    trade.quantity,
                    exec_price,
                );
                portfolio.positions.push(position.clone());
                Some(position)
            }
        }
        Side::Sell => {
            let index = portfolio
                .positions
                .iter()
                .position(|p| p.symbol == trade.symbol)
                .ok_or_else(|| LedgerError::PositionNotFound(trade.symbol.clone()))?;

            portfolio.cash += notional - trade.fee;

            let realized = {
                let position = &mut portfolio.positions[index];
                let realized =
                    (exec_price - position.entry_price) * Decimal::from(trade.quantity);
                position.quantity -= trade.quantity;
                position.current_price = exec_price;
                position.realized_pnl += realized;
                realized
            };

            trade.realized_pnl = Some(realized);
            portfolio.realized_pnl += realized;

            let position = &mut portfolio.positions[index];
            if position.quantity == 0 {
                portfolio.positions.remove(index);
                None
            } else {
                // Partial close: the weighted-average basis is unchanged.
                position.unrealized_pnl =
                    (exec_price - position.entry_price) * Decimal::from(position.quantity);
                position.updated_at = now;
                Some(position.clone())
            }
        }
    };

    portfolio.updated_at = now;
    Ok(result)
}

/// Allocation percentages keyed by symbol, plus a synthetic "CASH" entry.
/// Percentages sum to 100 when every position has a known price.
pub fn allocation(
    portfolio: &Portfolio,
    prices: &HashMap<String, Decimal>,
) -> HashMap<String, Decimal> {
    let total = portfolio_value(portfolio, prices);
    let mut allocations = HashMap::new();

    if total <= Decimal::ZERO {
        return allocations;
    }

    allocations.insert("CASH".to_string(), portfolio.cash / total * dec!(100));

    for position in &portfolio.positions {
        if let Some(price) = prices.get(&position.symbol) {
            let value = position.market_value(*price);
            allocations.insert(position.symbol.clone(), value / total * dec!(100));
        }
    }

    allocations
}

/// Concentration risk and diversification metrics.
pub fn risk_metrics(portfolio: &Portfolio, prices: &HashMap<String, Decimal>) -> RiskMetrics {
    let total = portfolio_value(portfolio, prices);
    let mut max_position_pct = Decimal::ZERO;

    if total > Decimal::ZERO {
        for position in &portfolio.positions {
            if let Some(price) = prices.get(&position.symbol) {
                let pct = position.market_value(*price) / total * dec!(100);
                if pct > max_position_pct {
                    max_position_pct = pct;
                }
            }
        }
    }

    let cash_pct = if total > Decimal::ZERO {
        portfolio.cash / total * dec!(100)
    } else {
        Decimal::ZERO
    };

    RiskMetrics {
        total_value: total,
        position_count: portfolio.positions.len(),
        max_position_pct,
        cash_pct,
        diversification_score: diversification_score(&portfolio.positions, total, prices),
    }
}

/// Diversification score from the Herfindahl index of position weights,
/// rescaled to 0-100 (100 = perfectly diversified). Single-position or
/// empty portfolios score 0.
fn diversification_score(
    positions: &[Position],
    total: Decimal,
    prices: &HashMap<String, Decimal>,
) -> Decimal {
    if positions.len() <= 1 || total <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    let mut herfindahl = Decimal::ZERO;
    for position in positions {
        if let Some(price) = prices.get(&position.symbol) {
            let weight = position.market_value(*price) / total;
            herfindahl += weight * weight;
        }
    }

    (Decimal::ONE - herfindahl) * dec!(100)
}

/// Rebalancing deltas against target allocations. A recommendation is
/// emitted only when the current allocation differs from the target by more
/// than one percentage point and the symbol has a known price.
pub fn rebalance_recommendations(
    portfolio: &Portfolio,
    targets: &HashMap<String, Decimal>,
    prices: &HashMap<String, Decimal>,
) -> Vec<RebalanceRecommendation> {
    let total = portfolio_value(portfolio, prices);
    let current_allocations = allocation(portfolio, prices);
    let mut recommendations = Vec::new();

    for (symbol, target_pct) in targets {
        let current_pct = current_allocations
            .get(symbol)
            .copied()
            .unwrap_or(Decimal::ZERO);
        let difference = *target_pct - current_pct;
        if difference.abs() <= REBALANCE_THRESHOLD {
            continue;
        }
        let Some(price) = prices.get(symbol) else {
            continue;
        };

        let target_value = *target_pct / dec!(100) * total;
        let current_value = current_pct / dec!(100) * total;
        let estimated_shares = ((target_value - current_value) / *price)
            .trunc()
            .to_i64()
            .unwrap_or(0);

        let action = if difference > REBALANCE_THRESHOLD {
            RebalanceAction::Buy
        } else if difference < -REBALANCE_THRESHOLD {
            RebalanceAction::Sell
        } else {
            RebalanceAction::Hold
        };

        recommendations.push(RebalanceRecommendation {
            symbol: symbol.clone(),
            current_pct,
            target_pct: *target_pct,
            difference,
            current_value,
            target_value,
            estimated_shares,
            action,
        });
    }

    recommendations.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    recommendations
}

/// Mark every priced position to market and refresh the portfolio's cached
/// total value and unrealized P&L.
pub fn refresh_market_data(portfolio: &mut Portfolio, prices: &HashMap<String, Decimal>) {
    let now = chrono::Utc::now().timestamp_millis();
    let mut total_unrealized = Decimal::ZERO;
    let mut total_value = portfolio.cash;

    for position in &mut portfolio.positions {
        if let Some(price) = prices.get(&position.symbol) {
            position.current_price = *price;
            position.unrealized_pnl =
                (*price - position.entry_price) * Decimal::from(position.quantity);
            position.updated_at = now;

            total_unrealized += position.unrealized_pnl;
            total_value += position.market_value(*price);
        }
    }

    portfolio.unrealized_pnl = total_unrealized;
    portfolio.total_value = total_value;
    portfolio.updated_at = now;
}

/// Comprehensive portfolio summary. Day P&L is derived from the delta
/// between current and previous-close prices and is not ledger truth.
pub fn summary(
    portfolio: &Portfolio,
    prices: &HashMap<String, Decimal>,
    previous_closes: &HashMap<String, Decimal>,
) -> PortfolioSummary {
    let total_value = portfolio_value(portfolio, prices);
    let positions_value = total_value - portfolio.cash;
    let unrealized = unrealized_pnl(&portfolio.positions, prices);

    let mut day_pnl = Decimal::ZERO;
    for position in &portfolio.positions {
        if let (Some(current), Some(previous)) = (
            prices.get(&position.symbol),
            previous_closes.get(&position.symbol),
        ) {
            day_pnl += (*current - *previous) * Decimal::from(position.quantity);
        }
    }

    let day_return_pct = if total_value > Decimal::ZERO {
        day_pnl / total_value * dec!(100)
    } else {
        Decimal::ZERO
    };

    let total_return_pct = if positions_value > Decimal::ZERO {
        unrealized / positions_value * dec!(100)
    } else {
        Decimal::ZERO
    };

    PortfolioSummary {
        portfolio_id: portfolio.id.clone(),
        total_value,
        cash: portfolio.cash,
        positions_value,
        unrealized_pnl: unrealized,
        realized_pnl: portfolio.realized_pnl,
        day_pnl,
        day_return_pct,
        total_return_pct,
        position_count: portfolio.positions.len(),
    }
}
