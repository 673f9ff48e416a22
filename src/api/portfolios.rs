//! Portfolio API
//!
//! Endpoints for the portfolio ledger:
//!
//! Portfolios:
//! - POST   /api/v1/portfolios - Create a portfolio with an initial deposit
//! - GET    /api/v1/portfolios/:id - Get portfolio details with positions
//! - DELETE /api/v1/portfolios/:id - Delete a portfolio (positions cascade)
//! - GET    /api/v1/portfolios/user/:user_id - List a user's portfolios
//! - POST   /api/v1/portfolios/:id/cash - Deposit or withdraw cash
//!
//! Positions:
//! - GET /api/v1/portfolios/:id/positions - List open positions
//! - GET /api/v1/positions - Look up one position by user and symbol
//!
//! Trading:
//! - POST /api/v1/portfolios/:id/trades - Validate and execute an order
//! - GET  /api/v1/portfolios/:id/trades - Trade history (symbol filter, paging)
//!
//! Analysis:
//! - GET  /api/v1/portfolios/:id/summary - Valuation and P&L summary
//! - GET  /api/v1/portfolios/:id/allocation - Allocation percentages
//! - GET  /api/v1/portfolios/:id/risk - Concentration and diversification
//! - POST /api/v1/portfolios/:id/rebalance - Rebalance recommendations

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::api::ApiResponse;
use crate::error::LedgerError;
use crate::types::{
    CashAdjustmentRequest, CreatePortfolioRequest, ExecuteTradeRequest, OrderType, Portfolio,
    Position, PortfolioSummary, RebalanceRecommendation, RebalanceRequest, RiskMetrics, Side,
    Trade,
};
use crate::AppState;

/// Create the portfolio router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/portfolios", post(create_portfolio))
        .route("/portfolios/:id", get(get_portfolio))
        .route("/portfolios/:id", delete(delete_portfolio))
        .route("/portfolios/user/:user_id", get(list_user_portfolios))
        .route("/portfolios/:id/cash", post(adjust_cash))
        .route("/portfolios/:id/positions", get(get_positions))
        .route("/positions", get(get_position))
        .route("/portfolios/:id/trades", post(execute_trade))
        .route("/portfolios/:id/trades", get(get_trade_history))
        .route("/portfolios/:id/summary", get(get_summary))
        .route("/portfolios/:id/allocation", get(get_allocation))
        .route("/portfolios/:id/risk", get(get_risk_metrics))
        .route("/portfolios/:id/rebalance", post(get_rebalance))
}

/// Prices for every open position in a portfolio, read from the cache.
fn position_prices(state: &AppState, portfolio: &Portfolio) -> HashMap<String, Decimal> {
    state.prices.prices(&portfolio.symbols())
}

// =============================================================================
// Portfolio Handlers
// =============================================================================

/// POST /api/v1/portfolios
async fn create_portfolio(
    State(state): State<AppState>,
    Json(request): Json<CreatePortfolioRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let portfolio = state
        .ledger
        .create_portfolio(&request.user_id, request.initial_cash)?;

    Ok((StatusCode::CREATED, Json(ApiResponse { data: portfolio })))
}

/// GET /api/v1/portfolios/:id
async fn get_portfolio(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Portfolio>>, LedgerError> {
    let portfolio = state.ledger.get_portfolio(&id)?;
    Ok(Json(ApiResponse { data: portfolio }))
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
    pub id: String,
}

/// DELETE /api/v1/portfolios/:id
async fn delete_portfolio(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<DeleteResponse>>, LedgerError> {
    state.ledger.delete_portfolio(&id)?;
    Ok(Json(ApiResponse {
        data: DeleteResponse { deleted: true, id },
    }))
}

/// GET /api/v1/portfolios/user/:user_id
async fn list_user_portfolios(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<Portfolio>>>, LedgerError> {
    let portfolios = state.ledger.list_portfolios(&user_id)?;
    Ok(Json(ApiResponse { data: portfolios }))
}

/// POST /api/v1/portfolios/:id/cash
async fn adjust_cash(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CashAdjustmentRequest>,
) -> Result<Json<ApiResponse<Portfolio>>, LedgerError> {
    let portfolio = state.ledger.adjust_cash(&id, request.amount)?;
    Ok(Json(ApiResponse { data: portfolio }))
}

// =============================================================================
// Position Handlers
// =============================================================================

/// GET /api/v1/portfolios/:id/positions
async fn get_positions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Vec<Position>>>, LedgerError> {
    let positions = state.ledger.get_positions(&id)?;
    Ok(Json(ApiResponse { data: positions }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionQuery {
    pub user_id: String,
    pub symbol: String,
}

/// GET /api/v1/positions?userId=...&symbol=...
///
/// `data` is null when the user holds no position in the symbol; absence is
/// a valid business outcome, not an error.
async fn get_position(
    State(state): State<AppState>,
    Query(query): Query<PositionQuery>,
) -> Result<Json<ApiResponse<Option<Position>>>, LedgerError> {
    let position = state.ledger.get_position(&query.user_id, &query.symbol)?;
    Ok(Json(ApiResponse { data: position }))
}

// =============================================================================
// Trading Handlers
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeExecutionResponse {
    pub trade: Trade,
    /// Resulting position; absent when a sell fully closed it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

/// POST /api/v1/portfolios/:id/trades
///
/// Market orders execute at the cached market price; limit orders at the
/// supplied limit price.
async fn execute_trade(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ExecuteTradeRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let side = Side::parse(&request.side)?;
    let order_type = request.order_type.unwrap_or(OrderType::Market);

    let exec_price = match order_type {
        OrderType::Limit => request
            .limit_price
            .ok_or(LedgerError::InvalidPrice(Decimal::ZERO))?,
        OrderType::Market => state.prices.current_price(&request.symbol)?,
    };

    let portfolio = state.ledger.get_portfolio(&id)?;
    let trade = Trade::new(
        id.clone(),
        portfolio.user_id,
        request.symbol,
        side,
        request.quantity,
        order_type,
    );

    let (trade, position) = state.ledger.execute_trade(&id, trade, exec_price)?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            data: TradeExecutionResponse { trade, position },
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct TradeHistoryQuery {
    pub symbol: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// GET /api/v1/portfolios/:id/trades
async fn get_trade_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<TradeHistoryQuery>,
) -> Result<Json<ApiResponse<Vec<Trade>>>, LedgerError> {
    let portfolio = state.ledger.get_portfolio(&id)?;
    let trades = state.ledger.trade_history(
        &portfolio.user_id,
        query.symbol.as_deref(),
        query.limit.unwrap_or(50),
        query.offset.unwrap_or(0),
    )?;
    Ok(Json(ApiResponse { data: trades }))
}

// =============================================================================
// Analysis Handlers
// =============================================================================

/// GET /api/v1/portfolios/:id/summary
async fn get_summary(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<PortfolioSummary>>, LedgerError> {
    let portfolio = state.ledger.get_portfolio(&id)?;
    let prices = position_prices(&state, &portfolio);
    let previous_closes = state.prices.previous_closes(&portfolio.symbols());

    let summary = state.ledger.summary(&id, &prices, &previous_closes)?;
    Ok(Json(ApiResponse { data: summary }))
}

/// GET /api/v1/portfolios/:id/allocation
async fn get_allocation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<HashMap<String, Decimal>>>, LedgerError> {
    let portfolio = state.ledger.get_portfolio(&id)?;
    let prices = position_prices(&state, &portfolio);

    let allocations = state.ledger.allocation(&id, &prices)?;
    Ok(Json(ApiResponse { data: allocations }))
}

/// GET /api/v1/portfolios/:id/risk
async fn get_risk_metrics(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<RiskMetrics>>, LedgerError> {
    let portfolio = state.ledger.get_portfolio(&id)?;
    let prices = position_prices(&state, &portfolio);

    let metrics = state.ledger.risk_metrics(&id, &prices)?;
    Ok(Json(ApiResponse { data: metrics }))
}

/// POST /api/v1/portfolios/:id/rebalance
async fn get_rebalance(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RebalanceRequest>,
) -> Result<Json<ApiResponse<Vec<RebalanceRecommendation>>>, LedgerError> {
    let portfolio = state.ledger.get_portfolio(&id)?;

    // Price both the held symbols and the rebalance targets.
    let mut symbols = portfolio.symbols();
    for symbol in request.target_allocations.keys() {
        if !symbols.contains(symbol) {
            symbols.push(symbol.clone());
        }
    }
    let prices = state.prices.prices(&symbols);

    let recommendations =
        state
            .ledger
            .rebalance_recommendations(&id, &request.target_allocations, &prices)?;
    Ok(Json(ApiResponse { data: recommendations }))
}
