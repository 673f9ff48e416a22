//! HTTP request adapter.
//!
//! Thin translation layer between HTTP and the ledger service: handlers
//! gather prices, call the orchestration layer, and shape responses. No
//! business rules live here.

pub mod health;
pub mod portfolios;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use serde::Serialize;

use crate::error::LedgerError;
use crate::AppState;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/api/v1", portfolios::router())
}

/// Standard success envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// Standard error envelope.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Convert LedgerError to an HTTP response.
impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            LedgerError::InvalidQuantity(_) => (StatusCode::BAD_REQUEST, "INVALID_QUANTITY"),
            LedgerError::InvalidPrice(_) => (StatusCode::BAD_REQUEST, "INVALID_PRICE"),
            LedgerError::InvalidSide(_) => (StatusCode::BAD_REQUEST, "INVALID_SIDE"),
            LedgerError::InsufficientFunds { .. } => {
                (StatusCode::BAD_REQUEST, "INSUFFICIENT_FUNDS")
            }
            LedgerError::InsufficientShares { .. } => {
                (StatusCode::BAD_REQUEST, "INSUFFICIENT_SHARES")
            }
            LedgerError::PortfolioNotFound(_) => (StatusCode::NOT_FOUND, "PORTFOLIO_NOT_FOUND"),
            LedgerError::PositionNotFound(_) => (StatusCode::NOT_FOUND, "POSITION_NOT_FOUND"),
            LedgerError::TradeNotFound(_) => (StatusCode::NOT_FOUND, "TRADE_NOT_FOUND"),
            LedgerError::PriceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "PRICE_UNAVAILABLE")
            }
            LedgerError::Persistence(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR")
            }
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}
