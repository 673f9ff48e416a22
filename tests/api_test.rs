//! API adapter tests: error-to-status mapping and request payload shapes.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use bourse::error::LedgerError;
use bourse::types::{ExecuteTradeRequest, OrderType};
use rust_decimal_macros::dec;

#[test]
fn test_error_status_mapping() {
    let cases = [
        (
            LedgerError::InvalidQuantity(0).into_response(),
            StatusCode::BAD_REQUEST,
        ),
        (
            LedgerError::InvalidSide("short".to_string()).into_response(),
            StatusCode::BAD_REQUEST,
        ),
        (
            LedgerError::InsufficientFunds {
                needed: dec!(100),
                available: dec!(1),
            }
            .into_response(),
            StatusCode::BAD_REQUEST,
        ),
        (
            LedgerError::PortfolioNotFound("p".to_string()).into_response(),
            StatusCode::NOT_FOUND,
        ),
        (
            LedgerError::PriceUnavailable("AAPL".to_string()).into_response(),
            StatusCode::SERVICE_UNAVAILABLE,
        ),
    ];

    for (response, expected) in cases {
        assert_eq!(response.status(), expected);
    }
}

#[test]
fn test_trade_request_accepts_camel_case_payload() {
    let json = r#"{
        "symbol": "AAPL",
        "side": "buy",
        "quantity": 10,
        "orderType": "limit",
        "limitPrice": "150.25"
    }"#;

    let request: ExecuteTradeRequest = serde_json::from_str(json).unwrap();
    assert_eq!(request.symbol, "AAPL");
    assert_eq!(request.side, "buy");
    assert_eq!(request.quantity, 10);
    assert_eq!(request.order_type, Some(OrderType::Limit));
    assert_eq!(request.limit_price, Some(dec!(150.25)));
}

#[test]
fn test_trade_request_defaults_to_market() {
    let json = r#"{"symbol": "AAPL", "side": "sell", "quantity": 3}"#;
    let request: ExecuteTradeRequest = serde_json::from_str(json).unwrap();
    assert_eq!(request.order_type, None);
    assert_eq!(request.limit_price, None);
}
