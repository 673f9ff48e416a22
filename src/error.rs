use rust_decimal::Decimal;
use thiserror::Error;

/// Ledger and trade execution errors.
///
/// Validation errors (`InvalidQuantity` through `InsufficientShares`) are
/// produced before any write and are safe to retry after correcting the
/// request. `Persistence` during a transactional step always follows a full
/// rollback, so the ledger is guaranteed unchanged.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("quantity must be positive, got {0}")]
    InvalidQuantity(i64),

    #[error("invalid price: {0}")]
    InvalidPrice(Decimal),

    #[error("invalid order side: {0}")]
    InvalidSide(String),

    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    #[error("insufficient shares: need {needed}, have {available}")]
    InsufficientShares { needed: i64, available: i64 },

    #[error("portfolio not found: {0}")]
    PortfolioNotFound(String),

    #[error("position not found: {0}")]
    PositionNotFound(String),

    #[error("trade not found: {0}")]
    TradeNotFound(String),

    #[error("no price data available for {0}")]
    PriceUnavailable(String),

    #[error("database error: {0}")]
    Persistence(#[from] rusqlite::Error),
}

impl From<reqwest::Error> for LedgerError {
    fn from(e: reqwest::Error) -> Self {
        LedgerError::PriceUnavailable(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
