//! Persistence gateway tests against an in-memory SQLite store.

use bourse::error::LedgerError;
use bourse::services::LedgerStore;
use bourse::types::*;
use rust_decimal_macros::dec;

fn store() -> LedgerStore {
    LedgerStore::new_in_memory().unwrap()
}

fn sample_portfolio(user_id: &str) -> Portfolio {
    Portfolio::new(user_id.to_string(), dec!(100000))
}

fn filled_trade(portfolio: &Portfolio, symbol: &str, created_at: i64) -> Trade {
    let mut trade = Trade::new(
        portfolio.id.clone(),
        portfolio.user_id.clone(),
        symbol.to_string(),
        Side::Buy,
        10,
        OrderType::Market,
    );
    trade.price = dec!(100);
    trade.fee = dec!(1);
    trade.status = TradeStatus::Filled;
    trade.executed_at = Some(created_at);
    trade.created_at = created_at;
    trade
}

#[test]
fn test_portfolio_roundtrip_preserves_decimals() {
    let store = store();
    let mut portfolio = Portfolio::new("user-1".to_string(), dec!(12345.6789));
    portfolio.realized_pnl = dec!(-0.01);
    store.create_portfolio(&portfolio).unwrap();

    let loaded = store.get_portfolio(&portfolio.id).unwrap();
    assert_eq!(loaded.id, portfolio.id);
    assert_eq!(loaded.cash, dec!(12345.6789));
    assert_eq!(loaded.realized_pnl, dec!(-0.01));
    assert_eq!(loaded.margin_available, portfolio.margin_available);
    assert!(loaded.positions.is_empty());
}

#[test]
fn test_get_missing_portfolio_is_not_found() {
    let store = store();
    let err = store.get_portfolio("nope").unwrap_err();
    assert!(matches!(err, LedgerError::PortfolioNotFound(_)));
}

#[test]
fn test_update_missing_portfolio_is_not_found() {
    let store = store();
    let portfolio = sample_portfolio("user-1");
    let err = store.update_portfolio(&portfolio).unwrap_err();
    assert!(matches!(err, LedgerError::PortfolioNotFound(_)));
}

#[test]
fn test_user_portfolios_only_lists_owner() {
    let store = store();
    let mine_a = sample_portfolio("user-1");
    let mine_b = sample_portfolio("user-1");
    let theirs = sample_portfolio("user-2");
    store.create_portfolio(&mine_a).unwrap();
    store.create_portfolio(&mine_b).unwrap();
    store.create_portfolio(&theirs).unwrap();

    let portfolios = store.get_user_portfolios("user-1").unwrap();
    assert_eq!(portfolios.len(), 2);
    assert!(portfolios.iter().all(|p| p.user_id == "user-1"));
}

#[test]
fn test_portfolio_load_includes_positions() {
    let store = store();
    let portfolio = sample_portfolio("user-1");
    store.create_portfolio(&portfolio).unwrap();

    let position = Position::open(
        portfolio.id.clone(),
        "user-1".to_string(),
        "AAPL".to_string(),
        10,
        dec!(150),
    );
    store.create_position(&position).unwrap();

    let loaded = store.get_portfolio(&portfolio.id).unwrap();
    assert_eq!(loaded.positions.len(), 1);
    assert_eq!(loaded.positions[0].symbol, "AAPL");
    assert_eq!(loaded.positions[0].entry_price, dec!(150));
}

#[test]
fn test_find_position_absence_is_none() {
    let store = store();
    assert!(store.find_position("user-1", "AAPL").unwrap().is_none());

    let portfolio = sample_portfolio("user-1");
    store.create_portfolio(&portfolio).unwrap();
    let position = Position::open(
        portfolio.id.clone(),
        "user-1".to_string(),
        "AAPL".to_string(),
        5,
        dec!(100),
    );
    store.create_position(&position).unwrap();

    let found = store.find_position("user-1", "AAPL").unwrap().unwrap();
    assert_eq!(found.id, position.id);
    assert!(store.find_position("user-1", "MSFT").unwrap().is_none());
}

#[test]
fn test_position_upsert_replaces_mutable_fields() {
    let store = store();
    let portfolio = sample_portfolio("user-1");
    store.create_portfolio(&portfolio).unwrap();

    let mut position = Position::open(
        portfolio.id.clone(),
        "user-1".to_string(),
        "AAPL".to_string(),
        10,
        dec!(150),
    );
    store.create_position(&position).unwrap();

    position.quantity = 20;
    position.entry_price = dec!(155);
    position.realized_pnl = dec!(42);
    store.update_position(&position).unwrap();

    let loaded = store.get_position(&position.id).unwrap();
    assert_eq!(loaded.quantity, 20);
    assert_eq!(loaded.entry_price, dec!(155));
    assert_eq!(loaded.realized_pnl, dec!(42));
}

#[test]
fn test_delete_missing_position_is_not_found() {
    let store = store();
    let err = store.delete_position("nope").unwrap_err();
    assert!(matches!(err, LedgerError::PositionNotFound(_)));
}

#[test]
fn test_open_symbols_are_distinct() {
    let store = store();
    let a = sample_portfolio("user-1");
    let b = sample_portfolio("user-2");
    store.create_portfolio(&a).unwrap();
    store.create_portfolio(&b).unwrap();

    for (portfolio, symbol) in [(&a, "AAPL"), (&a, "MSFT"), (&b, "AAPL")] {
        let position = Position::open(
            portfolio.id.clone(),
            portfolio.user_id.clone(),
            symbol.to_string(),
            1,
            dec!(100),
        );
        store.create_position(&position).unwrap();
    }

    let mut symbols = store.open_symbols().unwrap();
    symbols.sort();
    assert_eq!(symbols, vec!["AAPL".to_string(), "MSFT".to_string()]);
}

#[test]
fn test_trade_history_pagination_and_symbol_filter() {
    let store = store();
    let portfolio = sample_portfolio("user-1");
    store.create_portfolio(&portfolio).unwrap();

    // Five trades with strictly increasing timestamps: AAPL, MSFT, AAPL, ...
    for i in 0..5 {
        let symbol = if i % 2 == 0 { "AAPL" } else { "MSFT" };
        let trade = filled_trade(&portfolio, symbol, 1_000 + i);
        store.insert_trade(&trade).unwrap();
    }

    let all = store.get_trades("user-1", None, 50, 0).unwrap();
    assert_eq!(all.len(), 5);
    // Newest first.
    assert_eq!(all[0].created_at, 1_004);
    assert_eq!(all[4].created_at, 1_000);

    let page = store.get_trades("user-1", None, 2, 2).unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].created_at, 1_002);
    assert_eq!(page[1].created_at, 1_001);

    let aapl = store.get_trades("user-1", Some("AAPL"), 50, 0).unwrap();
    assert_eq!(aapl.len(), 3);
    assert!(aapl.iter().all(|t| t.symbol == "AAPL"));

    assert!(store.get_trades("user-2", None, 50, 0).unwrap().is_empty());
}

#[test]
fn test_trade_roundtrip_preserves_optional_fields() {
    let store = store();
    let portfolio = sample_portfolio("user-1");
    store.create_portfolio(&portfolio).unwrap();

    let mut trade = filled_trade(&portfolio, "AAPL", 1_000);
    trade.side = Side::Sell;
    trade.position_id = Some("pos-1".to_string());
    trade.realized_pnl = Some(dec!(12.5));
    store.insert_trade(&trade).unwrap();

    let loaded = store.get_trade(&trade.id).unwrap();
    assert_eq!(loaded.side, Side::Sell);
    assert_eq!(loaded.position_id.as_deref(), Some("pos-1"));
    assert_eq!(loaded.realized_pnl, Some(dec!(12.5)));
    assert_eq!(loaded.executed_at, Some(1_000));

    // Pending trades carry no execution data.
    let pending = Trade::new(
        portfolio.id.clone(),
        "user-1".to_string(),
        "MSFT".to_string(),
        Side::Buy,
        1,
        OrderType::Limit,
    );
    store.insert_trade(&pending).unwrap();
    let loaded = store.get_trade(&pending.id).unwrap();
    assert_eq!(loaded.status, TradeStatus::Pending);
    assert!(loaded.realized_pnl.is_none());
    assert!(loaded.executed_at.is_none());
}

#[test]
fn test_delete_portfolio_cascades_positions_but_keeps_trades() {
    let store = store();
    let portfolio = sample_portfolio("user-1");
    store.create_portfolio(&portfolio).unwrap();

    let position = Position::open(
        portfolio.id.clone(),
        "user-1".to_string(),
        "AAPL".to_string(),
        10,
        dec!(150),
    );
    store.create_position(&position).unwrap();
    let trade = filled_trade(&portfolio, "AAPL", 1_000);
    store.insert_trade(&trade).unwrap();

    store.delete_portfolio(&portfolio.id).unwrap();

    assert!(matches!(
        store.get_portfolio(&portfolio.id).unwrap_err(),
        LedgerError::PortfolioNotFound(_)
    ));
    assert!(store.find_position("user-1", "AAPL").unwrap().is_none());
    // The audit trail survives.
    assert_eq!(store.get_trades("user-1", None, 50, 0).unwrap().len(), 1);
}

#[test]
fn test_delete_missing_portfolio_is_not_found() {
    let store = store();
    let err = store.delete_portfolio("nope").unwrap_err();
    assert!(matches!(err, LedgerError::PortfolioNotFound(_)));
}

#[test]
fn test_transaction_error_rolls_back_all_writes() {
    let store = store();
    let portfolio = sample_portfolio("user-1");
    store.create_portfolio(&portfolio).unwrap();
    let trade = filled_trade(&portfolio, "AAPL", 1_000);
    store.insert_trade(&trade).unwrap();

    // Re-inserting the same trade id violates the primary key; the earlier
    // cash update in the same unit of work must not survive.
    let result: bourse::error::Result<()> = store.with_transaction(|tx| {
        tx.execute(
            "UPDATE portfolios SET cash = '0' WHERE id = ?1",
            rusqlite::params![portfolio.id],
        )?;
        tx.execute(
            "INSERT INTO trades (id, portfolio_id, user_id, symbol, quantity, price,
                                 side, order_type, status, fee, created_at)
             VALUES (?1, ?2, ?3, 'AAPL', 1, '100', 'buy', 'market', 'filled', '1', 0)",
            rusqlite::params![trade.id, portfolio.id, portfolio.user_id],
        )?;
        Ok(())
    });

    assert!(result.is_err());
    let loaded = store.get_portfolio(&portfolio.id).unwrap();
    assert_eq!(loaded.cash, dec!(100000));
}
