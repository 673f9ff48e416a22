//! End-to-end service tests: order execution with persistence, transactional
//! rollback, and per-portfolio serialization under concurrent orders.

use std::sync::Arc;

use bourse::error::LedgerError;
use bourse::services::{LedgerService, LedgerStore};
use bourse::types::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn service() -> (LedgerService, Arc<LedgerStore>) {
    let store = Arc::new(LedgerStore::new_in_memory().unwrap());
    (LedgerService::new(store.clone()), store)
}

fn order(portfolio: &Portfolio, symbol: &str, side: Side, quantity: i64) -> Trade {
    Trade::new(
        portfolio.id.clone(),
        portfolio.user_id.clone(),
        symbol.to_string(),
        side,
        quantity,
        OrderType::Market,
    )
}

#[test]
fn test_create_portfolio_persists_and_reserves_margin() {
    let (service, _store) = service();
    let portfolio = service.create_portfolio("user-1", dec!(100000)).unwrap();

    let loaded = service.get_portfolio(&portfolio.id).unwrap();
    assert_eq!(loaded.cash, dec!(100000));
    assert_eq!(loaded.margin_available, dec!(50000));
    assert_eq!(loaded.margin_used, Decimal::ZERO);
    assert_eq!(loaded.total_value, dec!(100000));
}

#[test]
fn test_create_portfolio_rejects_non_positive_deposit() {
    let (service, _store) = service();
    assert!(service.create_portfolio("user-1", Decimal::ZERO).is_err());
    assert!(service.create_portfolio("user-1", dec!(-1)).is_err());
}

#[test]
fn test_buy_sell_lifecycle_is_persisted() {
    let (service, store) = service();
    let portfolio = service.create_portfolio("user-1", dec!(100000)).unwrap();

    // Buy 10 @ 150 and 10 @ 160, then close all 20 @ 155.
    let buy1 = order(&portfolio, "AAPL", Side::Buy, 10);
    let (trade1, position1) = service
        .execute_trade(&portfolio.id, buy1, dec!(150))
        .unwrap();
    let position1 = position1.unwrap();
    assert_eq!(trade1.position_id.as_deref(), Some(position1.id.as_str()));

    let reloaded = store.get_portfolio(&portfolio.id).unwrap();
    assert_eq!(reloaded.cash, dec!(98498.5));
    assert_eq!(reloaded.positions.len(), 1);

    let buy2 = order(&portfolio, "AAPL", Side::Buy, 10);
    let (_, position2) = service
        .execute_trade(&portfolio.id, buy2, dec!(160))
        .unwrap();
    let position2 = position2.unwrap();
    assert_eq!(position2.id, position1.id);
    assert_eq!(position2.quantity, 20);
    assert_eq!(position2.entry_price, dec!(155));

    let sell = order(&portfolio, "AAPL", Side::Sell, 20);
    let (closing, closed) = service
        .execute_trade(&portfolio.id, sell, dec!(155))
        .unwrap();
    assert!(closed.is_none());
    // The closing trade still references the deleted position.
    assert_eq!(closing.position_id.as_deref(), Some(position1.id.as_str()));

    let final_state = store.get_portfolio(&portfolio.id).unwrap();
    assert_eq!(final_state.cash, dec!(99993.8));
    assert!(final_state.positions.is_empty());
    assert!(store.find_position("user-1", "AAPL").unwrap().is_none());

    // Three ledger entries, newest first, all filled.
    let history = service.trade_history("user-1", None, 50, 0).unwrap();
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|t| t.status == TradeStatus::Filled));
}

#[test]
fn test_rejected_order_writes_nothing() {
    let (service, store) = service();
    let portfolio = service.create_portfolio("user-1", dec!(1000)).unwrap();

    let trade = order(&portfolio, "AAPL", Side::Buy, 1000);
    let err = service
        .execute_trade(&portfolio.id, trade, dec!(150))
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds { .. }));

    let reloaded = store.get_portfolio(&portfolio.id).unwrap();
    assert_eq!(reloaded.cash, dec!(1000));
    assert!(reloaded.positions.is_empty());
    assert!(service.trade_history("user-1", None, 50, 0).unwrap().is_empty());
}

#[test]
fn test_commit_failure_rolls_back_every_mutation() {
    let (service, store) = service();
    let portfolio = service.create_portfolio("user-1", dec!(100000)).unwrap();

    // Occupy the trade id ahead of execution. The ledger insert then hits a
    // primary-key conflict at commit time, after validation passed, so the
    // position upsert and portfolio update must roll back with it.
    let trade = order(&portfolio, "AAPL", Side::Buy, 10);
    let mut occupant = order(&portfolio, "AAPL", Side::Buy, 1);
    occupant.id = trade.id.clone();
    occupant.price = dec!(1);
    occupant.status = TradeStatus::Filled;
    store.insert_trade(&occupant).unwrap();

    let err = service
        .execute_trade(&portfolio.id, trade, dec!(150))
        .unwrap_err();
    assert!(matches!(err, LedgerError::Persistence(_)));

    let reloaded = store.get_portfolio(&portfolio.id).unwrap();
    assert_eq!(reloaded.cash, dec!(100000));
    assert!(reloaded.positions.is_empty());
}

#[test]
fn test_sequential_partial_sells_accumulate_realized_pnl() {
    let (service, store) = service();
    let portfolio = service.create_portfolio("user-1", dec!(10000)).unwrap();

    let buy = order(&portfolio, "AAPL", Side::Buy, 10);
    service.execute_trade(&portfolio.id, buy, dec!(100)).unwrap();

    let sell1 = order(&portfolio, "AAPL", Side::Sell, 3);
    let (t1, _) = service
        .execute_trade(&portfolio.id, sell1, dec!(110))
        .unwrap();
    assert_eq!(t1.realized_pnl, Some(dec!(30)));

    let sell2 = order(&portfolio, "AAPL", Side::Sell, 3);
    let (t2, p2) = service
        .execute_trade(&portfolio.id, sell2, dec!(90))
        .unwrap();
    assert_eq!(t2.realized_pnl, Some(dec!(-30)));
    assert_eq!(p2.unwrap().realized_pnl, Decimal::ZERO);

    let reloaded = store.get_portfolio(&portfolio.id).unwrap();
    assert_eq!(reloaded.realized_pnl, Decimal::ZERO);
    assert_eq!(reloaded.positions[0].quantity, 4);
    assert_eq!(reloaded.positions[0].entry_price, dec!(100));
}

#[test]
fn test_concurrent_orders_are_serialized_per_portfolio() {
    let (service, store) = service();
    let portfolio = service.create_portfolio("user-1", dec!(100000)).unwrap();

    // Ten threads each buy 1 AAPL @ 100 (fee 1.00 apiece). With stale reads
    // the final cash would be wrong; serialized execution debits all ten.
    let mut handles = Vec::new();
    for _ in 0..10 {
        let service = service.clone();
        let portfolio = portfolio.clone();
        handles.push(std::thread::spawn(move || {
            let trade = Trade::new(
                portfolio.id.clone(),
                portfolio.user_id.clone(),
                "AAPL".to_string(),
                Side::Buy,
                1,
                OrderType::Market,
            );
            service.execute_trade(&portfolio.id, trade, dec!(100)).unwrap();
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let reloaded = store.get_portfolio(&portfolio.id).unwrap();
    assert_eq!(reloaded.cash, dec!(100000) - dec!(10) * dec!(101));
    assert_eq!(reloaded.positions.len(), 1);
    assert_eq!(reloaded.positions[0].quantity, 10);
    assert_eq!(reloaded.positions[0].entry_price, dec!(100));

    let history = service.trade_history("user-1", None, 50, 0).unwrap();
    assert_eq!(history.len(), 10);
}

#[test]
fn test_adjust_cash_deposit_withdraw_and_overdraw() {
    let (service, _store) = service();
    let portfolio = service.create_portfolio("user-1", dec!(1000)).unwrap();

    let after_deposit = service.adjust_cash(&portfolio.id, dec!(500)).unwrap();
    assert_eq!(after_deposit.cash, dec!(1500));

    let after_withdraw = service.adjust_cash(&portfolio.id, dec!(-1500)).unwrap();
    assert_eq!(after_withdraw.cash, Decimal::ZERO);

    let err = service.adjust_cash(&portfolio.id, dec!(-0.01)).unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
}

#[test]
fn test_delete_portfolio_keeps_ledger() {
    let (service, store) = service();
    let portfolio = service.create_portfolio("user-1", dec!(10000)).unwrap();

    let buy = order(&portfolio, "AAPL", Side::Buy, 10);
    service.execute_trade(&portfolio.id, buy, dec!(100)).unwrap();

    service.delete_portfolio(&portfolio.id).unwrap();

    assert!(matches!(
        service.get_portfolio(&portfolio.id).unwrap_err(),
        LedgerError::PortfolioNotFound(_)
    ));
    assert!(store.find_position("user-1", "AAPL").unwrap().is_none());
    assert_eq!(service.trade_history("user-1", None, 50, 0).unwrap().len(), 1);
}

#[test]
fn test_refresh_market_data_persists_marks() {
    let (service, store) = service();
    let portfolio = service.create_portfolio("user-1", dec!(10000)).unwrap();
    let buy = order(&portfolio, "AAPL", Side::Buy, 10);
    service.execute_trade(&portfolio.id, buy, dec!(100)).unwrap();

    let prices = std::collections::HashMap::from([("AAPL".to_string(), dec!(120))]);
    let refreshed = service.refresh_market_data(&portfolio.id, &prices).unwrap();
    assert_eq!(refreshed.unrealized_pnl, dec!(200));

    let reloaded = store.get_portfolio(&portfolio.id).unwrap();
    assert_eq!(reloaded.unrealized_pnl, dec!(200));
    assert_eq!(reloaded.positions[0].current_price, dec!(120));
}
