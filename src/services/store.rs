//! Persistence Gateway
//!
//! SQLite-backed storage for portfolios, positions, and the trade ledger.
//! Every entity maps 1:1 to a row; portfolio reads transitively load their
//! positions. Two execution modes are exposed: standalone methods that
//! commit independently, and [`LedgerStore::with_transaction`], a
//! caller-scoped unit of work in which the `pub(crate)` row functions
//! participate all-or-nothing.
//!
//! Money columns are stored as TEXT and parsed into `Decimal` on read, so
//! no precision is lost through SQLite's float affinity.

use rusqlite::types::Type;
use rusqlite::{params, Connection, Row, Transaction};
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::error::{LedgerError, Result};
use crate::types::{
    OrderType, Portfolio, Position, PositionSide, Side, Trade, TradeStatus,
};

/// SQLite store for the portfolio ledger.
pub struct LedgerStore {
    conn: Mutex<Connection>,
}

impl LedgerStore {
    /// Open (or create) a ledger database at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        info!("Ledger store initialized");
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        debug!("In-memory ledger store initialized");
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS portfolios (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                cash TEXT NOT NULL,
                margin_used TEXT NOT NULL,
                margin_available TEXT NOT NULL,
                total_value TEXT NOT NULL,
                unrealized_pnl TEXT NOT NULL,
                realized_pnl TEXT NOT NULL,
                day_pnl TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_portfolios_user ON portfolios(user_id)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS positions (
                id TEXT PRIMARY KEY,
                portfolio_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                side TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                current_price TEXT NOT NULL,
                unrealized_pnl TEXT NOT NULL,
                realized_pnl TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(portfolio_id, symbol)
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_positions_portfolio ON positions(portfolio_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_positions_user_symbol ON positions(user_id, symbol)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS trades (
                id TEXT PRIMARY KEY,
                portfolio_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                position_id TEXT,
                symbol TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                price TEXT NOT NULL,
                side TEXT NOT NULL,
                order_type TEXT NOT NULL,
                status TEXT NOT NULL,
                fee TEXT NOT NULL,
                realized_pnl TEXT,
                executed_at INTEGER,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trades_user ON trades(user_id, created_at DESC)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trades_user_symbol ON trades(user_id, symbol)",
            [],
        )?;

        debug!("Ledger schema initialized");
        Ok(())
    }

    /// Run a caller-scoped unit of work. All row operations performed inside
    /// the closure commit together; any error rolls the whole unit back.
    pub fn with_transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    // ========== Portfolio Methods ==========

    /// Persist a new portfolio.
    pub fn create_portfolio(&self, portfolio: &Portfolio) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        insert_portfolio(&conn, portfolio)?;
        info!(
            "Created portfolio {} for user {}",
            portfolio.id, portfolio.user_id
        );
        Ok(())
    }

    /// Load a portfolio by ID, including its positions.
    pub fn get_portfolio(&self, id: &str) -> Result<Portfolio> {
        let conn = self.conn.lock().unwrap();
        let mut portfolio = select_portfolio(&conn, id)?
            .ok_or_else(|| LedgerError::PortfolioNotFound(id.to_string()))?;
        portfolio.positions = select_positions_by_portfolio(&conn, id)?;
        Ok(portfolio)
    }

    /// Load all portfolios for a user, each with its positions.
    pub fn get_user_portfolios(&self, user_id: &str) -> Result<Vec<Portfolio>> {
        let conn = self.conn.lock().unwrap();
        let mut portfolios = {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, cash, margin_used, margin_available, total_value,
                        unrealized_pnl, realized_pnl, day_pnl, created_at, updated_at
                 FROM portfolios WHERE user_id = ?1 ORDER BY created_at DESC",
            )?;
            let rows = stmt.query_map(params![user_id], portfolio_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        for portfolio in &mut portfolios {
            portfolio.positions = select_positions_by_portfolio(&conn, &portfolio.id)?;
        }
        Ok(portfolios)
    }

    /// Update a portfolio's scalar fields (positions are managed separately).
    pub fn update_portfolio(&self, portfolio: &Portfolio) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        update_portfolio(&conn, portfolio)
    }

    /// Delete a portfolio and cascade-delete its positions. Trades are the
    /// immutable audit trail and are kept.
    pub fn delete_portfolio(&self, id: &str) -> Result<()> {
        let deleted = self.with_transaction(|tx| {
            tx.execute("DELETE FROM positions WHERE portfolio_id = ?1", params![id])?;
            let deleted = tx.execute("DELETE FROM portfolios WHERE id = ?1", params![id])?;
            Ok(deleted)
        })?;
        if deleted == 0 {
            return Err(LedgerError::PortfolioNotFound(id.to_string()));
        }
        info!("Deleted portfolio {}", id);
        Ok(())
    }

    // ========== Position Methods ==========

    /// Persist a new position.
    pub fn create_position(&self, position: &Position) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        upsert_position(&conn, position)?;
        debug!(
            "Created position {} ({} x{})",
            position.id, position.symbol, position.quantity
        );
        Ok(())
    }

    /// Load a position by ID.
    pub fn get_position(&self, id: &str) -> Result<Position> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            &format!("{POSITION_SELECT} WHERE id = ?1"),
            params![id],
            position_from_row,
        );
        match result {
            Ok(position) => Ok(position),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                Err(LedgerError::PositionNotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// All positions for a portfolio.
    pub fn get_portfolio_positions(&self, portfolio_id: &str) -> Result<Vec<Position>> {
        let conn = self.conn.lock().unwrap();
        select_positions_by_portfolio(&conn, portfolio_id)
    }

    /// Position for a (user, symbol) pair. Absence is a valid business
    /// outcome (no open position), so this returns `None` rather than an
    /// error.
    pub fn find_position(&self, user_id: &str, symbol: &str) -> Result<Option<Position>> {
        let conn = self.conn.lock().unwrap();
        select_position_by_user_symbol(&conn, user_id, symbol)
    }

    /// Update an existing position.
    pub fn update_position(&self, position: &Position) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        upsert_position(&conn, position)
    }

    /// Delete a position (full close).
    pub fn delete_position(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        delete_position(&conn, id)
    }

    /// Distinct symbols across all open positions (used to scope market
    /// data polling).
    pub fn open_symbols(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT DISTINCT symbol FROM positions")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<String>>>()?)
    }

    // ========== Trade Methods ==========

    /// Append a trade to the ledger. Trades are never updated or deleted.
    pub fn insert_trade(&self, trade: &Trade) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        insert_trade(&conn, trade)?;
        debug!(
            "Recorded trade {} ({} {} x{} @ {})",
            trade.id, trade.side, trade.symbol, trade.quantity, trade.price
        );
        Ok(())
    }

    /// Load a trade by ID.
    pub fn get_trade(&self, id: &str) -> Result<Trade> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            &format!("{TRADE_SELECT} WHERE id = ?1"),
            params![id],
            trade_from_row,
        );
        match result {
            Ok(trade) => Ok(trade),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                Err(LedgerError::TradeNotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Trade history for a user, newest first, optionally filtered by
    /// symbol, with limit/offset pagination.
    pub fn get_trades(
        &self,
        user_id: &str,
        symbol: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Trade>> {
        let conn = self.conn.lock().unwrap();
        let (limit, offset) = (limit as i64, offset as i64);
        let trades = match symbol {
            Some(symbol) => {
                let mut stmt = conn.prepare(&format!(
                    "{TRADE_SELECT} WHERE user_id = ?1 AND symbol = ?2
                     ORDER BY created_at DESC LIMIT ?3 OFFSET ?4"
                ))?;
                let rows =
                    stmt.query_map(params![user_id, symbol, limit, offset], trade_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "{TRADE_SELECT} WHERE user_id = ?1
                     ORDER BY created_at DESC LIMIT ?2 OFFSET ?3"
                ))?;
                let rows = stmt.query_map(params![user_id, limit, offset], trade_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(trades)
    }
}

// =============================================================================
// Row operations
//
// These take a `&Connection` (a `Transaction` derefs to one), so the same
// code serves both standalone and transactional execution.
// =============================================================================

const PORTFOLIO_SELECT: &str = "SELECT id, user_id, cash, margin_used, margin_available, \
     total_value, unrealized_pnl, realized_pnl, day_pnl, created_at, updated_at FROM portfolios";

const POSITION_SELECT: &str = "SELECT id, portfolio_id, user_id, symbol, quantity, side, \
     entry_price, current_price, unrealized_pnl, realized_pnl, created_at, updated_at FROM positions";

const TRADE_SELECT: &str = "SELECT id, portfolio_id, user_id, position_id, symbol, quantity, \
     price, side, order_type, status, fee, realized_pnl, executed_at, created_at FROM trades";

pub(crate) fn insert_portfolio(conn: &Connection, portfolio: &Portfolio) -> Result<()> {
    conn.execute(
        "INSERT INTO portfolios (id, user_id, cash, margin_used, margin_available,
                                 total_value, unrealized_pnl, realized_pnl, day_pnl,
                                 created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            portfolio.id,
            portfolio.user_id,
            portfolio.cash.to_string(),
            portfolio.margin_used.to_string(),
            portfolio.margin_available.to_string(),
            portfolio.total_value.to_string(),
            portfolio.unrealized_pnl.to_string(),
            portfolio.realized_pnl.to_string(),
            portfolio.day_pnl.to_string(),
            portfolio.created_at,
            portfolio.updated_at,
        ],
    )?;
    Ok(())
}

pub(crate) fn select_portfolio(conn: &Connection, id: &str) -> Result<Option<Portfolio>> {
    let result = conn.query_row(
        &format!("{PORTFOLIO_SELECT} WHERE id = ?1"),
        params![id],
        portfolio_from_row,
    );
    match result {
        Ok(portfolio) => Ok(Some(portfolio)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn update_portfolio(conn: &Connection, portfolio: &Portfolio) -> Result<()> {
    let updated = conn.execute(
        "UPDATE portfolios
         SET cash = ?2, margin_used = ?3, margin_available = ?4, total_value = ?5,
             unrealized_pnl = ?6, realized_pnl = ?7, day_pnl = ?8, updated_at = ?9
         WHERE id = ?1",
        params![
            portfolio.id,
            portfolio.cash.to_string(),
            portfolio.margin_used.to_string(),
            portfolio.margin_available.to_string(),
            portfolio.total_value.to_string(),
            portfolio.unrealized_pnl.to_string(),
            portfolio.realized_pnl.to_string(),
            portfolio.day_pnl.to_string(),
            portfolio.updated_at,
        ],
    )?;
    if updated == 0 {
        return Err(LedgerError::PortfolioNotFound(portfolio.id.clone()));
    }
    Ok(())
}

/// Insert a position, or replace every mutable field if the row exists.
pub(crate) fn upsert_position(conn: &Connection, position: &Position) -> Result<()> {
    conn.execute(
        "INSERT INTO positions (id, portfolio_id, user_id, symbol, quantity, side,
                                entry_price, current_price, unrealized_pnl, realized_pnl,
                                created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT(id) DO UPDATE SET
             quantity = excluded.quantity,
             entry_price = excluded.entry_price,
             current_price = excluded.current_price,
             unrealized_pnl = excluded.unrealized_pnl,
             realized_pnl = excluded.realized_pnl,
             updated_at = excluded.updated_at",
        params![
            position.id,
            position.portfolio_id,
            position.user_id,
            position.symbol,
            position.quantity,
            position.side.as_str(),
            position.entry_price.to_string(),
            position.current_price.to_string(),
            position.unrealized_pnl.to_string(),
            position.realized_pnl.to_string(),
            position.created_at,
            position.updated_at,
        ],
    )?;
    Ok(())
}

pub(crate) fn select_positions_by_portfolio(
    conn: &Connection,
    portfolio_id: &str,
) -> Result<Vec<Position>> {
    let mut stmt = conn.prepare(&format!(
        "{POSITION_SELECT} WHERE portfolio_id = ?1 ORDER BY created_at DESC"
    ))?;
    let rows = stmt.query_map(params![portfolio_id], position_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub(crate) fn select_position_by_user_symbol(
    conn: &Connection,
    user_id: &str,
    symbol: &str,
) -> Result<Option<Position>> {
    let result = conn.query_row(
        &format!("{POSITION_SELECT} WHERE user_id = ?1 AND symbol = ?2"),
        params![user_id, symbol],
        position_from_row,
    );
    match result {
        Ok(position) => Ok(Some(position)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn delete_position(conn: &Connection, id: &str) -> Result<()> {
    let deleted = conn.execute("DELETE FROM positions WHERE id = ?1", params![id])?;
    if deleted == 0 {
        return Err(LedgerError::PositionNotFound(id.to_string()));
    }
    Ok(())
}

pub(crate) fn insert_trade(conn: &Connection, trade: &Trade) -> Result<()> {
    conn.execute(
        "INSERT INTO trades (id, portfolio_id, user_id, position_id, symbol, quantity,
                             price, side, order_type, status, fee, realized_pnl,
                             executed_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            trade.id,
            trade.portfolio_id,
            trade.user_id,
            trade.position_id,
            trade.symbol,
            trade.quantity,
            trade.price.to_string(),
            trade.side.as_str(),
            trade.order_type.as_str(),
            trade.status.as_str(),
            trade.fee.to_string(),
            trade.realized_pnl.map(|d| d.to_string()),
            trade.executed_at,
            trade.created_at,
        ],
    )?;
    Ok(())
}

// ========== Row mapping ==========

fn decimal_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e: rust_decimal::Error| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
        })
}

fn optional_decimal_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let text: Option<String> = row.get(idx)?;
    match text {
        Some(text) => text
            .parse()
            .map(Some)
            .map_err(|e: rust_decimal::Error| {
                rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
            }),
        None => Ok(None),
    }
}

fn conversion_failure(idx: usize, what: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        format!("unknown {what}: {value}").into(),
    )
}

fn portfolio_from_row(row: &Row<'_>) -> rusqlite::Result<Portfolio> {
    Ok(Portfolio {
        id: row.get(0)?,
        user_id: row.get(1)?,
        cash: decimal_column(row, 2)?,
        margin_used: decimal_column(row, 3)?,
        margin_available: decimal_column(row, 4)?,
        total_value: decimal_column(row, 5)?,
        unrealized_pnl: decimal_column(row, 6)?,
        realized_pnl: decimal_column(row, 7)?,
        day_pnl: decimal_column(row, 8)?,
        positions: Vec::new(),
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn position_from_row(row: &Row<'_>) -> rusqlite::Result<Position> {
    let side: String = row.get(5)?;
    if side != PositionSide::Long.as_str() {
        return Err(conversion_failure(5, "position side", &side));
    }
    Ok(Position {
        id: row.get(0)?,
        portfolio_id: row.get(1)?,
        user_id: row.get(2)?,
        symbol: row.get(3)?,
        quantity: row.get(4)?,
        side: PositionSide::Long,
        entry_price: decimal_column(row, 6)?,
        current_price: decimal_column(row, 7)?,
        unrealized_pnl: decimal_column(row, 8)?,
        realized_pnl: decimal_column(row, 9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn trade_from_row(row: &Row<'_>) -> rusqlite::Result<Trade> {
    let side: String = row.get(7)?;
    let side = Side::parse(&side).map_err(|_| conversion_failure(7, "trade side", &side))?;
    let order_type: String = row.get(8)?;
    let order_type = OrderType::parse(&order_type)
        .ok_or_else(|| conversion_failure(8, "order type", &order_type))?;
    let status: String = row.get(9)?;
    let status = TradeStatus::parse(&status)
        .ok_or_else(|| conversion_failure(9, "trade status", &status))?;

    Ok(Trade {
        id: row.get(0)?,
        portfolio_id: row.get(1)?,
        user_id: row.get(2)?,
        position_id: row.get(3)?,
        symbol: row.get(4)?,
        quantity: row.get(5)?,
        price: decimal_column(row, 6)?,
        side,
        order_type,
        status,
        fee: decimal_column(row, 10)?,
        realized_pnl: optional_decimal_column(row, 11)?,
        executed_at: row.get(12)?,
        created_at: row.get(13)?,
    })
}
