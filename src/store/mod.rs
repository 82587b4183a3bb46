//! Position Store (PS) and Order Log (OL): SQLite persistence for councils,
//! wallets, futures positions, spot holdings, orders, and PnL snapshots.
//!
//! Follows the teacher's own database-wrapper shape: one `Store` struct
//! owning a single connection behind `Arc<tokio::sync::Mutex<Connection>>`,
//! schema created with `CREATE TABLE IF NOT EXISTS` on startup, WAL mode for
//! concurrent readers alongside the writer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::Mutex;

use crate::domain::{
    Council, FuturesPosition, HoldingStatus, MarginType, Order, Platform, PnLSnapshot, PositionSide,
    PositionStatus, SpotHolding, TradingMode, TradingType, Wallet,
};
use crate::money::Money;

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(database_path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(database_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Self { conn: Arc::new(Mutex::new(conn)) };
        Ok(store)
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Seeds a new council with its starting capital as both total account
    /// value and available balance; every other aggregate starts at zero.
    pub async fn insert_council(
        &self,
        trading_mode: TradingMode,
        trading_type: TradingType,
        initial_capital: Money,
    ) -> anyhow::Result<i64> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO councils (trading_mode, trading_type, initial_capital, total_account_value, available_balance)
             VALUES (?1, ?2, ?3, ?3, ?3)",
            params![trading_mode.as_str(), trading_type.as_str(), initial_capital.to_string()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub async fn find_council(&self, council_id: i64) -> anyhow::Result<Option<Council>> {
        let conn = self.conn.lock().await;
        let council = conn
            .query_row("SELECT * FROM councils WHERE id = ?1", params![council_id], row_to_council)
            .optional()?;
        Ok(council)
    }

    pub async fn save_council(&self, council: &Council) -> anyhow::Result<()> {
        let conn = self.conn.lock().await;
        exec_save_council(&conn, council)?;
        Ok(())
    }

    pub async fn find_wallet(&self, wallet_id: i64) -> anyhow::Result<Option<Wallet>> {
        let conn = self.conn.lock().await;
        let wallet = conn
            .query_row("SELECT * FROM wallets WHERE id = ?1", params![wallet_id], row_to_wallet)
            .optional()?;
        Ok(wallet)
    }

    pub async fn find_by_id(&self, position_id: i64) -> anyhow::Result<Option<FuturesPosition>> {
        let conn = self.conn.lock().await;
        let position = conn
            .query_row("SELECT * FROM futures_positions WHERE id = ?1", params![position_id], row_to_position)
            .optional()?;
        Ok(position)
    }

    /// Most recent row for `(council, symbol, side)` in the given `status`,
    /// unlike `find_open_position` this isn't restricted to OPEN rows.
    pub async fn find_by_symbol_and_side(
        &self,
        council_id: i64,
        symbol: &str,
        position_side: PositionSide,
        status: PositionStatus,
    ) -> anyhow::Result<Option<FuturesPosition>> {
        let conn = self.conn.lock().await;
        let position = conn
            .query_row(
                "SELECT * FROM futures_positions
                 WHERE council_id = ?1 AND symbol = ?2 AND position_side = ?3 AND status = ?4
                 ORDER BY opened_at DESC",
                params![council_id, symbol, position_side.as_str(), status.as_str()],
                row_to_position,
            )
            .optional()?;
        Ok(position)
    }

    /// The one open position for `(council, symbol, side, platform)`, if any.
    /// The partial unique index below enforces there is never more than one.
    pub async fn find_open_position(
        &self,
        council_id: i64,
        symbol: &str,
        position_side: PositionSide,
        platform: Platform,
    ) -> anyhow::Result<Option<FuturesPosition>> {
        let conn = self.conn.lock().await;
        let position = conn
            .query_row(
                "SELECT * FROM futures_positions
                 WHERE council_id = ?1 AND symbol = ?2 AND position_side = ?3
                   AND platform = ?4 AND status = 'OPEN'",
                params![council_id, symbol, position_side.as_str(), platform.as_str()],
                row_to_position,
            )
            .optional()?;
        Ok(position)
    }

    pub async fn find_open_positions(&self, council_id: i64) -> anyhow::Result<Vec<FuturesPosition>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM futures_positions WHERE council_id = ?1 AND status = 'OPEN' ORDER BY opened_at",
        )?;
        let rows = stmt.query_map(params![council_id], row_to_position)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Every futures position ever opened for this council, any status —
    /// used by the Metrics Aggregator to recompute council-level aggregates.
    pub async fn find_all_positions(&self, council_id: i64) -> anyhow::Result<Vec<FuturesPosition>> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT * FROM futures_positions WHERE council_id = ?1 ORDER BY opened_at")?;
        let rows = stmt.query_map(params![council_id], row_to_position)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub async fn count_active_holdings(&self, council_id: i64) -> anyhow::Result<i64> {
        let conn = self.conn.lock().await;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM spot_holdings WHERE council_id = ?1 AND status = 'ACTIVE'",
            params![council_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub async fn find_closed_positions(&self, council_id: i64, limit: i64) -> anyhow::Result<Vec<FuturesPosition>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM futures_positions
             WHERE council_id = ?1 AND status != 'OPEN'
             ORDER BY closed_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![council_id, limit], row_to_position)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Insert a new OPEN position. Fails (unique constraint violation
    /// surfaced by the caller as an anyhow error) if one already exists for
    /// this (council, symbol, side, platform) — the open-then-close policy's
    /// last line of defense below the application-level check.
    pub async fn insert_position(&self, position: &FuturesPosition) -> anyhow::Result<i64> {
        let conn = self.conn.lock().await;
        Ok(exec_insert_position(&conn, position)?)
    }

    /// Persists a freshly-opened position, its entry order, and the
    /// council's updated `last_executed_at` stamp in a single transaction —
    /// a crash partway through can't leave the trade half-recorded. Returns
    /// `(position_id, order_id)`; `order.futures_position_id` is overwritten
    /// with the position id assigned by this insert.
    pub async fn record_new_trade(
        &self,
        position: &FuturesPosition,
        mut order: Order,
        council: &Council,
    ) -> anyhow::Result<(i64, i64)> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let position_id = exec_insert_position(&tx, position)?;
        order.futures_position_id = Some(position_id);
        let order_id = exec_insert_order(&tx, &order)?;
        exec_save_council(&tx, council)?;
        tx.commit()?;
        Ok((position_id, order_id))
    }

    pub async fn update_position(&self, position: &FuturesPosition) -> anyhow::Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE futures_positions SET
                mark_price = ?2, notional = ?3, liquidation_price = ?4, isolated_margin = ?5,
                unrealized_profit = ?6, realized_pnl = ?7, fees_paid = ?8, funding_fees = ?9,
                max_notional = ?10, status = ?11, closed_at = ?12, stop_loss_price = ?13,
                stop_loss_order_id = ?14, take_profit_short = ?15, take_profit_short_order_id = ?16,
                take_profit_mid = ?17, take_profit_mid_order_id = ?18, take_profit_long = ?19,
                take_profit_long_order_id = ?20
             WHERE id = ?1",
            params![
                position.id,
                position.mark_price.to_string(),
                position.notional.to_string(),
                position.liquidation_price.map(|v| v.to_string()),
                position.isolated_margin.map(|v| v.to_string()),
                position.unrealized_profit.to_string(),
                position.realized_pnl.map(|v| v.to_string()),
                position.fees_paid.to_string(),
                position.funding_fees.to_string(),
                position.max_notional.to_string(),
                position.status.as_str(),
                position.closed_at.map(|t| t.to_rfc3339()),
                position.stop_loss_price.map(|v| v.to_string()),
                position.stop_loss_order_id,
                position.take_profit_short.map(|v| v.to_string()),
                position.take_profit_short_order_id,
                position.take_profit_mid.map(|v| v.to_string()),
                position.take_profit_mid_order_id,
                position.take_profit_long.map(|v| v.to_string()),
                position.take_profit_long_order_id,
            ],
        )?;
        Ok(())
    }

    pub async fn find_holding(
        &self,
        council_id: i64,
        symbol: &str,
        platform: Platform,
        trading_mode: TradingMode,
    ) -> anyhow::Result<Option<SpotHolding>> {
        let conn = self.conn.lock().await;
        let holding = conn
            .query_row(
                "SELECT * FROM spot_holdings
                 WHERE council_id = ?1 AND symbol = ?2 AND platform = ?3 AND trading_mode = ?4",
                params![council_id, symbol, platform.as_str(), trading_mode.as_str()],
                row_to_holding,
            )
            .optional()?;
        Ok(holding)
    }

    pub async fn upsert_holding(&self, holding: &SpotHolding) -> anyhow::Result<i64> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO spot_holdings (
                id, council_id, symbol, base_asset, quote_asset, free, locked, total,
                average_cost, total_cost, current_price, current_value, unrealized_pnl,
                platform, trading_mode, status, first_acquired_at, last_updated_at, closed_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
             ON CONFLICT(id) DO UPDATE SET
                free = excluded.free, locked = excluded.locked, total = excluded.total,
                average_cost = excluded.average_cost, total_cost = excluded.total_cost,
                current_price = excluded.current_price, current_value = excluded.current_value,
                unrealized_pnl = excluded.unrealized_pnl, status = excluded.status,
                last_updated_at = excluded.last_updated_at, closed_at = excluded.closed_at",
            params![
                if holding.id == 0 { None } else { Some(holding.id) },
                holding.council_id,
                holding.symbol,
                holding.base_asset,
                holding.quote_asset,
                holding.free.to_string(),
                holding.locked.to_string(),
                holding.total.to_string(),
                holding.average_cost.to_string(),
                holding.total_cost.to_string(),
                holding.current_price.to_string(),
                holding.current_value.to_string(),
                holding.unrealized_pnl.to_string(),
                holding.platform.as_str(),
                holding.trading_mode.as_str(),
                holding.status.as_str(),
                holding.first_acquired_at.to_rfc3339(),
                holding.last_updated_at.to_rfc3339(),
                holding.closed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub async fn insert_order(&self, order: &Order) -> anyhow::Result<i64> {
        let conn = self.conn.lock().await;
        Ok(exec_insert_order(&conn, order)?)
    }

    pub async fn insert_snapshot(&self, snapshot: &PnLSnapshot) -> anyhow::Result<i64> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO pnl_snapshots (
                council_id, futures_position_id, spot_holding_id, snapshot_time, mark_price,
                notional_value, unrealized_pnl, pnl_percentage, liquidation_distance_pct, margin_ratio
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                snapshot.council_id,
                snapshot.futures_position_id,
                snapshot.spot_holding_id,
                snapshot.snapshot_time.to_rfc3339(),
                snapshot.mark_price.to_string(),
                snapshot.notional_value.to_string(),
                snapshot.unrealized_pnl.to_string(),
                snapshot.pnl_percentage.to_string(),
                snapshot.liquidation_distance_pct.map(|v| v.to_string()),
                snapshot.margin_ratio.map(|v| v.to_string()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

/// Statement-level helpers shared between the plain-connection methods above
/// and `record_new_trade`'s transaction. Taking `&Connection` lets either a
/// locked `Connection` or a `Transaction` (which derefs to one) call them.
fn exec_insert_position(conn: &Connection, position: &FuturesPosition) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO futures_positions (
            council_id, symbol, position_side, position_amt, entry_price, mark_price,
            leverage, margin_type, notional, liquidation_price, isolated_margin,
            unrealized_profit, realized_pnl, fees_paid, funding_fees, max_notional,
            platform, trading_mode, status, opened_at, closed_at, confidence,
            agent_reasoning, external_position_id, stop_loss_price, stop_loss_order_id,
            take_profit_short, take_profit_short_order_id, take_profit_mid,
            take_profit_mid_order_id, take_profit_long, take_profit_long_order_id
         ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18,
            ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30, ?31, ?32
         )",
        params![
            position.council_id,
            position.symbol,
            position.position_side.as_str(),
            position.position_amt.to_string(),
            position.entry_price.to_string(),
            position.mark_price.to_string(),
            position.leverage,
            position.margin_type.as_str(),
            position.notional.to_string(),
            position.liquidation_price.map(|v| v.to_string()),
            position.isolated_margin.map(|v| v.to_string()),
            position.unrealized_profit.to_string(),
            position.realized_pnl.map(|v| v.to_string()),
            position.fees_paid.to_string(),
            position.funding_fees.to_string(),
            position.max_notional.to_string(),
            position.platform.as_str(),
            position.trading_mode.as_str(),
            position.status.as_str(),
            position.opened_at.to_rfc3339(),
            position.closed_at.map(|t| t.to_rfc3339()),
            position.confidence.map(|v| v.to_string()),
            position.agent_reasoning,
            position.external_position_id,
            position.stop_loss_price.map(|v| v.to_string()),
            position.stop_loss_order_id,
            position.take_profit_short.map(|v| v.to_string()),
            position.take_profit_short_order_id,
            position.take_profit_mid.map(|v| v.to_string()),
            position.take_profit_mid_order_id,
            position.take_profit_long.map(|v| v.to_string()),
            position.take_profit_long_order_id,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn exec_insert_order(conn: &Connection, order: &Order) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO orders (
            council_id, futures_position_id, spot_holding_id, symbol, client_order_id,
            exchange_order_id, side, order_type, position_side, orig_qty, executed_qty,
            price, stop_price, avg_price, time_in_force, reduce_only, close_position,
            status, platform, trading_mode, trading_type, commission, commission_asset,
            confidence, transaction_time, update_time
         ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18,
            ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26
         )",
        params![
            order.council_id,
            order.futures_position_id,
            order.spot_holding_id,
            order.symbol,
            order.client_order_id,
            order.exchange_order_id,
            order.side.as_str(),
            order.order_type.as_str(),
            order.position_side.map(|s| s.as_str()),
            order.orig_qty.to_string(),
            order.executed_qty.to_string(),
            order.price.map(|v| v.to_string()),
            order.stop_price.map(|v| v.to_string()),
            order.avg_price.map(|v| v.to_string()),
            order.time_in_force.map(|t| t.as_str()),
            order.reduce_only,
            order.close_position,
            order.status.as_str(),
            order.platform.as_str(),
            order.trading_mode.as_str(),
            order.trading_type.as_str(),
            order.commission.map(|v| v.to_string()),
            order.commission_asset,
            order.confidence.map(|v| v.to_string()),
            order.transaction_time.to_rfc3339(),
            order.update_time.to_rfc3339(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn exec_save_council(conn: &Connection, council: &Council) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE councils SET
            total_account_value = ?2, available_balance = ?3, used_balance = ?4,
            total_margin_used = ?5, total_unrealized_profit = ?6, total_realized_pnl = ?7,
            net_pnl = ?8, total_fees = ?9, total_funding_fees = ?10,
            open_futures_count = ?11, closed_futures_count = ?12, active_spot_holdings = ?13,
            average_leverage = ?14, average_confidence = ?15, biggest_win = ?16,
            biggest_loss = ?17, long_hold_pct = ?18, short_hold_pct = ?19, flat_hold_pct = ?20,
            last_executed_at = ?21
         WHERE id = ?1",
        params![
            council.id,
            council.total_account_value.to_string(),
            council.available_balance.to_string(),
            council.used_balance.to_string(),
            council.total_margin_used.to_string(),
            council.total_unrealized_profit.to_string(),
            council.total_realized_pnl.to_string(),
            council.net_pnl.to_string(),
            council.total_fees.to_string(),
            council.total_funding_fees.to_string(),
            council.open_futures_count,
            council.closed_futures_count,
            council.active_spot_holdings,
            council.average_leverage.to_string(),
            council.average_confidence.to_string(),
            council.biggest_win.to_string(),
            council.biggest_loss.to_string(),
            council.long_hold_pct.to_string(),
            council.short_hold_pct.to_string(),
            council.flat_hold_pct.to_string(),
            council.last_executed_at.map(|t| t.to_rfc3339()),
        ],
    )?;
    Ok(())
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS councils (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    trading_mode TEXT NOT NULL,
    trading_type TEXT NOT NULL,
    initial_capital TEXT NOT NULL,
    total_account_value TEXT NOT NULL,
    available_balance TEXT NOT NULL,
    used_balance TEXT NOT NULL DEFAULT '0',
    total_margin_used TEXT NOT NULL DEFAULT '0',
    total_unrealized_profit TEXT NOT NULL DEFAULT '0',
    total_realized_pnl TEXT NOT NULL DEFAULT '0',
    net_pnl TEXT NOT NULL DEFAULT '0',
    total_fees TEXT NOT NULL DEFAULT '0',
    total_funding_fees TEXT NOT NULL DEFAULT '0',
    open_futures_count INTEGER NOT NULL DEFAULT 0,
    closed_futures_count INTEGER NOT NULL DEFAULT 0,
    active_spot_holdings INTEGER NOT NULL DEFAULT 0,
    average_leverage TEXT NOT NULL DEFAULT '0',
    average_confidence TEXT NOT NULL DEFAULT '0',
    biggest_win TEXT NOT NULL DEFAULT '0',
    biggest_loss TEXT NOT NULL DEFAULT '0',
    long_hold_pct TEXT NOT NULL DEFAULT '0',
    short_hold_pct TEXT NOT NULL DEFAULT '0',
    flat_hold_pct TEXT NOT NULL DEFAULT '100',
    wallet_id INTEGER REFERENCES wallets(id),
    last_executed_at TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS wallets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    exchange TEXT NOT NULL,
    api_key TEXT NOT NULL,
    secret_key TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS futures_positions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    council_id INTEGER NOT NULL REFERENCES councils(id),
    symbol TEXT NOT NULL,
    position_side TEXT NOT NULL,
    position_amt TEXT NOT NULL,
    entry_price TEXT NOT NULL,
    mark_price TEXT NOT NULL,
    leverage INTEGER NOT NULL,
    margin_type TEXT NOT NULL,
    notional TEXT NOT NULL,
    liquidation_price TEXT,
    isolated_margin TEXT,
    unrealized_profit TEXT NOT NULL DEFAULT '0',
    realized_pnl TEXT,
    fees_paid TEXT NOT NULL DEFAULT '0',
    funding_fees TEXT NOT NULL DEFAULT '0',
    max_notional TEXT NOT NULL DEFAULT '0',
    platform TEXT NOT NULL,
    trading_mode TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'OPEN',
    opened_at TEXT NOT NULL,
    closed_at TEXT,
    confidence TEXT,
    agent_reasoning TEXT,
    external_position_id TEXT,
    stop_loss_price TEXT,
    stop_loss_order_id TEXT,
    take_profit_short TEXT,
    take_profit_short_order_id TEXT,
    take_profit_mid TEXT,
    take_profit_mid_order_id TEXT,
    take_profit_long TEXT,
    take_profit_long_order_id TEXT
);

-- Open-then-close policy, enforced at the store level: at most one OPEN
-- position per (council, symbol, side, platform).
CREATE UNIQUE INDEX IF NOT EXISTS idx_futures_positions_open_unique
    ON futures_positions (council_id, symbol, position_side, platform)
    WHERE status = 'OPEN';

CREATE TABLE IF NOT EXISTS spot_holdings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    council_id INTEGER NOT NULL REFERENCES councils(id),
    symbol TEXT NOT NULL,
    base_asset TEXT NOT NULL,
    quote_asset TEXT NOT NULL,
    free TEXT NOT NULL,
    locked TEXT NOT NULL DEFAULT '0',
    total TEXT NOT NULL,
    average_cost TEXT NOT NULL,
    total_cost TEXT NOT NULL,
    current_price TEXT NOT NULL,
    current_value TEXT NOT NULL,
    unrealized_pnl TEXT NOT NULL DEFAULT '0',
    platform TEXT NOT NULL,
    trading_mode TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'ACTIVE',
    first_acquired_at TEXT NOT NULL,
    last_updated_at TEXT NOT NULL,
    closed_at TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_spot_holdings_unique
    ON spot_holdings (council_id, symbol, platform, trading_mode);

CREATE TABLE IF NOT EXISTS orders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    council_id INTEGER NOT NULL REFERENCES councils(id),
    futures_position_id INTEGER REFERENCES futures_positions(id),
    spot_holding_id INTEGER REFERENCES spot_holdings(id),
    symbol TEXT NOT NULL,
    client_order_id TEXT NOT NULL,
    exchange_order_id TEXT NOT NULL,
    side TEXT NOT NULL,
    order_type TEXT NOT NULL,
    position_side TEXT,
    orig_qty TEXT NOT NULL,
    executed_qty TEXT NOT NULL DEFAULT '0',
    price TEXT,
    stop_price TEXT,
    avg_price TEXT,
    time_in_force TEXT,
    reduce_only INTEGER NOT NULL DEFAULT 0,
    close_position INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    platform TEXT NOT NULL,
    trading_mode TEXT NOT NULL,
    trading_type TEXT NOT NULL,
    commission TEXT,
    commission_asset TEXT,
    confidence TEXT,
    transaction_time TEXT NOT NULL,
    update_time TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pnl_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    council_id INTEGER NOT NULL REFERENCES councils(id),
    futures_position_id INTEGER REFERENCES futures_positions(id),
    spot_holding_id INTEGER REFERENCES spot_holdings(id),
    snapshot_time TEXT NOT NULL,
    mark_price TEXT NOT NULL,
    notional_value TEXT NOT NULL,
    unrealized_pnl TEXT NOT NULL,
    pnl_percentage TEXT NOT NULL,
    liquidation_distance_pct TEXT,
    margin_ratio TEXT
);
"#;

fn parse_decimal(s: String) -> rusqlite::Result<Money> {
    s.parse().map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

fn parse_decimal_opt(s: Option<String>) -> rusqlite::Result<Option<Money>> {
    s.map(parse_decimal).transpose()
}

fn parse_datetime(s: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

fn parse_datetime_opt(s: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    s.map(parse_datetime).transpose()
}

fn row_to_council(row: &Row) -> rusqlite::Result<Council> {
    Ok(Council {
        id: row.get("id")?,
        trading_mode: parse_trading_mode(row.get::<_, String>("trading_mode")?),
        trading_type: parse_trading_type(row.get::<_, String>("trading_type")?),
        initial_capital: parse_decimal(row.get("initial_capital")?)?,
        total_account_value: parse_decimal(row.get("total_account_value")?)?,
        available_balance: parse_decimal(row.get("available_balance")?)?,
        used_balance: parse_decimal(row.get("used_balance")?)?,
        total_margin_used: parse_decimal(row.get("total_margin_used")?)?,
        total_unrealized_profit: parse_decimal(row.get("total_unrealized_profit")?)?,
        total_realized_pnl: parse_decimal(row.get("total_realized_pnl")?)?,
        net_pnl: parse_decimal(row.get("net_pnl")?)?,
        total_fees: parse_decimal(row.get("total_fees")?)?,
        total_funding_fees: parse_decimal(row.get("total_funding_fees")?)?,
        open_futures_count: row.get("open_futures_count")?,
        closed_futures_count: row.get("closed_futures_count")?,
        active_spot_holdings: row.get("active_spot_holdings")?,
        average_leverage: parse_decimal(row.get("average_leverage")?)?,
        average_confidence: parse_decimal(row.get("average_confidence")?)?,
        biggest_win: parse_decimal(row.get("biggest_win")?)?,
        biggest_loss: parse_decimal(row.get("biggest_loss")?)?,
        long_hold_pct: parse_decimal(row.get("long_hold_pct")?)?,
        short_hold_pct: parse_decimal(row.get("short_hold_pct")?)?,
        flat_hold_pct: parse_decimal(row.get("flat_hold_pct")?)?,
        wallet_id: row.get("wallet_id")?,
        last_executed_at: parse_datetime_opt(row.get("last_executed_at")?)?,
        created_at: parse_datetime(row.get("created_at")?)?,
    })
}

fn row_to_wallet(row: &Row) -> rusqlite::Result<Wallet> {
    Ok(Wallet {
        id: row.get("id")?,
        exchange: row.get("exchange")?,
        api_key: row.get("api_key")?,
        secret_key: row.get("secret_key")?,
        is_active: row.get("is_active")?,
    })
}

fn row_to_position(row: &Row) -> rusqlite::Result<FuturesPosition> {
    Ok(FuturesPosition {
        id: row.get("id")?,
        council_id: row.get("council_id")?,
        symbol: row.get("symbol")?,
        position_side: parse_position_side(row.get::<_, String>("position_side")?),
        position_amt: parse_decimal(row.get("position_amt")?)?,
        entry_price: parse_decimal(row.get("entry_price")?)?,
        mark_price: parse_decimal(row.get("mark_price")?)?,
        leverage: row.get("leverage")?,
        margin_type: parse_margin_type(row.get::<_, String>("margin_type")?),
        notional: parse_decimal(row.get("notional")?)?,
        liquidation_price: parse_decimal_opt(row.get("liquidation_price")?)?,
        isolated_margin: parse_decimal_opt(row.get("isolated_margin")?)?,
        unrealized_profit: parse_decimal(row.get("unrealized_profit")?)?,
        realized_pnl: parse_decimal_opt(row.get("realized_pnl")?)?,
        fees_paid: parse_decimal(row.get("fees_paid")?)?,
        funding_fees: parse_decimal(row.get("funding_fees")?)?,
        max_notional: parse_decimal(row.get("max_notional")?)?,
        platform: parse_platform(row.get::<_, String>("platform")?),
        trading_mode: parse_trading_mode(row.get::<_, String>("trading_mode")?),
        status: parse_position_status(row.get::<_, String>("status")?),
        opened_at: parse_datetime(row.get("opened_at")?)?,
        closed_at: parse_datetime_opt(row.get("closed_at")?)?,
        confidence: parse_decimal_opt(row.get("confidence")?)?,
        agent_reasoning: row.get("agent_reasoning")?,
        external_position_id: row.get("external_position_id")?,
        stop_loss_price: parse_decimal_opt(row.get("stop_loss_price")?)?,
        stop_loss_order_id: row.get("stop_loss_order_id")?,
        take_profit_short: parse_decimal_opt(row.get("take_profit_short")?)?,
        take_profit_short_order_id: row.get("take_profit_short_order_id")?,
        take_profit_mid: parse_decimal_opt(row.get("take_profit_mid")?)?,
        take_profit_mid_order_id: row.get("take_profit_mid_order_id")?,
        take_profit_long: parse_decimal_opt(row.get("take_profit_long")?)?,
        take_profit_long_order_id: row.get("take_profit_long_order_id")?,
    })
}

fn row_to_holding(row: &Row) -> rusqlite::Result<SpotHolding> {
    Ok(SpotHolding {
        id: row.get("id")?,
        council_id: row.get("council_id")?,
        symbol: row.get("symbol")?,
        base_asset: row.get("base_asset")?,
        quote_asset: row.get("quote_asset")?,
        free: parse_decimal(row.get("free")?)?,
        locked: parse_decimal(row.get("locked")?)?,
        total: parse_decimal(row.get("total")?)?,
        average_cost: parse_decimal(row.get("average_cost")?)?,
        total_cost: parse_decimal(row.get("total_cost")?)?,
        current_price: parse_decimal(row.get("current_price")?)?,
        current_value: parse_decimal(row.get("current_value")?)?,
        unrealized_pnl: parse_decimal(row.get("unrealized_pnl")?)?,
        platform: parse_platform(row.get::<_, String>("platform")?),
        trading_mode: parse_trading_mode(row.get::<_, String>("trading_mode")?),
        status: parse_holding_status(row.get::<_, String>("status")?),
        first_acquired_at: parse_datetime(row.get("first_acquired_at")?)?,
        last_updated_at: parse_datetime(row.get("last_updated_at")?)?,
        closed_at: parse_datetime_opt(row.get("closed_at")?)?,
    })
}

fn parse_trading_mode(s: String) -> TradingMode {
    if s == "real" { TradingMode::Real } else { TradingMode::Paper }
}

fn parse_trading_type(s: String) -> TradingType {
    if s == "spot" { TradingType::Spot } else { TradingType::Futures }
}

fn parse_position_side(s: String) -> PositionSide {
    match s.as_str() {
        "LONG" => PositionSide::Long,
        "SHORT" => PositionSide::Short,
        _ => PositionSide::Both,
    }
}

fn parse_margin_type(s: String) -> MarginType {
    if s == "CROSSED" { MarginType::Crossed } else { MarginType::Isolated }
}

fn parse_platform(s: String) -> Platform {
    if s == "aster" { Platform::Aster } else { Platform::Binance }
}

fn parse_position_status(s: String) -> PositionStatus {
    match s.as_str() {
        "CLOSED" => PositionStatus::Closed,
        "LIQUIDATED" => PositionStatus::Liquidated,
        _ => PositionStatus::Open,
    }
}

fn parse_holding_status(s: String) -> HoldingStatus {
    if s == "CLOSED" { HoldingStatus::Closed } else { HoldingStatus::Active }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    async fn test_store() -> Store {
        let store = Store::open(":memory:").unwrap();
        store.migrate().await.unwrap();
        store
    }

    async fn seed_council(store: &Store) -> i64 {
        let conn = store.conn.lock().await;
        conn.execute(
            "INSERT INTO councils (trading_mode, trading_type, initial_capital, total_account_value, available_balance)
             VALUES ('paper', 'futures', '10000', '10000', '10000')",
            [],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    fn sample_position(council_id: i64) -> FuturesPosition {
        FuturesPosition {
            id: 0,
            council_id,
            symbol: "BTCUSDT".into(),
            position_side: PositionSide::Long,
            position_amt: dec!(0.002),
            entry_price: dec!(50000),
            mark_price: dec!(50000),
            leverage: 15,
            margin_type: MarginType::Isolated,
            notional: dec!(100),
            liquidation_price: None,
            isolated_margin: None,
            unrealized_profit: dec!(0),
            realized_pnl: None,
            fees_paid: dec!(0),
            funding_fees: dec!(0),
            max_notional: dec!(100),
            platform: Platform::Binance,
            trading_mode: TradingMode::Paper,
            status: PositionStatus::Open,
            opened_at: Utc::now(),
            closed_at: None,
            confidence: Some(dec!(0.75)),
            agent_reasoning: None,
            external_position_id: None,
            stop_loss_price: None,
            stop_loss_order_id: None,
            take_profit_short: None,
            take_profit_short_order_id: None,
            take_profit_mid: None,
            take_profit_mid_order_id: None,
            take_profit_long: None,
            take_profit_long_order_id: None,
        }
    }

    #[tokio::test]
    async fn insert_and_find_open_position_roundtrips() {
        let store = test_store().await;
        let council_id = seed_council(&store).await;
        let position = sample_position(council_id);
        let id = store.insert_position(&position).await.unwrap();
        assert!(id > 0);

        let found = store
            .find_open_position(council_id, "BTCUSDT", PositionSide::Long, Platform::Binance)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.entry_price, dec!(50000));
    }

    #[tokio::test]
    async fn duplicate_open_position_is_rejected_by_unique_index() {
        let store = test_store().await;
        let council_id = seed_council(&store).await;
        store.insert_position(&sample_position(council_id)).await.unwrap();
        let err = store.insert_position(&sample_position(council_id)).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn closing_a_position_frees_the_slot_for_reopening() {
        let store = test_store().await;
        let council_id = seed_council(&store).await;
        let id = store.insert_position(&sample_position(council_id)).await.unwrap();

        let mut position = store
            .find_open_position(council_id, "BTCUSDT", PositionSide::Long, Platform::Binance)
            .await
            .unwrap()
            .unwrap();
        position.id = id;
        position.status = PositionStatus::Closed;
        position.closed_at = Some(Utc::now());
        store.update_position(&position).await.unwrap();

        store.insert_position(&sample_position(council_id)).await.unwrap();
    }
}
