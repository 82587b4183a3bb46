//! Core domain entities: Council, Wallet, FuturesPosition, SpotHolding,
//! Order, PnLSnapshot — and the small enums that constrain their fields.
//!
//! These mirror the relational schema in `store`; conversion to/from SQLite
//! rows lives there, not here, so this module stays free of persistence
//! concerns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Paper,
    Real,
}

impl TradingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradingMode::Paper => "paper",
            TradingMode::Real => "real",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingType {
    Futures,
    Spot,
}

impl TradingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradingType::Futures => "futures",
            TradingType::Spot => "spot",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
    Both,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "LONG",
            PositionSide::Short => "SHORT",
            PositionSide::Both => "BOTH",
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarginType {
    Isolated,
    Crossed,
}

impl MarginType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarginType::Isolated => "ISOLATED",
            MarginType::Crossed => "CROSSED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Binance,
    Aster,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Binance => "binance",
            Platform::Aster => "aster",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    Open,
    Closed,
    Liquidated,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Open => "OPEN",
            PositionStatus::Closed => "CLOSED",
            PositionStatus::Liquidated => "LIQUIDATED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HoldingStatus {
    Active,
    Closed,
}

impl HoldingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HoldingStatus::Active => "ACTIVE",
            HoldingStatus::Closed => "CLOSED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(&self) -> OrderSide {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
    Limit,
    StopMarket,
    TakeProfitMarket,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
            OrderType::StopMarket => "STOP_MARKET",
            OrderType::TakeProfitMarket => "TAKE_PROFIT_MARKET",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    #[serde(rename = "GTC")]
    Gtc,
    #[serde(rename = "IOC")]
    Ioc,
    #[serde(rename = "FOK")]
    Fok,
}

impl TimeInForce {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeInForce::Gtc => "GTC",
            TimeInForce::Ioc => "IOC",
            TimeInForce::Fok => "FOK",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
}

/// Configuration plus running portfolio-level aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Council {
    pub id: i64,
    pub trading_mode: TradingMode,
    pub trading_type: TradingType,
    pub initial_capital: Money,
    pub total_account_value: Money,
    pub available_balance: Money,
    pub used_balance: Money,
    pub total_margin_used: Money,
    pub total_unrealized_profit: Money,
    pub total_realized_pnl: Money,
    pub net_pnl: Money,
    pub total_fees: Money,
    pub total_funding_fees: Money,
    pub open_futures_count: i64,
    pub closed_futures_count: i64,
    pub active_spot_holdings: i64,
    pub average_leverage: Money,
    pub average_confidence: Money,
    pub biggest_win: Money,
    pub biggest_loss: Money,
    pub long_hold_pct: Money,
    pub short_hold_pct: Money,
    pub flat_hold_pct: Money,
    pub wallet_id: Option<i64>,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Venue credentials. Read-only to the core; selected by `council.wallet_id`,
/// else environment defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: i64,
    pub exchange: String,
    pub api_key: String,
    pub secret_key: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuturesPosition {
    pub id: i64,
    pub council_id: i64,
    pub symbol: String,
    pub position_side: PositionSide,
    pub position_amt: Money,
    pub entry_price: Money,
    pub mark_price: Money,
    pub leverage: i32,
    pub margin_type: MarginType,
    pub notional: Money,
    pub liquidation_price: Option<Money>,
    pub isolated_margin: Option<Money>,
    pub unrealized_profit: Money,
    pub realized_pnl: Option<Money>,
    pub fees_paid: Money,
    pub funding_fees: Money,
    pub max_notional: Money,
    pub platform: Platform,
    pub trading_mode: TradingMode,
    pub status: PositionStatus,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub confidence: Option<Money>,
    pub agent_reasoning: Option<String>,
    pub external_position_id: Option<String>,
    pub stop_loss_price: Option<Money>,
    pub stop_loss_order_id: Option<String>,
    pub take_profit_short: Option<Money>,
    pub take_profit_short_order_id: Option<String>,
    pub take_profit_mid: Option<Money>,
    pub take_profit_mid_order_id: Option<String>,
    pub take_profit_long: Option<Money>,
    pub take_profit_long_order_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotHolding {
    pub id: i64,
    pub council_id: i64,
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub free: Money,
    pub locked: Money,
    pub total: Money,
    pub average_cost: Money,
    pub total_cost: Money,
    pub current_price: Money,
    pub current_value: Money,
    pub unrealized_pnl: Money,
    pub platform: Platform,
    pub trading_mode: TradingMode,
    pub status: HoldingStatus,
    pub first_acquired_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub council_id: i64,
    pub futures_position_id: Option<i64>,
    pub spot_holding_id: Option<i64>,
    pub symbol: String,
    pub client_order_id: String,
    pub exchange_order_id: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub position_side: Option<PositionSide>,
    pub orig_qty: Money,
    pub executed_qty: Money,
    pub price: Option<Money>,
    pub stop_price: Option<Money>,
    pub avg_price: Option<Money>,
    pub time_in_force: Option<TimeInForce>,
    pub reduce_only: bool,
    pub close_position: bool,
    pub status: OrderStatus,
    pub platform: Platform,
    pub trading_mode: TradingMode,
    pub trading_type: TradingType,
    pub commission: Option<Money>,
    pub commission_asset: Option<String>,
    pub confidence: Option<Money>,
    pub transaction_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PnLSnapshot {
    pub id: i64,
    pub council_id: i64,
    pub futures_position_id: Option<i64>,
    pub spot_holding_id: Option<i64>,
    pub snapshot_time: DateTime<Utc>,
    pub mark_price: Money,
    pub notional_value: Money,
    pub unrealized_pnl: Money,
    pub pnl_percentage: Money,
    pub liquidation_distance_pct: Option<Money>,
    pub margin_ratio: Option<Money>,
}
