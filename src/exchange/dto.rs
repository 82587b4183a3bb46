//! Wire DTOs for the exchange REST API.
//!
//! Decimal-like fields are transported as JSON strings and parsed through
//! `rust_decimal::Decimal::from_str`, never through `f64`, to avoid
//! floating-point drift at the venue boundary.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{OrderSide, OrderStatus, OrderType, PositionSide, TimeInForce};

fn de_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

fn de_decimal_opt<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    match s {
        None => Ok(None),
        Some(s) if s.is_empty() => Ok(None),
        Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    #[serde(rename = "price", deserialize_with = "de_decimal")]
    pub price: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSymbolFilter {
    #[serde(rename = "filterType")]
    pub filter_type: String,
    #[serde(rename = "stepSize", default, deserialize_with = "de_decimal_opt")]
    pub step_size: Option<Decimal>,
    #[serde(rename = "minQty", default, deserialize_with = "de_decimal_opt")]
    pub min_qty: Option<Decimal>,
    #[serde(rename = "maxQty", default, deserialize_with = "de_decimal_opt")]
    pub max_qty: Option<Decimal>,
    #[serde(rename = "tickSize", default, deserialize_with = "de_decimal_opt")]
    pub tick_size: Option<Decimal>,
    #[serde(rename = "notional", alias = "minNotional", default, deserialize_with = "de_decimal_opt")]
    pub notional: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSymbolInfo {
    pub symbol: String,
    pub filters: Vec<RawSymbolFilter>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountInfo {
    #[serde(rename = "availableBalance", deserialize_with = "de_decimal")]
    pub available_balance: Decimal,
    #[serde(rename = "totalWalletBalance", default, deserialize_with = "de_decimal_opt")]
    pub total_wallet_balance: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangePosition {
    pub symbol: String,
    #[serde(rename = "positionSide")]
    pub position_side: PositionSide,
    #[serde(rename = "positionAmt", deserialize_with = "de_decimal")]
    pub position_amount: Decimal,
    #[serde(rename = "entryPrice", default, deserialize_with = "de_decimal_opt")]
    pub entry_price: Option<Decimal>,
    #[serde(rename = "liquidationPrice", default, deserialize_with = "de_decimal_opt")]
    pub liquidation_price: Option<Decimal>,
    #[serde(rename = "isolatedMargin", default, deserialize_with = "de_decimal_opt")]
    pub isolated_margin: Option<Decimal>,
    #[serde(rename = "marginType", default)]
    pub margin_type: Option<String>,
}

/// A single candlestick. The venue wires this as a positional JSON array
/// (`[openTime, open, high, low, close, volume, closeTime, ...]`), parsed in
/// `exchange::binance` rather than through `Deserialize` here.
#[derive(Debug, Clone)]
pub struct Kline {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Optional filters for `get_all_orders`. `symbol` is required and passed
/// separately since the venue always needs it to scope the query.
#[derive(Debug, Clone, Default)]
pub struct OrderQueryFilters {
    pub order_id: Option<i64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaceOrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub position_side: Option<PositionSide>,
    pub time_in_force: Option<TimeInForce>,
    pub reduce_only: bool,
}

impl PlaceOrderRequest {
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            stop_price: None,
            position_side: None,
            time_in_force: None,
            reduce_only: false,
        }
    }

    pub fn with_position_side(mut self, side: PositionSide) -> Self {
        self.position_side = Some(side);
        self
    }

    pub fn reduce_only(mut self, reduce_only: bool) -> Self {
        self.reduce_only = reduce_only;
        self
    }

    pub fn stop_order(
        symbol: impl Into<String>,
        side: OrderSide,
        order_type: OrderType,
        quantity: Decimal,
        stop_price: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type,
            quantity,
            price: None,
            stop_price: Some(stop_price),
            position_side: None,
            time_in_force: None,
            reduce_only: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeOrder {
    #[serde(rename = "orderId")]
    pub order_id: i64,
    pub symbol: String,
    pub side: OrderSide,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    #[serde(rename = "positionSide", default)]
    pub position_side: Option<PositionSide>,
    #[serde(rename = "origQty", deserialize_with = "de_decimal")]
    pub orig_qty: Decimal,
    #[serde(rename = "executedQty", default, deserialize_with = "de_decimal_opt")]
    pub executed_qty: Option<Decimal>,
    #[serde(rename = "avgPrice", default, deserialize_with = "de_decimal_opt")]
    pub average_price: Option<Decimal>,
    pub status: OrderStatus,
}

impl ExchangeOrder {
    pub fn filled_quantity(&self) -> Decimal {
        self.executed_qty.unwrap_or(self.orig_qty)
    }
}
