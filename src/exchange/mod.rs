//! Exchange Client (XC): signed REST access to a venue, with retry,
//! backoff, and error-taxonomy mapping.

pub mod binance;
pub mod dto;
pub mod signing;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::{OrderSide, Platform, PositionSide};
use crate::money::SymbolFilters;

pub use dto::{AccountInfo, ExchangeOrder, ExchangePosition, Kline, OrderQueryFilters, PlaceOrderRequest, Ticker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginTypeReq {
    Isolated,
    Crossed,
}

/// Everything the Trading Router needs from a venue, abstracted behind a
/// trait so tests can swap in a mock without touching `TradingRouter`.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    fn platform(&self) -> Platform;

    async fn get_ticker(&self, symbol: &str) -> anyhow::Result<Ticker>;

    async fn get_klines(&self, symbol: &str, interval: &str, limit: u32) -> anyhow::Result<Vec<Kline>>;

    async fn get_symbol_info(&self, symbol: &str) -> anyhow::Result<SymbolFilters>;

    async fn get_account(&self) -> anyhow::Result<AccountInfo>;

    async fn get_positions(&self, symbol: Option<&str>) -> anyhow::Result<Vec<ExchangePosition>>;

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> anyhow::Result<()>;

    async fn set_margin_type(&self, symbol: &str, margin_type: MarginTypeReq) -> anyhow::Result<()>;

    async fn place_order(&self, request: PlaceOrderRequest) -> anyhow::Result<ExchangeOrder>;

    async fn modify_order(
        &self,
        symbol: &str,
        order_id: i64,
        quantity: Option<Decimal>,
        price: Option<Decimal>,
    ) -> anyhow::Result<ExchangeOrder>;

    async fn cancel_order(&self, symbol: &str, order_id: i64) -> anyhow::Result<()>;

    async fn cancel_all_orders(&self, symbol: &str) -> anyhow::Result<()>;

    async fn place_batch_orders(&self, orders: Vec<PlaceOrderRequest>) -> anyhow::Result<Vec<ExchangeOrder>>;

    async fn get_open_orders(&self, symbol: Option<&str>) -> anyhow::Result<Vec<ExchangeOrder>>;

    async fn get_all_orders(&self, symbol: &str, filters: OrderQueryFilters) -> anyhow::Result<Vec<ExchangeOrder>>;

    /// `None` if no open position matched; otherwise the last order placed.
    async fn close_position(&self, symbol: &str, side: PositionSide) -> anyhow::Result<Option<ExchangeOrder>>;
}

/// Derive the one-way/hedge-mode-aware direction of a reported exchange
/// position: explicit LONG/SHORT, or the sign of the amount when `BOTH`.
pub fn effective_direction(position_side: PositionSide, amount: Decimal) -> Option<OrderSide> {
    match position_side {
        PositionSide::Long => Some(OrderSide::Buy),
        PositionSide::Short => Some(OrderSide::Sell),
        PositionSide::Both => {
            if amount.is_sign_positive() && !amount.is_zero() {
                Some(OrderSide::Buy)
            } else if amount.is_sign_negative() {
                Some(OrderSide::Sell)
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn effective_direction_explicit_sides() {
        assert_eq!(effective_direction(PositionSide::Long, dec!(0)), Some(OrderSide::Buy));
        assert_eq!(effective_direction(PositionSide::Short, dec!(0)), Some(OrderSide::Sell));
    }

    #[test]
    fn effective_direction_one_way_mode_uses_sign() {
        assert_eq!(effective_direction(PositionSide::Both, dec!(1.5)), Some(OrderSide::Buy));
        assert_eq!(effective_direction(PositionSide::Both, dec!(-1.5)), Some(OrderSide::Sell));
        assert_eq!(effective_direction(PositionSide::Both, dec!(0)), None);
    }
}
