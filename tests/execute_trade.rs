//! End-to-end `execute_trade` scenarios against a mocked exchange, matching
//! the teacher's convention of cross-module integration tests living under
//! `tests/`.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use council_exec_backend::domain::{OrderSide, OrderStatus, OrderType, Platform, PositionSide, TradingMode, TradingType};
use council_exec_backend::events::EventBroadcaster;
use council_exec_backend::exchange::{
    AccountInfo, ExchangeClient, ExchangeOrder, ExchangePosition, Kline, MarginTypeReq, OrderQueryFilters,
    PlaceOrderRequest, Ticker,
};
use council_exec_backend::money::SymbolFilters;
use council_exec_backend::router::{ExitPlanRequest, TradingRouter};
use council_exec_backend::store::Store;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

struct MockExchange {
    price: Decimal,
    available_balance: Decimal,
    filters: SymbolFilters,
    next_order_id: AtomicI64,
}

impl MockExchange {
    fn new(price: Decimal, available_balance: Decimal, filters: SymbolFilters) -> Self {
        Self { price, available_balance, filters, next_order_id: AtomicI64::new(1) }
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    fn platform(&self) -> Platform {
        Platform::Binance
    }

    async fn get_ticker(&self, symbol: &str) -> anyhow::Result<Ticker> {
        Ok(Ticker { symbol: symbol.to_string(), price: self.price })
    }

    async fn get_klines(&self, _symbol: &str, _interval: &str, _limit: u32) -> anyhow::Result<Vec<Kline>> {
        Ok(vec![])
    }

    async fn get_symbol_info(&self, _symbol: &str) -> anyhow::Result<SymbolFilters> {
        Ok(self.filters)
    }

    async fn get_account(&self) -> anyhow::Result<AccountInfo> {
        Ok(AccountInfo { available_balance: self.available_balance, total_wallet_balance: None })
    }

    async fn get_positions(&self, _symbol: Option<&str>) -> anyhow::Result<Vec<ExchangePosition>> {
        Ok(vec![])
    }

    async fn set_leverage(&self, _symbol: &str, _leverage: u32) -> anyhow::Result<()> {
        Ok(())
    }

    async fn set_margin_type(&self, _symbol: &str, _margin_type: MarginTypeReq) -> anyhow::Result<()> {
        Ok(())
    }

    async fn place_order(&self, request: PlaceOrderRequest) -> anyhow::Result<ExchangeOrder> {
        let order_id = self.next_order_id.fetch_add(1, Ordering::SeqCst);
        Ok(ExchangeOrder {
            order_id,
            symbol: request.symbol,
            side: request.side,
            order_type: request.order_type,
            position_side: request.position_side,
            orig_qty: request.quantity,
            executed_qty: Some(request.quantity),
            average_price: Some(self.price),
            status: OrderStatus::Filled,
        })
    }

    async fn modify_order(
        &self,
        symbol: &str,
        order_id: i64,
        quantity: Option<Decimal>,
        _price: Option<Decimal>,
    ) -> anyhow::Result<ExchangeOrder> {
        Ok(ExchangeOrder {
            order_id,
            symbol: symbol.to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            position_side: None,
            orig_qty: quantity.unwrap_or(Decimal::ZERO),
            executed_qty: Some(Decimal::ZERO),
            average_price: Some(self.price),
            status: OrderStatus::New,
        })
    }

    async fn cancel_order(&self, _symbol: &str, _order_id: i64) -> anyhow::Result<()> {
        Ok(())
    }

    async fn cancel_all_orders(&self, _symbol: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn place_batch_orders(&self, _orders: Vec<PlaceOrderRequest>) -> anyhow::Result<Vec<ExchangeOrder>> {
        Ok(vec![])
    }

    async fn get_open_orders(&self, _symbol: Option<&str>) -> anyhow::Result<Vec<ExchangeOrder>> {
        Ok(vec![])
    }

    async fn get_all_orders(&self, _symbol: &str, _filters: OrderQueryFilters) -> anyhow::Result<Vec<ExchangeOrder>> {
        Ok(vec![])
    }

    async fn close_position(&self, symbol: &str, side: PositionSide) -> anyhow::Result<Option<ExchangeOrder>> {
        let order_id = self.next_order_id.fetch_add(1, Ordering::SeqCst);
        Ok(Some(ExchangeOrder {
            order_id,
            symbol: symbol.to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            position_side: Some(side),
            orig_qty: Decimal::ZERO,
            executed_qty: Some(Decimal::ZERO),
            average_price: Some(self.price),
            status: OrderStatus::Filled,
        }))
    }
}

fn btc_filters() -> SymbolFilters {
    SymbolFilters {
        step_size: dec!(0.001),
        min_qty: dec!(0.001),
        max_qty: dec!(1000),
        tick_size: dec!(0.01),
        min_notional: dec!(10),
    }
}

async fn router_with(price: Decimal, available_balance: Decimal) -> (Store, i64, TradingRouter) {
    let store = Store::open(":memory:").unwrap();
    store.migrate().await.unwrap();
    let council_id = store
        .insert_council(TradingMode::Paper, TradingType::Futures, dec!(10000))
        .await
        .unwrap();

    let client: Arc<dyn ExchangeClient> = Arc::new(MockExchange::new(price, available_balance, btc_filters()));
    let events = Arc::new(EventBroadcaster::new(16));
    let router = TradingRouter::new(store.clone(), events, client.clone(), client);
    (store, council_id, router)
}

#[tokio::test]
async fn long_profit_scenario_opens_and_reports_success() {
    let (store, council_id, router) = router_with(dec!(50000), dec!(10000)).await;

    let outcome = router
        .execute_trade(
            council_id,
            "BTCUSDT",
            OrderSide::Buy,
            dec!(100),
            dec!(0.75),
            None,
            ExitPlanRequest::default(),
            None,
        )
        .await
        .unwrap();

    assert!(outcome.success, "expected success, got {:?}", outcome.error);
    assert!(outcome.position_id.is_some());

    let position = store
        .find_open_position(council_id, "BTCUSDT", PositionSide::Both, Platform::Binance)
        .await
        .unwrap()
        .expect("position should be open");
    assert_eq!(position.position_amt, dec!(0.002));
    assert_eq!(position.entry_price, dec!(50000));
}

#[tokio::test]
async fn short_loss_scenario_closes_with_expected_realized_pnl() {
    let (store, council_id, router) = router_with(dec!(3000), dec!(10000)).await;

    let outcome = router
        .execute_trade(
            council_id,
            "BTCUSDT",
            OrderSide::Sell,
            dec!(300),
            dec!(0.65),
            Some(10),
            ExitPlanRequest::default(),
            None,
        )
        .await
        .unwrap();
    assert!(outcome.success, "expected success, got {:?}", outcome.error);

    let position = store
        .find_open_position(council_id, "BTCUSDT", PositionSide::Both, Platform::Binance)
        .await
        .unwrap()
        .expect("position should be open");
    assert_eq!(position.position_amt, dec!(-0.1));

    let closed = router.close_existing_position(council_id, "BTCUSDT", None).await.unwrap();
    assert!(closed.success, "expected close to succeed, got {:?}", closed.error);
}

#[tokio::test]
async fn reopening_an_open_position_is_refused() {
    let (_store, council_id, router) = router_with(dec!(50000), dec!(10000)).await;

    let first = router
        .execute_trade(
            council_id,
            "BTCUSDT",
            OrderSide::Buy,
            dec!(100),
            dec!(0.75),
            None,
            ExitPlanRequest::default(),
            None,
        )
        .await
        .unwrap();
    assert!(first.success);

    let second = router
        .execute_trade(
            council_id,
            "BTCUSDT",
            OrderSide::Buy,
            dec!(100),
            dec!(0.75),
            None,
            ExitPlanRequest::default(),
            None,
        )
        .await
        .unwrap();

    assert!(!second.success);
    assert!(second.error.unwrap().contains("PolicyViolation"));
}

#[tokio::test]
async fn step_size_rounding_to_zero_is_rejected() {
    let (_store, council_id, router) = router_with(dec!(50000), dec!(0.01)).await;

    let outcome = router
        .execute_trade(
            council_id,
            "BTCUSDT",
            OrderSide::Buy,
            dec!(0.01),
            dec!(0.5),
            Some(1),
            ExitPlanRequest::default(),
            None,
        )
        .await
        .unwrap();

    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("Validation"));
}

#[tokio::test]
async fn undersized_balance_caps_margin_at_ninety_five_percent() {
    // desired_usd (100000) implies a margin far beyond the 100 available
    // balance at 5x leverage, so sizing caps at 95% of the balance instead
    // of rejecting the trade outright.
    let (store, council_id, router) = router_with(dec!(50000), dec!(100)).await;

    let outcome = router
        .execute_trade(
            council_id,
            "BTCUSDT",
            OrderSide::Buy,
            dec!(100000),
            dec!(0.75),
            Some(5),
            ExitPlanRequest::default(),
            None,
        )
        .await
        .unwrap();

    assert!(outcome.success, "expected success, got {:?}", outcome.error);
    let position = store
        .find_open_position(council_id, "BTCUSDT", PositionSide::Both, Platform::Binance)
        .await
        .unwrap()
        .expect("position should be open");
    // actual_margin = 100 * 0.95 = 95; qty = 95 * 5 / 50000 = 0.0095,
    // quantized down to the nearest 0.001 step.
    assert_eq!(position.position_amt, dec!(0.009));
}
