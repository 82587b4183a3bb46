//! Trading Router (TR): the critical path from a sized trade request to a
//! persisted position/order and its exit-plan orders.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::domain::{
    Council, FuturesPosition, MarginType, OrderSide, OrderType, Platform, PositionSide, PositionStatus,
    TradingMode, TradingType, Wallet,
};
use crate::events::EventBroadcaster;
use crate::exchange::{ExchangeClient, MarginTypeReq, PlaceOrderRequest};
use crate::metrics::MetricsAggregator;
use crate::money::{check_lot_size, check_min_notional, quantize_down, LotCheck, NotionalCheck, Money};
use crate::position::PositionService;
use crate::store::Store;

/// Per-level exit prices supplied with a trade request. Any level left
/// `None` is simply skipped — no default-filling.
#[derive(Debug, Clone, Default)]
pub struct ExitPlanRequest {
    pub stop_loss: Option<Decimal>,
    pub take_profit_short: Option<Decimal>,
    pub take_profit_mid: Option<Decimal>,
    pub take_profit_long: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct ExecuteTradeOutcome {
    pub success: bool,
    pub position_id: Option<i64>,
    pub holding_id: Option<i64>,
    pub order_id: Option<i64>,
    pub platform: Option<Platform>,
    pub error: Option<String>,
}

impl ExecuteTradeOutcome {
    fn failure(error: impl Into<String>) -> Self {
        Self { success: false, position_id: None, holding_id: None, order_id: None, platform: None, error: Some(error.into()) }
    }
}

pub struct TradingRouter {
    store: Store,
    positions: PositionService,
    metrics: MetricsAggregator,
    events: Arc<EventBroadcaster>,
    paper_client: Arc<dyn ExchangeClient>,
    real_client: Arc<dyn ExchangeClient>,
}

/// Leverage derivation from confidence when the caller doesn't supply one.
fn leverage_from_confidence(confidence: Decimal) -> u32 {
    let c = confidence;
    let floor_mul = |mul: Decimal| -> u32 { (c * mul).floor().try_into().unwrap_or(0) };

    if c < Decimal::new(6, 1) {
        floor_mul(Decimal::TEN).max(1)
    } else if c < Decimal::new(7, 1) {
        floor_mul(Decimal::new(15, 0)).max(5)
    } else if c < Decimal::new(8, 1) {
        floor_mul(Decimal::new(20, 0)).max(10)
    } else {
        floor_mul(Decimal::new(25, 0)).max(15).min(20)
    }
}

impl TradingRouter {
    pub fn new(
        store: Store,
        events: Arc<EventBroadcaster>,
        paper_client: Arc<dyn ExchangeClient>,
        real_client: Arc<dyn ExchangeClient>,
    ) -> Self {
        Self {
            positions: PositionService::new(store.clone()),
            metrics: MetricsAggregator::new(store.clone()),
            store,
            events,
            paper_client,
            real_client,
        }
    }

    fn client_for(&self, council: &Council) -> Arc<dyn ExchangeClient> {
        // Wallet-credential fallback happens one layer down (client
        // construction in main.rs); here we only choose paper vs. real.
        Arc::clone(match council.trading_mode {
            TradingMode::Paper => &self.paper_client,
            TradingMode::Real => &self.real_client,
        })
    }

    /// Step 1, credential-mismatch branch of client selection: logs and
    /// falls back to environment defaults when a council's active wallet
    /// doesn't match the chosen platform.
    fn resolve_wallet(&self, wallet: Option<&Wallet>, platform: Platform) -> Option<Wallet> {
        match wallet {
            Some(w) if w.is_active && w.exchange.eq_ignore_ascii_case(platform.as_str()) => Some(w.clone()),
            Some(w) => {
                warn!(wallet_exchange = %w.exchange, platform = platform.as_str(), "wallet exchange mismatch, falling back to environment credentials");
                None
            }
            None => None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn execute_trade(
        &self,
        council_id: i64,
        symbol: &str,
        side: OrderSide,
        desired_usd: Decimal,
        confidence: Decimal,
        leverage: Option<u32>,
        exit_plan: ExitPlanRequest,
        agent_reasoning: Option<String>,
    ) -> anyhow::Result<ExecuteTradeOutcome> {
        let Some(council) = self.store.find_council(council_id).await? else {
            return Ok(ExecuteTradeOutcome::failure(format!("council {council_id} not found")));
        };

        let wallet = match council.wallet_id {
            Some(id) => self.store.find_wallet(id).await?,
            None => None,
        };
        let client = self.client_for(&council);
        let platform = client.platform();
        let _resolved_wallet = self.resolve_wallet(wallet.as_ref(), platform);

        // Step 2: pre-fetch.
        let account = client.get_account().await?;
        let ticker = client.get_ticker(symbol).await?;
        let price = ticker.price;

        // Step 3: leverage.
        let leverage = leverage.unwrap_or_else(|| leverage_from_confidence(confidence));

        // Step 4: size.
        let desired_margin = desired_usd / Decimal::from(leverage);
        let actual_margin = if desired_margin > account.available_balance {
            account.available_balance * Decimal::new(95, 2)
        } else {
            desired_margin
        };
        let raw_qty = actual_margin * Decimal::from(leverage) / price;

        // Step 5: precision.
        let filters = client.get_symbol_info(symbol).await?;
        let qty = quantize_down(raw_qty, filters.step_size);
        if qty <= Decimal::ZERO {
            return Ok(ExecuteTradeOutcome::failure("Validation: insufficient_for_step"));
        }
        match check_lot_size(qty, filters.min_qty, filters.max_qty, filters.step_size) {
            LotCheck::Ok => {}
            LotCheck::TooSmall => return Ok(ExecuteTradeOutcome::failure("Validation: below_min_qty")),
            LotCheck::TooLarge => return Ok(ExecuteTradeOutcome::failure("Validation: above_max_qty")),
            LotCheck::BadStep => return Ok(ExecuteTradeOutcome::failure("Validation: insufficient_for_step")),
        }
        if let NotionalCheck::BelowMin = check_min_notional(qty, price, filters.min_notional) {
            return Ok(ExecuteTradeOutcome::failure("Validation: below_min_notional"));
        }

        // Step 6: open-then-close policy.
        let api_position_side = match platform {
            Platform::Binance if matches!(council.trading_mode, TradingMode::Paper) => PositionSide::Both,
            _ => {
                if side == OrderSide::Buy {
                    PositionSide::Long
                } else {
                    PositionSide::Short
                }
            }
        };
        if self
            .store
            .find_open_position(council_id, symbol, api_position_side, platform)
            .await?
            .is_some()
        {
            warn!(council_id, symbol, side = ?api_position_side, "refusing to reopen an already-open position");
            return Ok(ExecuteTradeOutcome::failure(format!(
                "PolicyViolation: updates_forbidden (council={council_id}, symbol={symbol}, side={api_position_side})"
            )));
        }

        // Step 7: leverage & margin setup.
        if let Err(err) = client.set_margin_type(symbol, MarginTypeReq::Crossed).await {
            warn!(symbol, error = %err, "set_margin_type failed, continuing (idempotent contract assumed swallowed upstream)");
        }
        client.set_leverage(symbol, leverage).await?;

        // Step 8: place entry order.
        let order_request = PlaceOrderRequest::market(symbol, side, qty).with_position_side(api_position_side);
        let entry_order = client.place_order(order_request).await?;

        // Step 9: read back liquidation / isolated margin.
        let positions = client.get_positions(Some(symbol)).await?;
        let exchange_position = positions.into_iter().find(|p| p.position_side == api_position_side);
        let liquidation_price = exchange_position.as_ref().and_then(|p| p.liquidation_price);
        let isolated_margin = exchange_position.as_ref().and_then(|p| p.isolated_margin);

        // Step 10: persist (position, entry order, and council stamp in one
        // transaction so a crash between writes can't leave the trade
        // half-recorded).
        let now = chrono::Utc::now();
        let mut position = FuturesPosition {
            id: 0,
            council_id,
            symbol: symbol.to_string(),
            position_side: api_position_side,
            position_amt: if side == OrderSide::Buy { qty } else { -qty },
            entry_price: entry_order.average_price.unwrap_or(price),
            mark_price: entry_order.average_price.unwrap_or(price),
            leverage: leverage as i32,
            margin_type: MarginType::Crossed,
            notional: qty * price,
            liquidation_price,
            isolated_margin,
            unrealized_profit: Decimal::ZERO,
            realized_pnl: None,
            fees_paid: Decimal::ZERO,
            funding_fees: Decimal::ZERO,
            max_notional: qty * price,
            platform,
            trading_mode: council.trading_mode,
            status: PositionStatus::Open,
            opened_at: now,
            closed_at: None,
            confidence: Some(confidence),
            agent_reasoning,
            external_position_id: Some(entry_order.order_id.to_string()),
            stop_loss_price: None,
            stop_loss_order_id: None,
            take_profit_short: None,
            take_profit_short_order_id: None,
            take_profit_mid: None,
            take_profit_mid_order_id: None,
            take_profit_long: None,
            take_profit_long_order_id: None,
        };
        PositionService::prepare_new(&mut position);

        let order = crate::domain::Order {
            id: 0,
            council_id,
            futures_position_id: None,
            spot_holding_id: None,
            symbol: symbol.to_string(),
            client_order_id: uuid::Uuid::new_v4().to_string(),
            exchange_order_id: entry_order.order_id.to_string(),
            side,
            order_type: OrderType::Market,
            position_side: Some(api_position_side),
            orig_qty: entry_order.orig_qty,
            executed_qty: entry_order.filled_quantity(),
            price: None,
            stop_price: None,
            avg_price: entry_order.average_price,
            time_in_force: None,
            reduce_only: false,
            close_position: false,
            status: entry_order.status,
            platform,
            trading_mode: council.trading_mode,
            trading_type: TradingType::Futures,
            commission: None,
            commission_asset: None,
            confidence: Some(confidence),
            transaction_time: now,
            update_time: now,
        };
        let mut council = council;
        council.last_executed_at = Some(now);

        let (position_id, order_id) = self.store.record_new_trade(&position, order, &council).await?;
        position.id = position_id;

        info!(
            position_id,
            symbol = %position.symbol,
            side = %position.position_side,
            amt = %position.position_amt,
            entry_price = %position.entry_price,
            "futures position opened"
        );

        // Step 11: exit plan (non-fatal per slot).
        position = self.place_exit_plan(&client, position, side, qty, &exit_plan).await;

        // Step 12: metrics + events.
        self.metrics.refresh(council_id).await?;
        self.events.publish_cycle(
            council_id,
            format!("{side:?}"),
            symbol,
            confidence,
            &[(side, qty, price)],
        );

        info!(council_id, symbol, position_id = position.id, order_id, "trade executed");
        Ok(ExecuteTradeOutcome {
            success: true,
            position_id: Some(position.id),
            holding_id: None,
            order_id: Some(order_id),
            platform: Some(platform),
            error: None,
        })
    }

    async fn place_exit_plan(
        &self,
        client: &Arc<dyn ExchangeClient>,
        position: FuturesPosition,
        entry_side: OrderSide,
        entry_qty: Decimal,
        exit_plan: &ExitPlanRequest,
    ) -> FuturesPosition {
        let exit_side = entry_side.opposite();
        let mut slots: HashMap<&'static str, (Money, Option<String>)> = HashMap::new();

        if let Some(sl) = exit_plan.stop_loss {
            match client
                .place_order(PlaceOrderRequest::stop_order(&position.symbol, exit_side, OrderType::StopMarket, entry_qty, sl).with_position_side(position.position_side))
                .await
            {
                Ok(order) => {
                    slots.insert("sl", (sl, Some(order.order_id.to_string())));
                }
                Err(err) => {
                    warn!(position_id = position.id, error = %err, "stop-loss order placement failed, leaving slot null");
                }
            }
        }

        let tp_levels: Vec<(&'static str, Option<Decimal>)> = vec![
            ("tp_short", exit_plan.take_profit_short),
            ("tp_mid", exit_plan.take_profit_mid),
            ("tp_long", exit_plan.take_profit_long),
        ];
        let supplied: Vec<(&'static str, Decimal)> = tp_levels.into_iter().filter_map(|(k, v)| v.map(|v| (k, v))).collect();
        if !supplied.is_empty() {
            let split_qty = quantize_down(entry_qty / Decimal::from(supplied.len() as i64), Decimal::new(1, 8));
            for (key, tp_price) in supplied {
                match client
                    .place_order(
                        PlaceOrderRequest::stop_order(&position.symbol, exit_side, OrderType::TakeProfitMarket, split_qty, tp_price)
                            .with_position_side(position.position_side),
                    )
                    .await
                {
                    Ok(order) => {
                        slots.insert(key, (tp_price, Some(order.order_id.to_string())));
                    }
                    Err(err) => {
                        warn!(position_id = position.id, level = key, error = %err, "take-profit order placement failed, leaving slot null");
                    }
                }
            }
        }

        let fallback = position.clone();
        match self
            .positions
            .update_exit_plan(
                position,
                slots.get("sl").map(|(p, _)| *p),
                slots.get("sl").and_then(|(_, id)| id.clone()),
                slots.get("tp_short").cloned(),
                slots.get("tp_mid").cloned(),
                slots.get("tp_long").cloned(),
            )
            .await
        {
            Ok(updated) => updated,
            Err(err) => {
                warn!(position_id = fallback.id, error = %err, "failed to persist exit-plan update");
                fallback
            }
        }
    }

    /// Locates the OPEN row for `symbol` (any side if `side` is `None`),
    /// closes it on the exchange, and applies the resulting exit price to
    /// PSV.
    pub async fn close_existing_position(
        &self,
        council_id: i64,
        symbol: &str,
        side: Option<PositionSide>,
    ) -> anyhow::Result<ExecuteTradeOutcome> {
        let Some(council) = self.store.find_council(council_id).await? else {
            return Ok(ExecuteTradeOutcome::failure(format!("council {council_id} not found")));
        };
        let client = self.client_for(&council);

        let candidates = self.store.find_open_positions(council_id).await?;
        let Some(position) = candidates.into_iter().find(|p| {
            p.symbol == symbol && side.map(|s| s == p.position_side).unwrap_or(true)
        }) else {
            return Ok(ExecuteTradeOutcome::failure(format!("no open position for {symbol}")));
        };

        let closed_order = client.close_position(symbol, position.position_side).await?;
        let Some(closed_order) = closed_order else {
            return Ok(ExecuteTradeOutcome::failure(format!("exchange reported no matching position for {symbol}")));
        };

        let ticker = client.get_ticker(symbol).await?;
        let exit_price = closed_order.average_price.unwrap_or(ticker.price);

        let position = self
            .positions
            .close_position(position, exit_price, Decimal::ZERO, Decimal::ZERO)
            .await?;
        self.metrics.refresh(council_id).await?;

        Ok(ExecuteTradeOutcome {
            success: true,
            position_id: Some(position.id),
            holding_id: None,
            order_id: Some(closed_order.order_id),
            platform: Some(client.platform()),
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn leverage_boundaries_match_spec_thresholds() {
        assert_eq!(leverage_from_confidence(dec!(0.75)), 15);
        assert_eq!(leverage_from_confidence(dec!(0.80)), 20);
        assert_eq!(leverage_from_confidence(dec!(0.59)), 5);
        assert_eq!(leverage_from_confidence(dec!(0.69)), 10);
    }

    #[test]
    fn leverage_caps_at_twenty_for_high_confidence() {
        assert_eq!(leverage_from_confidence(dec!(0.95)), 20);
    }
}
