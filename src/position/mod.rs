//! Position Service (PSV): opens, marks, and closes futures positions and
//! spot holdings against their directional PnL formulas.

use chrono::Utc;
use tracing::info;

use crate::domain::{FuturesPosition, PositionSide, PositionStatus, SpotHolding, HoldingStatus};
use crate::money::Money;
use crate::store::Store;

pub struct PositionService {
    store: Store,
}

/// Directional PnL: `LONG -> (exit - entry) * amt`, `SHORT -> (entry - exit) * amt`.
/// `amt` is the stored signed/unsigned quantity; for `BOTH` (one-way mode) the
/// sign of `amt` itself already encodes direction, so it is treated as LONG
/// when positive and SHORT when negative.
fn directional_pnl(side: PositionSide, amt: Money, entry: Money, mark: Money) -> Money {
    let is_long = match side {
        PositionSide::Long => true,
        PositionSide::Short => false,
        PositionSide::Both => !amt.is_sign_negative(),
    };
    let amt = amt.abs();
    if is_long {
        (mark - entry) * amt
    } else {
        (entry - mark) * amt
    }
}

impl PositionService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Computes the derived fields for a freshly-sized position (status,
    /// mark price, notional, open timestamp) without persisting it. The
    /// Trading Router persists the prepared row as part of the same
    /// transaction that records its entry order and council stamp.
    pub fn prepare_new(position: &mut FuturesPosition) {
        position.status = PositionStatus::Open;
        position.mark_price = position.entry_price;
        position.unrealized_profit = Money::ZERO;
        position.notional = position.position_amt.abs() * position.entry_price;
        position.max_notional = position.notional;
        position.opened_at = Utc::now();
        position.closed_at = None;
    }

    pub async fn close_position(
        &self,
        mut position: FuturesPosition,
        exit_price: Money,
        fees: Money,
        funding_fees: Money,
    ) -> anyhow::Result<FuturesPosition> {
        if position.status != PositionStatus::Open {
            anyhow::bail!("position {} is not OPEN (status={:?})", position.id, position.status);
        }

        let pnl = directional_pnl(position.position_side, position.position_amt, position.entry_price, exit_price);
        let realized_pnl = pnl - fees - funding_fees;

        position.status = PositionStatus::Closed;
        position.closed_at = Some(Utc::now());
        position.mark_price = exit_price;
        position.unrealized_profit = Money::ZERO;
        position.realized_pnl = Some(realized_pnl);
        position.fees_paid += fees;
        position.funding_fees += funding_fees;

        self.store.update_position(&position).await?;

        info!(
            position_id = position.id,
            symbol = %position.symbol,
            realized_pnl = %realized_pnl,
            exit_price = %exit_price,
            "futures position closed"
        );
        Ok(position)
    }

    /// No-op if the position is not OPEN. Recomputes unrealized PnL using
    /// the same directional formula as `close_position`, refreshes
    /// notional, and bumps `max_notional` monotonically.
    pub async fn update_mark_price(
        &self,
        mut position: FuturesPosition,
        mark_price: Money,
        liquidation_price: Option<Money>,
    ) -> anyhow::Result<FuturesPosition> {
        if position.status != PositionStatus::Open {
            return Ok(position);
        }

        position.unrealized_profit =
            directional_pnl(position.position_side, position.position_amt, position.entry_price, mark_price);
        position.mark_price = mark_price;
        position.notional = position.position_amt.abs() * mark_price;
        position.max_notional = position.max_notional.max(position.notional);
        if liquidation_price.is_some() {
            position.liquidation_price = liquidation_price;
        }

        self.store.update_position(&position).await?;
        Ok(position)
    }

    /// Upserts any of the six exit-plan fields. Idempotent: passing `None`
    /// for a slot leaves its current stored value untouched.
    #[allow(clippy::too_many_arguments)]
    pub async fn update_exit_plan(
        &self,
        mut position: FuturesPosition,
        stop_loss_price: Option<Money>,
        stop_loss_order_id: Option<String>,
        take_profit_short: Option<(Money, Option<String>)>,
        take_profit_mid: Option<(Money, Option<String>)>,
        take_profit_long: Option<(Money, Option<String>)>,
    ) -> anyhow::Result<FuturesPosition> {
        if let Some(price) = stop_loss_price {
            position.stop_loss_price = Some(price);
            position.stop_loss_order_id = stop_loss_order_id;
        }
        if let Some((price, order_id)) = take_profit_short {
            position.take_profit_short = Some(price);
            position.take_profit_short_order_id = order_id;
        }
        if let Some((price, order_id)) = take_profit_mid {
            position.take_profit_mid = Some(price);
            position.take_profit_mid_order_id = order_id;
        }
        if let Some((price, order_id)) = take_profit_long {
            position.take_profit_long = Some(price);
            position.take_profit_long_order_id = order_id;
        }

        self.store.update_position(&position).await?;
        Ok(position)
    }

    /// Upserts a spot holding. Positive `qty_delta` (BUY) grows the weighted
    /// average cost; negative `qty_delta` (SELL) holds cost basis fixed and
    /// closes the holding once `total` reaches zero.
    pub async fn update_holding(&self, mut holding: SpotHolding, qty_delta: Money, price: Money) -> anyhow::Result<SpotHolding> {
        if qty_delta.is_sign_positive() {
            let new_total_cost = holding.total_cost + qty_delta * price;
            let new_total = holding.total + qty_delta;
            holding.average_cost = if new_total.is_zero() { Money::ZERO } else { new_total_cost / new_total };
            holding.total_cost = new_total_cost;
            holding.total = new_total;
            holding.free += qty_delta;
        } else {
            holding.total += qty_delta;
            holding.free += qty_delta;
            if holding.total <= Money::ZERO {
                holding.total = Money::ZERO;
                holding.free = Money::ZERO;
                holding.status = HoldingStatus::Closed;
                holding.closed_at = Some(Utc::now());
            }
        }

        holding.current_price = price;
        holding.current_value = holding.total * price;
        holding.unrealized_pnl = holding.current_value - holding.total * holding.average_cost;
        holding.last_updated_at = Utc::now();

        let id = self.store.upsert_holding(&holding).await?;
        holding.id = id;
        Ok(holding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MarginType, Platform, TradingMode};
    use rust_decimal_macros::dec;

    fn base_position() -> FuturesPosition {
        FuturesPosition {
            id: 0,
            council_id: 1,
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

    #[test]
    fn long_profit_matches_literal_scenario() {
        // bal=10000, conf=0.75, lev=15, margin=6.67, qty=0.002, close@51000, fees=0.50 -> pnl=1.50
        let pnl = directional_pnl(PositionSide::Long, dec!(0.002), dec!(50000), dec!(51000));
        assert_eq!(pnl, dec!(2.000));
        let realized = pnl - dec!(0.50) - dec!(0);
        assert_eq!(realized, dec!(1.500));
    }

    #[test]
    fn short_loss_matches_literal_scenario() {
        // conf=0.80, lev=20, qty=0.1, close@3100, fees=0.30 -> pnl=-10.30
        let pnl = directional_pnl(PositionSide::Short, dec!(0.1), dec!(3000), dec!(3100));
        assert_eq!(pnl, dec!(-10.0));
        let realized = pnl - dec!(0.30) - dec!(0);
        assert_eq!(realized, dec!(-10.30));
    }

    #[test]
    fn both_side_direction_follows_amount_sign() {
        let long_like = directional_pnl(PositionSide::Both, dec!(1), dec!(100), dec!(110));
        assert_eq!(long_like, dec!(10));
        let short_like = directional_pnl(PositionSide::Both, dec!(-1), dec!(100), dec!(110));
        assert_eq!(short_like, dec!(-10));
    }

    #[test]
    fn update_mark_price_bumps_max_notional_monotonically() {
        let mut position = base_position();
        position.max_notional = dec!(100);
        position.notional = position.position_amt.abs() * position.mark_price;

        // simulate what update_mark_price would compute without a store round-trip
        let mark_price = dec!(60000);
        position.unrealized_profit =
            directional_pnl(position.position_side, position.position_amt, position.entry_price, mark_price);
        position.notional = position.position_amt.abs() * mark_price;
        position.max_notional = position.max_notional.max(position.notional);

        assert_eq!(position.max_notional, dec!(120));

        // a subsequent lower mark must not shrink max_notional
        let lower_notional = position.position_amt.abs() * dec!(55000);
        position.max_notional = position.max_notional.max(lower_notional);
        assert_eq!(position.max_notional, dec!(120));
    }
}
