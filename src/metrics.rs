//! Metrics Aggregator (MA): idempotent recomputation of council-level
//! aggregate fields from the authoritative position/holding rows.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::domain::{Council, FuturesPosition, PositionSide, PositionStatus};
use crate::money::Money;
use crate::store::Store;

pub struct MetricsAggregator {
    store: Store,
}

/// Which side a stored position counts toward for hold-time accounting.
/// `BOTH` positions (one-way mode) are bucketed by the sign of their amount,
/// matching the same convention used for directional PnL.
fn hold_side(position: &FuturesPosition) -> HoldSide {
    match position.position_side {
        PositionSide::Long => HoldSide::Long,
        PositionSide::Short => HoldSide::Short,
        PositionSide::Both => {
            if position.position_amt.is_sign_negative() {
                HoldSide::Short
            } else {
                HoldSide::Long
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HoldSide {
    Long,
    Short,
}

/// Total seconds, within `[window_start, now]`, during which at least one
/// position of `side` was open. Overlapping intervals are merged so
/// concurrent positions on the same side aren't double-counted.
fn seconds_held(positions: &[&FuturesPosition], side: HoldSide, window_start: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let mut intervals: Vec<(DateTime<Utc>, DateTime<Utc>)> = positions
        .iter()
        .filter(|p| hold_side(p) == side)
        .map(|p| {
            let start = p.opened_at.max(window_start);
            let end = p.closed_at.unwrap_or(now).min(now);
            (start, end)
        })
        .filter(|(start, end)| end > start)
        .collect();

    intervals.sort_by_key(|(start, _)| *start);

    let mut merged_seconds = 0.0;
    let mut current: Option<(DateTime<Utc>, DateTime<Utc>)> = None;
    for (start, end) in intervals.drain(..) {
        current = match current {
            None => Some((start, end)),
            Some((cur_start, cur_end)) if start <= cur_end => Some((cur_start, cur_end.max(end))),
            Some((cur_start, cur_end)) => {
                merged_seconds += (cur_end - cur_start).num_milliseconds() as f64 / 1000.0;
                Some((start, end))
            }
        };
    }
    if let Some((start, end)) = current {
        merged_seconds += (end - start).num_milliseconds() as f64 / 1000.0;
    }
    merged_seconds
}

impl MetricsAggregator {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn refresh(&self, council_id: i64) -> anyhow::Result<Council> {
        let mut council = self
            .store
            .find_council(council_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("council {council_id} not found"))?;

        let positions = self.store.find_all_positions(council_id).await?;
        let active_holdings = self.store.count_active_holdings(council_id).await?;

        let open: Vec<&FuturesPosition> = positions.iter().filter(|p| p.status == PositionStatus::Open).collect();
        let closed: Vec<&FuturesPosition> = positions.iter().filter(|p| p.status != PositionStatus::Open).collect();

        council.total_unrealized_profit = open.iter().map(|p| p.unrealized_profit).sum();
        council.total_realized_pnl = closed.iter().filter_map(|p| p.realized_pnl).sum();
        council.open_futures_count = open.len() as i64;
        council.closed_futures_count = closed.len() as i64;
        council.active_spot_holdings = active_holdings;

        council.total_fees = positions.iter().map(|p| p.fees_paid).sum();
        council.total_funding_fees = positions.iter().map(|p| p.funding_fees).sum();
        council.net_pnl = council.total_realized_pnl + council.total_unrealized_profit
            - council.total_fees
            - council.total_funding_fees;

        let realized: Vec<Money> = closed.iter().filter_map(|p| p.realized_pnl).collect();
        if let Some(&first) = realized.first() {
            council.biggest_win = realized.iter().copied().fold(first, Money::max);
            council.biggest_loss = realized.iter().copied().fold(first, Money::min);
        }

        if !open.is_empty() {
            let total_leverage: i64 = open.iter().map(|p| p.leverage as i64).sum();
            council.average_leverage = Money::from(total_leverage) / Money::from(open.len() as i64);
        } else {
            council.average_leverage = Money::ZERO;
        }

        let confidences: Vec<Money> = positions.iter().filter_map(|p| p.confidence).collect();
        if !confidences.is_empty() {
            let sum: Money = confidences.iter().copied().sum();
            council.average_confidence = sum / Money::from(confidences.len() as i64);
        } else {
            council.average_confidence = Money::ZERO;
        }

        // A council with no position history gets long=0, short=0, flat=100
        // (the original implementation's behavior for an uninitialized window).
        if positions.is_empty() {
            council.long_hold_pct = Money::ZERO;
            council.short_hold_pct = Money::ZERO;
            council.flat_hold_pct = Money::from(100);
        } else {
            let now = Utc::now();
            let window_start = council.created_at;
            let window_secs = (now - window_start).num_milliseconds() as f64 / 1000.0;
            if window_secs <= 0.0 {
                council.long_hold_pct = Money::ZERO;
                council.short_hold_pct = Money::ZERO;
                council.flat_hold_pct = Money::from(100);
            } else {
                let refs: Vec<&FuturesPosition> = positions.iter().collect();
                let long_secs = seconds_held(&refs, HoldSide::Long, window_start, now);
                let short_secs = seconds_held(&refs, HoldSide::Short, window_start, now);
                let long_pct = (long_secs / window_secs * 100.0).clamp(0.0, 100.0);
                let short_pct = (short_secs / window_secs * 100.0).clamp(0.0, 100.0 - long_pct);
                council.long_hold_pct = Money::try_from(long_pct).unwrap_or(Money::ZERO);
                council.short_hold_pct = Money::try_from(short_pct).unwrap_or(Money::ZERO);
                council.flat_hold_pct = Money::from(100) - council.long_hold_pct - council.short_hold_pct;
            }
        }

        self.store.save_council(&council).await?;

        info!(
            council_id,
            open = council.open_futures_count,
            closed = council.closed_futures_count,
            net_pnl = %council.net_pnl,
            "metrics refreshed"
        );
        Ok(council)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MarginType, Platform, TradingMode};
    use chrono::Duration as ChronoDuration;
    use rust_decimal_macros::dec;

    fn position_with(side: PositionSide, amt: Money, opened_offset_secs: i64, closed_offset_secs: Option<i64>) -> FuturesPosition {
        let now = Utc::now();
        FuturesPosition {
            id: 1,
            council_id: 1,
            symbol: "BTCUSDT".into(),
            position_side: side,
            position_amt: amt,
            entry_price: dec!(100),
            mark_price: dec!(100),
            leverage: 10,
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
            status: if closed_offset_secs.is_some() { PositionStatus::Closed } else { PositionStatus::Open },
            opened_at: now + ChronoDuration::seconds(opened_offset_secs),
            closed_at: closed_offset_secs.map(|s| now + ChronoDuration::seconds(s)),
            confidence: Some(dec!(0.7)),
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
    fn hold_side_buckets_both_by_amount_sign() {
        let long_pos = position_with(PositionSide::Both, dec!(1), -100, Some(-50));
        let short_pos = position_with(PositionSide::Both, dec!(-1), -100, Some(-50));
        assert_eq!(hold_side(&long_pos), HoldSide::Long);
        assert_eq!(hold_side(&short_pos), HoldSide::Short);
    }

    #[test]
    fn seconds_held_merges_overlapping_intervals() {
        let now = Utc::now();
        let window_start = now - ChronoDuration::seconds(1000);
        let a = position_with(PositionSide::Long, dec!(1), -1000, Some(-500));
        let b = position_with(PositionSide::Long, dec!(1), -800, Some(-300));
        let refs = vec![&a, &b];
        let held = seconds_held(&refs, HoldSide::Long, window_start, now);
        // a: [-1000,-500], b: [-800,-300] -> merged [-1000,-300] = 700s
        assert!((held - 700.0).abs() < 1.0);
    }
}
