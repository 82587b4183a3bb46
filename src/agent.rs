//! Agent Adapter (AA): translates a council decision payload into a single
//! `TradingRouter::execute_trade` call, normalizing side strings and adding
//! no business logic of its own.
//!
//! Grounded in `src/agents/futures_trading_agent.py` of the original
//! implementation: the adapter there does no default-filling for omitted
//! exit-plan levels, and neither does this one.

use rust_decimal::Decimal;

use crate::domain::OrderSide;
use crate::router::{ExecuteTradeOutcome, ExitPlanRequest, TradingRouter};

/// Raw decision payload as received from the council layer, before side
/// normalization.
#[derive(Debug, Clone)]
pub struct CouncilDecision {
    pub council_id: i64,
    pub symbol: String,
    pub side: String,
    pub desired_usd: Decimal,
    pub confidence: Decimal,
    pub leverage: Option<u32>,
    pub stop_loss: Option<Decimal>,
    pub take_profit_short: Option<Decimal>,
    pub take_profit_mid: Option<Decimal>,
    pub take_profit_long: Option<Decimal>,
    pub agent_reasoning: Option<String>,
}

/// Normalizes the free-form side string the council decision carries
/// (`"buy"`, `"BUY"`, `"long"`, `"sell"`, `"SELL"`, `"short"`, …) into the
/// router's `OrderSide`.
pub fn normalize_side(raw: &str) -> Option<OrderSide> {
    match raw.to_ascii_lowercase().as_str() {
        "buy" | "long" => Some(OrderSide::Buy),
        "sell" | "short" => Some(OrderSide::Sell),
        _ => None,
    }
}

pub struct AgentAdapter {
    router: TradingRouter,
}

impl AgentAdapter {
    pub fn new(router: TradingRouter) -> Self {
        Self { router }
    }

    pub async fn dispatch(&self, decision: CouncilDecision) -> anyhow::Result<ExecuteTradeOutcome> {
        let Some(side) = normalize_side(&decision.side) else {
            return Ok(ExecuteTradeOutcome {
                success: false,
                position_id: None,
                holding_id: None,
                order_id: None,
                platform: None,
                error: Some(format!("unrecognized side: {}", decision.side)),
            });
        };

        let exit_plan = ExitPlanRequest {
            stop_loss: decision.stop_loss,
            take_profit_short: decision.take_profit_short,
            take_profit_mid: decision.take_profit_mid,
            take_profit_long: decision.take_profit_long,
        };

        self.router
            .execute_trade(
                decision.council_id,
                &decision.symbol,
                side,
                decision.desired_usd,
                decision.confidence,
                decision.leverage,
                exit_plan,
                decision.agent_reasoning,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_side_accepts_buy_sell_long_short_case_insensitive() {
        assert_eq!(normalize_side("buy"), Some(OrderSide::Buy));
        assert_eq!(normalize_side("BUY"), Some(OrderSide::Buy));
        assert_eq!(normalize_side("long"), Some(OrderSide::Buy));
        assert_eq!(normalize_side("sell"), Some(OrderSide::Sell));
        assert_eq!(normalize_side("SHORT"), Some(OrderSide::Sell));
        assert_eq!(normalize_side("sideways"), None);
    }
}
