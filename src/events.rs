//! Event Broadcaster (EB): publishes consensus/trade/cycle-complete events
//! to subscribers over a `tokio::sync::broadcast` channel, mirroring the
//! teacher's own WebSocket fan-out pattern in its old `main.rs`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::domain::OrderSide;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    Consensus {
        council_id: i64,
        decision: String,
        symbol: String,
        confidence: Decimal,
        timestamp: DateTime<Utc>,
    },
    Trade {
        council_id: i64,
        symbol: String,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
        timestamp: DateTime<Utc>,
    },
}

pub struct EventBroadcaster {
    sender: broadcast::Sender<Event>,
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    fn publish(&self, event: Event) {
        if let Err(err) = self.sender.send(event) {
            debug!(error = %err, "no active subscribers for event");
        }
    }

    pub fn publish_consensus(&self, council_id: i64, decision: impl Into<String>, symbol: impl Into<String>, confidence: Decimal) {
        self.publish(Event::Consensus {
            council_id,
            decision: decision.into(),
            symbol: symbol.into(),
            confidence,
            timestamp: Utc::now(),
        });
    }

    pub fn publish_trade(&self, council_id: i64, symbol: impl Into<String>, side: OrderSide, quantity: Decimal, price: Decimal) {
        self.publish(Event::Trade {
            council_id,
            symbol: symbol.into(),
            side,
            quantity,
            price,
            timestamp: Utc::now(),
        });
    }

    /// Publishes a consensus event followed by each of `trades` in order.
    pub fn publish_cycle(
        &self,
        council_id: i64,
        decision: impl Into<String>,
        symbol: impl Into<String> + Clone,
        confidence: Decimal,
        trades: &[(OrderSide, Decimal, Decimal)],
    ) {
        self.publish_consensus(council_id, decision, symbol.clone(), confidence);
        for (side, quantity, price) in trades {
            self.publish_trade(council_id, symbol.clone(), *side, *quantity, *price);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let eb = EventBroadcaster::new(16);
        eb.publish_consensus(1, "open_long", "BTCUSDT", dec!(0.75));
    }

    #[tokio::test]
    async fn subscriber_receives_cycle_events_in_order() {
        let eb = EventBroadcaster::new(16);
        let mut rx = eb.subscribe();

        eb.publish_cycle(1, "open_long", "BTCUSDT", dec!(0.75), &[(OrderSide::Buy, dec!(0.002), dec!(50000))]);

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, Event::Consensus { .. }));
        let second = rx.recv().await.unwrap();
        assert!(matches!(second, Event::Trade { .. }));
    }
}
