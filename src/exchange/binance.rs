//! Concrete `ExchangeClient` for Binance-style futures REST APIs (used for
//! both the testnet "paper" venue and the live "real" venue; only the base
//! URL and credentials differ).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Method;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::VenueConfig;
use crate::domain::{OrderSide, Platform, PositionSide};
use crate::error::{map_venue_error, ExchangeError, VenueContext};
use crate::money::{SymbolFilterCache, SymbolFilters};
use crate::ratelimit::{OrderLimiter, RequestLimiter};

use super::dto::{
    AccountInfo, ExchangeOrder, ExchangePosition, Kline, OrderQueryFilters, PlaceOrderRequest, RawSymbolInfo, Ticker,
};
use super::signing::{canonicalize, sign};
use super::{effective_direction, ExchangeClient, MarginTypeReq};

const MAX_RETRIES: u32 = 3;

pub struct BinanceClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    recv_window_ms: u64,
    platform: Platform,
    symbol_filters: SymbolFilterCache,
    request_limiter: RequestLimiter,
    order_limiter: OrderLimiter,
}

impl BinanceClient {
    pub fn new(venue: &VenueConfig, requests_per_minute: u32, orders_per_10s: u32, orders_per_day: u32) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(venue.request_timeout).build()?;
        Ok(Self {
            http,
            base_url: venue.base_url.clone(),
            api_key: venue.api_key.clone(),
            api_secret: venue.api_secret.clone(),
            recv_window_ms: venue.recv_window_ms,
            platform: Platform::Binance,
            symbol_filters: SymbolFilterCache::new(),
            request_limiter: RequestLimiter::new(requests_per_minute),
            order_limiter: OrderLimiter::new(orders_per_10s, orders_per_day),
        })
    }

    fn url_with_query(&self, endpoint: &str, query: &str) -> String {
        if query.is_empty() {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}{}?{}", self.base_url, endpoint, query)
        }
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        params: Vec<(&str, String)>,
        signed: bool,
        weight: u32,
    ) -> anyhow::Result<T> {
        self.request_limiter.acquire(weight).await;

        let mut attempt = 0u32;
        loop {
            let mut query = params.clone();
            if signed {
                query.push(("timestamp", Utc::now().timestamp_millis().to_string()));
                query.push(("recvWindow", self.recv_window_ms.to_string()));
            }
            let canonical = canonicalize(&query);
            let url = if signed {
                let signature = sign(&self.api_secret, &canonical);
                self.url_with_query(endpoint, &format!("{canonical}&signature={signature}"))
            } else {
                self.url_with_query(endpoint, &canonical)
            };

            let mut builder = self.http.request(method.clone(), &url);
            if signed {
                builder = builder.header("X-MBX-APIKEY", &self.api_key);
            }

            let outcome = builder.send().await;
            let transport_err = match outcome {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if status >= 400 {
                        let body: Value = resp.json().await.unwrap_or(Value::Null);
                        let code = body.get("code").and_then(Value::as_i64);
                        let msg = body.get("msg").and_then(Value::as_str);
                        map_venue_error(status, code, msg)
                    } else {
                        return resp.json::<T>().await.map_err(|e| {
                            anyhow::Error::from(ExchangeError::Transport(VenueContext {
                                code: None,
                                raw: Some(format!("decode error: {e}")),
                            }))
                        });
                    }
                }
                Err(e) => ExchangeError::Transport(VenueContext { code: None, raw: Some(e.to_string()) }),
            };

            if transport_err.is_retryable() && attempt < MAX_RETRIES {
                let delay = transport_err.backoff(attempt);
                warn!(attempt, delay_secs = delay.as_secs(), endpoint, "retrying after exchange error");
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }
            return Err(transport_err.into());
        }
    }

    fn parse_symbol_filters(raw: &RawSymbolInfo) -> anyhow::Result<SymbolFilters> {
        let mut step_size = None;
        let mut min_qty = None;
        let mut max_qty = None;
        let mut tick_size = None;
        let mut min_notional = Decimal::ZERO;

        for filter in &raw.filters {
            match filter.filter_type.as_str() {
                "LOT_SIZE" | "MARKET_LOT_SIZE" => {
                    step_size = filter.step_size.or(step_size);
                    min_qty = filter.min_qty.or(min_qty);
                    max_qty = filter.max_qty.or(max_qty);
                }
                "PRICE_FILTER" => {
                    tick_size = filter.tick_size.or(tick_size);
                }
                "MIN_NOTIONAL" | "NOTIONAL" => {
                    if let Some(n) = filter.notional {
                        min_notional = n;
                    }
                }
                _ => {}
            }
        }

        Ok(SymbolFilters {
            step_size: step_size.unwrap_or(Decimal::new(1, 3)),
            min_qty: min_qty.unwrap_or(Decimal::new(1, 3)),
            max_qty: max_qty.unwrap_or(Decimal::new(9_000_000, 0)),
            tick_size: tick_size.unwrap_or(Decimal::new(1, 2)),
            min_notional,
        })
    }

    /// Klines arrive as positional arrays
    /// (`[openTime, open, high, low, close, volume, closeTime, ...]`), not
    /// named objects, so they're parsed by index rather than `Deserialize`.
    fn parse_klines(raw: Vec<Value>) -> anyhow::Result<Vec<Kline>> {
        raw.into_iter()
            .map(|row| {
                let arr = row.as_array().ok_or_else(|| anyhow::anyhow!("kline row is not an array"))?;
                let field_str = |i: usize| -> anyhow::Result<&str> {
                    arr.get(i).and_then(Value::as_str).ok_or_else(|| anyhow::anyhow!("missing kline field {i}"))
                };
                let open_time_ms = arr
                    .first()
                    .and_then(Value::as_i64)
                    .ok_or_else(|| anyhow::anyhow!("missing kline open time"))?;
                Ok(Kline {
                    open_time: Utc.timestamp_millis_opt(open_time_ms).single().unwrap_or_else(Utc::now),
                    open: field_str(1)?.parse()?,
                    high: field_str(2)?.parse()?,
                    low: field_str(3)?.parse()?,
                    close: field_str(4)?.parse()?,
                    volume: field_str(5)?.parse()?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn get_ticker(&self, symbol: &str) -> anyhow::Result<Ticker> {
        self.request(
            Method::GET,
            "/fapi/v1/ticker/price",
            vec![("symbol", symbol.to_string())],
            false,
            1,
        )
        .await
    }

    async fn get_klines(&self, symbol: &str, interval: &str, limit: u32) -> anyhow::Result<Vec<Kline>> {
        let raw: Vec<Value> = self
            .request(
                Method::GET,
                "/fapi/v1/klines",
                vec![
                    ("symbol", symbol.to_string()),
                    ("interval", interval.to_string()),
                    ("limit", limit.to_string()),
                ],
                false,
                1,
            )
            .await?;
        Self::parse_klines(raw)
    }

    async fn get_symbol_info(&self, symbol: &str) -> anyhow::Result<SymbolFilters> {
        if let Some(cached) = self.symbol_filters.get(self.platform.as_str(), symbol) {
            return Ok(cached);
        }
        let raw: RawSymbolInfo = self
            .request(
                Method::GET,
                "/fapi/v1/exchangeInfo",
                vec![("symbol", symbol.to_string())],
                false,
                1,
            )
            .await?;
        let filters = Self::parse_symbol_filters(&raw)?;
        self.symbol_filters.insert(self.platform.as_str(), symbol, filters);
        Ok(filters)
    }

    async fn get_account(&self) -> anyhow::Result<AccountInfo> {
        self.request(Method::GET, "/fapi/v2/account", vec![], true, 5).await
    }

    async fn get_positions(&self, symbol: Option<&str>) -> anyhow::Result<Vec<ExchangePosition>> {
        let mut params = vec![];
        if let Some(symbol) = symbol {
            params.push(("symbol", symbol.to_string()));
        }
        let positions: Vec<ExchangePosition> =
            self.request(Method::GET, "/fapi/v2/positionRisk", params, true, 5).await?;
        Ok(positions.into_iter().filter(|p| !p.position_amount.is_zero()).collect())
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> anyhow::Result<()> {
        let _: Value = self
            .request(
                Method::POST,
                "/fapi/v1/leverage",
                vec![("symbol", symbol.to_string()), ("leverage", leverage.to_string())],
                true,
                1,
            )
            .await?;
        Ok(())
    }

    async fn set_margin_type(&self, symbol: &str, margin_type: MarginTypeReq) -> anyhow::Result<()> {
        let value = match margin_type {
            MarginTypeReq::Isolated => "ISOLATED",
            MarginTypeReq::Crossed => "CROSSED",
        };
        let result: anyhow::Result<Value> = self
            .request(
                Method::POST,
                "/fapi/v1/marginType",
                vec![("symbol", symbol.to_string()), ("marginType", value.to_string())],
                true,
                1,
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => match e.downcast_ref::<ExchangeError>() {
                // "No need to change margin type" is reported as an order-rejection-class
                // code by the venue; swallow it, matching the idempotent contract.
                Some(ExchangeError::OrderRejected { ctx, .. }) if ctx.code == Some(-4046) => {
                    info!(symbol, "margin type already set, treating as success");
                    Ok(())
                }
                _ => Err(e),
            },
        }
    }

    async fn place_order(&self, request: PlaceOrderRequest) -> anyhow::Result<ExchangeOrder> {
        self.order_limiter.acquire_order().await?;

        let mut params = vec![
            ("symbol", request.symbol.clone()),
            ("side", request.side.as_str().to_string()),
            ("type", request.order_type.as_str().to_string()),
            ("quantity", request.quantity.to_string()),
        ];
        if let Some(price) = request.price {
            params.push(("price", price.to_string()));
        }
        if let Some(stop_price) = request.stop_price {
            params.push(("stopPrice", stop_price.to_string()));
        }
        if let Some(position_side) = request.position_side {
            params.push(("positionSide", position_side.as_str().to_string()));
        }
        if let Some(time_in_force) = request.time_in_force {
            params.push(("timeInForce", time_in_force.as_str().to_string()));
        }
        if request.reduce_only {
            params.push(("reduceOnly", "true".to_string()));
        }

        self.request(Method::POST, "/fapi/v1/order", params, true, 1).await
    }

    async fn modify_order(
        &self,
        symbol: &str,
        order_id: i64,
        quantity: Option<Decimal>,
        price: Option<Decimal>,
    ) -> anyhow::Result<ExchangeOrder> {
        let mut params = vec![("symbol", symbol.to_string()), ("orderId", order_id.to_string())];
        if let Some(quantity) = quantity {
            params.push(("quantity", quantity.to_string()));
        }
        if let Some(price) = price {
            params.push(("price", price.to_string()));
        }
        self.request(Method::PUT, "/fapi/v1/order", params, true, 1).await
    }

    async fn cancel_order(&self, symbol: &str, order_id: i64) -> anyhow::Result<()> {
        let _: Value = self
            .request(
                Method::DELETE,
                "/fapi/v1/order",
                vec![("symbol", symbol.to_string()), ("orderId", order_id.to_string())],
                true,
                1,
            )
            .await?;
        Ok(())
    }

    async fn cancel_all_orders(&self, symbol: &str) -> anyhow::Result<()> {
        let _: Value = self
            .request(Method::DELETE, "/fapi/v1/allOpenOrders", vec![("symbol", symbol.to_string())], true, 1)
            .await?;
        Ok(())
    }

    async fn place_batch_orders(&self, orders: Vec<PlaceOrderRequest>) -> anyhow::Result<Vec<ExchangeOrder>> {
        if orders.is_empty() {
            return Ok(vec![]);
        }
        if orders.len() > 5 {
            return Err(ExchangeError::validation("orders", "batch limited to 5 orders").into());
        }
        self.order_limiter.acquire_order().await?;

        // Wire format: a genuine JSON array (see DESIGN.md Open Question notes),
        // not the stringified-list form the original source's venue client used.
        let batch = serde_json::to_string(&orders)?;
        self.request(
            Method::POST,
            "/fapi/v1/batchOrders",
            vec![("batchOrders", batch)],
            true,
            5,
        )
        .await
    }

    async fn get_open_orders(&self, symbol: Option<&str>) -> anyhow::Result<Vec<ExchangeOrder>> {
        let mut params = vec![];
        if let Some(symbol) = symbol {
            params.push(("symbol", symbol.to_string()));
        }
        self.request(Method::GET, "/fapi/v1/openOrders", params, true, 1).await
    }

    async fn get_all_orders(&self, symbol: &str, filters: OrderQueryFilters) -> anyhow::Result<Vec<ExchangeOrder>> {
        let mut params = vec![("symbol", symbol.to_string()), ("limit", filters.limit.unwrap_or(500).min(1000).to_string())];
        if let Some(order_id) = filters.order_id {
            params.push(("orderId", order_id.to_string()));
        }
        if let Some(start_time) = filters.start_time {
            params.push(("startTime", start_time.timestamp_millis().to_string()));
        }
        if let Some(end_time) = filters.end_time {
            params.push(("endTime", end_time.timestamp_millis().to_string()));
        }
        self.request(Method::GET, "/fapi/v1/allOrders", params, true, 1).await
    }

    async fn close_position(&self, symbol: &str, side: PositionSide) -> anyhow::Result<Option<ExchangeOrder>> {
        let positions = self.get_positions(Some(symbol)).await?;
        let mut last_order = None;

        match side {
            PositionSide::Both => {
                for position in positions {
                    let Some(direction) = effective_direction(position.position_side, position.position_amount) else {
                        continue;
                    };
                    let order = self
                        .place_order(
                            PlaceOrderRequest::market(symbol, direction.opposite(), position.position_amount.abs())
                                .with_position_side(position.position_side)
                                .reduce_only(true),
                        )
                        .await?;
                    last_order = Some(order);
                }
            }
            requested @ (PositionSide::Long | PositionSide::Short) => {
                let wanted_amt_sign_positive = matches!(requested, PositionSide::Long);
                let matched = positions.into_iter().find(|p| {
                    p.position_side == requested
                        || (p.position_side == PositionSide::Both
                            && (p.position_amount.is_sign_positive() == wanted_amt_sign_positive)
                            && !p.position_amount.is_zero())
                });
                if let Some(position) = matched {
                    let direction = if wanted_amt_sign_positive { OrderSide::Sell } else { OrderSide::Buy };
                    let order = self
                        .place_order(
                            PlaceOrderRequest::market(symbol, direction, position.position_amount.abs())
                                .with_position_side(position.position_side)
                                .reduce_only(true),
                        )
                        .await?;
                    last_order = Some(order);
                }
            }
        }

        Ok(last_order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_symbol_filters_reads_lot_size_and_notional() {
        let raw: RawSymbolInfo = serde_json::from_value(serde_json::json!({
            "symbol": "BTCUSDT",
            "filters": [
                {"filterType": "LOT_SIZE", "stepSize": "0.001", "minQty": "0.001", "maxQty": "1000"},
                {"filterType": "PRICE_FILTER", "tickSize": "0.01"},
                {"filterType": "MIN_NOTIONAL", "notional": "10"}
            ]
        }))
        .unwrap();

        let filters = BinanceClient::parse_symbol_filters(&raw).unwrap();
        assert_eq!(filters.step_size.to_string(), "0.001");
        assert_eq!(filters.min_notional.to_string(), "10");
    }
}
