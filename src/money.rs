//! Fixed-point money arithmetic and exchange precision rules.
//!
//! All monetary quantities in this crate are `rust_decimal::Decimal` (96-bit
//! mantissa, up to 28 fractional digits — comfortably inside the 20
//! integer / 8 fractional digit envelope this system needs). Binary floats
//! only appear at the venue JSON boundary, and only long enough to be
//! immediately parsed back into `Decimal` from their string representation.

use std::collections::HashMap;

use parking_lot::Mutex;
use rust_decimal::Decimal;

pub type Money = Decimal;

/// Result of a lot-size check against a symbol's declared quantity filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LotCheck {
    Ok,
    TooSmall,
    TooLarge,
    BadStep,
}

/// Result of a minimum-notional check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotionalCheck {
    Ok,
    BelowMin,
}

/// Venue-declared precision constraints for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolFilters {
    pub step_size: Decimal,
    pub min_qty: Decimal,
    pub max_qty: Decimal,
    pub tick_size: Decimal,
    pub min_notional: Decimal,
}

/// Round `qty` down to the nearest multiple of `step` (ROUND_DOWN, never
/// rejects for exceeding declared precision). `step` must be positive.
pub fn quantize_down(qty: Decimal, step: Decimal) -> Decimal {
    if step.is_zero() || qty.is_sign_negative() {
        return Decimal::ZERO;
    }
    let steps = (qty / step).trunc();
    steps * step
}

pub fn check_lot_size(qty: Decimal, min_qty: Decimal, max_qty: Decimal, step_size: Decimal) -> LotCheck {
    if step_size <= Decimal::ZERO {
        return LotCheck::BadStep;
    }
    if qty < min_qty {
        return LotCheck::TooSmall;
    }
    if qty > max_qty {
        return LotCheck::TooLarge;
    }
    let remainder = qty % step_size;
    if !remainder.is_zero() {
        return LotCheck::BadStep;
    }
    LotCheck::Ok
}

pub fn check_min_notional(qty: Decimal, price: Decimal, min_notional: Decimal) -> NotionalCheck {
    if qty * price < min_notional {
        NotionalCheck::BelowMin
    } else {
        NotionalCheck::Ok
    }
}

/// Weighted-average entry price on consolidation: `(Σ qty_i·price_i) / Σ qty_i`.
pub fn weighted_average_price(fills: &[(Decimal, Decimal)]) -> Option<Decimal> {
    let total_qty: Decimal = fills.iter().map(|(qty, _)| *qty).sum();
    if total_qty.is_zero() {
        return None;
    }
    let notional: Decimal = fills.iter().map(|(qty, price)| *qty * *price).sum();
    Some(notional / total_qty)
}

/// Per-process cache of symbol filters, keyed by (platform, symbol).
///
/// Populated lazily by the exchange client on first lookup and held for the
/// process lifetime, mirroring the venue's own expectation that filters
/// rarely change within a running session.
#[derive(Default)]
pub struct SymbolFilterCache {
    inner: Mutex<HashMap<(String, String), SymbolFilters>>,
}

impl SymbolFilterCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, platform: &str, symbol: &str) -> Option<SymbolFilters> {
        self.inner
            .lock()
            .get(&(platform.to_string(), symbol.to_string()))
            .copied()
    }

    pub fn insert(&self, platform: &str, symbol: &str, filters: SymbolFilters) {
        self.inner
            .lock()
            .insert((platform.to_string(), symbol.to_string()), filters);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn quantize_down_rounds_toward_zero() {
        assert_eq!(quantize_down(dec!(0.002001), dec!(0.001)), dec!(0.002));
        assert_eq!(quantize_down(dec!(0.0000002), dec!(0.001)), dec!(0));
        assert_eq!(quantize_down(dec!(0.1), dec!(0.01)), dec!(0.10));
    }

    #[test]
    fn quantize_down_is_idempotent_and_bounded() {
        let q = dec!(1.23456);
        let s = dec!(0.01);
        let quantized = quantize_down(q, s);
        assert!(quantized <= q);
        assert!((quantized % s).is_zero());
        assert_eq!(quantize_down(quantized, s), quantized);
    }

    #[test]
    fn lot_size_boundaries() {
        assert_eq!(check_lot_size(dec!(0.001), dec!(0.001), dec!(100), dec!(0.001)), LotCheck::Ok);
        assert_eq!(check_lot_size(dec!(0.0005), dec!(0.001), dec!(100), dec!(0.001)), LotCheck::TooSmall);
        assert_eq!(check_lot_size(dec!(200), dec!(0.001), dec!(100), dec!(0.001)), LotCheck::TooLarge);
        assert_eq!(check_lot_size(dec!(0.0015), dec!(0.001), dec!(100), dec!(0.001)), LotCheck::BadStep);
    }

    #[test]
    fn min_notional_boundaries() {
        assert_eq!(check_min_notional(dec!(0.002), dec!(5000), dec!(10)), NotionalCheck::Ok);
        assert_eq!(check_min_notional(dec!(0.0019999), dec!(5000), dec!(10)), NotionalCheck::BelowMin);
    }

    #[test]
    fn weighted_average_matches_manual_calc() {
        let avg = weighted_average_price(&[(dec!(1), dec!(100)), (dec!(3), dec!(200))]).unwrap();
        assert_eq!(avg, dec!(175));
    }

    #[test]
    fn symbol_filter_cache_roundtrips() {
        let cache = SymbolFilterCache::new();
        assert!(cache.get("binance", "BTCUSDT").is_none());
        cache.insert(
            "binance",
            "BTCUSDT",
            SymbolFilters {
                step_size: dec!(0.001),
                min_qty: dec!(0.001),
                max_qty: dec!(1000),
                tick_size: dec!(0.01),
                min_notional: dec!(10),
            },
        );
        assert_eq!(cache.get("binance", "BTCUSDT").unwrap().step_size, dec!(0.001));
    }
}
