//! Finite error taxonomy for exchange and routing failures.
//!
//! Retryability is a property of the variant, not of whatever happens to
//! catch it. Every fallible async method in this crate returns
//! `anyhow::Result<T>`; callers that need to branch on the structured kind
//! recover it with `err.downcast_ref::<ExchangeError>()`.

use std::fmt;

use thiserror::Error;

/// A venue error code plus the raw response body, carried on every variant
/// so the original payload survives for logging/reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VenueContext {
    pub code: Option<i64>,
    pub raw: Option<String>,
}

impl fmt::Display for VenueContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, &self.raw) {
            (Some(code), Some(raw)) => write!(f, "code={code} raw={raw}"),
            (Some(code), None) => write!(f, "code={code}"),
            (None, Some(raw)) => write!(f, "raw={raw}"),
            (None, None) => Ok(()),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("transport error ({0})")]
    Transport(VenueContext),

    #[error("throttled, retry after {retry_after_s}s ({ctx})")]
    Throttled { retry_after_s: u64, ctx: VenueContext },

    #[error("authentication rejected ({0})")]
    AuthRejected(VenueContext),

    #[error("order rejected: {reason} ({ctx})")]
    OrderRejected { reason: String, ctx: VenueContext },

    #[error("insufficient balance ({0})")]
    InsufficientBalance(VenueContext),

    #[error("invalid symbol ({0})")]
    InvalidSymbol(VenueContext),

    #[error("server error ({0})")]
    ServerError(VenueContext),

    #[error("validation failed: {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("policy violation: {reason}")]
    PolicyViolation { reason: String },

    #[error("not found ({0})")]
    NotFound(VenueContext),
}

impl ExchangeError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExchangeError::Transport(_) | ExchangeError::Throttled { .. } | ExchangeError::ServerError(_)
        )
    }

    /// Base delay before the next retry attempt, given a zero-indexed
    /// attempt number. Exponential backoff, base 1s, factor 2; capped at the
    /// variant's own `retry_after_s` when one is present.
    pub fn backoff(&self, attempt: u32) -> std::time::Duration {
        let exp = 2u64.saturating_pow(attempt);
        match self {
            ExchangeError::Throttled { retry_after_s, .. } => {
                std::time::Duration::from_secs(retry_after_s.saturating_mul(exp))
            }
            _ => std::time::Duration::from_secs(exp),
        }
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ExchangeError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn policy_violation(reason: impl Into<String>) -> Self {
        ExchangeError::PolicyViolation { reason: reason.into() }
    }
}

/// Maps a venue HTTP status + parsed `{code, msg}` body onto the taxonomy.
///
/// Mirrors the original venue client's `parse_binance_error`: specific
/// numeric error codes take priority over the HTTP status class.
pub fn map_venue_error(status: u16, code: Option<i64>, msg: Option<&str>) -> ExchangeError {
    let ctx = VenueContext {
        code,
        raw: msg.map(|m| m.to_string()),
    };

    match code {
        Some(-1003) => ExchangeError::Throttled { retry_after_s: 60, ctx },
        Some(-1015) => ExchangeError::Throttled { retry_after_s: 120, ctx },
        Some(-1022) | Some(-2014) | Some(-2015) => ExchangeError::AuthRejected(ctx),
        Some(-1111) | Some(-2010) | Some(-2011) | Some(-4164) => ExchangeError::OrderRejected {
            reason: msg.unwrap_or("order rejected").to_string(),
            ctx,
        },
        Some(-2019) => ExchangeError::InsufficientBalance(ctx),
        Some(-1121) => ExchangeError::InvalidSymbol(ctx),
        Some(-1007) => ExchangeError::Transport(ctx),
        _ => {
            if status == 429 {
                ExchangeError::Throttled { retry_after_s: 60, ctx }
            } else if status == 408 {
                ExchangeError::Transport(ctx)
            } else if (500..600).contains(&status) {
                ExchangeError::ServerError(ctx)
            } else {
                ExchangeError::Transport(ctx)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_codes() {
        assert!(matches!(
            map_venue_error(418, Some(-1003), None),
            ExchangeError::Throttled { retry_after_s: 60, .. }
        ));
        assert!(matches!(
            map_venue_error(418, Some(-1015), None),
            ExchangeError::Throttled { retry_after_s: 120, .. }
        ));
        assert!(matches!(map_venue_error(400, Some(-2019), None), ExchangeError::InsufficientBalance(_)));
        assert!(matches!(map_venue_error(400, Some(-1121), None), ExchangeError::InvalidSymbol(_)));
        assert!(matches!(map_venue_error(401, Some(-2015), None), ExchangeError::AuthRejected(_)));
    }

    #[test]
    fn maps_http_status_fallbacks() {
        assert!(matches!(map_venue_error(429, None, None), ExchangeError::Throttled { .. }));
        assert!(matches!(map_venue_error(503, None, None), ExchangeError::ServerError(_)));
        assert!(matches!(map_venue_error(408, None, None), ExchangeError::Transport(_)));
    }

    #[test]
    fn retryability_matches_taxonomy() {
        assert!(ExchangeError::Transport(VenueContext::default()).is_retryable());
        assert!(ExchangeError::ServerError(VenueContext::default()).is_retryable());
        assert!(ExchangeError::Throttled { retry_after_s: 1, ctx: VenueContext::default() }.is_retryable());
        assert!(!ExchangeError::AuthRejected(VenueContext::default()).is_retryable());
        assert!(!ExchangeError::policy_violation("x").is_retryable());
    }

    #[test]
    fn throttled_backoff_scales_with_attempt() {
        let err = ExchangeError::Throttled { retry_after_s: 2, ctx: VenueContext::default() };
        assert_eq!(err.backoff(0).as_secs(), 2);
        assert_eq!(err.backoff(1).as_secs(), 4);
        assert_eq!(err.backoff(2).as_secs(), 8);
    }
}
