//! Request signing for the venue's HMAC-SHA256 authentication scheme.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Canonicalize `params` (in caller-supplied order) as an ordered
/// `k=v&...` string, the exact bytes over which the signature is computed.
pub fn canonicalize(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// HMAC-SHA256 over the canonicalized query string, hex-encoded — matches
/// the venue's documented signing scheme (hex digest, not base64).
pub fn sign(secret: &str, canonical_query: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(canonical_query.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_preserves_order() {
        let params = vec![("symbol", "BTCUSDT".to_string()), ("side", "BUY".to_string())];
        assert_eq!(canonicalize(&params), "symbol=BTCUSDT&side=BUY");
    }

    #[test]
    fn sign_is_deterministic() {
        let a = sign("secret", "symbol=BTCUSDT&timestamp=1");
        let b = sign("secret", "symbol=BTCUSDT&timestamp=1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64); // hex-encoded SHA256 digest
    }

    #[test]
    fn sign_changes_with_input() {
        let a = sign("secret", "timestamp=1");
        let b = sign("secret", "timestamp=2");
        assert_ne!(a, b);
    }
}
