//! Gateway signature checks (HMAC-SHA256, hex encoded)

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn verify_hex(secret: &str, message: &[u8], signature_hex: &str) -> Result<(), &'static str> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| "HMAC key error")?;
    mac.update(message);

    // Constant-time comparison via hmac::verify_slice
    let sig_bytes = hex::decode(signature_hex.trim()).map_err(|_| "Invalid signature hex")?;
    mac.verify_slice(&sig_bytes)
        .map_err(|_| "Signature mismatch")
}

/// Checkout confirmation: HMAC over `"{gateway_order_id}|{gateway_payment_id}"`
pub fn verify_payment_signature(
    gateway_order_id: &str,
    gateway_payment_id: &str,
    signature: &str,
    key_secret: &str,
) -> Result<(), &'static str> {
    let message = format!("{gateway_order_id}|{gateway_payment_id}");
    verify_hex(key_secret, message.as_bytes(), signature)
}

/// Webhook delivery: HMAC over the raw request body
pub fn verify_webhook_signature(
    payload: &[u8],
    signature: &str,
    webhook_secret: &str,
) -> Result<(), &'static str> {
    verify_hex(webhook_secret, payload, signature)
}

/// Hex HMAC, used by tests and local tooling to produce valid signatures
pub fn sign(secret: &str, message: &[u8]) -> String {
    // new_from_slice only fails for fixed-size keys; HMAC accepts any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2
        let sig = sign("Jefe", b"what do ya want for nothing?");
        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_payment_signature_roundtrip() {
        let sig = sign("secret", b"order_123|pay_456");
        assert!(verify_payment_signature("order_123", "pay_456", &sig, "secret").is_ok());
        assert!(verify_payment_signature("order_123", "pay_457", &sig, "secret").is_err());
        assert!(verify_payment_signature("order_123", "pay_456", &sig, "other").is_err());
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(
            verify_payment_signature("o", "p", "not-hex", "secret"),
            Err("Invalid signature hex")
        );
        assert_eq!(
            verify_payment_signature("o", "p", "abcd", "secret"),
            Err("Signature mismatch")
        );
    }

    #[test]
    fn test_webhook_signature() {
        let body = br#"{"event":"payment.captured"}"#;
        let sig = sign("whsec", body);
        assert!(verify_webhook_signature(body, &sig, "whsec").is_ok());
        assert!(verify_webhook_signature(b"{}", &sig, "whsec").is_err());
    }
}
