//! Webhook signature verification: HMAC-SHA256 over the raw request body,
//! hex-encoded, compared in constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the caller-provided signature.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Compute the hex-encoded HMAC-SHA256 signature for a payload.
pub fn compute_signature(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a caller-provided signature against the expected one.
pub fn verify_signature(secret: &str, payload: &[u8], provided: &str) -> bool {
    let expected = compute_signature(secret, payload);
    bool::from(expected.as_bytes().ct_eq(provided.as_bytes()))
}

mod hex {
    /// Encode bytes as a lowercase hex string.
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_hex_and_deterministic() {
        let a = compute_signature("secret", b"payload");
        let b = compute_signature("secret", b"payload");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn signature_differs_by_secret_and_payload() {
        assert_ne!(
            compute_signature("secret_a", b"payload"),
            compute_signature("secret_b", b"payload")
        );
        assert_ne!(
            compute_signature("secret", b"payload_a"),
            compute_signature("secret", b"payload_b")
        );
    }

    #[test]
    fn verify_accepts_matching_signature() {
        let sig = compute_signature("secret", b"{\"event\":\"deploy\"}");
        assert!(verify_signature("secret", b"{\"event\":\"deploy\"}", &sig));
    }

    #[test]
    fn verify_rejects_wrong_value_and_wrong_length() {
        let sig = compute_signature("secret", b"body");
        assert!(!verify_signature("secret", b"tampered", &sig));
        assert!(!verify_signature("secret", b"body", "deadbeef"));
        assert!(!verify_signature("secret", b"body", ""));
    }
}
