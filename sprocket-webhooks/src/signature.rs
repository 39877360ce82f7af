//! Webhook signature generation and verification

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Prefix of the `x-hub-signature-256` header value
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// HMAC-SHA256 signer/verifier bound to a webhook secret
#[derive(Clone)]
pub struct WebhookSignature {
    secret: String,
}

impl std::fmt::Debug for WebhookSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSignature")
            .field("secret", &"[redacted]")
            .finish()
    }
}

impl WebhookSignature {
    /// Create a new signature utility with the given secret
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Sign a payload, producing `sha256=<hex>`
    pub fn sign(&self, payload: &[u8]) -> String {
        let mut mac =
            HmacSha256::new_from_slice(self.secret.as_bytes()).expect("HMAC can take any size key");
        mac.update(payload);
        format!("{}{}", SIGNATURE_PREFIX, hex::encode(mac.finalize().into_bytes()))
    }

    /// Verify a `sha256=<hex>` header against the exact bytes received.
    ///
    /// Fails closed: an empty header, a missing prefix, bad hex, or a
    /// mismatch all return `false`. The digest comparison is constant-time.
    pub fn verify(&self, payload: &[u8], signature: &str) -> bool {
        let Some(hex_digest) = signature.trim().strip_prefix(SIGNATURE_PREFIX) else {
            return false;
        };
        let Ok(expected) = hex::decode(hex_digest) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(self.secret.as_bytes()) else {
            return false;
        };

        mac.update(payload);
        mac.verify_slice(&expected).is_ok()
    }
}

/// Sign `payload` with `secret`
pub fn sign(secret: &str, payload: &[u8]) -> String {
    WebhookSignature::new(secret).sign(payload)
}

/// Verify `signature` for `payload` with `secret`
pub fn verify(secret: &str, payload: &[u8], signature: &str) -> bool {
    WebhookSignature::new(secret).verify(payload, signature)
}

/// Header names of a GitHub webhook delivery
pub mod headers {
    /// Event name, e.g. `push`
    pub const EVENT: &str = "x-github-event";

    /// Unique delivery id
    pub const DELIVERY: &str = "x-github-delivery";

    /// `sha256=<hex>` HMAC of the body
    pub const SIGNATURE_256: &str = "x-hub-signature-256";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_format() {
        let signature = sign("secret", b"{}");
        assert!(signature.starts_with("sha256="));
        assert_eq!(signature.len(), SIGNATURE_PREFIX.len() + 64);
    }

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2
        let signature = sign("Jefe", b"what do ya want for nothing?");
        assert_eq!(
            signature,
            "sha256=5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_sign_and_verify() {
        let signer = WebhookSignature::new("test-secret");
        let payload = br#"{"action":"opened"}"#;

        let signature = signer.sign(payload);
        assert!(signer.verify(payload, &signature));
    }

    #[test]
    fn test_verify_wrong_secret() {
        let payload = b"test payload";
        let signature = sign("secret1", payload);
        assert!(!verify("secret2", payload, &signature));
    }

    #[test]
    fn test_verify_tampered_body() {
        let signature = sign("secret", br#"{"ref":"main"}"#);
        assert!(!verify("secret", br#"{"ref":"evil"}"#, &signature));
        assert!(!verify("secret", br#"{ "ref":"main"}"#, &signature));
    }

    #[test]
    fn test_verify_malformed_headers() {
        let payload = b"payload";
        let digest = sign("secret", payload);
        let bare = digest.trim_start_matches(SIGNATURE_PREFIX);

        assert!(!verify("secret", payload, ""));
        assert!(!verify("secret", payload, bare));
        assert!(!verify("secret", payload, &format!("sha1={}", bare)));
        assert!(!verify("secret", payload, "sha256=not-hex"));
        assert!(!verify("secret", payload, &digest[..digest.len() - 2]));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let signer = WebhookSignature::new("hunter2");
        assert!(!format!("{:?}", signer).contains("hunter2"));
    }
}
