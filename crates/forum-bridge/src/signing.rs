//! HMAC-SHA256 signing shared by every forum handoff.
//!
//! Signatures are lowercase hex over the base64 payload string, which is what
//! the forum computes on its side. Verification compares the hex text in
//! constant time, so any altered character fails.

use crate::error::{BridgeError, BridgeResult};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies SSO payloads with the shared forum secret.
#[derive(Clone)]
pub struct SsoSigner {
    mac: HmacSha256,
}

impl std::fmt::Debug for SsoSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsoSigner").field("key", &"[REDACTED]").finish()
    }
}

impl SsoSigner {
    /// Create a signer from the shared secret.
    pub fn new(secret: impl AsRef<[u8]>) -> BridgeResult<Self> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(BridgeError::Config("SSO secret must not be empty".to_string()));
        }
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| BridgeError::Config(format!("HMAC initialization failed: {}", e)))?;
        Ok(Self { mac })
    }

    /// Compute the hex signature of an encoded payload.
    pub fn sign(&self, payload: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Check a signature against an encoded payload (constant-time).
    pub fn verify(&self, payload: &str, signature: &str) -> bool {
        let expected = self.sign(payload);
        expected.as_bytes().ct_eq(signature.as_bytes()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> SsoSigner {
        SsoSigner::new("d836444a9e4084d5b224a60c208dce14").unwrap()
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(matches!(SsoSigner::new(""), Err(BridgeError::Config(_))));
    }

    #[test]
    fn test_sign_then_verify() {
        let signer = signer();
        let sig = signer.sign("payload");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert!(signer.verify("payload", &sig));
        assert!(!signer.verify("payload", ""));
        assert!(!signer.verify("payload", &sig[..63]));
    }

    #[test]
    fn test_single_bit_flips_fail() {
        let signer = signer();
        let payload = "bm9uY2U9YWJjJnJldHVybl9zc29fdXJsPWh0dHA=";
        let sig = signer.sign(payload);

        for i in 0..payload.len() {
            for bit in 0..8 {
                let mut bytes = payload.as_bytes().to_vec();
                bytes[i] ^= 1 << bit;
                if let Ok(flipped) = String::from_utf8(bytes) {
                    assert!(!signer.verify(&flipped, &sig), "payload byte {} bit {}", i, bit);
                }
            }
        }

        for i in 0..sig.len() {
            for bit in 0..8 {
                let mut bytes = sig.as_bytes().to_vec();
                bytes[i] ^= 1 << bit;
                if let Ok(flipped) = String::from_utf8(bytes) {
                    assert!(!signer.verify(payload, &flipped), "sig byte {} bit {}", i, bit);
                }
            }
        }
    }

    #[test]
    fn test_different_secret_fails() {
        let sig = signer().sign("payload");
        let other = SsoSigner::new("another-secret").unwrap();
        assert!(!other.verify("payload", &sig));
    }
}
