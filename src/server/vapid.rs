//! VAPID key management for Web Push (RFC 8292).
//!
//! Keys are kept as base64url strings in the configuration file: the public
//! key as an uncompressed SEC1 point, which browsers take as
//! `applicationServerKey`, and the private key as the raw scalar that
//! `web-push`'s `VapidSignatureBuilder::from_base64()` expects.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine};
use p256::ecdsa::SigningKey;
use p256::elliptic_curve::rand_core::OsRng;
use serde::{Deserialize, Serialize};

use crate::encoding::decode_application_server_key;

/// VAPID keypair for web push authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VapidKeys {
    /// Raw 32-byte P-256 private key scalar (base64url).
    private_key_b64: String,
    /// Uncompressed public key bytes (base64url, 65 bytes decoded).
    public_key_b64: String,
}

impl VapidKeys {
    /// Generate a fresh VAPID keypair.
    pub fn generate() -> Result<Self> {
        let signing_key = SigningKey::random(&mut OsRng);
        Ok(Self::from_signing_key(&signing_key))
    }

    fn from_signing_key(signing_key: &SigningKey) -> Self {
        // SEC1 uncompressed public key (65 bytes: 0x04 || x || y)
        let public_bytes = signing_key.verifying_key().to_encoded_point(false);

        Self {
            private_key_b64: BASE64URL.encode(signing_key.to_bytes().as_slice()),
            public_key_b64: BASE64URL.encode(public_bytes.as_bytes()),
        }
    }

    /// Base64url-encoded uncompressed public key.
    ///
    /// Handed to browsers as the `applicationServerKey`.
    pub fn public_key_base64url(&self) -> &str {
        &self.public_key_b64
    }

    /// Base64url-encoded raw private key scalar.
    pub fn private_key_base64url(&self) -> &str {
        &self.private_key_b64
    }

    /// Reconstruct from configured base64url strings.
    ///
    /// Accepts padded or unpadded input. Checks the public key is an
    /// uncompressed P-256 point, the private key a valid scalar, and that the
    /// two belong together.
    pub fn from_base64url(public_key_b64: &str, private_key_b64: &str) -> Result<Self> {
        let pub_bytes = decode_application_server_key(public_key_b64)
            .context("Invalid base64url for VAPID public key")?;
        anyhow::ensure!(
            pub_bytes.len() == 65 && pub_bytes[0] == 0x04,
            "VAPID public key must be 65-byte uncompressed P-256 point"
        );

        let priv_bytes = decode_application_server_key(private_key_b64)
            .context("Invalid base64url for VAPID private key")?;
        anyhow::ensure!(
            priv_bytes.len() == 32,
            "VAPID private key must be 32-byte P-256 scalar, got {} bytes",
            priv_bytes.len()
        );
        let signing_key = SigningKey::from_bytes(priv_bytes.as_slice().into())
            .context("VAPID private key is not a valid P-256 scalar")?;

        let derived = Self::from_signing_key(&signing_key);
        anyhow::ensure!(
            derived.public_key_bytes()? == pub_bytes,
            "VAPID public key does not match the private key"
        );

        // Normalize to unpadded base64url for web-push
        Ok(derived)
    }

    /// Uncompressed public key bytes (65 bytes).
    pub fn public_key_bytes(&self) -> Result<Vec<u8>> {
        BASE64URL
            .decode(&self.public_key_b64)
            .context("Failed to decode VAPID public key")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_vapid_keys() {
        let keys = VapidKeys::generate().expect("should generate keys");

        let pub_bytes = keys.public_key_bytes().expect("decode public key");
        assert_eq!(pub_bytes.len(), 65, "uncompressed P-256 public key is 65 bytes");
        assert_eq!(pub_bytes[0], 0x04, "uncompressed point starts with 0x04");

        let priv_bytes = BASE64URL
            .decode(keys.private_key_base64url())
            .expect("decode private key");
        assert_eq!(priv_bytes.len(), 32, "raw P-256 scalar is 32 bytes");
    }

    #[test]
    fn test_from_base64url_accepts_generated_pair() {
        let keys = VapidKeys::generate().expect("should generate keys");
        let reconstructed =
            VapidKeys::from_base64url(keys.public_key_base64url(), keys.private_key_base64url())
                .expect("should reconstruct from base64url");

        assert_eq!(keys.public_key_base64url(), reconstructed.public_key_base64url());
        assert_eq!(keys.private_key_base64url(), reconstructed.private_key_base64url());
    }

    #[test]
    fn test_from_base64url_rejects_mismatched_pair() {
        let a = VapidKeys::generate().expect("generate a");
        let b = VapidKeys::generate().expect("generate b");
        assert!(VapidKeys::from_base64url(a.public_key_base64url(), b.private_key_base64url()).is_err());
    }

    #[test]
    fn test_from_base64url_rejects_invalid() {
        assert!(VapidKeys::from_base64url("not-valid-key", "also-bad").is_err());
    }

    #[test]
    fn test_vapid_key_works_with_web_push_from_base64() {
        use web_push::{SubscriptionInfo, VapidSignatureBuilder};

        let keys = VapidKeys::generate().expect("generate keys");
        let sub = SubscriptionInfo::new(
            "https://push.example.com/test",
            "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
            "AAAAAAAAAAAAAAAAAAAAAA",
        );
        let builder = VapidSignatureBuilder::from_base64(keys.private_key_base64url(), &sub);
        assert!(builder.is_ok(), "from_base64 should accept our raw key scalar");
    }
}
