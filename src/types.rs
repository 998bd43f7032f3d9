//! Types that cross the client/server network boundary.
//!
//! [`SubscriptionDescriptor`] serializes to the same JSON shape as a browser's
//! `PushSubscription.toJSON()`, so a descriptor produced by any browser can be
//! posted to the `/push` routes unchanged.

use serde::{Deserialize, Serialize};

use crate::encoding::{decode_application_server_key, encode_application_server_key};

/// Options a subscription was (or will be) created with.
///
/// The application server key is always held as decoded bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Every push must result in a user-visible notification.
    pub user_visible_only: bool,
    /// Decoded VAPID public key of the application server.
    pub application_server_key: Option<Vec<u8>>,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            user_visible_only: true,
            application_server_key: None,
        }
    }
}

/// Client keys used by the push service to encrypt payloads (RFC 8291).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    /// User agent's P-256 ECDH public key (uncompressed point).
    #[serde(with = "base64url_bytes")]
    pub p256dh: Vec<u8>,
    /// 16-byte authentication secret.
    #[serde(with = "base64url_bytes")]
    pub auth: Vec<u8>,
}

impl SubscriptionKeys {
    /// `p256dh` as unpadded base64url.
    pub fn p256dh_base64url(&self) -> String {
        encode_application_server_key(&self.p256dh)
    }

    /// `auth` as unpadded base64url.
    pub fn auth_base64url(&self) -> String {
        encode_application_server_key(&self.auth)
    }
}

/// A push subscription: where to deliver, and how to encrypt for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionDescriptor {
    /// Push service endpoint URL.
    pub endpoint: String,
    /// Expiry in milliseconds since the epoch, if the push service set one.
    #[serde(rename = "expirationTime", default)]
    pub expiration_time: Option<u64>,
    /// Encryption keys for this subscription.
    pub keys: SubscriptionKeys,
    /// Options the subscription was created with (local only, never sent).
    #[serde(skip)]
    pub options: SubscribeOptions,
}

impl SubscriptionDescriptor {
    /// Canonical form of this descriptor's endpoint.
    pub fn canonical_endpoint(&self) -> Result<String, InvalidEndpoint> {
        canonical_endpoint(&self.endpoint)
    }
}

/// The endpoint is not an absolute http(s) URL.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("Invalid push endpoint {endpoint:?}: {reason}")]
pub struct InvalidEndpoint {
    /// Endpoint as received.
    pub endpoint: String,
    /// Why it was rejected.
    pub reason: String,
}

/// Normalize a push endpoint URI into the registry key.
///
/// Parsing lower-cases scheme and host, drops default ports and
/// percent-encodes consistently, so two spellings of the same endpoint map to
/// the same key.
pub fn canonical_endpoint(endpoint: &str) -> Result<String, InvalidEndpoint> {
    let invalid = |reason: String| InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason,
    };

    let url = reqwest::Url::parse(endpoint.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }

    Ok(url.to_string())
}

/// Body of `POST /push/subscribe` and `POST /push/unsubscribe`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EndpointRequest {
    /// The subscription being added or removed.
    pub endpoint: SubscriptionDescriptor,
}

/// Minimal response body of every `/push` route.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Outcome code, e.g. `SUBSCRIBED`.
    pub message: String,
}

impl MessageResponse {
    /// Response carrying `message`.
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// Serde adapter for byte fields carried as base64url strings.
mod base64url_bytes {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    use super::{decode_application_server_key, encode_application_server_key};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode_application_server_key(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        decode_application_server_key(&encoded).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(endpoint: &str) -> SubscriptionDescriptor {
        SubscriptionDescriptor {
            endpoint: endpoint.to_string(),
            expiration_time: None,
            keys: SubscriptionKeys {
                p256dh: vec![4, 1, 2, 3],
                auth: vec![9; 16],
            },
            options: SubscribeOptions::default(),
        }
    }

    #[test]
    fn test_descriptor_json_matches_browser_shape() {
        let json = serde_json::to_value(descriptor("https://push.example/ep1")).unwrap();
        assert_eq!(json["endpoint"], "https://push.example/ep1");
        assert!(json["expirationTime"].is_null());
        assert_eq!(json["keys"]["p256dh"], "BAECAw");
        assert_eq!(json["keys"]["auth"], "CQkJCQkJCQkJCQkJCQkJCQ");
        assert!(json.get("options").is_none(), "local options never leave the client");
    }

    #[test]
    fn test_descriptor_parses_browser_json() {
        let parsed: SubscriptionDescriptor = serde_json::from_str(
            r#"{"endpoint":"https://push.example/ep1","expirationTime":null,
                "keys":{"p256dh":"BAECAw","auth":"CQkJCQkJCQkJCQkJCQkJCQ"}}"#,
        )
        .unwrap();
        assert_eq!(parsed, descriptor("https://push.example/ep1"));
    }

    #[test]
    fn test_descriptor_without_expiration_field() {
        let parsed: SubscriptionDescriptor = serde_json::from_str(
            r#"{"endpoint":"https://push.example/ep1","keys":{"p256dh":"BAECAw","auth":"CQ"}}"#,
        )
        .unwrap();
        assert_eq!(parsed.expiration_time, None);
        assert_eq!(parsed.keys.auth, vec![9]);
    }

    #[test]
    fn test_canonical_endpoint_normalizes_spelling() {
        let a = canonical_endpoint("HTTPS://Push.Example:443/ep1").unwrap();
        let b = canonical_endpoint("https://push.example/ep1").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_canonical_endpoint_rejects_non_http() {
        assert!(canonical_endpoint("not a url").is_err());
        assert!(canonical_endpoint("mailto:someone@example.com").is_err());
    }
}
