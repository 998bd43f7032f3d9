//! Web push message delivery.
//!
//! Encrypts payloads (RFC 8291) and signs requests with VAPID (RFC 8292)
//! using the `web-push` crate, then sends the HTTP request via reqwest so the
//! response status can be classified into a [`DeliveryError`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ServerPushConfig;
use crate::constants::LEGACY_GATEWAY_PREFIX;
use crate::encoding::decode_application_server_key;
use crate::types::SubscriptionDescriptor;

/// Why a single delivery failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryError {
    /// The push service no longer knows the subscription (404/410).
    #[error("Subscription expired (HTTP {status})")]
    Expired {
        /// HTTP status returned by the push service.
        status: u16,
    },
    /// The push service asked us to slow down (429).
    #[error("Rate limited by push service")]
    RateLimited,
    /// VAPID signing failed or the push service rejected our credentials.
    #[error("Credentials rejected: {reason}")]
    Credentials {
        /// Description of the failure.
        reason: String,
    },
    /// Any other non-success status.
    #[error("Push service rejected message (HTTP {status}): {body}")]
    Rejected {
        /// HTTP status returned by the push service.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },
    /// The request never got a response.
    #[error("Network error: {reason}")]
    Network {
        /// Description of the failure.
        reason: String,
    },
    /// The delivery exceeded its timeout.
    #[error("Delivery timed out")]
    Timeout,
    /// The subscription's keys or endpoint cannot be used.
    #[error("Malformed subscription: {reason}")]
    MalformedSubscription {
        /// Description of the failure.
        reason: String,
    },
}

impl DeliveryError {
    /// Whether retrying this subscription can never succeed.
    ///
    /// Permanent failures remove the subscription from the registry.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Expired { .. } | Self::MalformedSubscription { .. })
    }
}

/// Sends one encrypted push message.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Deliver `payload` to `subscription`, authenticated with `config`.
    async fn deliver(
        &self,
        subscription: &SubscriptionDescriptor,
        payload: &[u8],
        config: &ServerPushConfig,
    ) -> Result<(), DeliveryError>;
}

/// [`PushTransport`] speaking RFC 8030 to real push services.
///
/// Reuses a single `reqwest::Client` across deliveries for connection pooling.
#[derive(Debug, Clone, Default)]
pub struct WebPushTransport {
    client: reqwest::Client,
}

fn is_legacy_gateway(endpoint: &str) -> bool {
    endpoint.starts_with(LEGACY_GATEWAY_PREFIX)
}

impl WebPushTransport {
    /// Transport over an existing HTTP client.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Encrypt `payload` for `subscription` and build the authorized request.
    ///
    /// Endpoints on the legacy GCM gateway carry `Authorization: key=...`
    /// when a gateway key is configured; everything else is VAPID-signed.
    pub fn build_request(
        &self,
        subscription: &SubscriptionDescriptor,
        payload: &[u8],
        config: &ServerPushConfig,
    ) -> Result<reqwest::Request, DeliveryError> {
        use web_push::{
            ContentEncoding, SubscriptionInfo, VapidSignatureBuilder, WebPushMessageBuilder,
        };

        let sub_info = SubscriptionInfo::new(
            &subscription.endpoint,
            &subscription.keys.p256dh_base64url(),
            &subscription.keys.auth_base64url(),
        );

        let mut builder = WebPushMessageBuilder::new(&sub_info);
        builder.set_payload(ContentEncoding::Aes128Gcm, payload);
        builder.set_ttl(config.ttl_seconds);

        let gateway_key = config
            .gateway_api_key
            .as_deref()
            .filter(|_| is_legacy_gateway(&subscription.endpoint));

        if gateway_key.is_none() {
            // from_base64 asserts on the scalar length instead of returning an error
            let scalar_len = decode_application_server_key(&config.vapid.private_key)
                .map(|bytes| bytes.len())
                .unwrap_or_default();
            if scalar_len != 32 {
                return Err(DeliveryError::Credentials {
                    reason: "VAPID private key is not a 32-byte scalar".to_string(),
                });
            }

            let mut sig_builder =
                VapidSignatureBuilder::from_base64(&config.vapid.private_key, &sub_info).map_err(
                    |e| DeliveryError::Credentials {
                        reason: format!("Failed to build VAPID signature: {e}"),
                    },
                )?;
            sig_builder.add_claim("sub", config.vapid.subject.as_str());
            let sig = sig_builder.build().map_err(|e| DeliveryError::Credentials {
                reason: format!("Failed to sign VAPID JWT: {e}"),
            })?;
            builder.set_vapid_signature(sig);
        }

        let message = builder
            .build()
            .map_err(|e| DeliveryError::MalformedSubscription {
                reason: e.to_string(),
            })?;

        let mut request = self
            .client
            .post(message.endpoint.to_string())
            .header("TTL", message.ttl.to_string());

        if let Some(urgency) = message.urgency {
            request = request.header("Urgency", urgency.to_string());
        }

        if let Some(topic) = message.topic {
            request = request.header("Topic", topic);
        }

        if let Some(push_payload) = message.payload {
            // VAPID's Authorization header travels with the crypto headers
            request = request
                .header("Content-Encoding", push_payload.content_encoding.to_str())
                .header("Content-Type", "application/octet-stream");

            for (key, value) in &push_payload.crypto_headers {
                request = request.header(*key, value.as_str());
            }

            request = request.body(push_payload.content);
        }

        if let Some(key) = gateway_key {
            request = request.header("Authorization", format!("key={key}"));
        }

        request
            .build()
            .map_err(|e| DeliveryError::MalformedSubscription {
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl PushTransport for WebPushTransport {
    async fn deliver(
        &self,
        subscription: &SubscriptionDescriptor,
        payload: &[u8],
        config: &ServerPushConfig,
    ) -> Result<(), DeliveryError> {
        let request = self.build_request(subscription, payload, config)?;

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| DeliveryError::Network {
                reason: e.to_string(),
            })?;
        let status = response.status().as_u16();

        match status {
            200..=299 => Ok(()),
            404 | 410 => {
                log::info!("[WebPush] Subscription expired (HTTP {status})");
                Err(DeliveryError::Expired { status })
            }
            429 => {
                log::warn!("[WebPush] Rate limited (429)");
                Err(DeliveryError::RateLimited)
            }
            401 | 403 => {
                let body = response.text().await.unwrap_or_default();
                Err(DeliveryError::Credentials {
                    reason: format!("HTTP {status}: {body}"),
                })
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(DeliveryError::Rejected { status, body })
            }
        }
    }
}
