//! Application-wide constants for pushnoti.
//!
//! Centralizes defaults that are shared between the client flow, the
//! dispatch coordinator and the configuration layer.
//!
//! # Categories
//!
//! - **Client**: worker registration defaults
//! - **Delivery**: TTL and timeouts for push service requests
//! - **HTTP**: route paths and the fixed alert payload

use std::time::Duration;

// ============================================================================
// Client
// ============================================================================

/// Worker registration path used when none is configured or supplied.
pub const DEFAULT_WORKER_PATH: &str = "/service-worker";

// ============================================================================
// Delivery
// ============================================================================

/// Default time-to-live for queued-but-undelivered notifications (4 weeks).
pub const DEFAULT_TTL_SECONDS: u32 = 2_419_200;

/// Default upper bound for a single push service request.
///
/// Each recipient gets its own timeout so a hung push service endpoint
/// cannot hold up the rest of a fan-out.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Endpoint prefix of the legacy GCM gateway, authorized with an API key
/// instead of a VAPID signature.
pub const LEGACY_GATEWAY_PREFIX: &str = "https://android.googleapis.com/gcm/send";

// ============================================================================
// HTTP
// ============================================================================

/// Default listen address for `pushnoti serve`.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3000";

/// Payload sent by `GET /push/alert`.
pub const ALERT_TEST_PAYLOAD: &str = r#"{"message":"Test","tag":"Tag"}"#;
