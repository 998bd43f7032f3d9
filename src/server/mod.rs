//! Server side of the push lifecycle.
//!
//! Keeps the set of subscribed devices and fans notifications out to them
//! through their push services.
//!
//! # Architecture
//!
//! ```text
//! POST /push/subscribe ──▶ DispatchCoordinator ──▶ SubscriberRegistry
//!                                  │
//!            GET /push/alert ──────┤ dispatch_to_all
//!                                  ▼
//!                        PushTransport (web push, RFC 8030)
//!                                  ▼
//!                 push service ──▶ worker on the device
//! ```
//!
//! # VAPID Keys
//!
//! The server signs every push request with its VAPID keypair (RFC 8292).
//! The public half is handed to clients as the `applicationServerKey` they
//! subscribe with; `pushnoti vapid generate` creates a pair.

pub mod dispatch;
pub mod http;
pub mod push;
pub mod registry;
pub mod vapid;

pub use dispatch::{DeliveryFailure, DispatchCoordinator, DispatchReport};
pub use push::{DeliveryError, PushTransport, WebPushTransport};
pub use registry::SubscriberRegistry;
pub use vapid::VapidKeys;
