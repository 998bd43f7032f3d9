//! Client side of the push lifecycle.
//!
//! Everything here runs where the browser (or an equivalent environment)
//! lives: registering the worker that receives push events, negotiating
//! notification permission, creating and tearing down the push subscription,
//! and telling the application server about it.
//!
//! # Architecture
//!
//! ```text
//! WorkerEnvironment ──register──▶ WorkerHandle ──push capability──▶ SubscriptionManager
//!                                                                          │
//!                                                   SubscriptionDescriptor │
//!                                                                          ▼
//!                                                  PushClient ──POST /push/subscribe──▶ server
//! ```
//!
//! The environment is reached only through the traits in [`capability`], so
//! the same code drives a real browser bridge or the in-process
//! [`memory::MemoryEnvironment`].
//!
//! # Errors
//!
//! Client errors are deliberately small: UI code gets one of the
//! [`ClientError`] codes, and the underlying cause goes to the log.

pub mod capability;
pub mod flow;
pub mod memory;
pub mod subscription;
pub mod worker;

pub use capability::{
    CapabilityError, NotificationCapability, PermissionState, PushCapability, WorkerEnvironment,
    WorkerRegistration,
};
pub use flow::{init_global, PushClient};
pub use subscription::{ManagerOptions, SubscriptionManager};
pub use worker::{WorkerHandle, WorkerRegistrar};

/// User-facing client errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The environment cannot register workers at all.
    #[error("Worker registration is not supported in this environment")]
    CapabilityUnsupported,
    /// No worker path was supplied or configured.
    #[error("Worker path has not been defined")]
    PathNotDefined,
    /// `registration()` was called before a successful `register`.
    #[error("Worker has not been registered yet")]
    NotRegisteredYet,
    /// Global worker registration failed (cause is logged).
    #[error("Service worker registration failed")]
    ServiceWorkerRegistrationFailed,
    /// The user denied notification permission.
    #[error("Permission for notifications was denied")]
    PermissionDenied,
    /// Creating the push subscription failed for another reason.
    #[error("Failed to subscribe the user")]
    SubscribeUserFailed,
    /// There is no subscription to remove.
    #[error("Push notification has not been subscribed yet")]
    NotSubscribedYet,
    /// Tearing down the push subscription failed.
    #[error("Failed to unsubscribe")]
    UnsubscriptionFailed,
    /// The application server key is not valid base64url.
    #[error("Application server key is malformed")]
    MalformedKey,
    /// The application server rejected or did not answer a request.
    #[error("Application server request failed")]
    ServerRequestFailed,
}

impl ClientError {
    /// Stable code for UI code and logs.
    pub fn code(self) -> &'static str {
        match self {
            Self::CapabilityUnsupported => "SW_NOT_SUPPORT",
            Self::PathNotDefined => "PATH_NOT_DEFINED",
            Self::NotRegisteredYet => "NOT_REGISTERED_YET",
            Self::ServiceWorkerRegistrationFailed => "SERVICE_WORKER_REGISTRATION_FAILED",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::SubscribeUserFailed => "SUBSCRIBE_USER_FAILED",
            Self::NotSubscribedYet => "NOT_SUBSCRIBED_YET",
            Self::UnsubscriptionFailed => "UNSUBSCRIPTION_FAILED",
            Self::MalformedKey => "MALFORMED_KEY",
            Self::ServerRequestFailed => "SERVER_REQUEST_FAILED",
        }
    }
}
