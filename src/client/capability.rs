//! Capabilities the client borrows from its execution environment.
//!
//! These mirror the three browser objects the client touches:
//! `navigator.serviceWorker` ([`WorkerEnvironment`]), a registration's
//! `pushManager` ([`PushCapability`]) and `Notification` permission
//! ([`NotificationCapability`]). Every async method is a suspension point
//! with no ordering guarantee relative to other in-flight calls.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::types::{SubscribeOptions, SubscriptionDescriptor};

/// Notification permission as reported by the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermissionState {
    /// User allowed notifications.
    Granted,
    /// User blocked notifications.
    Denied,
    /// User has not decided yet.
    #[default]
    Default,
}

impl PermissionState {
    /// Browser spelling of the state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::Denied => "denied",
            Self::Default => "default",
        }
    }
}

impl std::fmt::Display for PermissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by an environment capability.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    /// The environment refused because notification permission is denied.
    #[error("Notification permission denied")]
    PermissionDenied,
    /// Any other failure, described by the environment.
    #[error("{0}")]
    Failed(String),
}

/// One worker registration, as handed out by a [`WorkerEnvironment`].
///
/// Clones share the push capability and the lock serializing changes to the
/// registration's subscription slot. An environment must hand out clones of
/// the same value for a repeated path, so every handle on one registration
/// contends on one lock.
#[derive(Clone)]
pub struct WorkerRegistration {
    push: Arc<dyn PushCapability>,
    subscription_lock: Arc<Mutex<()>>,
}

impl WorkerRegistration {
    /// A new registration over `push`, with its own subscription lock.
    pub fn new(push: Arc<dyn PushCapability>) -> Self {
        Self {
            push,
            subscription_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Push capability of this registration.
    pub fn push_manager(&self) -> Arc<dyn PushCapability> {
        Arc::clone(&self.push)
    }

    pub(crate) fn subscription_lock(&self) -> Arc<Mutex<()>> {
        Arc::clone(&self.subscription_lock)
    }
}

impl std::fmt::Debug for WorkerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRegistration").finish_non_exhaustive()
    }
}

/// Worker registration capability (`navigator.serviceWorker`).
#[async_trait]
pub trait WorkerEnvironment: Send + Sync {
    /// Whether the environment can register workers at all.
    fn supports_workers(&self) -> bool;

    /// Register the worker script at `path`.
    ///
    /// Registering the same path again yields (a clone of) the existing
    /// registration.
    async fn register_worker(&self, path: &str) -> Result<WorkerRegistration, CapabilityError>;
}

/// Push subscription capability of one worker registration (`pushManager`).
#[async_trait]
pub trait PushCapability: Send + Sync {
    /// Create a subscription. May return a new or the existing subscription,
    /// depending on the environment.
    async fn subscribe(
        &self,
        options: &SubscribeOptions,
    ) -> Result<SubscriptionDescriptor, CapabilityError>;

    /// Current subscription, without creating one.
    async fn get_subscription(&self) -> Result<Option<SubscriptionDescriptor>, CapabilityError>;

    /// Tear down `subscription` with the push service.
    async fn unsubscribe(&self, subscription: &SubscriptionDescriptor)
        -> Result<(), CapabilityError>;
}

/// Notification permission capability (`Notification`).
#[async_trait]
pub trait NotificationCapability: Send + Sync {
    /// Current permission, without prompting.
    fn permission(&self) -> PermissionState;

    /// Prompt the user (if undecided) and return the resulting permission.
    async fn request_permission(&self) -> PermissionState;
}
