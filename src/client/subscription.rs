//! Push subscription lifecycle.
//!
//! [`SubscriptionManager`] owns the subscription slot of one worker
//! registration. The idempotent entry points, [`subscribe_if_not_exist`] and
//! [`unsubscribe_if_exist`], hold the worker handle's subscription lock for
//! their whole query-then-act sequence, so concurrent callers on the same
//! handle never mint two subscriptions.
//!
//! # Permission denial
//!
//! A failed subscribe is reported as `PermissionDenied` when the capability
//! says so directly. Environments that only fail generically are handled by
//! re-reading the permission state right after the failure.
//!
//! [`subscribe_if_not_exist`]: SubscriptionManager::subscribe_if_not_exist
//! [`unsubscribe_if_exist`]: SubscriptionManager::unsubscribe_if_exist

use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;

use super::capability::{CapabilityError, NotificationCapability, PermissionState, PushCapability};
use super::worker::WorkerHandle;
use super::ClientError;
use crate::encoding::decode_application_server_key;
use crate::global::GlobalSlot;
use crate::types::{SubscribeOptions, SubscriptionDescriptor};

static GLOBAL_MANAGER: GlobalSlot<SubscriptionManager> = GlobalSlot::new();

/// Construction options for [`SubscriptionManager`].
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Every push must show a notification (default: `true`).
    pub user_visible_only: bool,
    /// VAPID public key of the application server, base64url.
    pub application_server_key: Option<String>,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            user_visible_only: true,
            application_server_key: None,
        }
    }
}

/// Creates and tears down the push subscription of one worker registration.
pub struct SubscriptionManager {
    push: Arc<dyn PushCapability>,
    notifications: Arc<dyn NotificationCapability>,
    options: RwLock<SubscribeOptions>,
    slot_lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("options", &self.options())
            .finish_non_exhaustive()
    }
}

impl SubscriptionManager {
    /// Create a manager for `worker`'s push capability.
    ///
    /// The application server key is decoded here; a malformed key fails
    /// construction.
    pub fn new(
        worker: &WorkerHandle,
        notifications: Arc<dyn NotificationCapability>,
        options: ManagerOptions,
    ) -> Result<Self, ClientError> {
        let application_server_key = options
            .application_server_key
            .as_deref()
            .map(decode_key)
            .transpose()?;

        Ok(Self {
            push: worker.push_manager(),
            notifications,
            options: RwLock::new(SubscribeOptions {
                user_visible_only: options.user_visible_only,
                application_server_key,
            }),
            slot_lock: worker.subscription_lock(),
        })
    }

    /// Options used by [`subscribe`](Self::subscribe).
    pub fn options(&self) -> SubscribeOptions {
        self.options
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the application server key used for future subscriptions.
    ///
    /// An existing subscription keeps the key it was created with.
    pub fn set_public_key(&self, application_server_key: &str) -> Result<(), ClientError> {
        let key = decode_key(application_server_key)?;
        self.options
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .application_server_key = Some(key);
        Ok(())
    }

    /// Request a new subscription with the stored options.
    ///
    /// Does not check for an existing subscription; prefer
    /// [`subscribe_if_not_exist`](Self::subscribe_if_not_exist).
    pub async fn subscribe(&self) -> Result<SubscriptionDescriptor, ClientError> {
        let options = self.options();
        self.subscribe_with(&options).await
    }

    /// Request a new subscription with explicit options.
    pub async fn subscribe_with(
        &self,
        options: &SubscribeOptions,
    ) -> Result<SubscriptionDescriptor, ClientError> {
        match self.push.subscribe(options).await {
            Ok(subscription) => {
                log::info!("[Subscription] Subscribed {}", subscription.endpoint);
                Ok(subscription)
            }
            Err(e) => Err(self.subscribe_failure(&e)),
        }
    }

    /// Current subscription, without creating one.
    pub async fn get_subscription(&self) -> Result<Option<SubscriptionDescriptor>, CapabilityError> {
        self.push.get_subscription().await
    }

    /// Return the existing subscription, or create one.
    pub async fn subscribe_if_not_exist(&self) -> Result<SubscriptionDescriptor, ClientError> {
        let _slot = self.slot_lock.lock().await;

        match self.push.get_subscription().await {
            Ok(Some(existing)) => return Ok(existing),
            Ok(None) => {}
            Err(e) => return Err(self.subscribe_failure(&e)),
        }

        self.subscribe().await
    }

    /// Tear down the existing subscription and return it.
    ///
    /// Fails with `NotSubscribedYet`, changing nothing, when there is none.
    pub async fn unsubscribe_if_exist(&self) -> Result<SubscriptionDescriptor, ClientError> {
        let _slot = self.slot_lock.lock().await;

        let subscription = match self.push.get_subscription().await {
            Ok(Some(subscription)) => subscription,
            Ok(None) => {
                log::warn!("[Subscription] Push notification has not been subscribed yet");
                return Err(ClientError::NotSubscribedYet);
            }
            Err(e) => {
                log::error!("[Subscription] UNSUBSCRIPTION_FAILED: {e}");
                return Err(ClientError::UnsubscriptionFailed);
            }
        };

        if let Err(e) = self.push.unsubscribe(&subscription).await {
            log::error!("[Subscription] UNSUBSCRIPTION_FAILED: {e}");
            return Err(ClientError::UnsubscriptionFailed);
        }

        log::info!("[Subscription] Unsubscribed {}", subscription.endpoint);
        Ok(subscription)
    }

    /// Prompt for notification permission.
    ///
    /// `callback` receives the result as well, for callers that expect the
    /// legacy callback style.
    pub async fn request_permission(
        notifications: &dyn NotificationCapability,
        callback: impl FnOnce(PermissionState),
    ) -> PermissionState {
        let state = notifications.request_permission().await;
        log::info!("[Subscription] Notification permission: {state}");
        callback(state);
        state
    }

    /// Store `manager` as the global subscription manager.
    pub fn set_global(manager: Arc<Self>) -> Arc<Self> {
        GLOBAL_MANAGER.set(manager)
    }

    /// The global subscription manager, if set.
    pub fn global() -> Option<Arc<Self>> {
        GLOBAL_MANAGER.get()
    }

    /// Clear the global subscription manager.
    pub fn reset_global() {
        GLOBAL_MANAGER.reset();
    }

    fn subscribe_failure(&self, error: &CapabilityError) -> ClientError {
        let denied = matches!(error, CapabilityError::PermissionDenied)
            || self.notifications.permission() == PermissionState::Denied;

        if denied {
            log::warn!("[Subscription] PERMISSION_DENIED: {error}");
            ClientError::PermissionDenied
        } else {
            log::error!("[Subscription] SUBSCRIBE_USER_FAILED: {error}");
            ClientError::SubscribeUserFailed
        }
    }
}

fn decode_key(application_server_key: &str) -> Result<Vec<u8>, ClientError> {
    decode_application_server_key(application_server_key).map_err(|e| {
        log::error!("[Subscription] {e}");
        ClientError::MalformedKey
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::memory::{MemoryEnvironment, MemoryNotifications, MemoryPushManager};
    use crate::client::WorkerRegistrar;
    use std::time::Duration;

    const APP_KEY: &str = "BAECAw";

    async fn setup(
        env: MemoryEnvironment,
        notifications: MemoryNotifications,
    ) -> (WorkerHandle, Arc<MemoryPushManager>, Arc<MemoryNotifications>) {
        let env = Arc::new(env);
        let mut registrar = WorkerRegistrar::new(env.clone(), Some("/sw.js".to_string()));
        let worker = registrar.register(None).await.unwrap();
        let push = env.push_manager("/sw.js").unwrap();
        (worker, push, Arc::new(notifications))
    }

    fn manager(worker: &WorkerHandle, notifications: Arc<MemoryNotifications>) -> SubscriptionManager {
        SubscriptionManager::new(
            worker,
            notifications,
            ManagerOptions {
                application_server_key: Some(APP_KEY.to_string()),
                ..ManagerOptions::default()
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_key_is_stored_decoded() {
        let (worker, _, notifications) = setup(
            MemoryEnvironment::new("https://push.example"),
            MemoryNotifications::settled(PermissionState::Granted),
        )
        .await;
        let manager = manager(&worker, notifications);

        let options = manager.options();
        assert!(options.user_visible_only);
        assert_eq!(options.application_server_key, Some(vec![4, 1, 2, 3]));
    }

    #[tokio::test]
    async fn test_malformed_key_fails_construction() {
        let (worker, _, notifications) = setup(
            MemoryEnvironment::new("https://push.example"),
            MemoryNotifications::settled(PermissionState::Granted),
        )
        .await;

        let result = SubscriptionManager::new(
            &worker,
            notifications,
            ManagerOptions {
                application_server_key: Some("%%%".to_string()),
                ..ManagerOptions::default()
            },
        );
        assert_eq!(result.unwrap_err(), ClientError::MalformedKey);
    }

    #[tokio::test]
    async fn test_set_public_key_keeps_existing_subscription() {
        let (worker, push, notifications) = setup(
            MemoryEnvironment::new("https://push.example"),
            MemoryNotifications::settled(PermissionState::Granted),
        )
        .await;
        let manager = manager(&worker, notifications);

        let before = manager.subscribe_if_not_exist().await.unwrap();
        manager.set_public_key("-_8").unwrap();
        assert_eq!(manager.options().application_server_key, Some(vec![0xfb, 0xff]));
        assert_eq!(push.current(), Some(before));

        assert_eq!(manager.set_public_key("%%%").unwrap_err(), ClientError::MalformedKey);
        assert_eq!(manager.options().application_server_key, Some(vec![0xfb, 0xff]));
    }

    #[tokio::test]
    async fn test_subscribe_if_not_exist_returns_same_descriptor() {
        let (worker, push, notifications) = setup(
            MemoryEnvironment::new("https://push.example"),
            MemoryNotifications::settled(PermissionState::Granted),
        )
        .await;
        let manager = manager(&worker, notifications);

        let first = manager.subscribe_if_not_exist().await.unwrap();
        let second = manager.subscribe_if_not_exist().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(push.subscribe_calls(), 1);
        assert_eq!(first.options.application_server_key, Some(vec![4, 1, 2, 3]));
    }

    #[tokio::test]
    async fn test_plain_subscribe_does_not_deduplicate() {
        let (worker, push, notifications) = setup(
            MemoryEnvironment::new("https://push.example"),
            MemoryNotifications::settled(PermissionState::Granted),
        )
        .await;
        let manager = manager(&worker, notifications);

        let first = manager.subscribe().await.unwrap();
        let second = manager.subscribe().await.unwrap();
        assert_ne!(first.endpoint, second.endpoint);
        assert_eq!(push.subscribe_calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_subscribe_if_not_exist_creates_one() {
        let (worker, push, notifications) = setup(
            MemoryEnvironment::new("https://push.example").with_push_latency(Duration::from_millis(20)),
            MemoryNotifications::settled(PermissionState::Granted),
        )
        .await;
        // Two managers sharing one worker handle still share its slot lock
        let a = manager(&worker, notifications.clone());
        let b = manager(&worker, notifications);

        let (first, second) = tokio::join!(a.subscribe_if_not_exist(), b.subscribe_if_not_exist());
        assert_eq!(first.unwrap(), second.unwrap());
        assert_eq!(push.subscribe_calls(), 1);
    }

    #[tokio::test]
    async fn test_separate_handles_for_one_registration_share_lock() {
        let env = Arc::new(
            MemoryEnvironment::new("https://push.example").with_push_latency(Duration::from_millis(20)),
        );
        let mut registrar = WorkerRegistrar::new(env.clone(), Some("/sw.js".to_string()));
        let first_handle = registrar.register(None).await.unwrap();
        let second_handle = registrar.register(None).await.unwrap();
        let push = env.push_manager("/sw.js").unwrap();
        let notifications = Arc::new(MemoryNotifications::settled(PermissionState::Granted));

        let a = manager(&first_handle, notifications.clone());
        let b = manager(&second_handle, notifications);

        let (first, second) = tokio::join!(a.subscribe_if_not_exist(), b.subscribe_if_not_exist());
        assert_eq!(first.unwrap(), second.unwrap());
        assert_eq!(push.subscribe_calls(), 1);
        assert_eq!(env.registration_requests(), 2);
    }

    #[tokio::test]
    async fn test_unsubscribe_without_subscription() {
        let (worker, push, notifications) = setup(
            MemoryEnvironment::new("https://push.example"),
            MemoryNotifications::settled(PermissionState::Granted),
        )
        .await;
        let manager = manager(&worker, notifications);

        assert_eq!(
            manager.unsubscribe_if_exist().await.unwrap_err(),
            ClientError::NotSubscribedYet
        );
        assert_eq!(push.unsubscribe_calls(), 0);
        assert!(push.current().is_none());
        assert!(manager.get_subscription().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unsubscribe_returns_removed_descriptor() {
        let (worker, push, notifications) = setup(
            MemoryEnvironment::new("https://push.example"),
            MemoryNotifications::settled(PermissionState::Granted),
        )
        .await;
        let manager = manager(&worker, notifications);

        let subscribed = manager.subscribe_if_not_exist().await.unwrap();
        let removed = manager.unsubscribe_if_exist().await.unwrap();
        assert_eq!(subscribed, removed);
        assert!(push.current().is_none());
    }

    #[tokio::test]
    async fn test_unsubscribe_failure() {
        let (worker, push, notifications) = setup(
            MemoryEnvironment::new("https://push.example"),
            MemoryNotifications::settled(PermissionState::Granted),
        )
        .await;
        let manager = manager(&worker, notifications);
        manager.subscribe_if_not_exist().await.unwrap();

        push.set_unsubscribe_failure(Some(CapabilityError::Failed("push service down".into())));
        assert_eq!(
            manager.unsubscribe_if_exist().await.unwrap_err(),
            ClientError::UnsubscriptionFailed
        );
        assert!(push.current().is_some());
    }

    #[tokio::test]
    async fn test_typed_denial_is_permission_denied() {
        let (worker, push, notifications) = setup(
            MemoryEnvironment::new("https://push.example"),
            MemoryNotifications::settled(PermissionState::Default),
        )
        .await;
        let manager = manager(&worker, notifications);

        push.set_subscribe_failure(Some(CapabilityError::PermissionDenied));
        assert_eq!(
            manager.subscribe_if_not_exist().await.unwrap_err(),
            ClientError::PermissionDenied
        );
    }

    #[tokio::test]
    async fn test_generic_failure_with_denied_state_is_permission_denied() {
        let (worker, push, notifications) = setup(
            MemoryEnvironment::new("https://push.example"),
            MemoryNotifications::settled(PermissionState::Denied),
        )
        .await;
        let manager = manager(&worker, notifications);

        push.set_subscribe_failure(Some(CapabilityError::Failed("AbortError".into())));
        assert_eq!(
            manager.subscribe_if_not_exist().await.unwrap_err(),
            ClientError::PermissionDenied
        );
    }

    #[tokio::test]
    async fn test_generic_failure_is_subscribe_user_failed() {
        let (worker, push, notifications) = setup(
            MemoryEnvironment::new("https://push.example"),
            MemoryNotifications::settled(PermissionState::Granted),
        )
        .await;
        let manager = manager(&worker, notifications);

        push.set_subscribe_failure(Some(CapabilityError::Failed("network".into())));
        assert_eq!(manager.subscribe().await.unwrap_err(), ClientError::SubscribeUserFailed);
    }

    #[tokio::test]
    async fn test_request_permission_invokes_callback() {
        let notifications = MemoryNotifications::answering(PermissionState::Granted);
        let mut seen = None;
        let state =
            SubscriptionManager::request_permission(&notifications, |s| seen = Some(s)).await;
        assert_eq!(state, PermissionState::Granted);
        assert_eq!(seen, Some(PermissionState::Granted));
    }

    #[tokio::test]
    async fn test_global_slot() {
        let (worker, _, notifications) = setup(
            MemoryEnvironment::new("https://push.example"),
            MemoryNotifications::settled(PermissionState::Granted),
        )
        .await;

        SubscriptionManager::reset_global();
        assert!(SubscriptionManager::global().is_none());

        let manager = SubscriptionManager::set_global(Arc::new(manager(&worker, notifications)));
        assert!(Arc::ptr_eq(&manager, &SubscriptionManager::global().unwrap()));

        SubscriptionManager::reset_global();
        assert!(SubscriptionManager::global().is_none());
    }
}
