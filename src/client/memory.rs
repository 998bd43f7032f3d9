//! In-process environment implementing the client capabilities.
//!
//! [`MemoryEnvironment`] behaves like a browser with a cooperative push
//! service: registrations are idempotent per path, each registration owns a
//! [`MemoryPushManager`], and subscriptions carry real P-256 keys so that
//! payloads encrypted for them are valid RFC 8291 messages. Used for headless
//! runs and throughout the test suites.

use async_trait::async_trait;
use p256::ecdsa::SigningKey;
use p256::elliptic_curve::rand_core::OsRng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::capability::{
    CapabilityError, NotificationCapability, PermissionState, PushCapability, WorkerEnvironment,
    WorkerRegistration,
};
use crate::types::{SubscribeOptions, SubscriptionDescriptor, SubscriptionKeys};

/// Worker container backed by memory.
#[derive(Debug)]
pub struct MemoryEnvironment {
    supported: bool,
    endpoint_base: String,
    push_latency: Duration,
    fail_registrations: AtomicBool,
    registration_requests: AtomicUsize,
    registrations: Mutex<HashMap<String, MemoryRegistration>>,
}

#[derive(Debug, Clone)]
struct MemoryRegistration {
    manager: Arc<MemoryPushManager>,
    registration: WorkerRegistration,
}

impl MemoryEnvironment {
    /// Environment whose subscriptions get endpoints under `endpoint_base`.
    pub fn new(endpoint_base: impl Into<String>) -> Self {
        Self {
            supported: true,
            endpoint_base: endpoint_base.into().trim_end_matches('/').to_string(),
            push_latency: Duration::ZERO,
            fail_registrations: AtomicBool::new(false),
            registration_requests: AtomicUsize::new(0),
            registrations: Mutex::new(HashMap::new()),
        }
    }

    /// Environment without worker support.
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new("https://push.invalid")
        }
    }

    /// Delay every push manager call by `latency`, widening race windows.
    pub fn with_push_latency(mut self, latency: Duration) -> Self {
        self.push_latency = latency;
        self
    }

    /// Make subsequent registrations fail.
    pub fn fail_registrations(&self, fail: bool) {
        self.fail_registrations.store(fail, Ordering::SeqCst);
    }

    /// Number of registration requests that reached the environment.
    pub fn registration_requests(&self) -> usize {
        self.registration_requests.load(Ordering::SeqCst)
    }

    /// Push manager of the registration at `path`, if any.
    pub fn push_manager(&self, path: &str) -> Option<Arc<MemoryPushManager>> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .map(|r| Arc::clone(&r.manager))
    }
}

#[async_trait]
impl WorkerEnvironment for MemoryEnvironment {
    fn supports_workers(&self) -> bool {
        self.supported
    }

    async fn register_worker(
        &self,
        path: &str,
    ) -> Result<WorkerRegistration, CapabilityError> {
        self.registration_requests.fetch_add(1, Ordering::SeqCst);
        if self.fail_registrations.load(Ordering::SeqCst) {
            return Err(CapabilityError::Failed(format!(
                "script at {path} failed to install"
            )));
        }

        let registration = self
            .registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(path.to_string())
            .or_insert_with(|| {
                let manager = Arc::new(MemoryPushManager::new(
                    self.endpoint_base.clone(),
                    self.push_latency,
                ));
                let push = Arc::clone(&manager) as Arc<dyn PushCapability>;
                MemoryRegistration {
                    manager,
                    registration: WorkerRegistration::new(push),
                }
            })
            .registration
            .clone();
        Ok(registration)
    }
}

/// Push manager of one memory registration.
///
/// Like a browser without deduplication on its side: every `subscribe`
/// mints a new subscription and replaces the current one.
#[derive(Debug)]
pub struct MemoryPushManager {
    endpoint_base: String,
    latency: Duration,
    next_id: AtomicU64,
    subscribe_calls: AtomicUsize,
    unsubscribe_calls: AtomicUsize,
    current: Mutex<Option<SubscriptionDescriptor>>,
    subscribe_failure: Mutex<Option<CapabilityError>>,
    unsubscribe_failure: Mutex<Option<CapabilityError>>,
}

impl MemoryPushManager {
    fn new(endpoint_base: String, latency: Duration) -> Self {
        Self {
            endpoint_base,
            latency,
            next_id: AtomicU64::new(1),
            subscribe_calls: AtomicUsize::new(0),
            unsubscribe_calls: AtomicUsize::new(0),
            current: Mutex::new(None),
            subscribe_failure: Mutex::new(None),
            unsubscribe_failure: Mutex::new(None),
        }
    }

    /// Make `subscribe` fail with `error` until cleared with `None`.
    pub fn set_subscribe_failure(&self, error: Option<CapabilityError>) {
        *self
            .subscribe_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = error;
    }

    /// Make `unsubscribe` fail with `error` until cleared with `None`.
    pub fn set_unsubscribe_failure(&self, error: Option<CapabilityError>) {
        *self
            .unsubscribe_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = error;
    }

    /// Number of `subscribe` calls received.
    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    /// Number of `unsubscribe` calls received.
    pub fn unsubscribe_calls(&self) -> usize {
        self.unsubscribe_calls.load(Ordering::SeqCst)
    }

    /// Current subscription, read synchronously.
    pub fn current(&self) -> Option<SubscriptionDescriptor> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn pause(&self) {
        if self.latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn mint(&self, options: &SubscribeOptions) -> SubscriptionDescriptor {
        // Uncompressed SEC1 point (65 bytes: 0x04 || x || y), like a browser's p256dh
        let user_agent_key = SigningKey::random(&mut OsRng);
        let p256dh = user_agent_key
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec();
        let auth: [u8; 16] = rand::random();

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        SubscriptionDescriptor {
            endpoint: format!("{}/{id}", self.endpoint_base),
            expiration_time: None,
            keys: SubscriptionKeys {
                p256dh,
                auth: auth.to_vec(),
            },
            options: options.clone(),
        }
    }
}

#[async_trait]
impl PushCapability for MemoryPushManager {
    async fn subscribe(
        &self,
        options: &SubscribeOptions,
    ) -> Result<SubscriptionDescriptor, CapabilityError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        if let Some(err) = self
            .subscribe_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(err);
        }

        let subscription = self.mint(options);
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(subscription.clone());
        Ok(subscription)
    }

    async fn get_subscription(&self) -> Result<Option<SubscriptionDescriptor>, CapabilityError> {
        self.pause().await;
        Ok(self.current())
    }

    async fn unsubscribe(
        &self,
        subscription: &SubscriptionDescriptor,
    ) -> Result<(), CapabilityError> {
        self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        if let Some(err) = self
            .unsubscribe_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(err);
        }

        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current
            .as_ref()
            .is_some_and(|c| c.endpoint == subscription.endpoint)
        {
            *current = None;
        }
        Ok(())
    }
}

/// Notification permission backed by memory.
///
/// Starts in `default`; the first `request_permission` settles on the
/// configured answer, later prompts return the settled state.
#[derive(Debug)]
pub struct MemoryNotifications {
    state: Mutex<PermissionState>,
    answer: PermissionState,
    prompts: AtomicUsize,
}

impl MemoryNotifications {
    /// Permission that will be answered with `answer` when prompted.
    pub fn answering(answer: PermissionState) -> Self {
        Self {
            state: Mutex::new(PermissionState::Default),
            answer,
            prompts: AtomicUsize::new(0),
        }
    }

    /// Permission already settled on `state`.
    pub fn settled(state: PermissionState) -> Self {
        Self {
            state: Mutex::new(state),
            answer: state,
            prompts: AtomicUsize::new(0),
        }
    }

    /// Change the current state, as a user would in browser settings.
    pub fn set(&self, state: PermissionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Number of times the user was prompted.
    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationCapability for MemoryNotifications {
    fn permission(&self) -> PermissionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn request_permission(&self) -> PermissionState {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == PermissionState::Default {
            self.prompts.fetch_add(1, Ordering::SeqCst);
            *state = self.answer;
        }
        *state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registration_is_idempotent_per_path() {
        let env = MemoryEnvironment::new("https://push.example/");
        env.register_worker("/sw.js").await.unwrap();
        env.register_worker("/sw.js").await.unwrap();
        env.register_worker("/other.js").await.unwrap();

        assert_eq!(env.registration_requests(), 3);
        let a = env.push_manager("/sw.js").unwrap();
        a.subscribe(&SubscribeOptions::default()).await.unwrap();
        assert_eq!(a.current().unwrap().endpoint, "https://push.example/1");
        assert!(env.push_manager("/other.js").unwrap().current().is_none());
    }

    #[tokio::test]
    async fn test_minted_keys_have_browser_shape() {
        let env = MemoryEnvironment::new("https://push.example");
        let push = env.register_worker("/sw.js").await.unwrap().push_manager();
        let sub = push.subscribe(&SubscribeOptions::default()).await.unwrap();

        assert_eq!(sub.keys.p256dh.len(), 65);
        assert_eq!(sub.keys.p256dh[0], 0x04);
        assert_eq!(sub.keys.auth.len(), 16);
    }

    #[tokio::test]
    async fn test_permission_prompt_settles_once() {
        let notifications = MemoryNotifications::answering(PermissionState::Denied);
        assert_eq!(notifications.permission(), PermissionState::Default);
        assert_eq!(notifications.request_permission().await, PermissionState::Denied);
        assert_eq!(notifications.request_permission().await, PermissionState::Denied);
        assert_eq!(notifications.prompts(), 1);
    }
}
