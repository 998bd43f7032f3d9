//! Dispatch coordinator.
//!
//! Owns the subscriber registry and fans a payload out to every registered
//! subscription. Deliveries run concurrently, each under its own timeout, so
//! a failing or hung push service endpoint never blocks its siblings. The
//! outcome of every recipient is collected into a [`DispatchReport`];
//! permanently failed subscriptions are pruned from the registry.

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::push::{DeliveryError, PushTransport};
use super::registry::SubscriberRegistry;
use crate::config::ServerPushConfig;
use crate::constants::DEFAULT_DELIVERY_TIMEOUT;
use crate::global::GlobalSlot;
use crate::types::{InvalidEndpoint, SubscriptionDescriptor};

static GLOBAL_COORDINATOR: GlobalSlot<DispatchCoordinator> = GlobalSlot::new();

/// One recipient that could not be reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryFailure {
    /// Canonical endpoint of the recipient.
    pub endpoint: String,
    /// Why delivery failed.
    pub reason: DeliveryError,
}

/// Per-recipient outcome of a [`DispatchCoordinator::dispatch_to_all`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    /// Endpoints the push service accepted the message for.
    pub succeeded: Vec<String>,
    /// Endpoints that failed, with the reason.
    pub failed: Vec<DeliveryFailure>,
    /// Endpoints removed from the registry after a permanent failure.
    pub pruned: Vec<String>,
}

impl DispatchReport {
    /// Number of deliveries attempted.
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Subscriber registry plus everything needed to deliver to it.
pub struct DispatchCoordinator {
    config: ServerPushConfig,
    registry: SubscriberRegistry,
    transport: Arc<dyn PushTransport>,
    delivery_timeout: Duration,
}

impl std::fmt::Debug for DispatchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchCoordinator")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("delivery_timeout", &self.delivery_timeout)
            .finish_non_exhaustive()
    }
}

impl DispatchCoordinator {
    /// Create a coordinator with an empty registry.
    pub fn new(config: ServerPushConfig, transport: Arc<dyn PushTransport>) -> Self {
        Self {
            config,
            registry: SubscriberRegistry::default(),
            transport,
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
        }
    }

    /// Override the per-delivery timeout.
    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    /// Build a coordinator and install it as the global one.
    ///
    /// Re-initializing replaces the global; dispatches already running keep
    /// the coordinator (and credentials) they started with.
    pub fn init_global(config: ServerPushConfig, transport: Arc<dyn PushTransport>) -> Arc<Self> {
        Self::new(config, transport).install_global()
    }

    /// Install this coordinator as the global one.
    pub fn install_global(self) -> Arc<Self> {
        log::info!("[Dispatch] Global coordinator initialized");
        GLOBAL_COORDINATOR.set(Arc::new(self))
    }

    /// The global coordinator, if initialized.
    pub fn global() -> Option<Arc<Self>> {
        GLOBAL_COORDINATOR.get()
    }

    /// Clear the global coordinator.
    pub fn reset_global() {
        GLOBAL_COORDINATOR.reset();
    }

    /// Whether a global coordinator is installed.
    pub fn is_initialized() -> bool {
        GLOBAL_COORDINATOR.is_initialized()
    }

    /// Credentials used for every delivery.
    pub fn config(&self) -> &ServerPushConfig {
        &self.config
    }

    /// The subscriber registry.
    pub fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    /// Register (or refresh) a subscription.
    ///
    /// Returns `true` if its endpoint was new.
    pub fn register(&self, subscription: SubscriptionDescriptor) -> Result<bool, InvalidEndpoint> {
        let endpoint = subscription.endpoint.clone();
        let added = self.registry.upsert(subscription)?;
        log::info!(
            "[Dispatch] {} {endpoint} ({} subscriber(s))",
            if added { "Registered" } else { "Refreshed" },
            self.registry.len()
        );
        Ok(added)
    }

    /// Drop the subscription for `endpoint`; unknown endpoints are a no-op.
    pub fn unregister(&self, endpoint: &str) -> Result<bool, InvalidEndpoint> {
        let removed = self.registry.remove(endpoint)?;
        if removed {
            log::info!(
                "[Dispatch] Unregistered {endpoint} ({} subscriber(s))",
                self.registry.len()
            );
        }
        Ok(removed)
    }

    /// Deliver `payload` to every registered subscription.
    ///
    /// Never fails as a whole: per-recipient outcomes are in the report.
    pub async fn dispatch_to_all(&self, payload: &[u8]) -> DispatchReport {
        let recipients = self.registry.snapshot();
        if recipients.is_empty() {
            log::debug!("[Dispatch] No subscribers, nothing to send");
            return DispatchReport::default();
        }

        let deliveries = recipients.iter().map(|(endpoint, subscription)| async move {
            let delivery = self.transport.deliver(subscription, payload, &self.config);
            let outcome = match tokio::time::timeout(self.delivery_timeout, delivery).await {
                Ok(result) => result,
                Err(_elapsed) => Err(DeliveryError::Timeout),
            };
            (endpoint, subscription, outcome)
        });
        let outcomes = join_all(deliveries).await;

        let mut report = DispatchReport::default();
        for (endpoint, subscription, outcome) in outcomes {
            match outcome {
                Ok(()) => report.succeeded.push(endpoint.clone()),
                Err(reason) => {
                    log::warn!("[Dispatch] Delivery to {endpoint} failed: {reason}");
                    if reason.is_permanent()
                        && self.registry.remove_if_unchanged(endpoint, subscription)
                    {
                        log::info!("[Dispatch] Pruned {endpoint}");
                        report.pruned.push(endpoint.clone());
                    }
                    report.failed.push(DeliveryFailure {
                        endpoint: endpoint.clone(),
                        reason,
                    });
                }
            }
        }

        log::info!(
            "[Dispatch] Sent to {}/{} subscriber(s), pruned {}",
            report.succeeded.len(),
            report.attempted(),
            report.pruned.len()
        );
        report
    }
}
