//! Subscriber registry.
//!
//! Holds one push subscription per canonical endpoint URI. Registration is
//! an upsert, so a browser that posts the same subscription twice (or a
//! refreshed one with new keys) never ends up with duplicate deliveries.
//! Kept in memory only; nothing survives a restart.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::types::{canonical_endpoint, InvalidEndpoint, SubscriptionDescriptor};

/// Registered push subscriptions keyed by canonical endpoint.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    subscriptions: RwLock<HashMap<String, SubscriptionDescriptor>>,
}

impl SubscriberRegistry {
    /// Add or replace the subscription for its endpoint.
    ///
    /// Returns `true` if the endpoint was not registered before.
    pub fn upsert(&self, subscription: SubscriptionDescriptor) -> Result<bool, InvalidEndpoint> {
        let key = subscription.canonical_endpoint()?;
        let previous = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, subscription);
        Ok(previous.is_none())
    }

    /// Remove the subscription for `endpoint`.
    ///
    /// Returns `true` if something was removed; unknown endpoints are a no-op.
    pub fn remove(&self, endpoint: &str) -> Result<bool, InvalidEndpoint> {
        let key = canonical_endpoint(endpoint)?;
        Ok(self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key)
            .is_some())
    }

    /// Remove the entry under `key` only if it still holds `expected`.
    ///
    /// Used for pruning after a failed delivery: a subscription refreshed
    /// while the delivery was in flight is left alone.
    pub(crate) fn remove_if_unchanged(&self, key: &str, expected: &SubscriptionDescriptor) -> bool {
        let mut subscriptions = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if subscriptions.get(key) == Some(expected) {
            subscriptions.remove(key);
            true
        } else {
            false
        }
    }

    /// Copy of all entries as `(canonical endpoint, subscription)`.
    pub fn snapshot(&self) -> Vec<(String, SubscriptionDescriptor)> {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Whether `endpoint` is registered.
    pub fn contains(&self, endpoint: &str) -> bool {
        canonical_endpoint(endpoint).is_ok_and(|key| {
            self.subscriptions
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .contains_key(&key)
        })
    }

    /// Number of registered subscriptions.
    pub fn len(&self) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
