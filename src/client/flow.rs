//! Page-level push flow: subscribe here, tell the server.
//!
//! [`init_global`] performs the bootstrap a page runs on load (register the
//! worker, ask for permission, build the global manager). [`PushClient`]
//! then pairs every local subscription change with the matching call to the
//! application server's `/push` routes.

use std::sync::{Arc, Mutex, PoisonError};

use super::capability::{NotificationCapability, WorkerEnvironment};
use super::subscription::{ManagerOptions, SubscriptionManager};
use super::worker::WorkerRegistrar;
use super::ClientError;
use crate::types::{EndpointRequest, MessageResponse, SubscriptionDescriptor};

/// Register the global worker, request permission and install the global
/// subscription manager.
pub async fn init_global(
    environment: Arc<dyn WorkerEnvironment>,
    notifications: Arc<dyn NotificationCapability>,
    worker_path: Option<&str>,
    application_server_key: Option<String>,
) -> Result<Arc<SubscriptionManager>, ClientError> {
    let worker = WorkerRegistrar::register_global(environment, worker_path).await?;
    log::info!("[Worker] Global worker registered at {}", worker.path());

    SubscriptionManager::request_permission(notifications.as_ref(), |_| {}).await;

    let manager = SubscriptionManager::new(
        &worker,
        notifications,
        ManagerOptions {
            application_server_key,
            ..ManagerOptions::default()
        },
    )?;
    Ok(SubscriptionManager::set_global(Arc::new(manager)))
}

/// Keeps the application server in step with the local subscription.
///
/// If the server cannot be told about an unsubscription that already
/// happened locally, the removed descriptor is kept until
/// [`retry_unsubscribe`](Self::retry_unsubscribe) delivers it.
#[derive(Debug, Clone)]
pub struct PushClient {
    manager: Arc<SubscriptionManager>,
    http: reqwest::Client,
    server_url: String,
    pending_removal: Arc<Mutex<Option<SubscriptionDescriptor>>>,
}

impl PushClient {
    /// Client for the server at `server_url` (scheme + host, no `/push`).
    pub fn new(manager: Arc<SubscriptionManager>, server_url: impl Into<String>) -> Self {
        Self {
            manager,
            http: reqwest::Client::new(),
            server_url: server_url.into().trim_end_matches('/').to_string(),
            pending_removal: Arc::new(Mutex::new(None)),
        }
    }

    /// Client over the global subscription manager.
    pub fn from_global(server_url: impl Into<String>) -> Result<Self, ClientError> {
        let manager = SubscriptionManager::global().ok_or_else(|| {
            log::error!("[Subscription] No global subscription manager installed");
            ClientError::NotRegisteredYet
        })?;
        Ok(Self::new(manager, server_url))
    }

    /// The subscription manager in use.
    pub fn manager(&self) -> &Arc<SubscriptionManager> {
        &self.manager
    }

    /// Subscribe if needed and register the subscription with the server.
    pub async fn subscribe(&self) -> Result<SubscriptionDescriptor, ClientError> {
        let subscription = self.manager.subscribe_if_not_exist().await?;
        log::info!("[Subscription] PERMISSION_GRANTED");

        self.post("subscribe", &subscription).await?;
        Ok(subscription)
    }

    /// Unsubscribe and ask the server to drop the removed endpoint.
    ///
    /// A failed upload leaves the removed descriptor pending; see
    /// [`pending_unsubscribe`](Self::pending_unsubscribe).
    pub async fn unsubscribe(&self) -> Result<SubscriptionDescriptor, ClientError> {
        let subscription = self.manager.unsubscribe_if_exist().await?;
        self.report_removal(subscription).await
    }

    /// Descriptor removed locally whose unsubscription the server has not
    /// acknowledged yet.
    pub fn pending_unsubscribe(&self) -> Option<SubscriptionDescriptor> {
        self.pending_removal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Send the pending unsubscription to the server again.
    ///
    /// `NotSubscribedYet` if nothing is pending.
    pub async fn retry_unsubscribe(&self) -> Result<SubscriptionDescriptor, ClientError> {
        let pending = self
            .pending_removal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match pending {
            Some(subscription) => self.report_removal(subscription).await,
            None => Err(ClientError::NotSubscribedYet),
        }
    }

    async fn report_removal(
        &self,
        subscription: SubscriptionDescriptor,
    ) -> Result<SubscriptionDescriptor, ClientError> {
        if let Err(e) = self.post("unsubscribe", &subscription).await {
            log::warn!(
                "[Subscription] Server not told about removal of {}, kept for retry",
                subscription.endpoint
            );
            *self
                .pending_removal
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(subscription);
            return Err(e);
        }

        log::info!("[Subscription] Unsubscription successful");
        Ok(subscription)
    }

    /// Ask the server to send its test alert to every subscriber.
    pub async fn trigger_alert(&self) -> Result<MessageResponse, ClientError> {
        let url = format!("{}/push/alert", self.server_url);
        let response = self.http.get(&url).send().await.map_err(request_failed)?;
        Self::read_message(response).await
    }

    async fn post(
        &self,
        route: &str,
        subscription: &SubscriptionDescriptor,
    ) -> Result<MessageResponse, ClientError> {
        let url = format!("{}/push/{route}", self.server_url);
        let body = EndpointRequest {
            endpoint: subscription.clone(),
        };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(request_failed)?;
        Self::read_message(response).await
    }

    async fn read_message(response: reqwest::Response) -> Result<MessageResponse, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("[Subscription] Server answered {status}: {body}");
            return Err(ClientError::ServerRequestFailed);
        }

        response
            .json::<MessageResponse>()
            .await
            .map_err(request_failed)
    }
}

fn request_failed(error: reqwest::Error) -> ClientError {
    log::error!("[Subscription] Server request failed: {error}");
    ClientError::ServerRequestFailed
}
