//! Worker registration.
//!
//! A push subscription hangs off a registered worker, so registration has to
//! succeed before anything else on the client can happen. [`WorkerRegistrar`]
//! wraps the environment's registration call with path defaulting and error
//! mapping, and keeps the resulting [`WorkerHandle`].
//!
//! A process-wide handle is kept in a [`GlobalSlot`] for callers that do not
//! thread the handle through explicitly.

use std::sync::Arc;
use tokio::sync::Mutex;

use super::capability::{PushCapability, WorkerEnvironment, WorkerRegistration};
use super::ClientError;
use crate::constants::DEFAULT_WORKER_PATH;
use crate::global::GlobalSlot;

static GLOBAL_WORKER: GlobalSlot<WorkerHandle> = GlobalSlot::new();

/// A registered worker.
///
/// The registration path is fixed for the lifetime of the handle. Handles
/// for the same registration, whether clones or the result of registering
/// the same path twice, share the push capability and the subscription lock.
#[derive(Clone)]
pub struct WorkerHandle {
    path: String,
    registration: WorkerRegistration,
}

impl WorkerHandle {
    /// Wrap the registration returned by the environment for `path`.
    pub fn new(path: impl Into<String>, registration: WorkerRegistration) -> Self {
        Self {
            path: path.into(),
            registration,
        }
    }

    /// Path the worker was registered with.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Push capability of this registration.
    pub fn push_manager(&self) -> Arc<dyn PushCapability> {
        self.registration.push_manager()
    }

    /// Lock serializing check-then-create on the registration's subscription slot.
    pub(crate) fn subscription_lock(&self) -> Arc<Mutex<()>> {
        self.registration.subscription_lock()
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Registers a worker with the environment and remembers the result.
pub struct WorkerRegistrar {
    environment: Arc<dyn WorkerEnvironment>,
    default_path: Option<String>,
    registration: Option<WorkerHandle>,
}

impl std::fmt::Debug for WorkerRegistrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRegistrar")
            .field("default_path", &self.default_path)
            .field("registration", &self.registration)
            .finish_non_exhaustive()
    }
}

impl WorkerRegistrar {
    /// Create a registrar. `default_path` is used when `register` gets none.
    pub fn new(environment: Arc<dyn WorkerEnvironment>, default_path: Option<String>) -> Self {
        Self {
            environment,
            default_path,
            registration: None,
        }
    }

    /// Whether `environment` can register workers.
    pub fn check_support(environment: &dyn WorkerEnvironment) -> bool {
        environment.supports_workers()
    }

    /// Register a worker at `path`, or at the configured default path.
    ///
    /// Support is checked before the environment is contacted. Each call
    /// issues a registration request; the environment decides whether a
    /// repeated path yields the same registration.
    pub async fn register(&mut self, path: Option<&str>) -> Result<WorkerHandle, ClientError> {
        if !Self::check_support(self.environment.as_ref()) {
            log::warn!("[Worker] Worker registration not supported");
            return Err(ClientError::CapabilityUnsupported);
        }

        let Some(path) = path
            .filter(|p| !p.is_empty())
            .or_else(|| self.default_path.as_deref().filter(|p| !p.is_empty()))
            .map(str::to_string)
        else {
            log::error!("[Worker] Worker path has not been defined");
            return Err(ClientError::PathNotDefined);
        };

        let registration = self.environment.register_worker(&path).await.map_err(|e| {
            log::error!("[Worker] Registration of {path} failed: {e}");
            ClientError::ServiceWorkerRegistrationFailed
        })?;

        let handle = WorkerHandle::new(path, registration);
        log::info!("[Worker] Registered {}", handle.path());
        self.registration = Some(handle.clone());
        Ok(handle)
    }

    /// The handle from the last successful `register`.
    pub fn registration(&self) -> Result<WorkerHandle, ClientError> {
        self.registration.clone().ok_or_else(|| {
            log::error!("[Worker] Worker has not been registered");
            ClientError::NotRegisteredYet
        })
    }

    /// Register a fresh registrar and store its handle as the global worker.
    ///
    /// Any failure is reported as `ServiceWorkerRegistrationFailed`; the
    /// cause is only logged.
    pub async fn register_global(
        environment: Arc<dyn WorkerEnvironment>,
        path: Option<&str>,
    ) -> Result<WorkerHandle, ClientError> {
        let mut registrar = Self::new(environment, Some(DEFAULT_WORKER_PATH.to_string()));
        match registrar.register(path).await {
            Ok(handle) => {
                GLOBAL_WORKER.set(Arc::new(handle.clone()));
                Ok(handle)
            }
            Err(e) => {
                log::error!("[Worker] SERVICE_WORKER_REGISTRATION_FAILED: {}", e.code());
                Err(ClientError::ServiceWorkerRegistrationFailed)
            }
        }
    }

    /// The global worker, if one has been registered.
    pub fn global() -> Option<WorkerHandle> {
        GLOBAL_WORKER.get().map(|handle| (*handle).clone())
    }

    /// Clear the global worker slot.
    pub fn reset_global() {
        GLOBAL_WORKER.reset();
    }

    /// Whether a global worker is set.
    pub fn is_global_initialized() -> bool {
        GLOBAL_WORKER.is_initialized()
    }
}
