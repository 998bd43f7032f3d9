//! pushnoti - web push subscription lifecycle and dispatch.
//!
//! This crate covers both ends of a web push setup: the client flow that
//! registers a worker, obtains notification permission and manages the push
//! subscription, and the application server that records subscriptions and
//! sends VAPID-signed, encrypted messages to every subscriber.
//!
//! # Modules
//!
//! - [`client`] - Worker registration, subscription management, server sync
//! - [`server`] - Subscriber registry, dispatch and the `/push` HTTP routes
//! - [`config`] - Configuration loading/saving
//! - [`encoding`] - Application server key encoding
//! - [`types`] - Types shared across the network boundary

pub mod client;
pub mod config;
pub mod constants;
pub mod encoding;
pub mod global;
pub mod server;
pub mod types;

// Re-export commonly used types
pub use client::{ClientError, PushClient, SubscriptionManager, WorkerRegistrar};
pub use config::{Config, ServerPushConfig, VapidCredentials};
pub use server::{DispatchCoordinator, DispatchReport};
pub use types::{SubscribeOptions, SubscriptionDescriptor, SubscriptionKeys};
