pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod queue;
pub mod routes;

use std::sync::Arc;

use config::Config;
use db::store::{GroupDirectory, MessageRepository, UserDirectory};
use db::Stores;
use gateway::{
    ConnectionHub, ConnectionRegistry, MessageRouter, PresenceNotifier, SessionLifecycle,
};
use queue::NotificationQueue;

/// Shared application state available to all route handlers.
///
/// Everything here is built once at startup; handlers only clone handles.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub messages: Arc<dyn MessageRepository>,
    pub groups: Arc<dyn GroupDirectory>,
    pub users: Arc<dyn UserDirectory>,
    pub registry: Arc<ConnectionRegistry>,
    pub hub: Arc<ConnectionHub>,
    pub router: Arc<MessageRouter>,
    pub lifecycle: Arc<SessionLifecycle>,
}

impl AppState {
    pub fn new(config: Config, stores: Stores, queue: Arc<dyn NotificationQueue>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let hub = Arc::new(ConnectionHub::new());

        let presence = Arc::new(PresenceNotifier::new(
            stores.users.clone(),
            registry.clone(),
            hub.clone(),
        ));
        let lifecycle = Arc::new(SessionLifecycle::new(
            registry.clone(),
            stores.groups.clone(),
            presence,
            hub.clone(),
            config.connect_timeout,
        ));
        let router = Arc::new(MessageRouter::new(
            stores.messages.clone(),
            stores.groups.clone(),
            registry.clone(),
            hub.clone(),
            queue,
            config.send_timeout,
        ));

        Self {
            config: Arc::new(config),
            messages: stores.messages,
            groups: stores.groups,
            users: stores.users,
            registry,
            hub,
            router,
            lifecycle,
        }
    }
}
