pub mod countdown;
pub mod registry;
pub mod round;
pub mod session;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};
use tracing::debug;

use crate::{
    config::AppConfig,
    dao::{models::RoomId, room_store::RoomStore},
    error::ServiceError,
    services::auth_service::{Authenticator, TokenAuthenticator},
};

pub use self::registry::{Connection, ConnectionRegistry};
pub use self::session::{RoomSession, RoomSessions};

pub type SharedState = Arc<AppState>;

/// Central application state: configuration, storage handle, live sockets and room sessions.
pub struct AppState {
    config: Arc<AppConfig>,
    store: RwLock<Option<Arc<dyn RoomStore>>>,
    degraded: watch::Sender<bool>,
    connections: ConnectionRegistry,
    sessions: RoomSessions,
    authenticator: Arc<dyn Authenticator>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let authenticator = Arc::new(TokenAuthenticator::from_config(&config));
        Self::with_authenticator(config, authenticator)
    }

    /// Same as [`AppState::new`] with a custom authentication collaborator.
    pub fn with_authenticator(
        config: AppConfig,
        authenticator: Arc<dyn Authenticator>,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            config: Arc::new(config),
            store: RwLock::new(None),
            degraded: degraded_tx,
            connections: ConnectionRegistry::new(),
            sessions: RoomSessions::new(),
            authenticator,
        })
    }

    pub fn config(&self) -> Arc<AppConfig> {
        self.config.clone()
    }

    /// Obtain a handle to the current store, if one is installed.
    pub async fn store(&self) -> Option<Arc<dyn RoomStore>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Current store, or [`ServiceError::Degraded`] while storage is unavailable.
    pub async fn require_store(&self) -> Result<Arc<dyn RoomStore>, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        self.store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new store implementation and leave degraded mode.
    pub async fn set_store(&self, store: Arc<dyn RoomStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear_store(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Registry of live player sockets.
    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    /// Per-room coordinator sessions.
    pub fn sessions(&self) -> &RoomSessions {
        &self.sessions
    }

    /// Release the session of a room nobody is connected to once its round is idle.
    pub fn release_room_if_unused(&self, room_id: RoomId) {
        if self.connections.members_of(room_id).is_empty() && self.sessions.evict_idle(room_id) {
            debug!(room_id, "released idle room session");
        }
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }
}
