pub mod lifecycle;
pub mod rooms;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{config::AppConfig, dao::exercise_store::ExerciseStore, error::ServiceError};

pub use self::rooms::{RoomHub, RoomKey};

pub type SharedState = Arc<AppState>;

/// Central application state holding the storage handle, realtime rooms and configuration.
pub struct AppState {
    store: RwLock<Option<Arc<dyn ExerciseStore>>>,
    rooms: RoomHub,
    config: Arc<AppConfig>,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            store: RwLock::new(None),
            rooms: RoomHub::new(config.room_capacity()),
            config: Arc::new(config),
            degraded: degraded_tx,
        })
    }

    /// Obtain a handle to the current exercise store, if one is installed.
    pub async fn store(&self) -> Option<Arc<dyn ExerciseStore>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Obtain the exercise store or fail with [`ServiceError::Degraded`].
    pub async fn require_store(&self) -> Result<Arc<dyn ExerciseStore>, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        self.store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new exercise store implementation and leave degraded mode.
    pub async fn set_store(&self, store: Arc<dyn ExerciseStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current exercise store and enter degraded mode.
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
                return false;
            }
            *current = value;
            true
        });
    }

    /// Realtime rooms used by the WebSocket layer.
    pub fn rooms(&self) -> &RoomHub {
        &self.rooms
    }

    /// Shared runtime configuration.
    pub fn config(&self) -> Arc<AppConfig> {
        self.config.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::exercise_store::memory::MemoryExerciseStore;

    #[tokio::test]
    async fn store_installation_toggles_degraded_mode() {
        let state = AppState::new(AppConfig::default());
        let mut watcher = state.degraded_watcher();
        assert!(state.is_degraded());
        assert!(matches!(state.require_store().await, Err(ServiceError::Degraded)));

        state.set_store(Arc::new(MemoryExerciseStore::new())).await;
        assert!(watcher.has_changed().unwrap());
        assert!(!*watcher.borrow_and_update());
        assert!(state.require_store().await.is_ok());

        state.clear_store().await;
        assert!(state.is_degraded());
        assert!(state.store().await.is_none());
    }
}
