use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::{
    dao::{exercise_store::ExerciseStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Keep a storage backend installed in the shared state, running in degraded mode whenever it
/// cannot be reached.
///
/// `connect` is retried with exponential backoff until it yields a store. The installed store is
/// then health-checked periodically; a failed check triggers a few in-place reconnects before
/// the store is dropped and `connect` takes over again.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn ExerciseStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        let store = match connect().await {
            Ok(store) => store,
            Err(err) => {
                warn!(error = %err, retry_in = ?delay, "storage connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
                continue;
            }
        };

        state.set_store(store.clone()).await;
        info!("storage connection established; leaving degraded mode");
        delay = INITIAL_DELAY;

        watch_store(&state, store.as_ref()).await;

        state.clear_store().await;
        error!("storage lost; entering degraded mode until a new connection succeeds");
        sleep(delay).await;
    }
}

/// Poll the store until it fails and cannot be recovered in place.
async fn watch_store(state: &SharedState, store: &dyn ExerciseStore) {
    loop {
        match store.health_check().await {
            Ok(()) => {
                if state.is_degraded() {
                    info!("storage healthy again; leaving degraded mode");
                    state.update_degraded(false);
                }
            }
            Err(err) => {
                warn!(error = %err, "storage health check failed; entering degraded mode");
                state.update_degraded(true);
                if !reconnect_in_place(store).await {
                    warn!("exhausted storage reconnect attempts");
                    return;
                }
                info!("storage reconnection succeeded after health check failure");
                state.update_degraded(false);
            }
        }
        sleep(HEALTH_POLL_INTERVAL).await;
    }
}

async fn reconnect_in_place(store: &dyn ExerciseStore) -> bool {
    let mut delay = INITIAL_DELAY;
    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => return true,
            Err(err) => {
                warn!(attempt, error = %err, "storage reconnect attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig, dao::exercise_store::memory::MemoryExerciseStore, state::AppState,
    };

    #[tokio::test]
    async fn installs_store_and_leaves_degraded_mode() {
        let state = AppState::new(AppConfig::default());
        let mut degraded = state.degraded_watcher();
        assert!(*degraded.borrow());

        let supervisor = tokio::spawn(run(state.clone(), || async {
            let store: Arc<dyn ExerciseStore> = Arc::new(MemoryExerciseStore::new());
            Ok::<_, StorageError>(store)
        }));

        degraded.wait_for(|value| !*value).await.unwrap();
        assert!(state.require_store().await.is_ok());
        supervisor.abort();
    }
}
