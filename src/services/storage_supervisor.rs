use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{room_store::RoomStore, storage::StorageError},
    services::room_service,
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

fn backoff(delay: Duration) -> Duration {
    (delay * 2).min(MAX_DELAY)
}

/// Keep a storage backend installed in the shared state, reconnecting with exponential
/// backoff and holding the service in degraded mode while it is unreachable.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn RoomStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        let store = match connect().await {
            Ok(store) => store,
            Err(err) => {
                warn!(error = %err, "storage connection attempt failed");
                sleep(delay).await;
                delay = backoff(delay);
                continue;
            }
        };

        if let Err(err) = room_service::seed_questions(&store, &state.config()).await {
            warn!(error = %err, "failed to seed the question bank");
        }
        state.set_store(store.clone()).await;
        info!("storage connection established; leaving degraded mode");
        delay = INITIAL_DELAY;

        watch(&state, store.as_ref()).await;

        state.clear_store().await;
        warn!("exhausted storage reconnect attempts; staying in degraded mode");
        sleep(delay).await;
        delay = backoff(delay);
    }
}

/// Poll the health of an installed store until it can no longer be recovered.
async fn watch(state: &SharedState, store: &dyn RoomStore) {
    loop {
        match store.health_check().await {
            Ok(()) => {
                if state.is_degraded() {
                    info!("storage healthy again; leaving degraded mode");
                    state.update_degraded(false);
                }
            }
            Err(err) => {
                warn!(error = %err, "storage health check failed");
                if !recover(state, store).await {
                    return;
                }
                state.update_degraded(false);
            }
        }
        sleep(HEALTH_POLL_INTERVAL).await;
    }
}

/// Try to reconnect a failing store; the first failed attempt enters degraded mode.
async fn recover(state: &SharedState, store: &dyn RoomStore) -> bool {
    let mut delay = INITIAL_DELAY;
    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "storage reconnection succeeded");
                return true;
            }
            Err(err) => {
                if attempt == 0 {
                    warn!(attempt, error = %err, "storage reconnect failed; entering degraded mode");
                    state.update_degraded(true);
                } else {
                    warn!(attempt, error = %err, "storage reconnect attempt failed");
                }
                sleep(delay).await;
                delay = backoff(delay);
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::{config::AppConfig, dao::room_store::memory::MemoryRoomStore, state::AppState};

    #[tokio::test(start_paused = true)]
    async fn installs_store_and_seeds_questions() {
        let state = AppState::new(AppConfig::default());
        let store = MemoryRoomStore::new();
        let installed = store.clone();

        let supervisor = tokio::spawn(run(state.clone(), move || {
            let store: Arc<dyn RoomStore> = Arc::new(installed.clone());
            async move { Ok(store) }
        }));
        sleep(Duration::from_millis(10)).await;

        assert!(!state.is_degraded());
        assert!(state.require_store().await.is_ok());
        assert_eq!(
            store.count_questions().await.unwrap(),
            AppConfig::default().seed_questions().len() as u64
        );
        supervisor.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_backoff_while_unreachable() {
        let state = AppState::new(AppConfig::default());
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let supervisor = tokio::spawn(run(state.clone(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                Err(StorageError::unavailable(
                    "unreachable".into(),
                    std::io::Error::other("connection refused"),
                ))
            }
        }));

        // Attempts at 0s, 1s, 3s and 7s.
        sleep(Duration::from_millis(7_500)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert!(state.is_degraded());
        supervisor.abort();
    }

    #[test]
    fn backoff_is_capped() {
        assert_eq!(backoff(Duration::from_secs(1)), Duration::from_secs(2));
        assert_eq!(backoff(Duration::from_secs(8)), MAX_DELAY);
    }
}
