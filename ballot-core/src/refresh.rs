use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{QueryCache, QueryKey};
use crate::error::BallotError;

/// Handle to a background cache task; `stop` waits for it to exit.
pub struct TaskHandle {
    cancel_tx: broadcast::Sender<()>,
    join: JoinHandle<()>,
}

impl TaskHandle {
    pub async fn stop(self) -> Result<(), BallotError> {
        let _ = self.cancel_tx.send(());
        self.join.await.map_err(BallotError::from)
    }
}

fn spawn_ticker<F, Fut>(name: &'static str, interval: Duration, mut tick: F) -> TaskHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let (cancel_tx, mut cancel_rx) = broadcast::channel(1);
    let join = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // the first tick completes immediately; wait a full period first
        ticker.tick().await;
        info!(task = name, every_ms = interval.as_millis() as u64, "background task started");

        loop {
            tokio::select! {
                _ = cancel_rx.recv() => {
                    info!(task = name, "background task shutdown requested");
                    break;
                }
                _ = ticker.tick() => tick().await,
            }
        }
    });

    TaskHandle { cancel_tx, join }
}

/// Refetches `keys` every `interval`. Failures stay on the cache entries.
pub fn spawn_refresher(cache: QueryCache, keys: Vec<QueryKey>, interval: Duration) -> TaskHandle {
    spawn_ticker("refresher", interval, move || {
        let cache = cache.clone();
        let keys = keys.clone();
        async move {
            for key in &keys {
                if let Err(err) = cache.refetch(key).await {
                    debug!(key = %key, error = %err.error, "scheduled refetch failed");
                }
            }
        }
    })
}

/// Evicts idle entries every `interval`.
pub fn spawn_collector(cache: QueryCache, interval: Duration) -> TaskHandle {
    spawn_ticker("collector", interval, move || {
        let cache = cache.clone();
        async move {
            let evicted = cache.collect_garbage().await;
            if evicted > 0 {
                debug!(evicted, "collected idle cache entries");
            }
        }
    })
}
