use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{BallotError, QueryError};
use crate::model::{PollDetail, PollId, PollSummary};
use crate::retry::RetryPolicy;
use crate::service::PollService;

/// Logical identity of a cached read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Polls,
    PollDetail(PollId),
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Polls => f.write_str("polls"),
            Self::PollDetail(id) => write!(f, "poll/{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Polls(Arc<Vec<PollSummary>>),
    Detail(Arc<PollDetail>),
}

impl QueryValue {
    pub fn into_polls(self) -> Option<Arc<Vec<PollSummary>>> {
        match self {
            Self::Polls(polls) => Some(polls),
            Self::Detail(_) => None,
        }
    }

    pub fn into_detail(self) -> Option<Arc<PollDetail>> {
        match self {
            Self::Detail(detail) => Some(detail),
            Self::Polls(_) => None,
        }
    }
}

/// Non-blocking view of one key.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Cached { value: QueryValue, stale: bool },
    Pending,
    Absent,
}

#[derive(Debug, Clone)]
pub struct EntrySnapshot {
    pub value: Option<QueryValue>,
    pub fetched_at: Option<Instant>,
    pub stale: bool,
    pub fetching: bool,
    pub last_error: Option<BallotError>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    Updated(QueryKey),
    Invalidated(QueryKey),
    Failed(QueryKey, BallotError),
    Evicted(QueryKey),
}

impl CacheEvent {
    pub fn key(&self) -> &QueryKey {
        match self {
            Self::Updated(key)
            | Self::Invalidated(key)
            | Self::Failed(key, _)
            | Self::Evicted(key) => key,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Age after which a cached value is refetched on the next read.
    pub stale_time: Duration,
    /// Idle time after which an entry is dropped by the collector.
    pub cache_time: Duration,
    pub retry: RetryPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(5 * 60),
            cache_time: Duration::from_secs(10 * 60),
            retry: RetryPolicy::queries(),
        }
    }
}

type SharedFetch = Shared<BoxFuture<'static, Result<QueryValue, BallotError>>>;

struct InFlight {
    epoch: u64,
    fetch: SharedFetch,
    abort: AbortHandle,
}

struct Entry {
    value: Option<QueryValue>,
    fetched_at: Option<Instant>,
    // epoch of the fetch that produced `value`
    data_epoch: u64,
    invalidated_epoch: u64,
    last_used: Instant,
    last_error: Option<BallotError>,
    in_flight: Option<InFlight>,
    watchers: Arc<()>,
}

impl Entry {
    fn new(now: Instant) -> Self {
        Self {
            value: None,
            fetched_at: None,
            data_epoch: 0,
            invalidated_epoch: 0,
            last_used: now,
            last_error: None,
            in_flight: None,
            watchers: Arc::new(()),
        }
    }

    fn is_stale(&self, now: Instant, stale_time: Duration) -> bool {
        match self.fetched_at {
            None => true,
            Some(at) => {
                self.invalidated_epoch > self.data_epoch || now.duration_since(at) > stale_time
            }
        }
    }

    fn fresh_value(&self, now: Instant, stale_time: Duration) -> Option<QueryValue> {
        if self.is_stale(now, stale_time) {
            None
        } else {
            self.value.clone()
        }
    }

    /// An in-flight fetch started before the last invalidation cannot satisfy new readers.
    fn joinable_fetch(&self) -> Option<SharedFetch> {
        self.in_flight
            .as_ref()
            .filter(|in_flight| in_flight.epoch > self.invalidated_epoch)
            .map(|in_flight| in_flight.fetch.clone())
    }

    fn is_watched(&self) -> bool {
        Arc::strong_count(&self.watchers) > 1
    }
}

#[derive(Default)]
struct State {
    entries: HashMap<QueryKey, Entry>,
    // orders fetch starts and invalidations
    epoch: u64,
}

struct CacheInner {
    service: Arc<dyn PollService>,
    config: CacheConfig,
    state: Mutex<State>,
    events: broadcast::Sender<CacheEvent>,
}

impl CacheInner {
    async fn complete(&self, key: &QueryKey, epoch: u64, result: &Result<QueryValue, BallotError>) {
        let mut state = self.state.lock().await;
        let Some(entry) = state.entries.get_mut(key) else {
            debug!(key = %key, "entry dropped before fetch completed");
            return;
        };
        if entry.in_flight.as_ref().is_some_and(|f| f.epoch == epoch) {
            entry.in_flight = None;
        }
        if epoch < entry.data_epoch {
            debug!(key = %key, epoch, current = entry.data_epoch, "discarding out-of-date result");
            return;
        }
        let event = match result {
            Ok(value) => {
                entry.value = Some(value.clone());
                entry.fetched_at = Some(Instant::now());
                entry.data_epoch = epoch;
                entry.last_error = None;
                debug!(key = %key, "cache updated");
                CacheEvent::Updated(key.clone())
            }
            Err(err) => {
                warn!(key = %key, error = %err, "fetch failed");
                entry.last_error = Some(err.clone());
                CacheEvent::Failed(key.clone(), err.clone())
            }
        };
        drop(state);
        let _ = self.events.send(event);
    }
}

async fn load(service: &dyn PollService, key: &QueryKey) -> Result<QueryValue, BallotError> {
    match key {
        QueryKey::Polls => service
            .list_polls()
            .await
            .map(|polls| QueryValue::Polls(Arc::new(polls))),
        QueryKey::PollDetail(id) => service
            .get_poll_detail(*id)
            .await
            .map(|detail| QueryValue::Detail(Arc::new(detail))),
    }
}

/// In-memory store of poll query results with request de-duplication.
///
/// Each instance is independent; clones share the same underlying store.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<CacheInner>,
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl QueryCache {
    pub fn new(service: Arc<dyn PollService>, config: CacheConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(CacheInner {
                service,
                config,
                state: Mutex::new(State::default()),
                events,
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Returns the cached value if fresh, otherwise waits for a (shared) fetch.
    pub async fn fetch(&self, key: &QueryKey) -> Result<QueryValue, QueryError<QueryValue>> {
        self.fetch_with(key, false).await
    }

    /// Fetches regardless of freshness. A running request is joined only if it
    /// started after the last invalidation.
    pub async fn refetch(&self, key: &QueryKey) -> Result<QueryValue, QueryError<QueryValue>> {
        self.fetch_with(key, true).await
    }

    async fn fetch_with(
        &self,
        key: &QueryKey,
        force: bool,
    ) -> Result<QueryValue, QueryError<QueryValue>> {
        let pending = {
            let mut guard = self.inner.state.lock().await;
            let State { entries, epoch } = &mut *guard;
            let now = Instant::now();
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| Entry::new(now));
            entry.last_used = now;
            if !force {
                if let Some(value) = entry.fresh_value(now, self.inner.config.stale_time) {
                    return Ok(value);
                }
            }
            match entry.joinable_fetch() {
                Some(fetch) => {
                    debug!(key = %key, "joining in-flight fetch");
                    fetch
                }
                None => {
                    *epoch += 1;
                    let in_flight = self.start_fetch(key.clone(), *epoch);
                    let fetch = in_flight.fetch.clone();
                    entry.in_flight = Some(in_flight);
                    fetch
                }
            }
        };

        match pending.await {
            Ok(value) => Ok(value),
            Err(error) => Err(QueryError {
                error,
                stale: self.cached_value(key).await,
            }),
        }
    }

    pub async fn polls(
        &self,
    ) -> Result<Arc<Vec<PollSummary>>, QueryError<Arc<Vec<PollSummary>>>> {
        match self.fetch(&QueryKey::Polls).await {
            Ok(value) => value.into_polls().ok_or_else(|| mismatch(&QueryKey::Polls)),
            Err(err) => Err(err.and_then_stale(QueryValue::into_polls)),
        }
    }

    pub async fn poll_detail(
        &self,
        poll: PollId,
    ) -> Result<Arc<PollDetail>, QueryError<Arc<PollDetail>>> {
        let key = QueryKey::PollDetail(poll);
        match self.fetch(&key).await {
            Ok(value) => value.into_detail().ok_or_else(|| mismatch(&key)),
            Err(err) => Err(err.and_then_stale(QueryValue::into_detail)),
        }
    }

    pub async fn lookup(&self, key: &QueryKey) -> Lookup {
        let mut state = self.inner.state.lock().await;
        let now = Instant::now();
        match state.entries.get_mut(key) {
            None => Lookup::Absent,
            Some(entry) => {
                entry.last_used = now;
                match &entry.value {
                    Some(value) => Lookup::Cached {
                        value: value.clone(),
                        stale: entry.is_stale(now, self.inner.config.stale_time),
                    },
                    None if entry.in_flight.is_some() => Lookup::Pending,
                    None => Lookup::Absent,
                }
            }
        }
    }

    pub async fn snapshot(&self, key: &QueryKey) -> Option<EntrySnapshot> {
        let state = self.inner.state.lock().await;
        let now = Instant::now();
        state.entries.get(key).map(|entry| EntrySnapshot {
            value: entry.value.clone(),
            fetched_at: entry.fetched_at,
            stale: entry.is_stale(now, self.inner.config.stale_time),
            fetching: entry.in_flight.is_some(),
            last_error: entry.last_error.clone(),
        })
    }

    pub async fn invalidate(&self, key: &QueryKey) {
        self.invalidate_where(|k| k == key).await;
    }

    pub async fn invalidate_all(&self) {
        self.invalidate_where(|_| true).await;
    }

    /// Marks every matching entry stale and notifies subscribers. Returns how many matched.
    pub async fn invalidate_where(&self, predicate: impl Fn(&QueryKey) -> bool) -> usize {
        let keys = self.mark_stale(predicate).await;
        for key in &keys {
            info!(key = %key, "invalidated");
            let _ = self.inner.events.send(CacheEvent::Invalidated(key.clone()));
        }
        keys.len()
    }

    async fn mark_stale(&self, predicate: impl Fn(&QueryKey) -> bool) -> Vec<QueryKey> {
        let mut guard = self.inner.state.lock().await;
        let State { entries, epoch } = &mut *guard;
        *epoch += 1;
        let mut keys = Vec::new();
        for (key, entry) in entries.iter_mut().filter(|(key, _)| predicate(key)) {
            entry.invalidated_epoch = *epoch;
            keys.push(key.clone());
        }
        keys
    }

    /// Drops entries idle for longer than the cache time. In-flight and
    /// subscribed entries are kept.
    pub async fn collect_garbage(&self) -> usize {
        let now = Instant::now();
        let cache_time = self.inner.config.cache_time;
        let mut state = self.inner.state.lock().await;
        let expired: Vec<QueryKey> = state
            .entries
            .iter()
            .filter(|(_, entry)| {
                entry.in_flight.is_none()
                    && !entry.is_watched()
                    && now.duration_since(entry.last_used) > cache_time
            })
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            state.entries.remove(key);
        }
        drop(state);

        for key in &expired {
            debug!(key = %key, "evicted");
            let _ = self.inner.events.send(CacheEvent::Evicted(key.clone()));
        }
        expired.len()
    }

    /// Registers interest in `key`; the entry is not collected while subscribed.
    pub async fn subscribe(&self, key: QueryKey) -> Subscription {
        let mut state = self.inner.state.lock().await;
        let now = Instant::now();
        let watch = state
            .entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(now))
            .watchers
            .clone();
        Subscription {
            key,
            events: self.inner.events.subscribe(),
            _watch: watch,
        }
    }

    /// Every cache event, for all keys.
    pub fn events(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    /// Aborts running fetches and empties the store.
    pub async fn shutdown(&self) {
        let mut state = self.inner.state.lock().await;
        for entry in state.entries.values_mut() {
            if let Some(in_flight) = entry.in_flight.take() {
                in_flight.abort.abort();
            }
        }
        let dropped = state.entries.len();
        state.entries.clear();
        info!(dropped, "query cache shut down");
    }

    async fn cached_value(&self, key: &QueryKey) -> Option<QueryValue> {
        let state = self.inner.state.lock().await;
        state.entries.get(key).and_then(|entry| entry.value.clone())
    }

    fn start_fetch(&self, key: QueryKey, epoch: u64) -> InFlight {
        debug!(key = %key, epoch, "fetching");
        let inner = Arc::clone(&self.inner);
        // The fetch runs detached so that dropped readers never cancel it.
        let task = tokio::spawn(async move {
            let result = {
                let service = inner.service.as_ref();
                let key = &key;
                inner
                    .config
                    .retry
                    .run("fetch", move || load(service, key))
                    .await
            };
            inner.complete(&key, epoch, &result).await;
            result
        });
        let abort = task.abort_handle();
        let fetch = async move { task.await.unwrap_or_else(|err| Err(err.into())) }
            .boxed()
            .shared();
        InFlight {
            epoch,
            fetch,
            abort,
        }
    }
}

fn mismatch<T>(key: &QueryKey) -> QueryError<T> {
    QueryError {
        error: BallotError::Unknown(format!("cached value for {key} has the wrong shape")),
        stale: None,
    }
}

/// Change notifications for a single query key.
pub struct Subscription {
    key: QueryKey,
    events: broadcast::Receiver<CacheEvent>,
    _watch: Arc<()>,
}

impl Subscription {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Next event for this key, or `None` once the cache is gone.
    pub async fn recv(&mut self) -> Option<CacheEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) if event.key() == &self.key => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(key = %self.key, skipped, "subscriber lagged");
                    // missed events may have touched this key
                    return Some(CacheEvent::Invalidated(self.key.clone()));
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
