use std::sync::Arc;

use tracing::info;

use crate::cache::{QueryCache, QueryKey, Subscription};
use crate::config::ClientConfig;
use crate::error::{BallotError, QueryError};
use crate::filter::{self, FilterState, PollStats};
use crate::model::{PollDetail, PollId, PollSummary, Principal};
use crate::mutation::MutationCoordinator;
use crate::refresh::{spawn_collector, spawn_refresher, TaskHandle};
use crate::service::{IdentityProvider, PollService};
use crate::view::PollView;

/// Entry point for a front-end: cached reads, writes, and derived views.
pub struct BallotClient {
    cache: QueryCache,
    mutations: MutationCoordinator,
    identity: Arc<dyn IdentityProvider>,
    tasks: Vec<TaskHandle>,
}

impl BallotClient {
    pub fn new(
        service: Arc<dyn PollService>,
        identity: Arc<dyn IdentityProvider>,
        config: &ClientConfig,
    ) -> Self {
        let cache = QueryCache::new(Arc::clone(&service), config.query.cache_config());
        let mutations = MutationCoordinator::new(
            service,
            Arc::clone(&identity),
            cache.clone(),
            config.mutation_retry_policy(),
        );
        Self {
            cache,
            mutations,
            identity,
            tasks: Vec::new(),
        }
    }

    /// Starts the idle-entry collector and, when configured, periodic refetching
    /// of the poll list. Requires a running tokio runtime.
    pub fn start_background(&mut self, config: &ClientConfig) {
        let cache_time = config.query.cache_config().cache_time;
        self.tasks.push(spawn_collector(self.cache.clone(), cache_time));
        if let Some(every) = config.query.refetch_interval() {
            self.tasks
                .push(spawn_refresher(self.cache.clone(), vec![QueryKey::Polls], every));
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn mutations(&self) -> &MutationCoordinator {
        &self.mutations
    }

    pub async fn viewer(&self) -> Option<Principal> {
        self.identity.current_identity().await
    }

    pub async fn login(&self) -> Result<Principal, BallotError> {
        self.identity.login().await
    }

    pub async fn logout(&self) -> Result<(), BallotError> {
        self.identity.logout().await
    }

    pub async fn polls(&self) -> Result<Arc<Vec<PollSummary>>, QueryError<Arc<Vec<PollSummary>>>> {
        self.cache.polls().await
    }

    pub async fn poll_detail(
        &self,
        poll: PollId,
    ) -> Result<Arc<PollDetail>, QueryError<Arc<PollDetail>>> {
        self.cache.poll_detail(poll).await
    }

    pub async fn filtered_polls(
        &self,
        state: &FilterState,
    ) -> Result<Vec<PollSummary>, QueryError<Vec<PollSummary>>> {
        let viewer = self.viewer().await;
        let apply = |polls: Arc<Vec<PollSummary>>| filter::apply(&polls, state, viewer.as_ref());
        match self.cache.polls().await {
            Ok(polls) => Ok(apply(polls)),
            Err(err) => Err(err.and_then_stale(|polls| Some(apply(polls)))),
        }
    }

    /// Polls created by the signed-in user; empty when nobody is signed in.
    pub async fn my_polls(&self) -> Result<Vec<PollSummary>, QueryError<Vec<PollSummary>>> {
        let Some(me) = self.viewer().await else {
            return Ok(Vec::new());
        };
        match self.cache.polls().await {
            Ok(polls) => Ok(filter::polls_by(&polls, &me)),
            Err(err) => Err(err.and_then_stale(|polls| Some(filter::polls_by(&polls, &me)))),
        }
    }

    pub async fn stats(&self) -> Result<PollStats, QueryError<PollStats>> {
        match self.cache.polls().await {
            Ok(polls) => Ok(PollStats::from_polls(&polls)),
            Err(err) => Err(err.and_then_stale(|polls| Some(PollStats::from_polls(&polls)))),
        }
    }

    /// Newest open polls, at most `limit`.
    pub async fn featured(
        &self,
        limit: usize,
    ) -> Result<Vec<PollSummary>, QueryError<Vec<PollSummary>>> {
        match self.cache.polls().await {
            Ok(polls) => Ok(filter::featured(&polls, limit)),
            Err(err) => Err(err.and_then_stale(|polls| Some(filter::featured(&polls, limit)))),
        }
    }

    pub async fn poll_view(&self, poll: PollId) -> Result<PollView, QueryError<PollView>> {
        let viewer = self.viewer().await;
        match self.cache.poll_detail(poll).await {
            Ok(detail) => Ok(PollView::build(&detail, viewer.as_ref())),
            Err(err) => {
                Err(err.and_then_stale(|detail| Some(PollView::build(&detail, viewer.as_ref()))))
            }
        }
    }

    pub async fn subscribe(&self, key: QueryKey) -> Subscription {
        self.cache.subscribe(key).await
    }

    pub async fn create_poll(&self, title: &str) -> Result<PollId, BallotError> {
        self.mutations.create_poll(title).await
    }

    pub async fn add_candidate(&self, poll: PollId, name: &str) -> Result<String, BallotError> {
        self.mutations.add_candidate(poll, name).await
    }

    pub async fn cast_ballot(&self, poll: PollId, candidate: &str) -> Result<String, BallotError> {
        self.mutations.cast_ballot(poll, candidate).await
    }

    pub async fn close_balloting(&self, poll: PollId) -> Result<String, BallotError> {
        self.mutations.close_balloting(poll).await
    }

    pub async fn reopen_balloting(&self, poll: PollId) -> Result<String, BallotError> {
        self.mutations.reopen_balloting(poll).await
    }

    pub async fn invalidate_all(&self) {
        self.cache.invalidate_all().await;
    }

    pub async fn invalidate_polls(&self) {
        self.cache.invalidate(&QueryKey::Polls).await;
    }

    pub async fn invalidate_poll(&self, poll: PollId) {
        self.cache.invalidate(&QueryKey::PollDetail(poll)).await;
    }

    /// Stops background tasks and empties the cache.
    pub async fn shutdown(self) -> Result<(), BallotError> {
        for task in self.tasks {
            task.stop().await?;
        }
        self.cache.shutdown().await;
        info!("client shut down");
        Ok(())
    }
}
