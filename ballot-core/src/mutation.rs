use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::{QueryCache, QueryKey};
use crate::error::{BallotError, Conflict};
use crate::model::{PollId, Principal};
use crate::retry::RetryPolicy;
use crate::service::{IdentityProvider, PollService};
use crate::validation::{validate_candidate_name, validate_poll_title};

/// Runs writes against the poll service and invalidates the reads they affect.
///
/// Invalidation only happens after the service acknowledged the write; a
/// failed mutation leaves the cache exactly as it was.
#[derive(Clone)]
pub struct MutationCoordinator {
    service: Arc<dyn PollService>,
    identity: Arc<dyn IdentityProvider>,
    cache: QueryCache,
    retry: RetryPolicy,
}

impl MutationCoordinator {
    pub fn new(
        service: Arc<dyn PollService>,
        identity: Arc<dyn IdentityProvider>,
        cache: QueryCache,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            service,
            identity,
            cache,
            retry,
        }
    }

    pub async fn create_poll(&self, title: &str) -> Result<PollId, BallotError> {
        let title = validate_poll_title(title)?;
        let caller = self.caller().await?;
        let service = self.service.as_ref();
        let caller = &caller;
        let id = self
            .finish(
                "create_poll",
                self.retry
                    .run("create_poll", move || service.create_poll(caller, title))
                    .await,
                &[QueryKey::Polls],
            )
            .await?;
        info!(poll = %id, "poll created");
        Ok(id)
    }

    pub async fn add_candidate(&self, poll: PollId, name: &str) -> Result<String, BallotError> {
        let name = validate_candidate_name(name)?;
        let caller = self.caller().await?;
        let service = self.service.as_ref();
        let caller = &caller;
        self.finish(
            "add_candidate",
            self.retry
                .run("add_candidate", move || service.add_candidate(caller, poll, name))
                .await,
            &[QueryKey::PollDetail(poll)],
        )
        .await
    }

    pub async fn cast_ballot(&self, poll: PollId, candidate: &str) -> Result<String, BallotError> {
        if candidate.trim().is_empty() {
            return Err(BallotError::validation("candidate", "is required"));
        }
        let caller = self.caller().await?;
        let service = self.service.as_ref();
        let caller = &caller;
        self.finish(
            "cast_ballot",
            self.retry
                .run("cast_ballot", move || service.cast_ballot(caller, poll, candidate))
                .await,
            &[QueryKey::PollDetail(poll), QueryKey::Polls],
        )
        .await
    }

    pub async fn close_balloting(&self, poll: PollId) -> Result<String, BallotError> {
        let caller = self.caller().await?;
        let service = self.service.as_ref();
        let caller = &caller;
        self.finish(
            "close_balloting",
            self.retry
                .run("close_balloting", move || service.close_balloting(caller, poll))
                .await,
            &[QueryKey::PollDetail(poll), QueryKey::Polls],
        )
        .await
    }

    pub async fn reopen_balloting(&self, poll: PollId) -> Result<String, BallotError> {
        let caller = self.caller().await?;
        let service = self.service.as_ref();
        let caller = &caller;
        self.finish(
            "reopen_balloting",
            self.retry
                .run("reopen_balloting", move || service.reopen_balloting(caller, poll))
                .await,
            &[QueryKey::PollDetail(poll), QueryKey::Polls],
        )
        .await
    }

    async fn caller(&self) -> Result<Principal, BallotError> {
        self.identity
            .current_identity()
            .await
            .ok_or(BallotError::StateConflict(Conflict::SignInRequired))
    }

    async fn finish<T>(
        &self,
        op: &str,
        result: Result<T, BallotError>,
        affected: &[QueryKey],
    ) -> Result<T, BallotError> {
        match result {
            Ok(value) => {
                for key in affected {
                    self.cache.invalidate(key).await;
                }
                info!(op, "mutation applied");
                Ok(value)
            }
            Err(err) => {
                warn!(op, error = %err, "mutation failed");
                Err(err)
            }
        }
    }
}
