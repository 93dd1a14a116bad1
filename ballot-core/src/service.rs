use async_trait::async_trait;

use crate::error::BallotError;
use crate::model::{PollDetail, PollId, PollSummary, Principal};

/// The remote backend that owns polls, ballots and tallies.
///
/// Write operations take the caller explicitly; the backend decides what that
/// caller is allowed to do.
#[async_trait]
pub trait PollService: Send + Sync {
    async fn list_polls(&self) -> Result<Vec<PollSummary>, BallotError>;

    async fn get_poll_detail(&self, poll: PollId) -> Result<PollDetail, BallotError>;

    async fn create_poll(&self, caller: &Principal, title: &str) -> Result<PollId, BallotError>;

    async fn add_candidate(
        &self,
        caller: &Principal,
        poll: PollId,
        name: &str,
    ) -> Result<String, BallotError>;

    async fn cast_ballot(
        &self,
        caller: &Principal,
        poll: PollId,
        candidate: &str,
    ) -> Result<String, BallotError>;

    async fn close_balloting(&self, caller: &Principal, poll: PollId)
        -> Result<String, BallotError>;

    async fn reopen_balloting(
        &self,
        caller: &Principal,
        poll: PollId,
    ) -> Result<String, BallotError>;
}

/// Session state owned by the authentication provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn is_authenticated(&self) -> bool;

    async fn current_identity(&self) -> Option<Principal>;

    async fn login(&self) -> Result<Principal, BallotError>;

    async fn logout(&self) -> Result<(), BallotError>;
}
