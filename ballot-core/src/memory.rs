use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{BallotError, Conflict};
use crate::model::{Ballot, PollDetail, PollId, PollSummary, Principal};
use crate::service::PollService;
use crate::validation::{validate_candidate_name, validate_poll_title};

#[derive(Debug, Clone)]
struct StoredPoll {
    id: PollId,
    name: String,
    voting_open: bool,
    creator: Principal,
    candidates: Vec<String>,
    // voter -> ballot; one entry per voter
    ballots: HashMap<Principal, Ballot>,
    // cast order, for a stable detail view
    ballot_order: Vec<Principal>,
}

impl StoredPoll {
    fn summary(&self) -> PollSummary {
        PollSummary {
            id: self.id,
            name: self.name.clone(),
            voting_open: self.voting_open,
            creator: self.creator.clone(),
        }
    }

    fn detail(&self) -> PollDetail {
        let ballots: Vec<Ballot> = self
            .ballot_order
            .iter()
            .filter_map(|voter| self.ballots.get(voter).cloned())
            .collect();
        let tally = self
            .candidates
            .iter()
            .map(|name| {
                let count = ballots.iter().filter(|b| &b.candidate == name).count() as u64;
                (name.clone(), count)
            })
            .collect();
        PollDetail {
            id: self.id,
            name: self.name.clone(),
            voting_open: self.voting_open,
            creator: self.creator.clone(),
            candidates: self.candidates.clone(),
            ballots,
            tally,
        }
    }
}

#[derive(Debug, Default)]
struct Backend {
    next_id: u64,
    polls: Vec<StoredPoll>,
}

impl Backend {
    fn poll_mut(&mut self, id: PollId) -> Result<&mut StoredPoll, BallotError> {
        self.polls
            .iter_mut()
            .find(|poll| poll.id == id)
            .ok_or(BallotError::NotFound(id))
    }
}

/// Self-contained poll backend honouring the remote service contract.
#[derive(Debug, Clone, Default)]
pub struct MemoryPollService {
    inner: Arc<RwLock<Backend>>,
}

impl MemoryPollService {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend pre-filled with a few polls, for demos and offline use.
    pub async fn with_sample_polls() -> Result<Self, BallotError> {
        let service = Self::new();
        let host = Principal::new("sample-host");
        let guest = Principal::new("sample-guest");

        let lunch = service.create_poll(&host, "Team lunch spot").await?;
        for name in ["Pizza", "Sushi", "Tacos"] {
            service.add_candidate(&host, lunch, name).await?;
        }
        service.cast_ballot(&guest, lunch, "Sushi").await?;

        let retro = service.create_poll(&guest, "Retro format").await?;
        for name in ["Start stop continue", "Sailboat"] {
            service.add_candidate(&guest, retro, name).await?;
        }
        service.close_balloting(&guest, retro).await?;
        Ok(service)
    }

    fn set_open(poll: &mut StoredPoll, caller: &Principal, open: bool) -> Result<(), BallotError> {
        if &poll.creator != caller {
            return Err(Conflict::Unauthorized.into());
        }
        poll.voting_open = open;
        Ok(())
    }
}

#[async_trait]
impl PollService for MemoryPollService {
    async fn list_polls(&self) -> Result<Vec<PollSummary>, BallotError> {
        let backend = self.inner.read().await;
        Ok(backend.polls.iter().map(StoredPoll::summary).collect())
    }

    async fn get_poll_detail(&self, poll: PollId) -> Result<PollDetail, BallotError> {
        let backend = self.inner.read().await;
        backend
            .polls
            .iter()
            .find(|p| p.id == poll)
            .map(StoredPoll::detail)
            .ok_or(BallotError::NotFound(poll))
    }

    async fn create_poll(&self, caller: &Principal, title: &str) -> Result<PollId, BallotError> {
        let title = validate_poll_title(title)?;
        let mut backend = self.inner.write().await;
        let id = PollId(backend.next_id);
        backend.next_id += 1;
        backend.polls.push(StoredPoll {
            id,
            name: title.to_owned(),
            voting_open: true,
            creator: caller.clone(),
            candidates: Vec::new(),
            ballots: HashMap::new(),
            ballot_order: Vec::new(),
        });
        debug!(poll = %id, "poll created");
        Ok(id)
    }

    async fn add_candidate(
        &self,
        _caller: &Principal,
        poll: PollId,
        name: &str,
    ) -> Result<String, BallotError> {
        let name = validate_candidate_name(name)?;
        let mut backend = self.inner.write().await;
        let stored = backend.poll_mut(poll)?;
        if stored.candidates.iter().any(|existing| existing == name) {
            return Err(Conflict::DuplicateCandidate.into());
        }
        stored.candidates.push(name.to_owned());
        Ok(format!("Candidate {name} added"))
    }

    async fn cast_ballot(
        &self,
        caller: &Principal,
        poll: PollId,
        candidate: &str,
    ) -> Result<String, BallotError> {
        let mut backend = self.inner.write().await;
        let stored = backend.poll_mut(poll)?;
        if !stored.voting_open {
            return Err(Conflict::VotingClosed.into());
        }
        if !stored.candidates.iter().any(|name| name == candidate) {
            return Err(Conflict::InvalidCandidate.into());
        }
        if stored.ballots.contains_key(caller) {
            return Err(Conflict::AlreadyVoted.into());
        }
        stored.ballots.insert(
            caller.clone(),
            Ballot {
                voter: caller.clone(),
                candidate: candidate.to_owned(),
                cast_at: Utc::now(),
            },
        );
        stored.ballot_order.push(caller.clone());
        Ok(format!("Ballot cast for {candidate}"))
    }

    async fn close_balloting(
        &self,
        caller: &Principal,
        poll: PollId,
    ) -> Result<String, BallotError> {
        let mut backend = self.inner.write().await;
        Self::set_open(backend.poll_mut(poll)?, caller, false)?;
        Ok("Balloting closed".to_owned())
    }

    async fn reopen_balloting(
        &self,
        caller: &Principal,
        poll: PollId,
    ) -> Result<String, BallotError> {
        let mut backend = self.inner.write().await;
        Self::set_open(backend.poll_mut(poll)?, caller, true)?;
        Ok("Balloting reopened".to_owned())
    }
}
