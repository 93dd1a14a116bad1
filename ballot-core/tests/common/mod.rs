#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ballot_core::{
    BallotError, MemoryPollService, PollDetail, PollId, PollService, PollSummary, Principal,
};

pub fn alice() -> Principal {
    Principal::new("alice-principal")
}

pub fn bob() -> Principal {
    Principal::new("bob-principal")
}

#[derive(Default)]
struct Failures {
    remaining: usize,
    error: Option<BallotError>,
}

impl Failures {
    fn take(&mut self) -> Option<BallotError> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.error.clone()
    }
}

/// Wraps the in-memory backend with call counters, artificial latency and
/// scripted failures.
#[derive(Default)]
pub struct TestService {
    pub backend: MemoryPollService,
    pub list_calls: AtomicUsize,
    pub detail_calls: AtomicUsize,
    pub write_calls: AtomicUsize,
    latency_ms: AtomicU64,
    read_failures: Mutex<Failures>,
    write_failures: Mutex<Failures>,
}

impl TestService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, times: usize, error: BallotError) {
        *self.read_failures.lock().unwrap() = Failures {
            remaining: times,
            error: Some(error),
        };
    }

    pub fn fail_writes(&self, times: usize, error: BallotError) {
        *self.write_failures.lock().unwrap() = Failures {
            remaining: times,
            error: Some(error),
        };
    }

    pub fn lists(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn details(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    /// Creates a poll with candidates straight on the backend, bypassing the counters.
    pub async fn seed(&self, creator: &Principal, title: &str, candidates: &[&str]) -> PollId {
        let id = self.backend.create_poll(creator, title).await.unwrap();
        for name in candidates {
            self.backend.add_candidate(creator, id, name).await.unwrap();
        }
        id
    }

    /// Reads see the backend, and pick up a scripted failure, as of the
    /// request; latency applies to the response.
    async fn respond<T>(&self, result: Result<T, BallotError>) -> Result<T, BallotError> {
        let failure = self.read_failures.lock().unwrap().take();
        self.delay().await;
        match failure {
            Some(err) => Err(err),
            None => result,
        }
    }

    async fn before_write(&self) -> Result<(), BallotError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        let failure = self.write_failures.lock().unwrap().take();
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn delay(&self) {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

#[async_trait]
impl PollService for TestService {
    async fn list_polls(&self) -> Result<Vec<PollSummary>, BallotError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let result = self.backend.list_polls().await;
        self.respond(result).await
    }

    async fn get_poll_detail(&self, poll: PollId) -> Result<PollDetail, BallotError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        let result = self.backend.get_poll_detail(poll).await;
        self.respond(result).await
    }

    async fn create_poll(&self, caller: &Principal, title: &str) -> Result<PollId, BallotError> {
        self.before_write().await?;
        self.backend.create_poll(caller, title).await
    }

    async fn add_candidate(
        &self,
        caller: &Principal,
        poll: PollId,
        name: &str,
    ) -> Result<String, BallotError> {
        self.before_write().await?;
        self.backend.add_candidate(caller, poll, name).await
    }

    async fn cast_ballot(
        &self,
        caller: &Principal,
        poll: PollId,
        candidate: &str,
    ) -> Result<String, BallotError> {
        self.before_write().await?;
        self.backend.cast_ballot(caller, poll, candidate).await
    }

    async fn close_balloting(
        &self,
        caller: &Principal,
        poll: PollId,
    ) -> Result<String, BallotError> {
        self.before_write().await?;
        self.backend.close_balloting(caller, poll).await
    }

    async fn reopen_balloting(
        &self,
        caller: &Principal,
        poll: PollId,
    ) -> Result<String, BallotError> {
        self.before_write().await?;
        self.backend.reopen_balloting(caller, poll).await
    }
}
