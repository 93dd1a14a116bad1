use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{BallotError, Conflict};
use crate::model::{PollDetail, PollId, PollSummary, Principal};
use crate::service::PollService;

pub const PRINCIPAL_HEADER: &str = "x-principal";

/// JSON-over-HTTP client for the poll backend.
#[derive(Debug, Clone)]
pub struct HttpPollService {
    client: Client,
    base: Url,
}

#[derive(Serialize)]
struct CreatePollBody<'a> {
    title: &'a str,
}

#[derive(Serialize)]
struct CandidateBody<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct BallotBody<'a> {
    candidate: &'a str,
}

#[derive(Deserialize)]
struct Created {
    id: PollId,
}

#[derive(Deserialize)]
struct Confirmation {
    message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorBody {
    error: String,
    field: Option<String>,
    message: Option<String>,
}

impl HttpPollService {
    /// `base_url` is the API root; a trailing slash is added when missing so
    /// relative routes resolve beneath it.
    pub fn new(client: Client, base_url: &str) -> Result<Self, BallotError> {
        let mut base = Url::parse(base_url)
            .map_err(|e| BallotError::validation("base_url", e.to_string()))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { client, base })
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, BallotError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ballotlife/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Self::new(client, base_url)
    }

    fn url(&self, route: &str) -> Result<Url, BallotError> {
        self.base
            .join(route)
            .map_err(|e| BallotError::Unknown(format!("bad route {route}: {e}")))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        poll: Option<PollId>,
    ) -> Result<T, BallotError> {
        let response = request.send().await?;
        let response = check_status(response, poll).await?;
        Ok(response.json::<T>().await?)
    }

    fn post<B: Serialize + ?Sized>(
        &self,
        caller: &Principal,
        route: &str,
        poll: Option<PollId>,
        body: &B,
    ) -> Result<RequestBuilder, BallotError> {
        debug!(route, ?poll, "POST");
        Ok(self
            .client
            .post(self.url(route)?)
            .header(PRINCIPAL_HEADER, caller.as_str())
            .json(body))
    }

    async fn confirm(
        &self,
        caller: &Principal,
        route: &str,
        poll: PollId,
        body: &(impl Serialize + Sync),
    ) -> Result<String, BallotError> {
        let request = self.post(caller, route, Some(poll), body)?;
        let confirmation: Confirmation = self.send(request, Some(poll)).await?;
        Ok(confirmation.message)
    }
}

async fn check_status(response: Response, poll: Option<PollId>) -> Result<Response, BallotError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body: ErrorBody = response.json().await.unwrap_or_default();
    Err(error_from_status(status, poll, body))
}

fn error_from_status(status: StatusCode, poll: Option<PollId>, body: ErrorBody) -> BallotError {
    let message = body
        .message
        .clone()
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_owned());
    match status {
        StatusCode::NOT_FOUND => match poll {
            Some(id) => BallotError::NotFound(id),
            None => BallotError::Unknown(message),
        },
        StatusCode::BAD_REQUEST => BallotError::Validation {
            field: body.field.unwrap_or_else(|| "request".to_owned()),
            message,
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Conflict::Unauthorized.into(),
        StatusCode::CONFLICT => match conflict_from_code(&body.error) {
            Some(conflict) => conflict.into(),
            None => BallotError::Unknown(message),
        },
        StatusCode::REQUEST_TIMEOUT | StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => BallotError::Network(message),
        _ => BallotError::Unknown(format!("{status}: {message}")),
    }
}

fn conflict_from_code(code: &str) -> Option<Conflict> {
    match code {
        "voting_closed" => Some(Conflict::VotingClosed),
        "already_voted" => Some(Conflict::AlreadyVoted),
        "invalid_candidate" => Some(Conflict::InvalidCandidate),
        "duplicate_candidate" => Some(Conflict::DuplicateCandidate),
        "unauthorized" => Some(Conflict::Unauthorized),
        _ => None,
    }
}

#[async_trait]
impl PollService for HttpPollService {
    async fn list_polls(&self) -> Result<Vec<PollSummary>, BallotError> {
        let request = self.client.get(self.url("polls")?);
        self.send(request, None).await
    }

    async fn get_poll_detail(&self, poll: PollId) -> Result<PollDetail, BallotError> {
        let request = self.client.get(self.url(&format!("polls/{poll}"))?);
        self.send(request, Some(poll)).await
    }

    async fn create_poll(&self, caller: &Principal, title: &str) -> Result<PollId, BallotError> {
        let request = self.post(caller, "polls", None, &CreatePollBody { title })?;
        let created: Created = self.send(request, None).await?;
        Ok(created.id)
    }

    async fn add_candidate(
        &self,
        caller: &Principal,
        poll: PollId,
        name: &str,
    ) -> Result<String, BallotError> {
        self.confirm(caller, &format!("polls/{poll}/candidates"), poll, &CandidateBody { name })
            .await
    }

    async fn cast_ballot(
        &self,
        caller: &Principal,
        poll: PollId,
        candidate: &str,
    ) -> Result<String, BallotError> {
        self.confirm(caller, &format!("polls/{poll}/ballots"), poll, &BallotBody { candidate })
            .await
    }

    async fn close_balloting(
        &self,
        caller: &Principal,
        poll: PollId,
    ) -> Result<String, BallotError> {
        self.confirm(caller, &format!("polls/{poll}/close"), poll, &serde_json::json!({}))
            .await
    }

    async fn reopen_balloting(
        &self,
        caller: &Principal,
        poll: PollId,
    ) -> Result<String, BallotError> {
        self.confirm(caller, &format!("polls/{poll}/reopen"), poll, &serde_json::json!({}))
            .await
    }
}
