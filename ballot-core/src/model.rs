use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PollId(pub u64);

impl fmt::Display for PollId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PollId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(PollId)
    }
}

/// Opaque identity token issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PollSummary {
    pub id: PollId,
    pub name: String,
    pub voting_open: bool,
    pub creator: Principal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Ballot {
    pub voter: Principal,
    pub candidate: String,
    pub cast_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PollDetail {
    pub id: PollId,
    pub name: String,
    pub voting_open: bool,
    pub creator: Principal,
    pub candidates: Vec<String>,
    pub ballots: Vec<Ballot>,
    #[serde(rename = "ballotCount")]
    pub tally: Vec<(String, u64)>,
}

impl PollDetail {
    pub fn summary(&self) -> PollSummary {
        PollSummary {
            id: self.id,
            name: self.name.clone(),
            voting_open: self.voting_open,
            creator: self.creator.clone(),
        }
    }

    /// Votes recorded for `candidate`; candidates missing from the tally have none.
    pub fn votes_for(&self, candidate: &str) -> u64 {
        self.tally
            .iter()
            .find(|(name, _)| name == candidate)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollStatus {
    Open,
    Closed,
}

impl PollStatus {
    pub fn from_open(voting_open: bool) -> Self {
        if voting_open {
            Self::Open
        } else {
            Self::Closed
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Closed => "Closed",
        }
    }
}
