use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::model::{PollSummary, Principal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreatorFilter {
    #[default]
    All,
    Mine,
    Others,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    #[default]
    Recent,
    Alphabetical,
    /// Summaries carry no vote counts, so this orders like `Recent`.
    Popular,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterState {
    pub search: String,
    pub status: StatusFilter,
    pub creator: CreatorFilter,
    pub sort: SortMode,
}

impl FilterState {
    fn matches(&self, poll: &PollSummary, needle: &str, viewer: Option<&Principal>) -> bool {
        if !needle.is_empty() && !poll.name.to_lowercase().contains(needle) {
            return false;
        }
        let status_ok = match self.status {
            StatusFilter::All => true,
            StatusFilter::Open => poll.voting_open,
            StatusFilter::Closed => !poll.voting_open,
        };
        let creator_ok = match (self.creator, viewer) {
            (CreatorFilter::All, _) => true,
            (CreatorFilter::Mine, Some(me)) => &poll.creator == me,
            (CreatorFilter::Others, Some(me)) => &poll.creator != me,
            // nobody signed in: "mine" is empty, "others" is everything
            (CreatorFilter::Mine, None) => false,
            (CreatorFilter::Others, None) => true,
        };
        status_ok && creator_ok
    }
}

/// Filters then sorts a copy of `polls`. The input is left untouched.
pub fn apply(polls: &[PollSummary], state: &FilterState, viewer: Option<&Principal>) -> Vec<PollSummary> {
    let needle = state.search.to_lowercase();
    let mut out: Vec<PollSummary> = polls
        .iter()
        .filter(|poll| state.matches(poll, &needle, viewer))
        .cloned()
        .collect();
    // sort_by is stable: equal keys keep their filtered order
    match state.sort {
        SortMode::Alphabetical => out.sort_by(|a, b| collate(&a.name, &b.name)),
        SortMode::Recent | SortMode::Popular => out.sort_by(|a, b| b.id.cmp(&a.id)),
    }
    out
}

/// Case-insensitive comparison; names differing only in case compare equal.
fn collate(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}

pub fn polls_by(polls: &[PollSummary], creator: &Principal) -> Vec<PollSummary> {
    polls
        .iter()
        .filter(|poll| &poll.creator == creator)
        .cloned()
        .collect()
}

/// First `limit` open polls, in list order.
pub fn featured(polls: &[PollSummary], limit: usize) -> Vec<PollSummary> {
    polls
        .iter()
        .filter(|poll| poll.voting_open)
        .take(limit)
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PollStats {
    pub total: usize,
    pub open: usize,
    pub closed: usize,
}

impl PollStats {
    pub fn from_polls(polls: &[PollSummary]) -> Self {
        let open = polls.iter().filter(|poll| poll.voting_open).count();
        Self {
            total: polls.len(),
            open,
            closed: polls.len() - open,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PollId;

    fn summary(id: u64, name: &str, open: bool, creator: &str) -> PollSummary {
        PollSummary {
            id: PollId(id),
            name: name.to_owned(),
            voting_open: open,
            creator: Principal::new(creator),
        }
    }

    fn ids(polls: &[PollSummary]) -> Vec<u64> {
        polls.iter().map(|p| p.id.0).collect()
    }

    #[test]
    fn alphabetical_sort_is_stable() {
        let polls = vec![
            summary(3, "B", true, "a"),
            summary(1, "A", true, "a"),
            summary(2, "B", true, "a"),
        ];
        let state = FilterState {
            sort: SortMode::Alphabetical,
            ..Default::default()
        };
        let sorted = apply(&polls, &state, None);
        let names: Vec<&str> = sorted.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["A", "B", "B"]);
        assert_eq!(ids(&sorted), [1, 3, 2]);
    }

    #[test]
    fn search_is_case_insensitive_and_keeps_order() {
        let polls = vec![
            summary(1, "Budget 2024", true, "a"),
            summary(2, "Lunch Choice", true, "a"),
            summary(3, "budget vote", false, "a"),
        ];
        let state = FilterState {
            search: "budget".into(),
            status: StatusFilter::All,
            sort: SortMode::Alphabetical,
            ..Default::default()
        };
        let names: Vec<String> = apply(&polls, &state, None).into_iter().map(|p| p.name).collect();
        assert_eq!(names, ["Budget 2024", "budget vote"]);
        assert_eq!(polls.len(), 3);
    }

    #[test]
    fn search_whitespace_is_part_of_the_match() {
        let polls = vec![
            summary(1, "budget vote", true, "a"),
            summary(2, "Vote now", true, "a"),
        ];
        let state = FilterState {
            search: " vote".into(),
            ..Default::default()
        };
        let names: Vec<String> = apply(&polls, &state, None).into_iter().map(|p| p.name).collect();
        assert_eq!(names, ["budget vote"]);
    }

    #[test]
    fn status_and_recent_order() {
        let polls = vec![
            summary(1, "one", true, "a"),
            summary(5, "five", false, "a"),
            summary(3, "three", true, "a"),
        ];
        let open = FilterState {
            status: StatusFilter::Open,
            ..Default::default()
        };
        assert_eq!(ids(&apply(&polls, &open, None)), [3, 1]);

        let closed = FilterState {
            status: StatusFilter::Closed,
            ..Default::default()
        };
        assert_eq!(ids(&apply(&polls, &closed, None)), [5]);

        let popular = FilterState {
            sort: SortMode::Popular,
            ..Default::default()
        };
        assert_eq!(ids(&apply(&polls, &popular, None)), [5, 3, 1]);
    }

    #[test]
    fn creator_filter_uses_viewer() {
        let polls = vec![summary(1, "one", true, "alice"), summary(2, "two", true, "bob")];
        let alice = Principal::new("alice");
        let mine = FilterState {
            creator: CreatorFilter::Mine,
            ..Default::default()
        };
        assert_eq!(ids(&apply(&polls, &mine, Some(&alice))), [1]);
        assert!(apply(&polls, &mine, None).is_empty());

        let others = FilterState {
            creator: CreatorFilter::Others,
            ..Default::default()
        };
        assert_eq!(ids(&apply(&polls, &others, Some(&alice))), [2]);
        assert_eq!(ids(&polls_by(&polls, &alice)), [1]);
    }

    #[test]
    fn stats_and_featured() {
        let polls = vec![
            summary(1, "one", true, "a"),
            summary(2, "two", false, "a"),
            summary(3, "three", true, "a"),
            summary(4, "four", true, "a"),
        ];
        assert_eq!(
            PollStats::from_polls(&polls),
            PollStats {
                total: 4,
                open: 3,
                closed: 1
            }
        );
        assert_eq!(ids(&featured(&polls, 2)), [1, 3]);
    }
}
