//! Presentation aggregates computed from a poll detail.
//!
//! Everything here is a pure function of its inputs so views can be rebuilt
//! on every render without touching the cache.

use serde::Serialize;

use crate::model::{PollDetail, PollStatus, Principal};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateResult {
    pub name: String,
    pub votes: u64,
    pub percentage: f64,
}

pub fn total_votes(poll: &PollDetail) -> u64 {
    poll.tally.iter().map(|(_, count)| count).sum()
}

/// Share of the vote for `candidate`, in percent. Zero when nobody voted.
pub fn percentage(poll: &PollDetail, candidate: &str) -> f64 {
    share(poll.votes_for(candidate), total_votes(poll))
}

fn share(votes: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        votes as f64 / total as f64 * 100.0
    }
}

/// Candidates by descending vote count; ties keep candidate-list order.
pub fn ranking(poll: &PollDetail) -> Vec<CandidateResult> {
    let total = total_votes(poll);
    let mut results: Vec<CandidateResult> = poll
        .candidates
        .iter()
        .map(|name| {
            let votes = poll.votes_for(name);
            CandidateResult {
                name: name.clone(),
                votes,
                percentage: share(votes, total),
            }
        })
        .collect();
    results.sort_by(|a, b| b.votes.cmp(&a.votes));
    results
}

pub fn user_vote<'a>(poll: &'a PollDetail, identity: &Principal) -> Option<&'a str> {
    poll.ballots
        .iter()
        .find(|ballot| &ballot.voter == identity)
        .map(|ballot| ballot.candidate.as_str())
}

/// Everything a poll page needs, from the point of view of `viewer`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollView {
    pub status: PollStatus,
    pub total_votes: u64,
    pub ranking: Vec<CandidateResult>,
    pub user_vote: Option<String>,
    pub is_creator: bool,
    pub can_vote: bool,
}

impl PollView {
    pub fn build(poll: &PollDetail, viewer: Option<&Principal>) -> Self {
        let user_vote = viewer.and_then(|who| user_vote(poll, who)).map(str::to_owned);
        let is_creator = viewer.is_some_and(|who| who == &poll.creator);
        let can_vote = viewer.is_some()
            && poll.voting_open
            && !poll.candidates.is_empty()
            && user_vote.is_none();
        Self {
            status: PollStatus::from_open(poll.voting_open),
            total_votes: total_votes(poll),
            ranking: ranking(poll),
            user_vote,
            is_creator,
            can_vote,
        }
    }

    pub fn has_voted(&self) -> bool {
        self.user_vote.is_some()
    }

    /// Only the creator may open or close balloting.
    pub fn can_manage(&self) -> bool {
        self.is_creator
    }
}

/// `"37.5%"`, or `"0%"` when nobody voted.
pub fn format_percentage(votes: u64, total: u64) -> String {
    if total == 0 {
        return "0%".to_owned();
    }
    format!("{:.1}%", share(votes, total))
}

/// Shortens long principals to `abcdef...uvwxyz`.
pub fn format_principal(principal: &Principal) -> String {
    let text = principal.as_str();
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= 12 {
        return text.to_owned();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 6..].iter().collect();
    format!("{head}...{tail}")
}

pub fn format_count(count: u64) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.1}K", count as f64 / 1_000.0)
    } else {
        count.to_string()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::model::{Ballot, PollId};

    fn poll(candidates: &[&str], votes: &[(&str, &str)]) -> PollDetail {
        let ballots: Vec<Ballot> = votes
            .iter()
            .map(|(voter, candidate)| Ballot {
                voter: Principal::new(*voter),
                candidate: (*candidate).to_owned(),
                cast_at: Utc::now(),
            })
            .collect();
        let tally = candidates
            .iter()
            .map(|name| {
                let count = ballots.iter().filter(|b| b.candidate == *name).count() as u64;
                ((*name).to_owned(), count)
            })
            .collect();
        PollDetail {
            id: PollId(1),
            name: "Lunch".into(),
            voting_open: true,
            creator: Principal::new("alice"),
            candidates: candidates.iter().map(|c| (*c).to_owned()).collect(),
            ballots,
            tally,
        }
    }

    #[test]
    fn percentages_sum_to_one_hundred() {
        let cases = [
            poll(&["A", "B", "C"], &[("1", "A"), ("2", "B"), ("3", "C")]),
            poll(&["A", "B"], &[("1", "A"), ("2", "A"), ("3", "B")]),
            poll(&["A", "B", "C"], &[("1", "A"), ("2", "A"), ("3", "A"), ("4", "A"), ("5", "A"), ("6", "B"), ("7", "C")]),
        ];
        for detail in &cases {
            let sum: f64 = detail.candidates.iter().map(|c| percentage(detail, c)).sum();
            assert!((99.9..=100.1).contains(&sum), "sum was {sum}");
        }
    }

    #[test]
    fn no_votes_means_zero_percent_everywhere() {
        let detail = poll(&["A", "B"], &[]);
        assert_eq!(total_votes(&detail), 0);
        assert!(detail.candidates.iter().all(|c| percentage(&detail, c) == 0.0));
        assert_eq!(format_percentage(0, 0), "0%");
    }

    #[test]
    fn ranking_is_stable_on_ties() {
        let detail = poll(
            &["A", "B", "C", "D"],
            &[("1", "C"), ("2", "B"), ("3", "D"), ("4", "C")],
        );
        let ranked = ranking(&detail);
        let names: Vec<&str> = ranked.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["C", "B", "D", "A"]);
    }

    #[test]
    fn user_vote_finds_own_ballot() {
        let detail = poll(&["A", "B"], &[("alice", "B"), ("bob", "A")]);
        assert_eq!(user_vote(&detail, &Principal::new("alice")), Some("B"));
        assert_eq!(user_vote(&detail, &Principal::new("carol")), None);
    }

    #[test]
    fn view_flags_follow_viewer() {
        let detail = poll(&["A", "B"], &[("bob", "A")]);
        let alice = Principal::new("alice");
        let bob = Principal::new("bob");

        let creator_view = PollView::build(&detail, Some(&alice));
        assert!(creator_view.is_creator && creator_view.can_manage());
        assert!(creator_view.can_vote);

        let voter_view = PollView::build(&detail, Some(&bob));
        assert!(voter_view.has_voted());
        assert!(!voter_view.can_vote);
        assert!(!voter_view.can_manage());

        let anonymous = PollView::build(&detail, None);
        assert!(!anonymous.can_vote);
        assert_eq!(anonymous.status.label(), "Open");
    }

    #[test]
    fn formatting_helpers() {
        assert_eq!(format_percentage(1, 3), "33.3%");
        assert_eq!(format_principal(&Principal::new("short")), "short");
        assert_eq!(
            format_principal(&Principal::new("rrkah-fqaaa-aaaaa-aaaaq-cai")),
            "rrkah-...aq-cai"
        );
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1_240), "1.2K");
        assert_eq!(format_count(3_400_000), "3.4M");
    }
}
