use ballot_core::view::{format_count, format_percentage, format_principal};
use ballot_core::{PollDetail, PollStats, PollStatus, PollSummary, PollView, Principal};

pub fn poll_list(polls: &[PollSummary], viewer: Option<&Principal>) {
    if polls.is_empty() {
        println!("No polls found.");
        return;
    }
    for poll in polls {
        let status = PollStatus::from_open(poll.voting_open).label();
        let mine = if viewer == Some(&poll.creator) { " (yours)" } else { "" };
        println!(
            "{:>5}  {:<6}  {}  by {}{}",
            poll.id.0,
            status,
            poll.name,
            format_principal(&poll.creator),
            mine
        );
    }
}

pub fn poll(detail: &PollDetail, view: &PollView) {
    println!("{} [{}]", detail.name, view.status.label());
    println!("created by {}", format_principal(&detail.creator));
    println!("{} votes", format_count(view.total_votes));
    if view.ranking.is_empty() {
        println!("No candidates yet.");
    }
    for (place, result) in view.ranking.iter().enumerate() {
        let marker = if view.user_vote.as_deref() == Some(result.name.as_str()) {
            "*"
        } else {
            " "
        };
        println!(
            "{marker} {:>2}. {:<30} {:>6}  {}",
            place + 1,
            result.name,
            format_count(result.votes),
            format_percentage(result.votes, view.total_votes)
        );
    }
    if view.can_vote {
        println!("You have not voted yet.");
    }
    if view.can_manage() {
        let action = match view.status {
            PollStatus::Open => "close",
            PollStatus::Closed => "reopen",
        };
        println!("You created this poll; `ballot {action} {}` to change balloting.", detail.id);
    }
}

pub fn stats(stats: &PollStats) {
    println!(
        "{} polls: {} open, {} closed",
        stats.total, stats.open, stats.closed
    );
}
