mod render;

use std::sync::Arc;

use ballot_core::{
    BallotClient, BallotError, ClientConfig, CreatorFilter, HttpPollService, MemoryPollService,
    PollId, PollService, PrefStore, QueryError, SortMode, StaticIdentity, StatusFilter,
};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Command line client for BallotLife polls.
#[derive(Parser, Debug)]
#[command(name = "ballot")]
#[command(about = "Browse, create and vote in BallotLife polls")]
struct Args {
    /// Poll service root, overriding the config file
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Act as this principal
    #[arg(short, long, value_name = "PRINCIPAL")]
    principal: Option<String>,

    /// Use an in-memory backend with sample polls instead of the poll service.
    /// Nothing is kept between runs.
    #[arg(long)]
    offline: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List polls; filters are remembered between runs
    List {
        #[arg(short, long)]
        search: Option<String>,
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
        #[arg(long, value_enum)]
        sort: Option<SortArg>,
        /// Only polls created by the signed-in principal
        #[arg(long, conflicts_with = "others")]
        mine: bool,
        /// Only polls created by someone else
        #[arg(long)]
        others: bool,
        /// Forget the remembered filter first
        #[arg(long)]
        reset: bool,
    },
    /// Show results for a poll (defaults to the last one shown)
    Show { id: Option<PollId> },
    Create { title: String },
    AddCandidate { id: PollId, name: String },
    Vote { id: PollId, candidate: String },
    Close { id: PollId },
    Reopen { id: PollId },
    /// Open and closed poll counts
    Stats,
    /// A handful of open polls
    Featured {
        #[arg(short, long, default_value_t = 5)]
        limit: usize,
    },
    /// Poll titles that failed to submit
    Drafts,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StatusArg {
    All,
    Open,
    Closed,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SortArg {
    Recent,
    Alphabetical,
    Popular,
}

impl From<StatusArg> for StatusFilter {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::All => Self::All,
            StatusArg::Open => Self::Open,
            StatusArg::Closed => Self::Closed,
        }
    }
}

impl From<SortArg> for SortMode {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Recent => Self::Recent,
            SortArg::Alphabetical => Self::Alphabetical,
            SortArg::Popular => Self::Popular,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut config = ClientConfig::load();
    if let Some(url) = &args.base_url {
        config.service.base_url = url.clone();
    }
    if let Some(principal) = &args.principal {
        config.service.principal = Some(principal.clone());
    }

    let service: Arc<dyn PollService> = if args.offline {
        info!("using in-memory backend with sample polls");
        Arc::new(MemoryPollService::with_sample_polls().await?)
    } else {
        debug!(base_url = %config.service.base_url, "using poll service");
        Arc::new(HttpPollService::with_timeout(
            &config.service.base_url,
            config.query.request_timeout(),
        )?)
    };
    let identity = match config.principal() {
        Some(principal) => StaticIdentity::signed_in(principal),
        None => StaticIdentity::anonymous(),
    };
    let client = BallotClient::new(service, Arc::new(identity), &config);
    let prefs = load_prefs().await;

    let outcome = run(args.command, &client, &prefs).await;
    client.shutdown().await?;
    outcome.map_err(Into::into)
}

async fn run(command: Command, client: &BallotClient, prefs: &PrefStore) -> Result<(), BallotError> {
    let viewer = client.viewer().await;
    match command {
        Command::List {
            search,
            status,
            sort,
            mine,
            others,
            reset,
        } => {
            let mut filter = if reset {
                Default::default()
            } else {
                prefs.last_filter().await
            };
            if let Some(search) = search {
                filter.search = search;
            }
            if let Some(status) = status {
                filter.status = status.into();
            }
            if let Some(sort) = sort {
                filter.sort = sort.into();
            }
            if mine {
                filter.creator = CreatorFilter::Mine;
            } else if others {
                filter.creator = CreatorFilter::Others;
            }
            let polls = or_stale(client.filtered_polls(&filter).await)?;
            render::poll_list(&polls, viewer.as_ref());
            if let Err(e) = prefs.save_filter(&filter).await {
                warn!(error = %e, "failed to remember filter");
            }
        }
        Command::Show { id } => {
            let Some(id) = id.or(prefs.last_visited().await) else {
                return Err(BallotError::validation("id", "no poll given and none shown before"));
            };
            let detail = or_stale(client.poll_detail(id).await)?;
            let view = or_stale(client.poll_view(id).await)?;
            render::poll(&detail, &view);
            if let Err(e) = prefs.record_visit(id).await {
                warn!(error = %e, "failed to remember last poll");
            }
        }
        Command::Create { title } => {
            let created = client.create_poll(&title).await;
            track_draft(prefs, &title, &created).await;
            println!("Created poll {}", created?);
        }
        Command::AddCandidate { id, name } => {
            println!("{}", client.add_candidate(id, &name).await?);
        }
        Command::Vote { id, candidate } => {
            println!("{}", client.cast_ballot(id, &candidate).await?);
        }
        Command::Close { id } => {
            println!("{}", client.close_balloting(id).await?);
        }
        Command::Reopen { id } => {
            println!("{}", client.reopen_balloting(id).await?);
        }
        Command::Stats => {
            let stats = or_stale(client.stats().await)?;
            render::stats(&stats);
        }
        Command::Featured { limit } => {
            let polls = or_stale(client.featured(limit).await)?;
            render::poll_list(&polls, viewer.as_ref());
        }
        Command::Drafts => {
            for draft in prefs.drafts().await {
                println!("{draft}");
            }
        }
    }
    Ok(())
}

/// Keeps a title that failed for transient reasons so it can be retried later,
/// and forgets it once a create goes through.
async fn track_draft(prefs: &PrefStore, title: &str, created: &Result<PollId, BallotError>) {
    let title = title.trim();
    let saved = match created {
        Ok(_) => prefs.discard_draft(title).await,
        Err(err) if err.is_retryable() => prefs.push_draft(title).await,
        Err(_) => return,
    };
    if let Err(e) = saved {
        warn!(error = %e, "failed to update drafts");
    }
}

/// Falls back to cached data when a refresh fails, with a warning.
fn or_stale<T>(result: Result<T, QueryError<T>>) -> Result<T, BallotError> {
    match result {
        Ok(value) => Ok(value),
        Err(QueryError {
            error,
            stale: Some(value),
        }) => {
            eprintln!("warning: {error} (showing cached data)");
            Ok(value)
        }
        Err(QueryError { error, stale: None }) => Err(error),
    }
}

async fn load_prefs() -> PrefStore {
    match ClientConfig::config_dir() {
        Ok(dir) => PrefStore::load_from_dir(dir).await,
        Err(e) => {
            warn!(error = %e, "preferences will not be saved");
            PrefStore::in_memory()
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drafts_follow_create_outcome() {
        let prefs = PrefStore::in_memory();

        let offline = Err(BallotError::Network("connection refused".into()));
        track_draft(&prefs, " Team lunch ", &offline).await;
        assert_eq!(prefs.drafts().await, vec!["Team lunch"]);

        let rejected = Err(BallotError::validation("title", "too short"));
        track_draft(&prefs, "ab", &rejected).await;
        assert_eq!(prefs.drafts().await, vec!["Team lunch"]);

        track_draft(&prefs, "Team lunch", &Ok(PollId(3))).await;
        assert!(prefs.drafts().await.is_empty());
    }
}
