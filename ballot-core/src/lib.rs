pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod filter;
pub mod http;
pub mod identity;
pub mod memory;
pub mod model;
pub mod mutation;
pub mod prefs;
pub mod refresh;
pub mod retry;
pub mod service;
pub mod validation;
pub mod view;

pub use cache::{CacheConfig, CacheEvent, EntrySnapshot, Lookup, QueryCache, QueryKey, QueryValue};
pub use cache::Subscription;
pub use client::BallotClient;
pub use config::{ClientConfig, ConfigError};
pub use error::{BallotError, Conflict, QueryError};
pub use filter::{CreatorFilter, FilterState, PollStats, SortMode, StatusFilter};
pub use http::HttpPollService;
pub use identity::StaticIdentity;
pub use memory::MemoryPollService;
pub use model::{Ballot, PollDetail, PollId, PollStatus, PollSummary, Principal};
pub use mutation::MutationCoordinator;
pub use prefs::{PrefStore, PrefsError};
pub use refresh::{spawn_collector, spawn_refresher, TaskHandle};
pub use retry::RetryPolicy;
pub use service::{IdentityProvider, PollService};
pub use view::{CandidateResult, PollView};
