use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::filter::FilterState;
use crate::model::PollId;

pub const LAST_FILTER: &str = "ballotlife_last_filter";
pub const LAST_VISITED: &str = "ballotlife_last_visited";
pub const DRAFT_POLLS: &str = "ballotlife_draft_polls";

const MAX_DRAFTS: usize = 20;

#[derive(Debug, Error)]
pub enum PrefsError {
    #[error("preferences io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("preferences format error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Small key-value store for client-side preferences, persisted as one JSON file.
#[derive(Debug, Clone)]
pub struct PrefStore {
    inner: Arc<RwLock<BTreeMap<String, Value>>>,
    path: Option<PathBuf>,
}

impl PrefStore {
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(RwLock::new(BTreeMap::new())),
            path: None,
        }
    }

    /// Loads `prefs.json` from `dir`. A corrupted file falls back to the
    /// temp copy left by an interrupted write, then to an empty store.
    pub async fn load_from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            warn!(error = %e, "failed to create preferences dir");
        }
        let path = dir.join("prefs.json");
        let values = read_json_with_tmp_fallback(&path).await;
        Self {
            inner: Arc::new(RwLock::new(values)),
            path: Some(path),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let inner = self.inner.read().await;
        let value = inner.get(key)?.clone();
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(key, error = %e, "ignoring unreadable preference");
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), PrefsError> {
        let value = serde_json::to_value(value)?;
        self.inner.write().await.insert(key.to_owned(), value);
        self.persist().await
    }

    pub async fn remove(&self, key: &str) -> Result<(), PrefsError> {
        let removed = self.inner.write().await.remove(key).is_some();
        if removed {
            self.persist().await
        } else {
            Ok(())
        }
    }

    pub async fn last_filter(&self) -> FilterState {
        self.get(LAST_FILTER).await.unwrap_or_default()
    }

    pub async fn save_filter(&self, filter: &FilterState) -> Result<(), PrefsError> {
        self.set(LAST_FILTER, filter).await
    }

    pub async fn last_visited(&self) -> Option<PollId> {
        self.get(LAST_VISITED).await
    }

    pub async fn record_visit(&self, poll: PollId) -> Result<(), PrefsError> {
        self.set(LAST_VISITED, &poll).await
    }

    pub async fn drafts(&self) -> Vec<String> {
        self.get(DRAFT_POLLS).await.unwrap_or_default()
    }

    /// Remembers an unsent poll title, newest first, without duplicates.
    pub async fn push_draft(&self, title: &str) -> Result<(), PrefsError> {
        let mut drafts = self.drafts().await;
        drafts.retain(|existing| existing != title);
        drafts.insert(0, title.to_owned());
        drafts.truncate(MAX_DRAFTS);
        self.set(DRAFT_POLLS, &drafts).await
    }

    pub async fn discard_draft(&self, title: &str) -> Result<(), PrefsError> {
        let mut drafts = self.drafts().await;
        let before = drafts.len();
        drafts.retain(|existing| existing != title);
        if drafts.len() == before {
            return Ok(());
        }
        self.set(DRAFT_POLLS, &drafts).await
    }

    async fn persist(&self) -> Result<(), PrefsError> {
        let Some(path) = &self.path else {
            debug!("preferences are in-memory only; skipping persist");
            return Ok(());
        };
        let bytes = {
            let inner = self.inner.read().await;
            serde_json::to_vec_pretty(&*inner)?
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // write to a sibling then rename, so a crash never leaves a torn file
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

async fn read_json_with_tmp_fallback<T: DeserializeOwned + Default>(path: &Path) -> T {
    match tokio::fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice::<T>(&bytes) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "failed to parse JSON, trying tmp fallback");
                let tmp = path.with_extension("json.tmp");
                match tokio::fs::read(&tmp).await {
                    Ok(tmp_bytes) => serde_json::from_slice::<T>(&tmp_bytes).unwrap_or_default(),
                    Err(_) => Default::default(),
                }
            }
        },
        Err(_) => Default::default(),
    }
}
