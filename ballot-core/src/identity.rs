use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{BallotError, Conflict};
use crate::model::Principal;
use crate::service::IdentityProvider;

/// In-process identity provider backed by a fixed principal.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    principal: Option<Principal>,
    active: Arc<RwLock<Option<Principal>>>,
}

impl StaticIdentity {
    /// A provider that signs in as `principal` on `login`.
    pub fn new(principal: Option<Principal>) -> Self {
        Self {
            principal,
            active: Arc::new(RwLock::new(None)),
        }
    }

    /// A provider that starts out signed in.
    pub fn signed_in(principal: Principal) -> Self {
        Self {
            principal: Some(principal.clone()),
            active: Arc::new(RwLock::new(Some(principal))),
        }
    }

    pub fn anonymous() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn is_authenticated(&self) -> bool {
        self.active.read().await.is_some()
    }

    async fn current_identity(&self) -> Option<Principal> {
        self.active.read().await.clone()
    }

    async fn login(&self) -> Result<Principal, BallotError> {
        let principal = self
            .principal
            .clone()
            .ok_or(BallotError::StateConflict(Conflict::SignInRequired))?;
        *self.active.write().await = Some(principal.clone());
        info!(principal = %principal, "signed in");
        Ok(principal)
    }

    async fn logout(&self) -> Result<(), BallotError> {
        if let Some(principal) = self.active.write().await.take() {
            info!(principal = %principal, "signed out");
        }
        Ok(())
    }
}
