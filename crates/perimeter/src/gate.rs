//! The gate state machine.
//!
//! ```text
//! ┌──────────┐  enabled = false   ┌──────────┐
//! │ request  │───────────────────→│ Disabled │  everything passes
//! └────┬─────┘                    └──────────┘
//!      │ session marker?
//!      ▼
//! ┌──────────┐  redeem(valid)     ┌──────────┐
//! │  Locked  │───────────────────→│ Unlocked │
//! └──────────┘←───────────────────└──────────┘
//!               marker no longer valid
//! ```
//!
//! The session marker is re-validated on every request through the token
//! cache, so deactivating or expiring a token locks out sessions that used
//! it on their next request.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::Config;
use crate::error::PerimeterError;
use crate::models::{access_token, access_token_use};
use crate::recorder::{self, UseDetails};
use crate::session::Session;
use crate::store::TokenStore;

/// Where a visitor stands with respect to the gate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateState {
    /// The gate is switched off for this deployment.
    Disabled,
    /// No valid token in the session.
    Locked,
    /// The session holds this still-valid token.
    Unlocked(String),
}

/// A candidate token submitted through the entry flow.
#[derive(Debug, Clone, Default)]
pub struct Redemption {
    pub token: String,
    pub details: UseDetails,
}

/// A successful redemption and its audit record.
#[derive(Debug, Clone)]
pub struct Redeemed {
    pub token: access_token::Model,
    pub usage: access_token_use::Model,
}

/// Shared gate handle; cheap to clone into router state.
#[derive(Clone)]
pub struct Gate {
    inner: Arc<GateInner>,
}

struct GateInner {
    config: Config,
    store: TokenStore,
}

impl Gate {
    pub fn new(config: Config, store: TokenStore) -> Self {
        debug!(
            enabled = config.enabled,
            session_key = %config.session_key,
            default_expiry_days = config.default_expiry_days,
            gateway_path = %config.gateway_path,
            "perimeter gate configured"
        );
        Gate {
            inner: Arc::new(GateInner { config, store }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn store(&self) -> &TokenStore {
        &self.inner.store
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.config.enabled
    }

    /// Whether `path` skips the gate: exactly the gateway path, or a path
    /// under one of the configured prefixes.
    pub fn is_bypassed(&self, path: &str) -> bool {
        let config = &self.inner.config;
        path == config.gateway_path
            || config
                .bypass_paths
                .iter()
                .any(|prefix| is_under(path, prefix))
    }

    /// Work out the visitor's state, re-validating any stored token.
    ///
    /// A marker whose token is no longer valid is removed from the session.
    pub async fn check(&self, session: &dyn Session) -> Result<GateState, PerimeterError> {
        if !self.is_enabled() {
            return Ok(GateState::Disabled);
        }

        let key = &self.inner.config.session_key;
        let Some(value) = session.get(key).await? else {
            return Ok(GateState::Locked);
        };

        if self.inner.store.get_access_token(&value).await?.is_valid() {
            Ok(GateState::Unlocked(value))
        } else {
            debug!("session token no longer valid, locking");
            session.remove(key).await?;
            Ok(GateState::Locked)
        }
    }

    /// Entry flow: validate a candidate token, unlock the session and
    /// record the use.
    ///
    /// Any rejected candidate yields [`PerimeterError::InvalidToken`],
    /// whatever the reason. A [`PerimeterError::Recording`] error means the
    /// session was already unlocked but the audit record was not written.
    pub async fn redeem(
        &self,
        session: &dyn Session,
        redemption: Redemption,
    ) -> Result<Redeemed, PerimeterError> {
        let candidate = redemption.token.trim();
        if candidate.is_empty() {
            return Err(PerimeterError::InvalidToken);
        }

        let token = match self.inner.store.get_access_token(candidate).await?.into_token() {
            Some(token) if token.is_valid() => token,
            _ => {
                info!("rejected access token");
                return Err(PerimeterError::InvalidToken);
            }
        };

        session
            .insert(&self.inner.config.session_key, &token.token)
            .await?;
        let usage = recorder::record_use(self.inner.store.db(), &token, redemption.details).await?;

        info!(token_id = token.id, "access token redeemed");
        Ok(Redeemed { token, usage })
    }
}

/// `/health` covers `/health` and `/health/live` but not `/healthcheck`.
fn is_under(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => prefix.ends_with('/') || rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
