//! Session store: a thin adapter over the external identity provider.
//!
//! The store relays the provider's change stream and translates provider
//! errors into [`AuthError`]. It performs no resolution logic.

use crate::error::{AuthError, AuthResult, ProviderError};
use crate::types::{Session, SignUpMetadata};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Session-change notifications emitted by an identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
}

/// One provider notification: the event name and the session after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChange {
    pub event: SessionEvent,
    pub session: Option<Session>,
}

impl AuthChange {
    pub fn new(event: SessionEvent, session: Option<Session>) -> Self {
        Self { event, session }
    }

    /// User id of the session carried by this change, if any.
    pub fn subject(&self) -> Option<&str> {
        self.session.as_ref().map(Session::subject)
    }
}

/// Capability the core needs from an identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Read the provider's current session.
    async fn get_session(&self) -> Result<Option<Session>, ProviderError>;

    /// Subscribe to session changes. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<AuthChange>;

    async fn sign_in_with_password(&self, email: &str, password: &str)
        -> Result<(), ProviderError>;

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &SignUpMetadata,
    ) -> Result<(), ProviderError>;

    async fn sign_out(&self) -> Result<(), ProviderError>;
}

#[derive(Default)]
struct LatestSession {
    session: Option<Session>,
    /// Set once any change has been relayed; startup reads never overwrite it.
    from_event: bool,
}

/// Adapter holding the raw authentication primitives.
#[derive(Clone)]
pub struct SessionStore {
    provider: Arc<dyn IdentityProvider>,
    latest: Arc<Mutex<LatestSession>>,
}

impl SessionStore {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            provider,
            latest: Arc::new(Mutex::new(LatestSession::default())),
        }
    }

    /// Read the current session once, at startup.
    pub async fn current_session(&self) -> AuthResult<Option<Session>> {
        match self.provider.get_session().await {
            Ok(session) => {
                let mut latest = self.latest.lock();
                if !latest.from_event {
                    latest.session = session.clone();
                }
                debug!(
                    user_id = session.as_ref().map(Session::subject),
                    "Current session read from provider"
                );
                Ok(session)
            }
            Err(error) => {
                warn!(error = %error, "Failed to read current session");
                Err(error.into())
            }
        }
    }

    /// Subscribe to the provider's change stream.
    pub fn subscribe(&self) -> SessionSubscription {
        SessionSubscription {
            receiver: self.provider.subscribe(),
            latest: self.latest.clone(),
        }
    }

    /// Most recent raw session seen, including same-user token refreshes.
    pub fn latest_session(&self) -> Option<Session> {
        self.latest.lock().session.clone()
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<()> {
        self.provider
            .sign_in_with_password(email, password)
            .await
            .map_err(|error| {
                let error = AuthError::from(error);
                info!(error = %error, "Sign-in rejected");
                error
            })
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &SignUpMetadata,
    ) -> AuthResult<()> {
        self.provider
            .sign_up(email, password, metadata)
            .await
            .map_err(|error| {
                let error = AuthError::from(error);
                info!(error = %error, "Sign-up rejected");
                error
            })
    }

    pub async fn sign_out(&self) -> AuthResult<()> {
        self.provider.sign_out().await.map_err(AuthError::from)
    }
}

/// Live subscription to session changes. Dropping it unsubscribes.
pub struct SessionSubscription {
    receiver: broadcast::Receiver<AuthChange>,
    latest: Arc<Mutex<LatestSession>>,
}

impl SessionSubscription {
    /// Wait for the next change. Returns `None` once the provider is gone.
    pub async fn next(&mut self) -> Option<AuthChange> {
        loop {
            match self.receiver.recv().await {
                Ok(change) => {
                    let mut latest = self.latest.lock();
                    latest.session = change.session.clone();
                    latest.from_event = true;
                    return Some(change);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Later changes still carry the latest session
                    warn!(skipped, "Session subscription lagged, skipped changes");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Session change channel closed");
                    return None;
                }
            }
        }
    }
}
