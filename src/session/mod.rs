//! Per-connection lifecycle: `Connected -> Identified -> Closed`.
//!
//! Each physical connection owns exactly one [`Session`], driven by the task
//! that reads that connection's frames, so events for one connection are
//! applied in the order they arrived.

use std::sync::Arc;

use thiserror::Error;

use crate::connection_manager::{ConnectionHandle, Identity};
use crate::presence::PresenceBroadcaster;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Transport established, no identity yet
    Connected,
    /// Identity bound, registry entry present (unless supplanted by a newer connection)
    Identified(Identity),
    /// Terminal
    Closed,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("identity must not be empty")]
    EmptyIdentity,

    #[error("session is closed")]
    Closed,

    #[error("identity '{requested}' does not match authenticated identity '{authenticated}'")]
    IdentityMismatch {
        requested: String,
        authenticated: String,
    },
}

impl SessionError {
    /// Error code sent to the client
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyIdentity => "INVALID_IDENTITY",
            Self::Closed => "SESSION_CLOSED",
            Self::IdentityMismatch { .. } => "IDENTITY_MISMATCH",
        }
    }
}

pub struct Session {
    handle: Arc<ConnectionHandle>,
    presence: Arc<PresenceBroadcaster>,
    state: SessionState,
    /// Identity proven by a token at upgrade time, if any
    authenticated: Option<Identity>,
}

impl Session {
    /// Start a session for a freshly established connection.
    ///
    /// The connection receives presence updates from now on, identified or not.
    pub fn open(handle: Arc<ConnectionHandle>, presence: Arc<PresenceBroadcaster>) -> Self {
        presence.subscribe(handle.clone());
        Self {
            handle,
            presence,
            state: SessionState::Connected,
            authenticated: None,
        }
    }

    /// Only accept `identify` for this identity
    pub fn pinned_to(mut self, identity: impl Into<Identity>) -> Self {
        self.authenticated = Some(identity.into());
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn identity(&self) -> Option<&str> {
        match &self.state {
            SessionState::Identified(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn handle(&self) -> &Arc<ConnectionHandle> {
        &self.handle
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Bind this connection to `identity`.
    ///
    /// Allowed from `Connected` and, as a re-identify, from `Identified`.
    /// Returns `true` if the online set changed and a broadcast went out.
    /// Otherwise this connection alone is sent the current snapshot.
    #[tracing::instrument(
        name = "session.identify",
        skip(self),
        fields(connection_id = %self.handle.id)
    )]
    pub async fn identify(&mut self, identity: &str) -> Result<bool, SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        if identity.trim().is_empty() {
            return Err(SessionError::EmptyIdentity);
        }
        if let Some(ref authenticated) = self.authenticated {
            if authenticated != identity {
                return Err(SessionError::IdentityMismatch {
                    requested: identity.to_string(),
                    authenticated: authenticated.clone(),
                });
            }
        }

        let handle = self.handle.clone();
        let announced = self
            .presence
            .apply(|registry| registry.register(identity, &handle))
            .await;

        let previous = std::mem::replace(
            &mut self.state,
            SessionState::Identified(identity.to_string()),
        );
        tracing::info!(
            identity = %identity,
            reidentify = matches!(previous, SessionState::Identified(_)),
            broadcast = announced.is_some(),
            "Connection identified"
        );

        if announced.is_none() {
            if let Err(e) = self.presence.sync(&self.handle).await {
                tracing::debug!(error = %e, "Presence sync to identifying connection failed");
            }
        }

        Ok(announced.is_some())
    }

    /// Close the session. Idempotent.
    ///
    /// Returns `true` if this removed a registry entry and a broadcast went out.
    /// A session that never identified does not touch the registry.
    #[tracing::instrument(
        name = "session.disconnect",
        skip(self),
        fields(connection_id = %self.handle.id)
    )]
    pub async fn disconnect(&mut self) -> bool {
        let previous = std::mem::replace(&mut self.state, SessionState::Closed);

        match previous {
            SessionState::Closed => false,
            SessionState::Connected => {
                self.presence.unsubscribe(self.handle.id);
                false
            }
            SessionState::Identified(identity) => {
                self.presence.unsubscribe(self.handle.id);
                let handle = self.handle.clone();
                let announced = self
                    .presence
                    .apply(|registry| registry.unregister(&handle))
                    .await;

                tracing::info!(
                    identity = %identity,
                    broadcast = announced.is_some(),
                    "Identified connection closed"
                );
                announced.is_some()
            }
        }
    }
}
