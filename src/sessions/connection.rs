//! Lifecycle of the persistent connection.
//!
//! [`ConnectionManager::connect`] runs the handshake in a fixed order:
//!
//! 1. Load saved credentials and present their token.
//! 2. Save the token the server returned before doing anything else, so a crash right after
//!    connecting cannot lose the identity.
//! 3. Issue the subscription queries. Incoming messages queue on the transport until polled, so
//!    nothing that arrives early is lost.
//!
//! The manager never reconnects on its own.

use std::sync::Arc;

use crate::optimistic::reducers::Reducer;
use crate::optimistic::ReducerSink;
use crate::report_violation_to;
use crate::telemetry::{ViolationKind, ViolationObserver, ViolationSeverity};
use crate::token::{Credentials, TokenStore};
use crate::{Identity, ServerMessage, SyncError, TableName, Transport};

/// Where the connection stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection. [`ConnectionManager::connect`] may be called.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// Connected; waiting for the snapshot.
    Subscribing,
    /// Snapshot loaded; diffs are flowing.
    Live,
    /// A subscription failed or the snapshot did not match the expected schema. Not retryable.
    Failed,
}

impl ConnectionState {
    /// Whether reducer calls can be sent.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Subscribing | Self::Live)
    }
}

/// Owns the transport, the identity and the saved token.
pub struct ConnectionManager<T> {
    transport: T,
    state: ConnectionState,
    identity: Option<Identity>,
    subscriptions: Vec<TableName>,
    token_store: Arc<dyn TokenStore>,
    observer: Option<Arc<dyn ViolationObserver>>,
    last_error: Option<SyncError>,
}

impl<T> std::fmt::Debug for ConnectionManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state)
            .field("identity", &self.identity)
            .field("subscriptions", &self.subscriptions)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> ConnectionManager<T> {
    /// Creates a disconnected manager.
    pub fn new(
        transport: T,
        subscriptions: Vec<TableName>,
        token_store: Arc<dyn TokenStore>,
        observer: Option<Arc<dyn ViolationObserver>>,
    ) -> Self {
        Self {
            transport,
            state: ConnectionState::Disconnected,
            identity: None,
            subscriptions,
            token_store,
            observer,
            last_error: None,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// The identity of the current connection.
    #[must_use]
    pub const fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// The error that ended the last connect attempt or the session.
    #[must_use]
    pub const fn last_error(&self) -> Option<&SyncError> {
        self.last_error.as_ref()
    }

    /// The underlying transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Connects, persists the token and subscribes.
    ///
    /// Returns the identity on success. On failure the manager is back to
    /// [`ConnectionState::Disconnected`] and the error is kept in
    /// [`last_error`](Self::last_error).
    pub async fn connect(&mut self) -> Result<Identity, SyncError> {
        match self.state {
            ConnectionState::Failed => {
                return Err(self
                    .last_error
                    .clone()
                    .unwrap_or(SyncError::NotConnected));
            },
            ConnectionState::Subscribing | ConnectionState::Live => {
                if let Some(identity) = &self.identity {
                    return Ok(identity.clone());
                }
            },
            ConnectionState::Disconnected | ConnectionState::Connecting => {},
        }

        self.state = ConnectionState::Connecting;
        let saved = match self.token_store.load() {
            Ok(saved) => saved,
            Err(err) => {
                report_violation_to!(
                    self.observer,
                    ViolationSeverity::Warning,
                    ViolationKind::Storage,
                    "could not load identity token, connecting as a new identity: {}",
                    err
                );
                None
            },
        };
        let returning = saved.is_some();

        let handshake = match self
            .transport
            .connect(saved.map(|credentials| credentials.token))
            .await
        {
            Ok(handshake) => handshake,
            Err(err) => {
                report_violation_to!(
                    self.observer,
                    ViolationSeverity::Error,
                    ViolationKind::Connection,
                    "connect failed: {}",
                    err
                );
                self.state = ConnectionState::Disconnected;
                self.last_error = Some(err.clone());
                return Err(err);
            },
        };

        let credentials = Credentials {
            identity: handshake.identity.clone(),
            token: handshake.token,
        };
        if let Err(err) = self.token_store.save(&credentials) {
            report_violation_to!(
                self.observer,
                ViolationSeverity::Error,
                ViolationKind::Storage,
                "could not save identity token; a reconnect will act as a new player: {}",
                err
            );
        }
        self.identity = Some(handshake.identity.clone());
        self.state = ConnectionState::Subscribing;
        tracing::info!(identity = %handshake.identity, returning, "connected");

        if let Err(err) = self.transport.subscribe(&self.subscriptions) {
            report_violation_to!(
                self.observer,
                ViolationSeverity::Error,
                ViolationKind::Subscription,
                "could not issue subscriptions: {}",
                err
            );
            self.transport.disconnect();
            self.state = ConnectionState::Disconnected;
            self.identity = None;
            self.last_error = Some(err.clone());
            return Err(err);
        }
        tracing::debug!(tables = self.subscriptions.len(), "subscriptions issued");
        self.last_error = None;
        Ok(handshake.identity)
    }

    /// Drains every queued message. Nothing is delivered unless connected.
    ///
    /// A [`ServerMessage::Disconnected`] moves the manager to
    /// [`ConnectionState::Disconnected`]; messages after it are dropped.
    pub fn receive(&mut self) -> Vec<ServerMessage> {
        if !self.state.is_connected() {
            return Vec::new();
        }
        let mut messages = self.transport.receive_all_messages();
        if let Some(index) = messages
            .iter()
            .position(|message| matches!(message, ServerMessage::Disconnected { .. }))
        {
            let dropped = messages.len() - index - 1;
            messages.truncate(index + 1);
            if dropped > 0 {
                tracing::debug!(dropped, "discarding messages received after disconnect");
            }
            self.state = ConnectionState::Disconnected;
            self.identity = None;
            self.transport.disconnect();
        }
        messages
    }

    /// Closes the connection. The saved token is kept.
    pub fn disconnect(&mut self) {
        if self.state == ConnectionState::Failed {
            return;
        }
        self.transport.disconnect();
        self.state = ConnectionState::Disconnected;
        self.identity = None;
    }

    /// Drops the saved token so the next connect acts as a brand-new player.
    pub fn forget_identity(&mut self) -> Result<(), SyncError> {
        self.token_store.clear()
    }

    pub(crate) fn mark_live(&mut self) {
        if self.state == ConnectionState::Subscribing {
            self.state = ConnectionState::Live;
        }
    }

    pub(crate) fn mark_failed(&mut self, err: SyncError) {
        self.transport.disconnect();
        self.state = ConnectionState::Failed;
        self.last_error = Some(err);
    }

    /// Abandons an attempt that was cut short, e.g. by a timeout.
    pub(crate) fn abort_connect(&mut self, err: SyncError) {
        if self.state == ConnectionState::Connecting || self.state == ConnectionState::Subscribing {
            self.transport.disconnect();
            self.state = ConnectionState::Disconnected;
            self.identity = None;
        }
        self.last_error = Some(err);
    }
}

impl<T: Transport> ReducerSink for ConnectionManager<T> {
    fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    fn send(&mut self, reducer: &Reducer) -> Result<(), SyncError> {
        self.transport.call_reducer(reducer)
    }
}
