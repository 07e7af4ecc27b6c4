//! An in-process stand-in for the remote store.
//!
//! [`MemoryServer`] is the scripted server half: tests and offline play decide what snapshot it
//! serves, push diffs and events into it, and inspect the reducer calls it received.
//! [`MemoryTransport`] is the client half and implements [`Transport`].
//!
//! The server mints `player-N` / `token-N` pairs on a token-less connect and recognizes tokens
//! it minted before. An unknown token is refused.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::mirror::{Snapshot, TableDiff};
use crate::optimistic::reducers::Reducer;
use crate::{
    Handshake, Identity, IdentityToken, ServerEvent, ServerMessage, SyncError, TableName,
    Transport,
};

#[derive(Debug, Default)]
struct ServerState {
    minted: u64,
    tokens: BTreeMap<String, Identity>,
    snapshot: Snapshot,
    subscription_error: Option<(Option<TableName>, String)>,
    connect_failure: Option<String>,
    refuse_calls: bool,
    inbox: VecDeque<ServerMessage>,
    calls: Vec<Reducer>,
    subscriptions: Vec<Vec<TableName>>,
    connects: Vec<Option<Identity>>,
}

/// The scripted server half. Cloning shares state.
#[derive(Debug, Clone, Default)]
pub struct MemoryServer {
    state: Arc<Mutex<ServerState>>,
}

impl MemoryServer {
    /// Creates a server with an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A new client-side transport connected to this server.
    #[must_use]
    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport {
            state: Arc::clone(&self.state),
            connected: false,
        }
    }

    /// Sets the rows served on every subscription. Only subscribed tables are sent.
    pub fn set_snapshot(&self, snapshot: Snapshot) {
        self.state.lock().snapshot = snapshot;
    }

    /// Makes every following subscription fail with `reason`.
    pub fn fail_subscription(&self, table: Option<TableName>, reason: impl Into<String>) {
        self.state.lock().subscription_error = Some((table, reason.into()));
    }

    /// Makes the next connect attempt fail with `reason`.
    pub fn fail_next_connect(&self, reason: impl Into<String>) {
        self.state.lock().connect_failure = Some(reason.into());
    }

    /// Makes reducer calls fail at dispatch time while `refuse` is set.
    pub fn refuse_calls(&self, refuse: bool) {
        self.state.lock().refuse_calls = refuse;
    }

    /// Queues a message for the client.
    pub fn push(&self, message: ServerMessage) {
        self.state.lock().inbox.push_back(message);
    }

    /// Queues a row diff for the client.
    pub fn push_diff(&self, diff: TableDiff) {
        self.push(ServerMessage::Diff(diff));
    }

    /// Queues a one-shot event for the client.
    pub fn push_event(&self, event: ServerEvent) {
        self.push(ServerMessage::Event(event));
    }

    /// Simulates the server closing the connection.
    pub fn drop_connection(&self, reason: impl Into<String>) {
        self.push(ServerMessage::Disconnected {
            reason: reason.into(),
        });
    }

    /// Every reducer call received so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<Reducer> {
        self.state.lock().calls.clone()
    }

    /// Every subscription request received so far, oldest first.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<Vec<TableName>> {
        self.state.lock().subscriptions.clone()
    }

    /// The identity each connect attempt resolved to (`None` when refused).
    #[must_use]
    pub fn connects(&self) -> Vec<Option<Identity>> {
        self.state.lock().connects.clone()
    }

    /// How many identities were minted.
    #[must_use]
    pub fn minted(&self) -> u64 {
        self.state.lock().minted
    }
}

/// The client half of a [`MemoryServer`].
#[derive(Debug)]
pub struct MemoryTransport {
    state: Arc<Mutex<ServerState>>,
    connected: bool,
}

impl MemoryTransport {
    /// Whether the transport is connected.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    fn handshake(&self, token: Option<IdentityToken>) -> Result<Handshake, SyncError> {
        let mut state = self.state.lock();
        if let Some(reason) = state.connect_failure.take() {
            state.connects.push(None);
            return Err(SyncError::ConnectionFailed { context: reason });
        }
        let handshake = match token {
            Some(token) => match state.tokens.get(token.expose()).cloned() {
                Some(identity) => Handshake { identity, token },
                None => {
                    state.connects.push(None);
                    return Err(SyncError::ConnectionFailed {
                        context: "unrecognized identity token".to_owned(),
                    });
                },
            },
            None => {
                state.minted += 1;
                let identity = Identity::new(format!("player-{}", state.minted));
                let token = IdentityToken::new(format!("token-{}", state.minted));
                state
                    .tokens
                    .insert(token.expose().to_owned(), identity.clone());
                Handshake { identity, token }
            },
        };
        state.connects.push(Some(handshake.identity.clone()));
        Ok(handshake)
    }
}

impl Transport for MemoryTransport {
    async fn connect(&mut self, token: Option<IdentityToken>) -> Result<Handshake, SyncError> {
        let handshake = self.handshake(token)?;
        self.connected = true;
        Ok(handshake)
    }

    fn subscribe(&mut self, tables: &[TableName]) -> Result<(), SyncError> {
        if !self.connected {
            return Err(SyncError::NotConnected);
        }
        let mut state = self.state.lock();
        state.subscriptions.push(tables.to_vec());
        let reply = match &state.subscription_error {
            Some((table, reason)) => ServerMessage::SubscriptionError {
                table: *table,
                reason: reason.clone(),
            },
            None => ServerMessage::SubscriptionApplied(Snapshot {
                tables: state
                    .snapshot
                    .tables
                    .iter()
                    .filter(|table| tables.contains(&table.table))
                    .cloned()
                    .collect(),
            }),
        };
        state.inbox.push_back(reply);
        Ok(())
    }

    fn call_reducer(&mut self, reducer: &Reducer) -> Result<(), SyncError> {
        if !self.connected {
            return Err(SyncError::NotConnected);
        }
        let mut state = self.state.lock();
        if state.refuse_calls {
            return Err(SyncError::ConnectionFailed {
                context: "call refused".to_owned(),
            });
        }
        state.calls.push(reducer.clone());
        Ok(())
    }

    fn receive_all_messages(&mut self) -> Vec<ServerMessage> {
        if !self.connected {
            return Vec::new();
        }
        let messages: Vec<ServerMessage> = self.state.lock().inbox.drain(..).collect();
        if messages
            .iter()
            .any(|message| matches!(message, ServerMessage::Disconnected { .. }))
        {
            self.connected = false;
        }
        messages
    }

    fn disconnect(&mut self) {
        if self.connected {
            self.connected = false;
            self.state.lock().inbox.clear();
        }
    }
}
