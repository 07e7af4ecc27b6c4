//! # Lurelands Sync
//!
//! Replicated-state synchronization core for the Lurelands multiplayer fishing client.
//!
//! The client keeps an in-process mirror of a fixed set of server-owned tables. A
//! [`SyncClient`] connects through a [`Transport`], subscribes to every table, loads one
//! snapshot wholesale and then applies the live diff stream row by row. Gameplay code reads the
//! mirror through pure projections in [`views`], listens for changes on the
//! [`EventDispatcher`], and requests state changes through the client's mutation methods, some
//! of which apply a speculative edit to the mirror before the server confirms them.
//!
//! The server is a black box: it accepts subscriptions and named reducer calls, and every effect
//! of a reducer call is observed only through later diffs. Nothing here awaits a reducer's
//! completion.
//!
//! ```
//! use lurelands_sync::network::memory::MemoryServer;
//! use lurelands_sync::{ClientBuilder, SyncEvent, EventKind};
//!
//! # async fn demo() -> Result<(), lurelands_sync::SyncError> {
//! let server = MemoryServer::new();
//! let mut client = ClientBuilder::new()
//!     .with_local_name("Wren")
//!     .build(server.transport())?;
//!
//! client.dispatcher().on(EventKind::StateReady, |_event: &SyncEvent| {
//!     // first render
//! });
//!
//! if client.connect().await {
//!     client.poll()?;
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

pub use dispatch::{EventDispatcher, EventKind, ListenerId, SyncEvent};
pub use error::{RejectReason, SyncError};
pub use mirror::{
    ChangeKind, MirrorChange, Row, RowKey, RowSet, RowValue, Snapshot, TableCache, TableDiff,
    TableMirror, TableSnapshot,
};
pub use optimistic::pending::{EditId, PendingEdit, PendingEdits};
pub use optimistic::reducers::Reducer;
pub use optimistic::{MutationCoordinator, ReducerSink};
pub use reconnect::Backoff;
pub use schema::InventoryKey;
pub use sessions::builder::ClientBuilder;
pub use sessions::client::SyncClient;
pub use sessions::config::{ClientConfig, ReconnectConfig};
pub use sessions::connection::{ConnectionManager, ConnectionState};
pub use token::{Credentials, FileTokenStore, MemoryTokenStore, TokenStore};

pub mod dispatch;
#[doc(hidden)]
pub mod error;
pub mod hash;
pub mod mirror;
pub mod optimistic;
pub mod prelude;
pub mod quest;
pub mod reconnect;
pub mod ring;
/// Internal random number generator based on PCG32, used for reconnect jitter.
pub mod rng;
pub mod schema;
pub mod telemetry;
pub mod token;
pub mod views;

#[cfg(test)]
pub(crate) mod test_config;
#[doc(hidden)]
pub mod sessions {
    pub mod builder;
    pub mod client;
    pub mod config;
    pub mod connection;
}
/// Wire encoding and transport implementations.
pub mod network {
    /// Binary codec for row payloads and reducer arguments.
    pub mod codec;
    /// In-process transport used by tests and offline play.
    pub mod memory;
}

/// The identity the server assigned to this client. Doubles as the player id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Identity(String);

impl Identity {
    /// Wraps a server-issued identity string.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The identity as the player id used by every table.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque credential returned by the first successful connection.
///
/// Supplying it on every later connection keeps the same logical identity. Losing it means
/// acting as a brand-new player. Its `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityToken(String);

impl IdentityToken {
    /// Wraps a server-issued token.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw token, for handing back to the transport.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IdentityToken(..)")
    }
}

/// What a successful connect yields: who we are and how to be recognized next time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// The identity the server recognized or minted.
    pub identity: Identity,
    /// The token to present on the next connect.
    pub token: IdentityToken,
}

/// Every table the client subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableName {
    /// Connected players.
    Player,
    /// Inventory stacks.
    Inventory,
    /// Static item configuration.
    ItemDefinition,
    /// Static quest definitions.
    Quest,
    /// Per-player quest progress.
    PlayerQuest,
    /// Append-only game event log.
    GameEvent,
    /// Per-player statistics and levels.
    PlayerStats,
    /// Spawn points.
    SpawnPoint,
    /// Ponds.
    Pond,
    /// Rivers.
    River,
    /// Oceans.
    Ocean,
}

impl TableName {
    /// The full subscription set, in load order.
    pub const ALL: [Self; 11] = [
        Self::Player,
        Self::Inventory,
        Self::ItemDefinition,
        Self::Quest,
        Self::PlayerQuest,
        Self::GameEvent,
        Self::PlayerStats,
        Self::SpawnPoint,
        Self::Pond,
        Self::River,
        Self::Ocean,
    ];

    /// The table's name on the server.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Player => "player",
            Self::Inventory => "inventory",
            Self::ItemDefinition => "item_definition",
            Self::Quest => "quest",
            Self::PlayerQuest => "player_quest",
            Self::GameEvent => "game_event",
            Self::PlayerStats => "player_stats",
            Self::SpawnPoint => "spawn_point",
            Self::Pond => "pond",
            Self::River => "river",
            Self::Ocean => "ocean",
        }
    }

    /// Whether this is immutable world geography.
    #[must_use]
    pub const fn is_geography(&self) -> bool {
        matches!(
            self,
            Self::SpawnPoint | Self::Pond | Self::River | Self::Ocean
        )
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One-shot notifications pushed by the server that are not backed by a table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ServerEvent {
    /// Somebody landed a fish.
    FishCaught {
        /// Who caught it.
        player_id: String,
        /// Fish item id.
        item_id: String,
        /// Star rarity.
        rarity: u8,
        /// Size of the fish.
        size: f32,
    },
    /// A player reached a new level.
    LevelUp {
        /// Who leveled.
        player_id: String,
        /// The new level.
        level: u32,
    },
    /// Free-form broadcast.
    Notice {
        /// Text to show.
        message: String,
    },
}

/// Everything a [`Transport`] can deliver.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ServerMessage {
    /// The subscription set applied; this is the initial bulk load.
    SubscriptionApplied(Snapshot),
    /// A subscription query failed to apply. Fatal.
    SubscriptionError {
        /// The failing table, if known.
        table: Option<TableName>,
        /// What the server said.
        reason: String,
    },
    /// One row changed.
    Diff(TableDiff),
    /// A one-shot event.
    Event(ServerEvent),
    /// The connection was closed or lost.
    Disconnected {
        /// Why, as far as the transport knows.
        reason: String,
    },
}

/// The only seam between the client and the remote store.
///
/// Implement it over whatever wire protocol the server speaks. Query language, framing and
/// encoding stay on the other side of this trait.
pub trait Transport {
    /// Opens the persistent connection, presenting `token` when one was saved.
    ///
    /// Resolves once the server accepted or refused the connection. The returned handshake
    /// carries the identity to act as and the token to present next time.
    fn connect(
        &mut self,
        token: Option<IdentityToken>,
    ) -> impl Future<Output = Result<Handshake, SyncError>>;

    /// Issues the subscription queries. The snapshot arrives later as
    /// [`ServerMessage::SubscriptionApplied`].
    fn subscribe(&mut self, tables: &[TableName]) -> Result<(), SyncError>;

    /// Sends a named reducer call. Fire-and-forget: success only shows up as later diffs.
    fn call_reducer(&mut self, reducer: &Reducer) -> Result<(), SyncError>;

    /// Returns all messages received since the last time this method was called, in arrival
    /// order.
    fn receive_all_messages(&mut self) -> Vec<ServerMessage>;

    /// Closes the connection. Calling it while disconnected does nothing.
    fn disconnect(&mut self);
}
