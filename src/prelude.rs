//! Convenient re-exports for common usage.
//!
//! ```rust
//! use lurelands_sync::prelude::*;
//! ```
//!
//! The prelude includes:
//!
//! - **Client**: [`SyncClient`], [`ClientBuilder`], [`ConnectionState`]
//! - **Seams**: [`Transport`], [`TokenStore`], [`FileTokenStore`], [`MemoryTokenStore`]
//! - **Mirror**: [`TableMirror`], [`TableName`], [`MirrorChange`], [`ChangeKind`]
//! - **Events**: [`EventDispatcher`], [`EventKind`], [`SyncEvent`], [`ListenerId`]
//! - **Rows**: [`Player`], [`InventoryItem`], [`Quest`], [`PlayerQuest`], [`GameEvent`]
//! - **Errors**: [`SyncError`], [`RejectReason`]
//! - **Configuration**: [`ClientConfig`], [`ReconnectConfig`]
//!
//! Read-side projections live in [`views`](crate::views), which is re-exported as a module.
//!
//! ```rust
//! use lurelands_sync::prelude::*;
//! use lurelands_sync::network::memory::MemoryServer;
//!
//! let server = MemoryServer::new();
//! let client: SyncClient<_> = ClientBuilder::new()
//!     .with_config(ClientConfig::minimal())
//!     .build(server.transport())?;
//! assert_eq!(client.state(), ConnectionState::Disconnected);
//! assert!(views::online_players(client.mirror()).is_empty());
//! # Ok::<(), SyncError>(())
//! ```

pub use crate::dispatch::{EventDispatcher, EventKind, ListenerId, SyncEvent};
pub use crate::error::{RejectReason, SyncError};
pub use crate::mirror::{ChangeKind, MirrorChange, TableMirror};
pub use crate::schema::{GameEvent, InventoryItem, Player, PlayerQuest, Quest};
pub use crate::sessions::builder::ClientBuilder;
pub use crate::sessions::client::SyncClient;
pub use crate::sessions::config::{ClientConfig, ReconnectConfig};
pub use crate::sessions::connection::ConnectionState;
pub use crate::token::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use crate::views;
pub use crate::{Identity, TableName, Transport};
