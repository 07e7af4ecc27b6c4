//! The table mirror: the client's single source of truth for what it believes about the server.
//!
//! Every subscribed table has one [`TableCache`] keyed by that table's stable row identifier.
//! The game event log is the exception: it is a capped, newest-first [`RingBuffer`].
//!
//! # Snapshot load
//!
//! [`TableMirror::load_snapshot`] rebuilds the mirror wholesale, table by table, into a staging
//! mirror. Only when every table loaded is the staging mirror swapped in; a failure on any table
//! leaves the live mirror exactly as it was. A partially populated mirror is worse than an empty
//! one.
//!
//! # Diffs
//!
//! [`TableMirror::apply_diff`] applies one insert, update or delete. An update replaces the whole
//! row, so replaying it is harmless. A delete for an unknown key does nothing.
//!
//! There is no cross-table atomicity: "spend gold and grant an item" may arrive as two diffs in
//! either order. Readers must tolerate that.
//!
//! Secondary groupings (all inventory of one player, ...) are deliberately not stored here; the
//! [`views`](crate::views) module computes them on read.

mod table;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hasher;

pub use table::TableCache;

use crate::hash::FnvHasher;
use crate::network::codec;
use crate::ring::RingBuffer;
use crate::schema::{
    GameEvent, InventoryItem, InventoryKey, ItemDefinition, Ocean, Player, PlayerQuest,
    PlayerStats, Pond, Quest, River, SpawnPoint,
};
use crate::{SyncError, TableName};

/// A mirrored row type.
pub trait Row: Clone + fmt::Debug + Serialize {
    /// The stable row identifier used as the cache key.
    type Key: Ord + Clone + fmt::Debug + Serialize;

    /// The table this row type belongs to.
    const TABLE: TableName;

    /// This row's identifier.
    fn key(&self) -> Self::Key;
}

impl Row for Player {
    type Key = String;
    const TABLE: TableName = TableName::Player;

    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Row for InventoryItem {
    type Key = InventoryKey;
    const TABLE: TableName = TableName::Inventory;

    fn key(&self) -> InventoryKey {
        InventoryKey::Row(self.id)
    }
}

impl Row for ItemDefinition {
    type Key = String;
    const TABLE: TableName = TableName::ItemDefinition;

    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Row for Quest {
    type Key = String;
    const TABLE: TableName = TableName::Quest;

    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Row for PlayerQuest {
    type Key = (String, String);
    const TABLE: TableName = TableName::PlayerQuest;

    fn key(&self) -> (String, String) {
        (self.player_id.clone(), self.quest_id.clone())
    }
}

impl Row for GameEvent {
    type Key = u64;
    const TABLE: TableName = TableName::GameEvent;

    fn key(&self) -> u64 {
        self.id
    }
}

impl Row for PlayerStats {
    type Key = String;
    const TABLE: TableName = TableName::PlayerStats;

    fn key(&self) -> String {
        self.player_id.clone()
    }
}

impl Row for SpawnPoint {
    type Key = String;
    const TABLE: TableName = TableName::SpawnPoint;

    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Row for Pond {
    type Key = String;
    const TABLE: TableName = TableName::Pond;

    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Row for River {
    type Key = String;
    const TABLE: TableName = TableName::River;

    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Row for Ocean {
    type Key = String;
    const TABLE: TableName = TableName::Ocean;

    fn key(&self) -> String {
        self.id.clone()
    }
}

/// A row identifier tagged with its table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RowKey {
    /// Player id.
    Player(String),
    /// Inventory row id or placeholder.
    Inventory(InventoryKey),
    /// Item id.
    ItemDefinition(String),
    /// Quest id.
    Quest(String),
    /// `(player_id, quest_id)`.
    PlayerQuest(String, String),
    /// Event id.
    GameEvent(u64),
    /// Player id.
    PlayerStats(String),
    /// Spawn point id.
    SpawnPoint(String),
    /// Pond id.
    Pond(String),
    /// River id.
    River(String),
    /// Ocean id.
    Ocean(String),
}

impl RowKey {
    /// The table this key addresses.
    #[must_use]
    pub const fn table(&self) -> TableName {
        match self {
            Self::Player(_) => TableName::Player,
            Self::Inventory(_) => TableName::Inventory,
            Self::ItemDefinition(_) => TableName::ItemDefinition,
            Self::Quest(_) => TableName::Quest,
            Self::PlayerQuest(..) => TableName::PlayerQuest,
            Self::GameEvent(_) => TableName::GameEvent,
            Self::PlayerStats(_) => TableName::PlayerStats,
            Self::SpawnPoint(_) => TableName::SpawnPoint,
            Self::Pond(_) => TableName::Pond,
            Self::River(_) => TableName::River,
            Self::Ocean(_) => TableName::Ocean,
        }
    }
}

/// A row of any mirrored table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum RowValue {
    Player(Player),
    Inventory(InventoryItem),
    ItemDefinition(ItemDefinition),
    Quest(Quest),
    PlayerQuest(PlayerQuest),
    GameEvent(GameEvent),
    PlayerStats(PlayerStats),
    SpawnPoint(SpawnPoint),
    Pond(Pond),
    River(River),
    Ocean(Ocean),
}

impl RowValue {
    /// The table this row belongs to.
    #[must_use]
    pub const fn table(&self) -> TableName {
        match self {
            Self::Player(_) => TableName::Player,
            Self::Inventory(_) => TableName::Inventory,
            Self::ItemDefinition(_) => TableName::ItemDefinition,
            Self::Quest(_) => TableName::Quest,
            Self::PlayerQuest(_) => TableName::PlayerQuest,
            Self::GameEvent(_) => TableName::GameEvent,
            Self::PlayerStats(_) => TableName::PlayerStats,
            Self::SpawnPoint(_) => TableName::SpawnPoint,
            Self::Pond(_) => TableName::Pond,
            Self::River(_) => TableName::River,
            Self::Ocean(_) => TableName::Ocean,
        }
    }

    /// The authoritative identifier of this row.
    #[must_use]
    pub fn key(&self) -> RowKey {
        match self {
            Self::Player(row) => RowKey::Player(row.key()),
            Self::Inventory(row) => RowKey::Inventory(row.key()),
            Self::ItemDefinition(row) => RowKey::ItemDefinition(row.key()),
            Self::Quest(row) => RowKey::Quest(row.key()),
            Self::PlayerQuest(row) => RowKey::PlayerQuest(row.player_id.clone(), row.quest_id.clone()),
            Self::GameEvent(row) => RowKey::GameEvent(row.key()),
            Self::PlayerStats(row) => RowKey::PlayerStats(row.key()),
            Self::SpawnPoint(row) => RowKey::SpawnPoint(row.key()),
            Self::Pond(row) => RowKey::Pond(row.key()),
            Self::River(row) => RowKey::River(row.key()),
            Self::Ocean(row) => RowKey::Ocean(row.key()),
        }
    }
}

/// One row-level change delivered after the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum TableDiff {
    /// A new row.
    Insert(RowValue),
    /// A whole-row replacement, addressed by the row's identifier.
    Update(RowValue),
    /// Removal of the row with this row's identifier.
    Delete(RowValue),
}

impl TableDiff {
    /// The table this diff touches.
    #[must_use]
    pub const fn table(&self) -> TableName {
        match self {
            Self::Insert(row) | Self::Update(row) | Self::Delete(row) => row.table(),
        }
    }
}

/// The rows of one table in a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum RowSet {
    /// Rows the transport already decoded.
    Rows(Vec<RowValue>),
    /// A bincode payload holding a list of the table's row type.
    Encoded(Vec<u8>),
}

/// One table's share of a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSnapshot {
    /// Which table.
    pub table: TableName,
    /// Every row currently visible to the subscription.
    pub rows: RowSet,
}

/// The bulk load delivered once per successful subscription.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    /// Per-table rows, loaded in order.
    pub tables: Vec<TableSnapshot>,
}

impl Snapshot {
    /// Adds a table of already-decoded rows.
    #[must_use]
    pub fn with_rows(mut self, table: TableName, rows: Vec<RowValue>) -> Self {
        self.tables.push(TableSnapshot {
            table,
            rows: RowSet::Rows(rows),
        });
        self
    }

    /// Adds a table as an encoded payload.
    #[must_use]
    pub fn with_encoded(mut self, table: TableName, bytes: Vec<u8>) -> Self {
        self.tables.push(TableSnapshot {
            table,
            rows: RowSet::Encoded(bytes),
        });
        self
    }
}

/// What kind of change happened to a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// The row appeared.
    Insert,
    /// The row was replaced.
    Update,
    /// The row went away.
    Delete,
}

/// A change the mirror actually applied, as broadcast to listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorChange {
    /// The table that changed.
    pub table: TableName,
    /// Insert, update or delete.
    pub kind: ChangeKind,
    /// The cache key of the row.
    pub key: RowKey,
    /// The row after the change; `None` for deletes.
    pub row: Option<RowValue>,
    /// The row before the change, if one was cached.
    pub previous: Option<RowValue>,
}

/// In-memory replica of every subscribed table.
///
/// Owned by exactly one [`SyncClient`](crate::SyncClient). Application code gets shared
/// references or cloned projections, never a mutable handle.
#[derive(Debug, Clone)]
pub struct TableMirror {
    players: TableCache<Player>,
    inventory: TableCache<InventoryItem>,
    item_definitions: TableCache<ItemDefinition>,
    quests: TableCache<Quest>,
    player_quests: TableCache<PlayerQuest>,
    player_stats: TableCache<PlayerStats>,
    spawn_points: TableCache<SpawnPoint>,
    ponds: TableCache<Pond>,
    rivers: TableCache<River>,
    oceans: TableCache<Ocean>,
    events: RingBuffer<GameEvent>,
    loaded: bool,
    next_placeholder: u64,
}

impl Default for TableMirror {
    fn default() -> Self {
        Self::new(crate::ClientConfig::DEFAULT_EVENT_LOG_CAPACITY)
    }
}

impl TableMirror {
    /// Creates an empty mirror whose event log keeps at most `event_log_capacity` entries.
    #[must_use]
    pub fn new(event_log_capacity: usize) -> Self {
        Self {
            players: TableCache::default(),
            inventory: TableCache::default(),
            item_definitions: TableCache::default(),
            quests: TableCache::default(),
            player_quests: TableCache::default(),
            player_stats: TableCache::default(),
            spawn_points: TableCache::default(),
            ponds: TableCache::default(),
            rivers: TableCache::default(),
            oceans: TableCache::default(),
            events: RingBuffer::new(event_log_capacity),
            loaded: false,
            next_placeholder: 0,
        }
    }

    /// Whether a snapshot has been loaded since construction or the last [`clear`](Self::clear).
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Players.
    #[must_use]
    pub const fn players(&self) -> &TableCache<Player> {
        &self.players
    }

    /// Inventory stacks, authoritative rows and placeholders alike.
    #[must_use]
    pub const fn inventory(&self) -> &TableCache<InventoryItem> {
        &self.inventory
    }

    /// Item definitions.
    #[must_use]
    pub const fn item_definitions(&self) -> &TableCache<ItemDefinition> {
        &self.item_definitions
    }

    /// Quest definitions.
    #[must_use]
    pub const fn quests(&self) -> &TableCache<Quest> {
        &self.quests
    }

    /// Quest progress records.
    #[must_use]
    pub const fn player_quests(&self) -> &TableCache<PlayerQuest> {
        &self.player_quests
    }

    /// Player statistics.
    #[must_use]
    pub const fn player_stats(&self) -> &TableCache<PlayerStats> {
        &self.player_stats
    }

    /// Spawn points.
    #[must_use]
    pub const fn spawn_points(&self) -> &TableCache<SpawnPoint> {
        &self.spawn_points
    }

    /// Ponds.
    #[must_use]
    pub const fn ponds(&self) -> &TableCache<Pond> {
        &self.ponds
    }

    /// Rivers.
    #[must_use]
    pub const fn rivers(&self) -> &TableCache<River> {
        &self.rivers
    }

    /// Oceans.
    #[must_use]
    pub const fn oceans(&self) -> &TableCache<Ocean> {
        &self.oceans
    }

    /// The game event log, newest first.
    #[must_use]
    pub const fn events(&self) -> &RingBuffer<GameEvent> {
        &self.events
    }

    /// Number of rows cached for `table`.
    #[must_use]
    pub fn row_count(&self, table: TableName) -> usize {
        match table {
            TableName::Player => self.players.len(),
            TableName::Inventory => self.inventory.len(),
            TableName::ItemDefinition => self.item_definitions.len(),
            TableName::Quest => self.quests.len(),
            TableName::PlayerQuest => self.player_quests.len(),
            TableName::GameEvent => self.events.len(),
            TableName::PlayerStats => self.player_stats.len(),
            TableName::SpawnPoint => self.spawn_points.len(),
            TableName::Pond => self.ponds.len(),
            TableName::River => self.rivers.len(),
            TableName::Ocean => self.oceans.len(),
        }
    }

    /// Whether every table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        TableName::ALL.iter().all(|table| self.row_count(*table) == 0)
    }

    /// Rebuilds the mirror from a snapshot.
    ///
    /// Tables are loaded in the order given. Tables missing from the snapshot end up empty. If
    /// any table fails to load (an undecodable payload or a row of another table), the whole
    /// load is abandoned and `self` is left untouched.
    ///
    /// Returns the tables that were loaded.
    pub fn load_snapshot(&mut self, snapshot: Snapshot) -> Result<Vec<TableName>, SyncError> {
        let mut staging = Self::new(self.events.capacity());
        let mut loaded = Vec::with_capacity(snapshot.tables.len());

        for TableSnapshot { table, rows } in snapshot.tables {
            let rows = match rows {
                RowSet::Rows(rows) => rows,
                RowSet::Encoded(bytes) => {
                    codec::decode_rows(table, &bytes).map_err(|err| SyncError::SchemaMismatch {
                        table,
                        context: err.to_string(),
                    })?
                },
            };
            staging.load_table(table, rows)?;
            tracing::trace!(table = table.as_str(), rows = staging.row_count(table), "table loaded");
            loaded.push(table);
        }

        staging.loaded = true;
        staging.next_placeholder = self.next_placeholder;
        *self = staging;
        Ok(loaded)
    }

    fn load_table(&mut self, table: TableName, rows: Vec<RowValue>) -> Result<(), SyncError> {
        self.clear_table(table);
        if table == TableName::GameEvent {
            let mut events = Vec::with_capacity(rows.len());
            for row in rows {
                match row {
                    RowValue::GameEvent(event) => events.push(event),
                    other => return Err(Self::foreign_row(table, &other)),
                }
            }
            events.sort_by_key(|event| event.id);
            events.dedup_by_key(|event| event.id);
            for event in events {
                self.events.push_front(event);
            }
            return Ok(());
        }
        for row in rows {
            if row.table() != table {
                return Err(Self::foreign_row(table, &row));
            }
            self.put(row.key(), row);
        }
        Ok(())
    }

    fn foreign_row(table: TableName, row: &RowValue) -> SyncError {
        SyncError::SchemaMismatch {
            table,
            context: format!("snapshot for {} carried a {} row", table, row.table()),
        }
    }

    fn clear_table(&mut self, table: TableName) {
        match table {
            TableName::Player => self.players.clear(),
            TableName::Inventory => self.inventory.clear(),
            TableName::ItemDefinition => self.item_definitions.clear(),
            TableName::Quest => self.quests.clear(),
            TableName::PlayerQuest => self.player_quests.clear(),
            TableName::GameEvent => self.events.clear(),
            TableName::PlayerStats => self.player_stats.clear(),
            TableName::SpawnPoint => self.spawn_points.clear(),
            TableName::Pond => self.ponds.clear(),
            TableName::River => self.rivers.clear(),
            TableName::Ocean => self.oceans.clear(),
        }
    }

    /// Applies one diff and returns the change, or `None` when nothing changed (a delete of an
    /// unknown key).
    pub fn apply_diff(&mut self, diff: TableDiff) -> Option<MirrorChange> {
        match diff {
            TableDiff::Insert(row) => Some(self.write(ChangeKind::Insert, row)),
            TableDiff::Update(row) => Some(self.write(ChangeKind::Update, row)),
            TableDiff::Delete(row) => {
                let key = row.key();
                let previous = self.remove(&key)?;
                Some(MirrorChange {
                    table: key.table(),
                    kind: ChangeKind::Delete,
                    key,
                    row: None,
                    previous: Some(previous),
                })
            },
        }
    }

    fn write(&mut self, kind: ChangeKind, row: RowValue) -> MirrorChange {
        let key = row.key();
        let previous = self.put(key.clone(), row.clone());
        MirrorChange {
            table: key.table(),
            kind,
            key,
            row: Some(row),
            previous,
        }
    }

    /// Drops every row and forgets the snapshot.
    pub fn clear(&mut self) {
        for table in TableName::ALL {
            self.clear_table(table);
        }
        self.loaded = false;
    }

    /// A deterministic fingerprint of the mirror's content.
    ///
    /// Two mirrors holding the same rows under the same keys produce the same value, regardless
    /// of the order the rows arrived in.
    #[must_use]
    pub fn checksum(&self) -> u64 {
        let mut hasher = FnvHasher::new();
        feed(&mut hasher, TableName::Player, self.players.entries());
        feed(&mut hasher, TableName::Inventory, self.inventory.entries());
        feed(&mut hasher, TableName::ItemDefinition, self.item_definitions.entries());
        feed(&mut hasher, TableName::Quest, self.quests.entries());
        feed(&mut hasher, TableName::PlayerQuest, self.player_quests.entries());
        feed(
            &mut hasher,
            TableName::GameEvent,
            self.events.iter().map(|event| (&event.id, event)),
        );
        feed(&mut hasher, TableName::PlayerStats, self.player_stats.entries());
        feed(&mut hasher, TableName::SpawnPoint, self.spawn_points.entries());
        feed(&mut hasher, TableName::Pond, self.ponds.entries());
        feed(&mut hasher, TableName::River, self.rivers.entries());
        feed(&mut hasher, TableName::Ocean, self.oceans.entries());
        hasher.finish()
    }

    /// Reads a row by key, cloned.
    pub(crate) fn row(&self, key: &RowKey) -> Option<RowValue> {
        match key {
            RowKey::Player(id) => self.players.get(id).cloned().map(RowValue::Player),
            RowKey::Inventory(id) => self.inventory.get(id).cloned().map(RowValue::Inventory),
            RowKey::ItemDefinition(id) => self
                .item_definitions
                .get(id)
                .cloned()
                .map(RowValue::ItemDefinition),
            RowKey::Quest(id) => self.quests.get(id).cloned().map(RowValue::Quest),
            RowKey::PlayerQuest(player_id, quest_id) => self
                .player_quests
                .get(&(player_id.clone(), quest_id.clone()))
                .cloned()
                .map(RowValue::PlayerQuest),
            RowKey::GameEvent(id) => self
                .events
                .iter()
                .find(|event| event.id == *id)
                .cloned()
                .map(RowValue::GameEvent),
            RowKey::PlayerStats(id) => self.player_stats.get(id).cloned().map(RowValue::PlayerStats),
            RowKey::SpawnPoint(id) => self.spawn_points.get(id).cloned().map(RowValue::SpawnPoint),
            RowKey::Pond(id) => self.ponds.get(id).cloned().map(RowValue::Pond),
            RowKey::River(id) => self.rivers.get(id).cloned().map(RowValue::River),
            RowKey::Ocean(id) => self.oceans.get(id).cloned().map(RowValue::Ocean),
        }
    }

    /// Stores `value` under `key`, returning what was there. A key and value of different
    /// tables are refused and leave the mirror unchanged.
    pub(crate) fn put(&mut self, key: RowKey, value: RowValue) -> Option<RowValue> {
        match (key, value) {
            (RowKey::Player(id), RowValue::Player(row)) => {
                self.players.insert(id, row).map(RowValue::Player)
            },
            (RowKey::Inventory(id), RowValue::Inventory(row)) => {
                self.inventory.insert(id, row).map(RowValue::Inventory)
            },
            (RowKey::ItemDefinition(id), RowValue::ItemDefinition(row)) => self
                .item_definitions
                .insert(id, row)
                .map(RowValue::ItemDefinition),
            (RowKey::Quest(id), RowValue::Quest(row)) => {
                self.quests.insert(id, row).map(RowValue::Quest)
            },
            (RowKey::PlayerQuest(player_id, quest_id), RowValue::PlayerQuest(row)) => self
                .player_quests
                .insert((player_id, quest_id), row)
                .map(RowValue::PlayerQuest),
            (RowKey::GameEvent(id), RowValue::GameEvent(row)) => {
                if let Some(slot) = self.events.find_mut(|event| event.id == id) {
                    return Some(RowValue::GameEvent(std::mem::replace(slot, row)));
                }
                self.events.push_front(row);
                None
            },
            (RowKey::PlayerStats(id), RowValue::PlayerStats(row)) => {
                self.player_stats.insert(id, row).map(RowValue::PlayerStats)
            },
            (RowKey::SpawnPoint(id), RowValue::SpawnPoint(row)) => {
                self.spawn_points.insert(id, row).map(RowValue::SpawnPoint)
            },
            (RowKey::Pond(id), RowValue::Pond(row)) => self.ponds.insert(id, row).map(RowValue::Pond),
            (RowKey::River(id), RowValue::River(row)) => {
                self.rivers.insert(id, row).map(RowValue::River)
            },
            (RowKey::Ocean(id), RowValue::Ocean(row)) => {
                self.oceans.insert(id, row).map(RowValue::Ocean)
            },
            (key, value) => {
                tracing::warn!(
                    key_table = key.table().as_str(),
                    row_table = value.table().as_str(),
                    "refusing to store a row under a key of another table"
                );
                None
            },
        }
    }

    /// Removes the row under `key`, returning it.
    pub(crate) fn remove(&mut self, key: &RowKey) -> Option<RowValue> {
        match key {
            RowKey::Player(id) => self.players.remove(id).map(RowValue::Player),
            RowKey::Inventory(id) => self.inventory.remove(id).map(RowValue::Inventory),
            RowKey::ItemDefinition(id) => self
                .item_definitions
                .remove(id)
                .map(RowValue::ItemDefinition),
            RowKey::Quest(id) => self.quests.remove(id).map(RowValue::Quest),
            RowKey::PlayerQuest(player_id, quest_id) => self
                .player_quests
                .remove(&(player_id.clone(), quest_id.clone()))
                .map(RowValue::PlayerQuest),
            RowKey::GameEvent(id) => self
                .events
                .remove_first(|event| event.id == *id)
                .map(RowValue::GameEvent),
            RowKey::PlayerStats(id) => self.player_stats.remove(id).map(RowValue::PlayerStats),
            RowKey::SpawnPoint(id) => self.spawn_points.remove(id).map(RowValue::SpawnPoint),
            RowKey::Pond(id) => self.ponds.remove(id).map(RowValue::Pond),
            RowKey::River(id) => self.rivers.remove(id).map(RowValue::River),
            RowKey::Ocean(id) => self.oceans.remove(id).map(RowValue::Ocean),
        }
    }

    /// Stores a speculative inventory row under a fresh placeholder key.
    pub(crate) fn insert_placeholder(&mut self, item: InventoryItem) -> InventoryKey {
        self.next_placeholder += 1;
        let key = InventoryKey::Placeholder(self.next_placeholder);
        self.inventory.insert(key, item);
        key
    }
}

fn feed<'a, K, R>(
    hasher: &mut FnvHasher,
    table: TableName,
    entries: impl Iterator<Item = (&'a K, &'a R)>,
) where
    K: Serialize + 'a,
    R: Serialize + 'a,
{
    hasher.write(table.as_str().as_bytes());
    for entry in entries {
        if let Ok(bytes) = codec::encode(&entry) {
            hasher.write(&bytes);
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::test_config::{event, fish, item_definition, player, pole};

    fn populated() -> TableMirror {
        let mut mirror = TableMirror::new(4);
        mirror
            .load_snapshot(
                Snapshot::default()
                    .with_rows(TableName::Player, vec![RowValue::Player(player("p1", 100))])
                    .with_rows(TableName::Inventory, vec![
                        RowValue::Inventory(fish(1, "p1", 3)),
                        RowValue::Inventory(pole(2, "p1", "pole_1")),
                    ])
                    .with_rows(TableName::ItemDefinition, vec![RowValue::ItemDefinition(
                        item_definition("pole_2", 50, 1),
                    )]),
            )
            .unwrap();
        mirror
    }

    #[test]
    fn snapshot_holds_every_row_exactly_once() {
        let mut mirror = TableMirror::new(8);
        let loaded = mirror
            .load_snapshot(Snapshot::default().with_rows(TableName::Inventory, vec![
                RowValue::Inventory(fish(1, "p1", 3)),
                RowValue::Inventory(fish(1, "p1", 3)),
                RowValue::Inventory(fish(2, "p1", 1)),
            ]))
            .unwrap();
        assert_eq!(loaded, vec![TableName::Inventory]);
        assert!(mirror.is_loaded());
        assert_eq!(mirror.inventory().len(), 2);
        assert!(mirror.inventory().contains(&InventoryKey::Row(1)));
        assert!(mirror.inventory().contains(&InventoryKey::Row(2)));
    }

    #[test]
    fn non_stackable_pole_and_fish_do_not_collide() {
        let mut mirror = TableMirror::new(8);
        let mut same_kind_fish = fish(5, "p1", 1);
        same_kind_fish.item_id = "pole_1".to_owned();
        same_kind_fish.rarity = 0;
        mirror
            .load_snapshot(Snapshot::default().with_rows(TableName::Inventory, vec![
                RowValue::Inventory(pole(4, "p1", "pole_1")),
                RowValue::Inventory(same_kind_fish),
            ]))
            .unwrap();
        assert_eq!(mirror.inventory().len(), 2);
    }

    #[test]
    fn failed_snapshot_leaves_mirror_untouched() {
        let mut mirror = populated();
        let before = mirror.checksum();
        let err = mirror
            .load_snapshot(
                Snapshot::default()
                    .with_rows(TableName::Player, vec![RowValue::Player(player("p2", 5))])
                    .with_encoded(TableName::Inventory, vec![0xde, 0xad]),
            )
            .unwrap_err();
        assert!(matches!(err, SyncError::SchemaMismatch {
            table: TableName::Inventory,
            ..
        }));
        assert_eq!(mirror.checksum(), before);
        assert!(mirror.players().contains(&"p1".to_owned()));
        assert!(!mirror.players().contains(&"p2".to_owned()));
    }

    #[test]
    fn failed_first_snapshot_leaves_mirror_empty() {
        let mut mirror = TableMirror::new(8);
        let result = mirror.load_snapshot(
            Snapshot::default()
                .with_rows(TableName::Player, vec![RowValue::Player(player("p1", 5))])
                .with_rows(TableName::Quest, vec![RowValue::Player(player("p9", 5))]),
        );
        assert!(result.is_err());
        assert!(mirror.is_empty());
        assert!(!mirror.is_loaded());
    }

    #[test]
    fn encoded_tables_load() {
        let mut mirror = TableMirror::new(8);
        let bytes = codec::encode_rows(&[fish(7, "p1", 2)]).unwrap();
        mirror
            .load_snapshot(Snapshot::default().with_encoded(TableName::Inventory, bytes))
            .unwrap();
        assert_eq!(
            mirror.inventory().get(&InventoryKey::Row(7)).unwrap().quantity,
            2
        );
    }

    #[test]
    fn snapshot_replaces_previous_content() {
        let mut mirror = populated();
        mirror
            .load_snapshot(
                Snapshot::default()
                    .with_rows(TableName::Player, vec![RowValue::Player(player("p1", 7))]),
            )
            .unwrap();
        assert!(mirror.inventory().is_empty());
        assert_eq!(mirror.players().get(&"p1".to_owned()).unwrap().gold, 7);
    }

    #[test]
    fn consecutive_updates_keep_the_last() {
        let mut mirror = populated();
        mirror.apply_diff(TableDiff::Update(RowValue::Inventory(fish(1, "p1", 3))));
        mirror.apply_diff(TableDiff::Update(RowValue::Inventory(fish(1, "p1", 5))));
        assert_eq!(
            mirror.inventory().get(&InventoryKey::Row(1)).unwrap().quantity,
            5
        );
    }

    #[test]
    fn replayed_update_is_idempotent() {
        let mut mirror = populated();
        let diff = TableDiff::Update(RowValue::Player(player("p1", 42)));
        mirror.apply_diff(diff.clone());
        let once = mirror.checksum();
        mirror.apply_diff(diff);
        assert_eq!(mirror.checksum(), once);
    }

    #[test]
    fn delete_of_unknown_key_is_a_no_op() {
        let mut mirror = populated();
        let before = mirror.checksum();
        let change = mirror.apply_diff(TableDiff::Delete(RowValue::Inventory(fish(99, "p1", 1))));
        assert!(change.is_none());
        assert_eq!(mirror.checksum(), before);
    }

    #[test]
    fn delete_reports_previous_row() {
        let mut mirror = populated();
        let change = mirror
            .apply_diff(TableDiff::Delete(RowValue::Inventory(fish(1, "p1", 0))))
            .unwrap();
        assert_eq!(change.kind, ChangeKind::Delete);
        assert_eq!(change.previous, Some(RowValue::Inventory(fish(1, "p1", 3))));
        assert!(change.row.is_none());
    }

    #[test]
    fn event_log_is_capped_newest_first() {
        let mut mirror = TableMirror::new(3);
        mirror
            .load_snapshot(Snapshot::default().with_rows(
                TableName::GameEvent,
                (1..=5).rev().map(|id| RowValue::GameEvent(event(id))).collect(),
            ))
            .unwrap();
        let ids: Vec<u64> = mirror.events().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![5, 4, 3]);

        mirror.apply_diff(TableDiff::Insert(RowValue::GameEvent(event(6))));
        let ids: Vec<u64> = mirror.events().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![6, 5, 4]);
    }

    #[test]
    fn replayed_event_insert_does_not_duplicate() {
        let mut mirror = TableMirror::new(3);
        mirror.apply_diff(TableDiff::Insert(RowValue::GameEvent(event(1))));
        mirror.apply_diff(TableDiff::Insert(RowValue::GameEvent(event(1))));
        assert_eq!(mirror.events().len(), 1);
    }

    #[test]
    fn checksum_ignores_arrival_order() {
        let mut left = TableMirror::new(8);
        let mut right = TableMirror::new(8);
        left.apply_diff(TableDiff::Insert(RowValue::Inventory(fish(1, "p1", 1))));
        left.apply_diff(TableDiff::Insert(RowValue::Inventory(fish(2, "p1", 2))));
        right.apply_diff(TableDiff::Insert(RowValue::Inventory(fish(2, "p1", 2))));
        right.apply_diff(TableDiff::Insert(RowValue::Inventory(fish(1, "p1", 1))));
        assert_eq!(left.checksum(), right.checksum());
        right.apply_diff(TableDiff::Update(RowValue::Inventory(fish(1, "p1", 9))));
        assert_ne!(left.checksum(), right.checksum());
    }

    #[test]
    fn placeholders_live_beside_authoritative_rows() {
        let mut mirror = populated();
        let key = mirror.insert_placeholder(fish(0, "p1", 1));
        assert!(key.is_placeholder());
        assert_eq!(mirror.inventory().len(), 3);
        assert!(mirror.remove(&RowKey::Inventory(key)).is_some());
        assert_eq!(mirror.inventory().len(), 2);
    }

    #[test]
    fn clear_forgets_everything() {
        let mut mirror = populated();
        mirror.clear();
        assert!(mirror.is_empty());
        assert!(!mirror.is_loaded());
    }
}
