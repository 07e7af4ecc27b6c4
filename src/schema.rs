//! Row types for every table the client mirrors.
//!
//! All rows are owned by the remote store. The client never originates identifiers: row ids
//! arrive with the rows, and the only locally created rows are speculative placeholders that
//! the mirror keys separately (see [`InventoryKey`]).

use serde::{Deserialize, Serialize};
use web_time::{SystemTime, UNIX_EPOCH};

/// Item id of the free starter pole, the only purchasable item with a price of zero.
pub const STARTER_POLE_ID: &str = "pole_1";

/// Microseconds since the Unix epoch, as stamped by the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// The local wall clock. Only used to stamp speculative rows.
    #[must_use]
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or_default();
        Self(micros)
    }
}

/// A connected (or previously connected) player.
///
/// Absence of a row means the player is logically offline; the remote store keeps rows for
/// players that left and flips `is_online` instead of deleting them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    /// Identity string of the player.
    pub id: String,
    /// Display name.
    pub name: String,
    /// World x position.
    pub x: f32,
    /// World y position.
    pub y: f32,
    /// Facing angle in radians.
    pub facing_angle: f32,
    /// Whether the line is currently cast.
    pub is_casting: bool,
    /// Cast target x, while casting.
    pub cast_target_x: Option<f32>,
    /// Cast target y, while casting.
    pub cast_target_y: Option<f32>,
    /// ARGB customization color.
    pub color: u32,
    /// Whether the player is in the world right now.
    pub is_online: bool,
    /// Currency balance.
    pub gold: u32,
    /// Item id of the equipped pole, if any.
    pub equipped_pole_id: Option<String>,
    /// When the row last changed.
    pub last_updated: Timestamp,
}

/// Key of a row in the inventory table.
///
/// Server rows are keyed by their authoritative row id, never by item type and rarity: a
/// non-stackable pole and a common fish stack may share that pair. Speculative grants live under
/// a separate placeholder key space so an authoritative row can never collide with one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InventoryKey {
    /// An authoritative row id.
    Row(u64),
    /// A local placeholder awaiting its authoritative row.
    Placeholder(u64),
}

impl InventoryKey {
    /// Returns `true` for speculative placeholder keys.
    #[must_use]
    pub const fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder(_))
    }
}

/// One stack (or single instance) of an item owned by a player.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InventoryItem {
    /// Authoritative row id, unique per stack.
    pub id: u64,
    /// Owning player id.
    pub player_id: String,
    /// Item type id, e.g. `fish_pond_1` or `pole_2`.
    pub item_id: String,
    /// Star rarity for fish (1-3), 0 for everything else.
    pub rarity: u8,
    /// Stack size.
    pub quantity: u32,
}

impl InventoryItem {
    /// Whether this row holds the same kind of item as `other`.
    #[must_use]
    pub fn same_kind(&self, player_id: &str, item_id: &str, rarity: u8) -> bool {
        self.player_id == player_id && self.item_id == item_id && self.rarity == rarity
    }
}

/// Static configuration for an item type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDefinition {
    /// Item type id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// `fish`, `pole` or `lure`.
    pub category: String,
    /// Tier level, 1-4.
    pub tier: u8,
    /// Shop price; zero means not purchasable (except the starter pole).
    pub buy_price: u32,
    /// Base sell price before the rarity multiplier.
    pub sell_price: u32,
    /// Maximum stack size; 1 for poles.
    pub stack_size: u32,
    /// Rarity multipliers as JSON, e.g. `{"2": 2.0, "3": 4.0}`.
    pub rarity_multipliers: Option<String>,
    /// Whether the item is currently available in game.
    pub is_active: bool,
}

impl ItemDefinition {
    /// Whether the shop sells this item.
    #[must_use]
    pub fn is_purchasable(&self) -> bool {
        self.is_active && (self.buy_price > 0 || self.id == STARTER_POLE_ID)
    }

    /// Whether several units share one inventory row.
    #[must_use]
    pub const fn is_stackable(&self) -> bool {
        self.stack_size > 1
    }

    /// Unit sell price for the given rarity, rounded to whole gold.
    ///
    /// Uses the definition's own multiplier table when it parses, otherwise the default curve
    /// (1x for rarity 0-1, 2x for 2, 4x for 3).
    #[must_use]
    pub fn sell_price_for(&self, rarity: u8) -> u32 {
        let custom = self
            .rarity_multipliers
            .as_deref()
            .and_then(|json| {
                serde_json::from_str::<std::collections::BTreeMap<String, f64>>(json).ok()
            })
            .and_then(|table| table.get(&rarity.to_string()).copied());
        let multiplier = custom.unwrap_or(match rarity {
            2 => 2.0,
            3 => 4.0,
            _ => 1.0,
        });
        (f64::from(self.sell_price) * multiplier).round() as u32
    }
}

/// Whether a quest is part of a storyline or repeats daily.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestType {
    /// Completed once, in storyline order.
    Story,
    /// May be accepted again after completion.
    Daily,
}

/// Static quest definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quest {
    /// Quest id.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Flavor text.
    pub description: String,
    /// Story or daily.
    pub quest_type: QuestType,
    /// Storyline group, for story quests.
    pub storyline: Option<String>,
    /// Order within the storyline.
    pub story_order: Option<u32>,
    /// Quest that must be completed before this one can be accepted.
    pub prerequisite_quest_id: Option<String>,
    /// Requirements JSON blob.
    pub requirements: String,
    /// Rewards JSON blob.
    pub rewards: String,
}

/// Progress state of a quest for one player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    /// Not accepted yet.
    Available,
    /// Accepted and in progress.
    Active,
    /// Finished.
    Completed,
}

/// A player's progress record for one quest. At most one exists per (player, quest) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerQuest {
    /// Authoritative row id (zero for speculative rows).
    pub id: u64,
    /// Owning player id.
    pub player_id: String,
    /// Quest id.
    pub quest_id: String,
    /// Current status.
    pub status: QuestStatus,
    /// Progress JSON blob.
    pub progress: String,
    /// When the quest was accepted.
    pub accepted_at: Option<Timestamp>,
    /// When the quest was completed.
    pub completed_at: Option<Timestamp>,
}

/// Kind of a logged game event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameEventType {
    /// A fish was caught.
    FishCaught,
    /// An item was bought.
    ItemBought,
    /// An item was sold.
    ItemSold,
    /// A play session started.
    SessionStarted,
    /// A play session ended.
    SessionEnded,
    /// A pole was equipped.
    PoleEquipped,
    /// A pole was unequipped.
    PoleUnequipped,
    /// A quest was completed.
    QuestCompleted,
    /// Any event type this client does not know about.
    Other(String),
}

/// An append-only log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Authoritative row id; grows monotonically.
    pub id: u64,
    /// Acting player.
    pub player_id: String,
    /// What happened.
    pub event_type: GameEventType,
    /// Item involved, if any.
    pub item_id: Option<String>,
    /// Quantity involved, if any.
    pub quantity: Option<u32>,
    /// Gold involved, if any.
    pub gold_amount: Option<u32>,
    /// Rarity involved, if any.
    pub rarity: Option<u8>,
    /// When it happened.
    pub created_at: Timestamp,
}

/// Aggregated statistics and level progress of a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStats {
    /// Player id.
    pub player_id: String,
    /// Current level, starting at 1.
    pub level: u32,
    /// XP accumulated.
    pub xp: u64,
    /// XP needed to reach the next level.
    pub xp_to_next_level: u64,
    /// Fish caught, all time.
    pub total_fish_caught: u32,
    /// Gold earned, all time.
    pub total_gold_earned: u64,
    /// Gold spent, all time.
    pub total_gold_spent: u64,
}

/// A place where players can spawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnPoint {
    /// Spawn point id.
    pub id: String,
    /// X position.
    pub x: f32,
    /// Y position.
    pub y: f32,
    /// Human-readable name.
    pub name: String,
}

/// A circular fishing pond.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pond {
    /// Pond id.
    pub id: String,
    /// Center x.
    pub x: f32,
    /// Center y.
    pub y: f32,
    /// Radius.
    pub radius: f32,
}

/// A rectangular river segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct River {
    /// River id.
    pub id: String,
    /// Center x.
    pub x: f32,
    /// Center y.
    pub y: f32,
    /// Width across the flow.
    pub width: f32,
    /// Segment length.
    pub length: f32,
    /// Rotation in radians.
    pub rotation: f32,
}

/// A large rectangular body of water.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ocean {
    /// Ocean id.
    pub id: String,
    /// Top-left x.
    pub x: f32,
    /// Top-left y.
    pub y: f32,
    /// Width.
    pub width: f32,
    /// Height.
    pub height: f32,
}
