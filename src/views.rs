//! Read-only projections over the [`TableMirror`].
//!
//! Every function here is pure: it takes a shared reference, returns owned data and never
//! touches the mirror. Calling one twice with no diff in between yields equal results.
//!
//! Iteration order follows the mirror's key order. Callers that want another order re-sort.

use serde::Serialize;

use crate::mirror::TableMirror;
use crate::quest::requirements_met;
use crate::schema::{
    GameEvent, InventoryItem, InventoryKey, ItemDefinition, Ocean, Player, PlayerQuest,
    PlayerStats, Pond, Quest, QuestStatus, River, SpawnPoint,
};

/// One inventory stack as shown to the player.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryEntry {
    /// Mirror key of the stack.
    pub key: InventoryKey,
    /// The stack itself.
    pub item: InventoryItem,
    /// `true` for speculative grants the server has not confirmed yet.
    pub pending: bool,
}

/// A quest definition paired with one player's progress on it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestWithProgress {
    /// The quest definition.
    pub quest: Quest,
    /// The player's progress record, if the quest was ever accepted.
    pub progress: Option<PlayerQuest>,
    /// The record's status, or [`QuestStatus::Available`] when there is no record.
    pub status: QuestStatus,
    /// Whether the prerequisite (if any) is completed.
    pub unlocked: bool,
    /// Whether the quest is active and its recorded progress meets the requirements.
    pub ready_to_complete: bool,
}

/// The static world layout.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct WorldGeography {
    /// Spawn points.
    pub spawn_points: Vec<SpawnPoint>,
    /// Ponds.
    pub ponds: Vec<Pond>,
    /// Rivers.
    pub rivers: Vec<River>,
    /// Oceans.
    pub oceans: Vec<Ocean>,
}

impl WorldGeography {
    /// Whether no geography has been mirrored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spawn_points.is_empty()
            && self.ponds.is_empty()
            && self.rivers.is_empty()
            && self.oceans.is_empty()
    }
}

/// A player's row, if mirrored. A miss means "not present", never an error.
#[must_use]
pub fn player(mirror: &TableMirror, player_id: &str) -> Option<Player> {
    mirror.players().get(&player_id.to_owned()).cloned()
}

/// Every player currently flagged online.
#[must_use]
pub fn online_players(mirror: &TableMirror) -> Vec<Player> {
    mirror
        .players()
        .iter()
        .filter(|player| player.is_online)
        .cloned()
        .collect()
}

/// Every inventory stack owned by `player_id`, authoritative rows first.
#[must_use]
pub fn inventory_of(mirror: &TableMirror, player_id: &str) -> Vec<InventoryEntry> {
    mirror
        .inventory()
        .entries()
        .filter(|(_, item)| item.player_id == player_id)
        .map(|(key, item)| InventoryEntry {
            key: *key,
            item: item.clone(),
            pending: key.is_placeholder(),
        })
        .collect()
}

/// Every quest definition with `player_id`'s progress on it.
///
/// Quests without a progress record are reported as available.
#[must_use]
pub fn quests_and_progress_of(mirror: &TableMirror, player_id: &str) -> Vec<QuestWithProgress> {
    let completed = |quest_id: &str| {
        mirror
            .player_quests()
            .get(&(player_id.to_owned(), quest_id.to_owned()))
            .is_some_and(|record| record.status == QuestStatus::Completed)
    };

    mirror
        .quests()
        .iter()
        .map(|quest| {
            let progress = mirror
                .player_quests()
                .get(&(player_id.to_owned(), quest.id.clone()))
                .cloned();
            let status = progress
                .as_ref()
                .map_or(QuestStatus::Available, |record| record.status);
            let unlocked = quest
                .prerequisite_quest_id
                .as_deref()
                .is_none_or(completed);
            let ready_to_complete = progress.as_ref().is_some_and(|record| {
                record.status == QuestStatus::Active
                    && requirements_met(&quest.requirements, &record.progress)
            });
            QuestWithProgress {
                quest: quest.clone(),
                progress,
                status,
                unlocked,
                ready_to_complete,
            }
        })
        .collect()
}

/// A player's statistics, if mirrored.
#[must_use]
pub fn stats_of(mirror: &TableMirror, player_id: &str) -> Option<PlayerStats> {
    mirror.player_stats().get(&player_id.to_owned()).cloned()
}

/// Up to `limit` events, newest first.
#[must_use]
pub fn recent_events(mirror: &TableMirror, limit: usize) -> Vec<GameEvent> {
    mirror.events().iter().take(limit).cloned().collect()
}

/// An item definition, if mirrored.
#[must_use]
pub fn item_definition(mirror: &TableMirror, item_id: &str) -> Option<ItemDefinition> {
    mirror.item_definitions().get(&item_id.to_owned()).cloned()
}

/// The whole static world layout.
#[must_use]
pub fn world(mirror: &TableMirror) -> WorldGeography {
    WorldGeography {
        spawn_points: mirror.spawn_points().iter().cloned().collect(),
        ponds: mirror.ponds().iter().cloned().collect(),
        rivers: mirror.rivers().iter().cloned().collect(),
        oceans: mirror.oceans().iter().cloned().collect(),
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
    use crate::mirror::{RowValue, Snapshot};
    use crate::schema::QuestType;
    use crate::test_config::{event, fish, player, player_quest, pole, quest};
    use crate::TableName;

    fn mirror() -> TableMirror {
        let mut offline = player("p2", 0);
        offline.is_online = false;
        let mut mirror = TableMirror::new(8);
        mirror
            .load_snapshot(
                Snapshot::default()
                    .with_rows(TableName::Player, vec![
                        RowValue::Player(player("p1", 10)),
                        RowValue::Player(offline),
                    ])
                    .with_rows(TableName::Inventory, vec![
                        RowValue::Inventory(fish(1, "p1", 3)),
                        RowValue::Inventory(pole(2, "p1", "pole_1")),
                        RowValue::Inventory(fish(3, "p2", 1)),
                    ])
                    .with_rows(TableName::Quest, vec![
                        RowValue::Quest(quest("q1", QuestType::Story, None)),
                        RowValue::Quest(quest("q2", QuestType::Story, Some("q1"))),
                    ])
                    .with_rows(TableName::PlayerQuest, vec![RowValue::PlayerQuest(
                        player_quest("p1", "q1", QuestStatus::Active, r#"{"total": 2}"#),
                    )])
                    .with_rows(
                        TableName::GameEvent,
                        (1..=4).map(|id| RowValue::GameEvent(event(id))).collect(),
                    ),
            )
            .unwrap();
        mirror
    }

    #[test]
    fn inventory_is_filtered_by_owner() {
        let mirror = mirror();
        let items = inventory_of(&mirror, "p1");
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|entry| entry.item.player_id == "p1"));
        assert!(items.iter().all(|entry| !entry.pending));
        assert!(inventory_of(&mirror, "nobody").is_empty());
    }

    #[test]
    fn placeholders_are_marked_pending() {
        let mut mirror = mirror();
        mirror.insert_placeholder(pole(0, "p1", "pole_2"));
        let items = inventory_of(&mirror, "p1");
        assert_eq!(items.len(), 3);
        assert!(items[2].pending);
        assert_eq!(items[2].item.item_id, "pole_2");
    }

    #[test]
    fn quests_without_records_are_available() {
        let mirror = mirror();
        let quests = quests_and_progress_of(&mirror, "p1");
        assert_eq!(quests.len(), 2);

        assert_eq!(quests[0].quest.id, "q1");
        assert_eq!(quests[0].status, QuestStatus::Active);
        assert!(quests[0].unlocked);
        assert!(quests[0].ready_to_complete);

        assert_eq!(quests[1].quest.id, "q2");
        assert_eq!(quests[1].status, QuestStatus::Available);
        assert!(quests[1].progress.is_none());
        assert!(!quests[1].unlocked);
        assert!(!quests[1].ready_to_complete);
    }

    #[test]
    fn projections_are_idempotent() {
        let mirror = mirror();
        assert_eq!(inventory_of(&mirror, "p1"), inventory_of(&mirror, "p1"));
        assert_eq!(
            quests_and_progress_of(&mirror, "p1"),
            quests_and_progress_of(&mirror, "p1")
        );
        assert_eq!(world(&mirror), world(&mirror));
    }

    #[test]
    fn lookups_miss_quietly() {
        let mirror = mirror();
        assert!(super::player(&mirror, "ghost").is_none());
        assert!(stats_of(&mirror, "p1").is_none());
        assert!(item_definition(&mirror, "pole_9").is_none());
        assert!(world(&mirror).is_empty());
    }

    #[test]
    fn online_players_skip_offline_rows() {
        let mirror = mirror();
        let online = online_players(&mirror);
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].id, "p1");
    }

    #[test]
    fn recent_events_are_newest_first() {
        let mirror = mirror();
        let ids: Vec<u64> = recent_events(&mirror, 2).iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![4, 3]);
    }
}
