//! Shared row fixtures for unit tests.

use crate::schema::{
    GameEvent, GameEventType, InventoryItem, ItemDefinition, Player, PlayerQuest, Quest,
    QuestStatus, QuestType, Timestamp,
};

pub fn player(id: &str, gold: u32) -> Player {
    Player {
        id: id.to_owned(),
        name: format!("{id}-name"),
        x: 0.0,
        y: 0.0,
        facing_angle: 0.0,
        is_casting: false,
        cast_target_x: None,
        cast_target_y: None,
        color: 0xFFFF_FFFF,
        is_online: true,
        gold,
        equipped_pole_id: None,
        last_updated: Timestamp(0),
    }
}

/// A one-star pond fish stack.
pub fn fish(id: u64, player_id: &str, quantity: u32) -> InventoryItem {
    InventoryItem {
        id,
        player_id: player_id.to_owned(),
        item_id: "fish_pond_1".to_owned(),
        rarity: 1,
        quantity,
    }
}

pub fn pole(id: u64, player_id: &str, item_id: &str) -> InventoryItem {
    InventoryItem {
        id,
        player_id: player_id.to_owned(),
        item_id: item_id.to_owned(),
        rarity: 0,
        quantity: 1,
    }
}

pub fn item_definition(id: &str, buy_price: u32, stack_size: u32) -> ItemDefinition {
    ItemDefinition {
        id: id.to_owned(),
        name: id.to_owned(),
        category: if id.starts_with("pole") { "pole" } else { "fish" }.to_owned(),
        tier: 1,
        buy_price,
        sell_price: buy_price / 2,
        stack_size,
        rarity_multipliers: None,
        is_active: true,
    }
}

pub fn event(id: u64) -> GameEvent {
    GameEvent {
        id,
        player_id: "p1".to_owned(),
        event_type: GameEventType::FishCaught,
        item_id: Some("fish_pond_1".to_owned()),
        quantity: Some(1),
        gold_amount: None,
        rarity: Some(1),
        created_at: Timestamp(id as i64),
    }
}

pub fn quest(id: &str, quest_type: QuestType, prerequisite: Option<&str>) -> Quest {
    Quest {
        id: id.to_owned(),
        title: id.to_owned(),
        description: String::new(),
        quest_type,
        storyline: None,
        story_order: None,
        prerequisite_quest_id: prerequisite.map(str::to_owned),
        requirements: r#"{"total_fish": 2}"#.to_owned(),
        rewards: r#"{"gold": 30}"#.to_owned(),
    }
}

pub fn player_quest(player_id: &str, quest_id: &str, status: QuestStatus, progress: &str) -> PlayerQuest {
    PlayerQuest {
        id: 1,
        player_id: player_id.to_owned(),
        quest_id: quest_id.to_owned(),
        status,
        progress: progress.to_owned(),
        accepted_at: Some(Timestamp(1)),
        completed_at: None,
    }
}
