//! Common test infrastructure shared across integration tests.
//!
//! Row fixtures for a small Lurelands world and helpers to bring a client up against a
//! [`MemoryServer`].
//!
//! # Usage
//!
//! ```ignore
//! mod common;
//! use common::{live_client, world_snapshot, LOCAL_ID};
//! ```

#![allow(dead_code)]

use std::sync::Arc;

use lurelands_sync::network::memory::{MemoryServer, MemoryTransport};
use lurelands_sync::schema::{
    GameEvent, GameEventType, InventoryItem, ItemDefinition, Player, Pond, Quest, QuestType,
    SpawnPoint, Timestamp,
};
use lurelands_sync::telemetry::CollectingObserver;
use lurelands_sync::{ClientBuilder, ClientConfig, RowValue, Snapshot, SyncClient, TableName};

/// The identity the memory server mints for the first token-less connect.
pub const LOCAL_ID: &str = "player-1";

/// Price of the `pole_2` fixture.
pub const POLE_PRICE: u32 = 50;

pub fn player(id: &str, gold: u32) -> Player {
    Player {
        id: id.to_owned(),
        name: format!("angler {id}"),
        x: 120.0,
        y: 80.0,
        facing_angle: 0.0,
        is_casting: false,
        cast_target_x: None,
        cast_target_y: None,
        color: 0xFF4A_90D9,
        is_online: true,
        gold,
        equipped_pole_id: None,
        last_updated: Timestamp(1),
    }
}

pub fn stack(id: u64, player_id: &str, item_id: &str, rarity: u8, quantity: u32) -> InventoryItem {
    InventoryItem {
        id,
        player_id: player_id.to_owned(),
        item_id: item_id.to_owned(),
        rarity,
        quantity,
    }
}

pub fn definition(id: &str, category: &str, buy_price: u32, sell_price: u32, stack_size: u32) -> ItemDefinition {
    ItemDefinition {
        id: id.to_owned(),
        name: id.to_owned(),
        category: category.to_owned(),
        tier: 1,
        buy_price,
        sell_price,
        stack_size,
        rarity_multipliers: None,
        is_active: true,
    }
}

pub fn catch_event(id: u64) -> GameEvent {
    GameEvent {
        id,
        player_id: LOCAL_ID.to_owned(),
        event_type: GameEventType::FishCaught,
        item_id: Some("fish_pond_1".to_owned()),
        quantity: Some(1),
        gold_amount: None,
        rarity: Some(1),
        created_at: Timestamp(id as i64),
    }
}

pub fn first_catch_quest() -> Quest {
    Quest {
        id: "first_catch".to_owned(),
        title: "First Catch".to_owned(),
        description: "Land any fish.".to_owned(),
        quest_type: QuestType::Story,
        storyline: Some("beginnings".to_owned()),
        story_order: Some(1),
        prerequisite_quest_id: None,
        requirements: r#"{"total_fish": 1}"#.to_owned(),
        rewards: r#"{"gold": 25}"#.to_owned(),
    }
}

/// A world with the local player holding `gold`, one other player, a shop and a pond.
pub fn world_snapshot(gold: u32) -> Snapshot {
    Snapshot::default()
        .with_rows(TableName::Player, vec![
            RowValue::Player(player(LOCAL_ID, gold)),
            RowValue::Player(player("player-9", 10)),
        ])
        .with_rows(TableName::Inventory, vec![RowValue::Inventory(stack(
            1,
            LOCAL_ID,
            "fish_pond_1",
            1,
            3,
        ))])
        .with_rows(TableName::ItemDefinition, vec![
            RowValue::ItemDefinition(definition("pole_2", "pole", POLE_PRICE, 25, 1)),
            RowValue::ItemDefinition(definition("fish_pond_1", "fish", 0, 5, 99)),
        ])
        .with_rows(TableName::Quest, vec![RowValue::Quest(first_catch_quest())])
        .with_rows(TableName::SpawnPoint, vec![RowValue::SpawnPoint(SpawnPoint {
            id: "dock".to_owned(),
            x: 100.0,
            y: 100.0,
            name: "Old Dock".to_owned(),
        })])
        .with_rows(TableName::Pond, vec![RowValue::Pond(Pond {
            id: "pond_a".to_owned(),
            x: 300.0,
            y: 240.0,
            radius: 64.0,
        })])
}

pub fn client_for(server: &MemoryServer, config: ClientConfig) -> SyncClient<MemoryTransport> {
    ClientBuilder::new()
        .with_config(config)
        .build(server.transport())
        .expect("valid test config")
}

pub fn observed_client_for(
    server: &MemoryServer,
    config: ClientConfig,
) -> (SyncClient<MemoryTransport>, Arc<CollectingObserver>) {
    let observer = Arc::new(CollectingObserver::new());
    let client = ClientBuilder::new()
        .with_config(config)
        .with_violation_observer(observer.clone())
        .build(server.transport())
        .expect("valid test config");
    (client, observer)
}

/// Connects, loads the snapshot and returns a live client.
pub async fn live_client(server: &MemoryServer, gold: u32) -> SyncClient<MemoryTransport> {
    server.set_snapshot(world_snapshot(gold));
    let mut client = client_for(server, ClientConfig::default());
    assert!(client.connect().await, "memory server refused the connection");
    client.poll().expect("snapshot applies");
    client
}

/// Installs a `tracing` subscriber for the test binary. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
