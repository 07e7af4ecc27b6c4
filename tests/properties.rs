//! Property-based tests for the table mirror and its projections.
//!
//! # Properties Tested
//!
//! - Replaying an update diff leaves the mirror as a single application did.
//! - The game event log never exceeds its capacity and stays newest-first.
//! - Projections are idempotent: two reads with no diff in between agree.
//! - A snapshot mirrors every row exactly once, under its own key.
//! - The checksum does not depend on arrival order.

mod common;

use proptest::prelude::*;

use common::{catch_event, player, stack, LOCAL_ID};
use lurelands_sync::{views, RowValue, Snapshot, TableDiff, TableMirror, TableName};

// ============================================================================
// Strategies
// ============================================================================

fn owner() -> impl Strategy<Value = String> {
    prop_oneof![Just(LOCAL_ID.to_owned()), Just("player-9".to_owned())]
}

fn inventory_row() -> impl Strategy<Value = RowValue> {
    (1_u64..20, owner(), 0_u8..=3, 1_u32..50).prop_map(|(id, owner, rarity, quantity)| {
        RowValue::Inventory(stack(id, &owner, "fish_pond_1", rarity, quantity))
    })
}

fn player_row() -> impl Strategy<Value = RowValue> {
    (owner(), 0_u32..1_000).prop_map(|(id, gold)| RowValue::Player(player(&id, gold)))
}

fn diff() -> impl Strategy<Value = TableDiff> {
    prop_oneof![
        inventory_row().prop_map(TableDiff::Insert),
        inventory_row().prop_map(TableDiff::Update),
        inventory_row().prop_map(TableDiff::Delete),
        player_row().prop_map(TableDiff::Update),
    ]
}

fn mirror_after(diffs: &[TableDiff]) -> TableMirror {
    let mut mirror = TableMirror::new(16);
    for diff in diffs {
        mirror.apply_diff(diff.clone());
    }
    mirror
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn replayed_update_is_a_no_op(prefix in prop::collection::vec(diff(), 0..30), row in inventory_row()) {
        let mut once = mirror_after(&prefix);
        once.apply_diff(TableDiff::Update(row.clone()));

        let mut twice = mirror_after(&prefix);
        twice.apply_diff(TableDiff::Update(row.clone()));
        twice.apply_diff(TableDiff::Update(row));

        prop_assert_eq!(once.checksum(), twice.checksum());
        prop_assert_eq!(
            views::inventory_of(&once, LOCAL_ID),
            views::inventory_of(&twice, LOCAL_ID)
        );
    }

    #[test]
    fn event_log_is_bounded_and_newest_first(capacity in 1_usize..20, count in 0_u64..60) {
        let mut mirror = TableMirror::new(capacity);
        for id in 1..=count {
            mirror.apply_diff(TableDiff::Insert(RowValue::GameEvent(catch_event(id))));
        }

        let ids: Vec<u64> = views::recent_events(&mirror, usize::MAX)
            .iter()
            .map(|event| event.id)
            .collect();
        let kept = (count as usize).min(capacity);
        prop_assert_eq!(ids.len(), kept);
        let expected: Vec<u64> = (1..=count).rev().take(kept).collect();
        prop_assert_eq!(ids, expected);
    }

    #[test]
    fn projections_are_idempotent(diffs in prop::collection::vec(diff(), 0..40)) {
        let mirror = mirror_after(&diffs);

        prop_assert_eq!(
            views::inventory_of(&mirror, LOCAL_ID),
            views::inventory_of(&mirror, LOCAL_ID)
        );
        prop_assert_eq!(
            views::quests_and_progress_of(&mirror, LOCAL_ID),
            views::quests_and_progress_of(&mirror, LOCAL_ID)
        );
        prop_assert_eq!(views::online_players(&mirror), views::online_players(&mirror));
    }

    #[test]
    fn snapshot_mirrors_every_row_once(ids in prop::collection::btree_set(1_u64..500, 0..40)) {
        let rows: Vec<RowValue> = ids
            .iter()
            .map(|id| RowValue::Inventory(stack(*id, LOCAL_ID, "fish_pond_1", 1, 1)))
            .collect();
        let mut mirror = TableMirror::new(16);
        mirror
            .load_snapshot(Snapshot::default().with_rows(TableName::Inventory, rows))
            .unwrap();

        prop_assert_eq!(mirror.row_count(TableName::Inventory), ids.len());
        for entry in views::inventory_of(&mirror, LOCAL_ID) {
            prop_assert!(!entry.pending);
            prop_assert!(ids.contains(&entry.item.id));
        }
    }

    #[test]
    fn checksum_ignores_arrival_order(rows in prop::collection::btree_map(1_u64..100, 1_u32..9, 0..20)) {
        let inserts: Vec<TableDiff> = rows
            .iter()
            .map(|(id, quantity)| {
                TableDiff::Insert(RowValue::Inventory(stack(*id, LOCAL_ID, "fish_pond_1", 1, *quantity)))
            })
            .collect();
        let reversed: Vec<TableDiff> = inserts.iter().rev().cloned().collect();

        prop_assert_eq!(mirror_after(&inserts).checksum(), mirror_after(&reversed).checksum());
    }
}
