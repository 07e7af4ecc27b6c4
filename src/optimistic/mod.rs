//! The optimistic mutation coordinator.
//!
//! Economy actions (buy, sell, equip, unequip, accept and complete quest) feel instant because
//! the coordinator edits the mirror before the server has answered:
//!
//! 1. Preconditions are checked against the current mirror. If they fail, the mutation is
//!    rejected with [`SyncError::Rejected`] and no remote call is made.
//! 2. The speculative edit is applied and recorded in [`PendingEdits`].
//! 3. The reducer call is handed to the [`ReducerSink`]. Nothing waits for it.
//! 4. Later diffs overwrite the speculation with authoritative rows.
//!
//! Speculative inventory grants are stored under placeholder keys. An authoritative insert of
//! the same owner, item and rarity supersedes the placeholder; quantities are never summed.
//!
//! All other reducers are plain fire-and-forget calls.

pub mod pending;
pub mod reducers;

use std::sync::Arc;
use std::time::Duration;

use web_time::Instant;

use crate::error::RejectReason;
use crate::mirror::{ChangeKind, MirrorChange, RowKey, RowValue, TableMirror};
use crate::quest::{requirements_met, QuestRewards};
use crate::report_violation_to;
use crate::schema::{
    InventoryItem, InventoryKey, Player, PlayerQuest, QuestStatus, QuestType, Timestamp,
};
use crate::telemetry::{ViolationKind, ViolationObserver, ViolationSeverity};
use crate::SyncError;
use pending::{PendingEdits, RevertedEdit};
use reducers::{
    BuyItemArgs, CatchFishArgs, EquipPoleArgs, JoinWorldArgs, PlayerArgs, QuestArgs, Reducer,
    SellItemArgs, StartCastingArgs, UpdateNameArgs, UpdatePositionArgs,
};

/// Where reducer calls go. Implemented by the connection manager.
pub trait ReducerSink {
    /// Whether calls can be dispatched right now.
    fn is_connected(&self) -> bool;

    /// Hands a call to the transport. Returns once it is queued, not once it ran.
    fn send(&mut self, reducer: &Reducer) -> Result<(), SyncError>;
}

enum Edit {
    Put(RowKey, RowValue),
    Remove(RowKey),
    Placeholder(InventoryItem),
}

/// Wraps reducer calls with speculative mirror edits.
#[derive(Default)]
pub struct MutationCoordinator {
    pending: PendingEdits,
    observer: Option<Arc<dyn ViolationObserver>>,
}

impl std::fmt::Debug for MutationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationCoordinator")
            .field("pending", &self.pending.len())
            .field("has_observer", &self.observer.is_some())
            .finish()
    }
}

impl MutationCoordinator {
    /// Creates a coordinator reporting failures to `observer` (or to tracing when `None`).
    #[must_use]
    pub fn new(observer: Option<Arc<dyn ViolationObserver>>) -> Self {
        Self {
            pending: PendingEdits::new(),
            observer,
        }
    }

    /// Speculative edits not yet confirmed.
    #[must_use]
    pub const fn pending(&self) -> &PendingEdits {
        &self.pending
    }

    /// Forgets all speculation. Used when the mirror is cleared or rebuilt.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Feeds an authoritative change through the pending set. Returns extra changes made to
    /// the mirror as a result (superseded placeholders).
    pub fn reconcile(&mut self, mirror: &mut TableMirror, change: &MirrorChange) -> Vec<MirrorChange> {
        self.pending.confirm(&change.key);
        match (&change.kind, &change.row) {
            (ChangeKind::Insert, Some(RowValue::Inventory(item))) => self
                .pending
                .supersede_placeholder(mirror, item)
                .into_iter()
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Reverts every edit older than `timeout` at `now`, reporting each one.
    pub fn expire(
        &mut self,
        mirror: &mut TableMirror,
        now: Instant,
        timeout: Duration,
    ) -> Vec<RevertedEdit> {
        let reverted = self.pending.expire(mirror, now, timeout);
        for edit in &reverted {
            report_violation_to!(
                self.observer,
                ViolationSeverity::Warning,
                ViolationKind::Optimistic,
                "speculative {} edit was never confirmed; reverted {} row(s)",
                edit.reducer,
                edit.changes.len()
            );
        }
        reverted
    }

    // ------------------------------------------------------------------
    // Fire-and-forget reducers
    // ------------------------------------------------------------------

    /// Enters the world, or comes back online.
    pub fn join_world(
        &mut self,
        sink: &mut impl ReducerSink,
        player_id: &str,
        name: &str,
        color: u32,
    ) -> Result<(), SyncError> {
        self.call(
            sink,
            &Reducer::JoinWorld(JoinWorldArgs {
                player_id: player_id.to_owned(),
                name: name.to_owned(),
                color,
            }),
        )
    }

    /// Goes offline. The player row stays, flagged offline.
    pub fn leave_world(&mut self, sink: &mut impl ReducerSink, player_id: &str) -> Result<(), SyncError> {
        self.call(
            sink,
            &Reducer::LeaveWorld(PlayerArgs {
                player_id: player_id.to_owned(),
            }),
        )
    }

    /// Reports a new position.
    pub fn update_position(
        &mut self,
        sink: &mut impl ReducerSink,
        player_id: &str,
        x: f32,
        y: f32,
        facing_angle: f32,
    ) -> Result<(), SyncError> {
        self.call(
            sink,
            &Reducer::UpdatePosition(UpdatePositionArgs {
                player_id: player_id.to_owned(),
                x,
                y,
                facing_angle,
            }),
        )
    }

    /// Casts the line at a target.
    pub fn start_casting(
        &mut self,
        sink: &mut impl ReducerSink,
        player_id: &str,
        target_x: f32,
        target_y: f32,
    ) -> Result<(), SyncError> {
        self.call(
            sink,
            &Reducer::StartCasting(StartCastingArgs {
                player_id: player_id.to_owned(),
                target_x,
                target_y,
            }),
        )
    }

    /// Reels the line in.
    pub fn stop_casting(&mut self, sink: &mut impl ReducerSink, player_id: &str) -> Result<(), SyncError> {
        self.call(
            sink,
            &Reducer::StopCasting(PlayerArgs {
                player_id: player_id.to_owned(),
            }),
        )
    }

    /// Reports a landed fish. The server grants it and updates quest progress.
    pub fn catch_fish(&mut self, sink: &mut impl ReducerSink, args: CatchFishArgs) -> Result<(), SyncError> {
        if !(1..=3).contains(&args.rarity) {
            return Err(SyncError::InvalidRequest {
                info: format!("fish rarity must be 1-3, got {}", args.rarity),
            });
        }
        self.call(sink, &Reducer::CatchFish(args))
    }

    /// Renames the player.
    pub fn update_player_name(
        &mut self,
        sink: &mut impl ReducerSink,
        player_id: &str,
        name: &str,
    ) -> Result<(), SyncError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SyncError::InvalidRequest {
                info: "player name must not be empty".to_owned(),
            });
        }
        self.call(
            sink,
            &Reducer::UpdatePlayerName(UpdateNameArgs {
                player_id: player_id.to_owned(),
                name: name.to_owned(),
            }),
        )
    }

    // ------------------------------------------------------------------
    // Optimistic reducers
    // ------------------------------------------------------------------

    /// Buys one unit of an item. Gold drops and the item shows up immediately.
    pub fn buy_item(
        &mut self,
        mirror: &mut TableMirror,
        sink: &mut impl ReducerSink,
        player_id: &str,
        item_id: &str,
    ) -> Result<Vec<MirrorChange>, SyncError> {
        Self::ensure_connected(sink)?;
        let player = require_player(mirror, player_id)?;
        let definition = mirror
            .item_definitions()
            .get(&item_id.to_owned())
            .ok_or_else(|| RejectReason::UnknownItem {
                item_id: item_id.to_owned(),
            })?;
        if !definition.is_purchasable() {
            return Err(RejectReason::NotPurchasable {
                item_id: item_id.to_owned(),
            }
            .into());
        }
        let price = definition.buy_price;
        if player.gold < price {
            return Err(RejectReason::InsufficientGold {
                required: price,
                available: player.gold,
            }
            .into());
        }

        let mut buyer = player.clone();
        buyer.gold -= price;
        buyer.last_updated = Timestamp::now();
        let mut edits = vec![Edit::Put(
            RowKey::Player(player_id.to_owned()),
            RowValue::Player(buyer),
        )];

        let open_stack = definition.is_stackable().then(|| {
            mirror.inventory().entries().find(|(_, row)| {
                row.same_kind(player_id, item_id, 0) && row.quantity < definition.stack_size
            })
        });
        match open_stack.flatten() {
            Some((key, row)) => {
                let mut stack = row.clone();
                stack.quantity += 1;
                edits.push(Edit::Put(RowKey::Inventory(*key), RowValue::Inventory(stack)));
            },
            None => edits.push(Edit::Placeholder(InventoryItem {
                id: 0,
                player_id: player_id.to_owned(),
                item_id: item_id.to_owned(),
                rarity: 0,
                quantity: 1,
            })),
        }

        self.submit(
            mirror,
            sink,
            Reducer::BuyItem(BuyItemArgs {
                player_id: player_id.to_owned(),
                item_id: item_id.to_owned(),
            }),
            edits,
        )
    }

    /// Sells `quantity` units of an item at a rarity, draining stacks in key order.
    pub fn sell_item(
        &mut self,
        mirror: &mut TableMirror,
        sink: &mut impl ReducerSink,
        player_id: &str,
        item_id: &str,
        rarity: u8,
        quantity: u32,
    ) -> Result<Vec<MirrorChange>, SyncError> {
        Self::ensure_connected(sink)?;
        if quantity == 0 {
            return Err(RejectReason::ZeroQuantity.into());
        }
        let player = require_player(mirror, player_id)?;
        if player.equipped_pole_id.as_deref() == Some(item_id) {
            return Err(RejectReason::ItemEquipped {
                item_id: item_id.to_owned(),
            }
            .into());
        }
        let definition = mirror
            .item_definitions()
            .get(&item_id.to_owned())
            .ok_or_else(|| RejectReason::UnknownItem {
                item_id: item_id.to_owned(),
            })?;

        let stacks: Vec<(InventoryKey, InventoryItem)> = mirror
            .inventory()
            .entries()
            .filter(|(_, row)| row.same_kind(player_id, item_id, rarity))
            .map(|(key, row)| (*key, row.clone()))
            .collect();
        let owned: u32 = stacks.iter().map(|(_, row)| row.quantity).sum();
        if owned < quantity {
            return Err(RejectReason::ItemNotOwned {
                item_id: item_id.to_owned(),
                required: quantity,
                owned,
            }
            .into());
        }

        let mut edits = Vec::new();
        let mut remaining = quantity;
        for (key, mut row) in stacks {
            if remaining == 0 {
                break;
            }
            let taken = remaining.min(row.quantity);
            remaining -= taken;
            if taken == row.quantity {
                edits.push(Edit::Remove(RowKey::Inventory(key)));
            } else {
                row.quantity -= taken;
                edits.push(Edit::Put(RowKey::Inventory(key), RowValue::Inventory(row)));
            }
        }

        let mut seller = player.clone();
        seller.gold = seller
            .gold
            .saturating_add(definition.sell_price_for(rarity).saturating_mul(quantity));
        seller.last_updated = Timestamp::now();
        edits.push(Edit::Put(
            RowKey::Player(player_id.to_owned()),
            RowValue::Player(seller),
        ));

        self.submit(
            mirror,
            sink,
            Reducer::SellItem(SellItemArgs {
                player_id: player_id.to_owned(),
                item_id: item_id.to_owned(),
                rarity,
                quantity,
            }),
            edits,
        )
    }

    /// Equips a pole the player owns.
    pub fn equip_pole(
        &mut self,
        mirror: &mut TableMirror,
        sink: &mut impl ReducerSink,
        player_id: &str,
        pole_item_id: &str,
    ) -> Result<Vec<MirrorChange>, SyncError> {
        Self::ensure_connected(sink)?;
        let player = require_player(mirror, player_id)?;
        let owns = mirror
            .inventory()
            .iter()
            .any(|row| row.player_id == player_id && row.item_id == pole_item_id && row.quantity > 0);
        if !owns {
            return Err(RejectReason::ItemNotOwned {
                item_id: pole_item_id.to_owned(),
                required: 1,
                owned: 0,
            }
            .into());
        }
        let mut equipped = player.clone();
        equipped.equipped_pole_id = Some(pole_item_id.to_owned());
        self.submit(
            mirror,
            sink,
            Reducer::EquipPole(EquipPoleArgs {
                player_id: player_id.to_owned(),
                pole_item_id: pole_item_id.to_owned(),
            }),
            vec![Edit::Put(
                RowKey::Player(player_id.to_owned()),
                RowValue::Player(equipped),
            )],
        )
    }

    /// Unequips the current pole. It stays in the inventory.
    pub fn unequip_pole(
        &mut self,
        mirror: &mut TableMirror,
        sink: &mut impl ReducerSink,
        player_id: &str,
    ) -> Result<Vec<MirrorChange>, SyncError> {
        Self::ensure_connected(sink)?;
        let player = require_player(mirror, player_id)?;
        let mut unequipped = player.clone();
        unequipped.equipped_pole_id = None;
        self.submit(
            mirror,
            sink,
            Reducer::UnequipPole(PlayerArgs {
                player_id: player_id.to_owned(),
            }),
            vec![Edit::Put(
                RowKey::Player(player_id.to_owned()),
                RowValue::Player(unequipped),
            )],
        )
    }

    /// Accepts a quest. Daily quests may be re-accepted after completion; story quests may not.
    pub fn accept_quest(
        &mut self,
        mirror: &mut TableMirror,
        sink: &mut impl ReducerSink,
        player_id: &str,
        quest_id: &str,
    ) -> Result<Vec<MirrorChange>, SyncError> {
        Self::ensure_connected(sink)?;
        let quest = mirror
            .quests()
            .get(&quest_id.to_owned())
            .ok_or_else(|| RejectReason::UnknownQuest {
                quest_id: quest_id.to_owned(),
            })?;
        let key = (player_id.to_owned(), quest_id.to_owned());
        let existing = mirror.player_quests().get(&key);
        match existing.map(|record| record.status) {
            Some(QuestStatus::Active) => {
                return Err(RejectReason::QuestAlreadyActive {
                    quest_id: quest_id.to_owned(),
                }
                .into());
            },
            Some(QuestStatus::Completed) if quest.quest_type == QuestType::Story => {
                return Err(RejectReason::QuestAlreadyCompleted {
                    quest_id: quest_id.to_owned(),
                }
                .into());
            },
            _ => {},
        }
        if let Some(prerequisite) = &quest.prerequisite_quest_id {
            let done = mirror
                .player_quests()
                .get(&(player_id.to_owned(), prerequisite.clone()))
                .is_some_and(|record| record.status == QuestStatus::Completed);
            if !done {
                return Err(RejectReason::PrerequisiteMissing {
                    quest_id: quest_id.to_owned(),
                    prerequisite: prerequisite.clone(),
                }
                .into());
            }
        }

        let accepted = PlayerQuest {
            id: existing.map_or(0, |record| record.id),
            player_id: player_id.to_owned(),
            quest_id: quest_id.to_owned(),
            status: QuestStatus::Active,
            progress: "{}".to_owned(),
            accepted_at: Some(Timestamp::now()),
            completed_at: None,
        };
        self.submit(
            mirror,
            sink,
            Reducer::AcceptQuest(QuestArgs {
                player_id: player_id.to_owned(),
                quest_id: quest_id.to_owned(),
            }),
            vec![Edit::Put(
                RowKey::PlayerQuest(key.0, key.1),
                RowValue::PlayerQuest(accepted),
            )],
        )
    }

    /// Completes an active quest whose requirements are met, crediting its gold reward.
    ///
    /// Item rewards are left to the server's diffs.
    pub fn complete_quest(
        &mut self,
        mirror: &mut TableMirror,
        sink: &mut impl ReducerSink,
        player_id: &str,
        quest_id: &str,
    ) -> Result<Vec<MirrorChange>, SyncError> {
        Self::ensure_connected(sink)?;
        let quest = mirror
            .quests()
            .get(&quest_id.to_owned())
            .ok_or_else(|| RejectReason::UnknownQuest {
                quest_id: quest_id.to_owned(),
            })?;
        let record = mirror
            .player_quests()
            .get(&(player_id.to_owned(), quest_id.to_owned()))
            .filter(|record| record.status == QuestStatus::Active)
            .ok_or_else(|| RejectReason::QuestNotActive {
                quest_id: quest_id.to_owned(),
            })?;
        if !requirements_met(&quest.requirements, &record.progress) {
            return Err(RejectReason::RequirementsNotMet {
                quest_id: quest_id.to_owned(),
            }
            .into());
        }

        let mut completed = record.clone();
        completed.status = QuestStatus::Completed;
        completed.completed_at = Some(Timestamp::now());
        let mut edits = vec![Edit::Put(
            RowKey::PlayerQuest(player_id.to_owned(), quest_id.to_owned()),
            RowValue::PlayerQuest(completed),
        )];

        let reward_gold = QuestRewards::parse(&quest.rewards).map_or(0, |rewards| rewards.gold);
        if reward_gold > 0 {
            if let Some(player) = mirror.players().get(&player_id.to_owned()) {
                let mut rewarded = player.clone();
                rewarded.gold = rewarded.gold.saturating_add(reward_gold);
                edits.push(Edit::Put(
                    RowKey::Player(player_id.to_owned()),
                    RowValue::Player(rewarded),
                ));
            }
        }

        self.submit(
            mirror,
            sink,
            Reducer::CompleteQuest(QuestArgs {
                player_id: player_id.to_owned(),
                quest_id: quest_id.to_owned(),
            }),
            edits,
        )
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    fn ensure_connected(sink: &impl ReducerSink) -> Result<(), SyncError> {
        if sink.is_connected() {
            Ok(())
        } else {
            Err(SyncError::NotConnected)
        }
    }

    fn call(&mut self, sink: &mut impl ReducerSink, reducer: &Reducer) -> Result<(), SyncError> {
        Self::ensure_connected(sink)?;
        tracing::trace!(reducer = reducer.name(), "calling reducer");
        sink.send(reducer).map_err(|err| self.dispatch_failed(reducer, &err))
    }

    fn submit(
        &mut self,
        mirror: &mut TableMirror,
        sink: &mut impl ReducerSink,
        reducer: Reducer,
        edits: Vec<Edit>,
    ) -> Result<Vec<MirrorChange>, SyncError> {
        let mut priors = Vec::with_capacity(edits.len());
        let mut changes = Vec::with_capacity(edits.len());
        for edit in edits {
            let (key, row, previous) = match edit {
                Edit::Put(key, row) => {
                    let previous = mirror.put(key.clone(), row.clone());
                    (key, Some(row), previous)
                },
                Edit::Remove(key) => {
                    let previous = mirror.remove(&key);
                    (key, None, previous)
                },
                Edit::Placeholder(item) => {
                    let key = RowKey::Inventory(mirror.insert_placeholder(item.clone()));
                    (key, Some(RowValue::Inventory(item)), None)
                },
            };
            let kind = match (&row, &previous) {
                (None, _) => ChangeKind::Delete,
                (Some(_), Some(_)) => ChangeKind::Update,
                (Some(_), None) => ChangeKind::Insert,
            };
            priors.push((key.clone(), previous.clone()));
            changes.push(MirrorChange {
                table: key.table(),
                kind,
                key,
                row,
                previous,
            });
        }

        let id = self.pending.record(reducer.name(), Instant::now(), priors);
        tracing::debug!(
            reducer = reducer.name(),
            edit = id.as_u64(),
            rows = changes.len(),
            "applied speculative edit"
        );

        if let Err(err) = sink.send(&reducer) {
            self.pending.revert(id, mirror);
            return Err(self.dispatch_failed(&reducer, &err));
        }
        Ok(changes)
    }

    fn dispatch_failed(&self, reducer: &Reducer, err: &SyncError) -> SyncError {
        report_violation_to!(
            self.observer,
            ViolationSeverity::Error,
            ViolationKind::Mutation,
            "could not dispatch {}: {}",
            reducer.name(),
            err
        );
        SyncError::DispatchFailed {
            reducer: reducer.name(),
            context: err.to_string(),
        }
    }
}

fn require_player<'a>(mirror: &'a TableMirror, player_id: &str) -> Result<&'a Player, RejectReason> {
    mirror
        .players()
        .get(&player_id.to_owned())
        .ok_or_else(|| RejectReason::PlayerNotMirrored {
            player_id: player_id.to_owned(),
        })
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::mirror::{Snapshot, TableDiff};
    use crate::schema::QuestType;
    use crate::telemetry::CollectingObserver;
    use crate::test_config::{fish, item_definition, player, player_quest, pole, quest};
    use crate::TableName;

    #[derive(Default)]
    struct RecordingSink {
        offline: bool,
        broken: bool,
        sent: Vec<Reducer>,
    }

    impl ReducerSink for RecordingSink {
        fn is_connected(&self) -> bool {
            !self.offline
        }

        fn send(&mut self, reducer: &Reducer) -> Result<(), SyncError> {
            if self.broken {
                return Err(SyncError::ConnectionFailed {
                    context: "socket closed".to_owned(),
                });
            }
            self.sent.push(reducer.clone());
            Ok(())
        }
    }

    fn shop(gold: u32) -> TableMirror {
        let mut mirror = TableMirror::new(8);
        mirror
            .load_snapshot(
                Snapshot::default()
                    .with_rows(TableName::Player, vec![RowValue::Player(player("p1", gold))])
                    .with_rows(TableName::Inventory, vec![
                        RowValue::Inventory(fish(1, "p1", 3)),
                        RowValue::Inventory(fish(2, "p1", 2)),
                        RowValue::Inventory(pole(3, "p1", "pole_1")),
                    ])
                    .with_rows(TableName::ItemDefinition, vec![
                        RowValue::ItemDefinition(item_definition("pole_1", 0, 1)),
                        RowValue::ItemDefinition(item_definition("pole_2", 50, 1)),
                        RowValue::ItemDefinition(item_definition("fish_pond_1", 10, 99)),
                        RowValue::ItemDefinition(item_definition("bait", 0, 99)),
                    ])
                    .with_rows(TableName::Quest, vec![
                        RowValue::Quest(quest("story_1", QuestType::Story, None)),
                        RowValue::Quest(quest("story_2", QuestType::Story, Some("story_1"))),
                        RowValue::Quest(quest("daily_1", QuestType::Daily, None)),
                    ]),
            )
            .unwrap();
        mirror
    }

    fn gold(mirror: &TableMirror) -> u32 {
        mirror.players().get(&"p1".to_owned()).unwrap().gold
    }

    fn rejected(result: Result<Vec<MirrorChange>, SyncError>) -> RejectReason {
        match result {
            Err(SyncError::Rejected { reason }) => reason,
            other => panic!("expected a rejection, got {other:?}"),
        }
    }

    #[test]
    fn broke_player_is_rejected_without_a_call() {
        let mut mirror = shop(0);
        let mut sink = RecordingSink::default();
        let mut coordinator = MutationCoordinator::default();
        let before = mirror.checksum();

        let reason = rejected(coordinator.buy_item(&mut mirror, &mut sink, "p1", "pole_2"));

        assert_eq!(reason, RejectReason::InsufficientGold {
            required: 50,
            available: 0
        });
        assert!(sink.sent.is_empty());
        assert_eq!(mirror.checksum(), before);
        assert!(coordinator.pending().is_empty());
    }

    #[test]
    fn buying_a_pole_adds_a_placeholder_and_spends_gold() {
        let mut mirror = shop(100);
        let mut sink = RecordingSink::default();
        let mut coordinator = MutationCoordinator::default();

        let changes = coordinator
            .buy_item(&mut mirror, &mut sink, "p1", "pole_2")
            .unwrap();

        assert_eq!(gold(&mirror), 50);
        assert_eq!(changes.len(), 2);
        let placeholders: Vec<_> = mirror
            .inventory()
            .entries()
            .filter(|(key, _)| key.is_placeholder())
            .collect();
        assert_eq!(placeholders.len(), 1);
        assert_eq!(placeholders[0].1.item_id, "pole_2");
        assert_eq!(sink.sent.len(), 1);
        assert_eq!(sink.sent[0].name(), "buy_item");
        assert_eq!(coordinator.pending().len(), 1);
    }

    #[test]
    fn authoritative_insert_supersedes_the_placeholder() {
        let mut mirror = shop(100);
        let mut sink = RecordingSink::default();
        let mut coordinator = MutationCoordinator::default();
        coordinator
            .buy_item(&mut mirror, &mut sink, "p1", "pole_2")
            .unwrap();

        let change = mirror
            .apply_diff(TableDiff::Insert(RowValue::Inventory(pole(10, "p1", "pole_2"))))
            .unwrap();
        let extra = coordinator.reconcile(&mut mirror, &change);
        let change = mirror
            .apply_diff(TableDiff::Update(RowValue::Player(player("p1", 50))))
            .unwrap();
        coordinator.reconcile(&mut mirror, &change);

        assert_eq!(extra.len(), 1);
        assert_eq!(extra[0].kind, ChangeKind::Delete);
        let poles: Vec<_> = mirror
            .inventory()
            .iter()
            .filter(|row| row.item_id == "pole_2")
            .collect();
        assert_eq!(poles.len(), 1);
        assert_eq!(poles[0].id, 10);
        assert_eq!(gold(&mirror), 50);
        assert!(coordinator.pending().is_empty());
    }

    #[test]
    fn free_items_other_than_the_starter_pole_are_not_for_sale() {
        let mut mirror = shop(100);
        let mut sink = RecordingSink::default();
        let mut coordinator = MutationCoordinator::default();

        let reason = rejected(coordinator.buy_item(&mut mirror, &mut sink, "p1", "bait"));
        assert_eq!(reason, RejectReason::NotPurchasable {
            item_id: "bait".to_owned()
        });
        coordinator
            .buy_item(&mut mirror, &mut sink, "p1", "pole_1")
            .unwrap();
        assert_eq!(gold(&mirror), 100);
    }

    #[test]
    fn stackable_purchase_tops_up_an_open_stack() {
        let mut mirror = shop(100);
        let mut sink = RecordingSink::default();
        let mut coordinator = MutationCoordinator::default();
        let mut common = fish(4, "p1", 5);
        common.rarity = 0;
        mirror.put(RowKey::Inventory(InventoryKey::Row(4)), RowValue::Inventory(common));

        coordinator
            .buy_item(&mut mirror, &mut sink, "p1", "fish_pond_1")
            .unwrap();

        assert_eq!(
            mirror.inventory().get(&InventoryKey::Row(4)).unwrap().quantity,
            6
        );
        assert!(!mirror.inventory().entries().any(|(key, _)| key.is_placeholder()));
    }

    #[test]
    fn selling_drains_stacks_in_order_and_pays() {
        let mut mirror = shop(0);
        let mut sink = RecordingSink::default();
        let mut coordinator = MutationCoordinator::default();

        coordinator
            .sell_item(&mut mirror, &mut sink, "p1", "fish_pond_1", 1, 4)
            .unwrap();

        assert!(mirror.inventory().get(&InventoryKey::Row(1)).is_none());
        assert_eq!(
            mirror.inventory().get(&InventoryKey::Row(2)).unwrap().quantity,
            1
        );
        assert_eq!(gold(&mirror), 5 * 4);
    }

    #[test]
    fn selling_more_than_owned_is_rejected() {
        let mut mirror = shop(0);
        let mut sink = RecordingSink::default();
        let mut coordinator = MutationCoordinator::default();

        let reason = rejected(coordinator.sell_item(
            &mut mirror,
            &mut sink,
            "p1",
            "fish_pond_1",
            1,
            6,
        ));
        assert_eq!(reason, RejectReason::ItemNotOwned {
            item_id: "fish_pond_1".to_owned(),
            required: 6,
            owned: 5
        });
        let reason = rejected(coordinator.sell_item(
            &mut mirror,
            &mut sink,
            "p1",
            "fish_pond_1",
            1,
            0,
        ));
        assert_eq!(reason, RejectReason::ZeroQuantity);
        assert!(sink.sent.is_empty());
    }

    #[test]
    fn equipped_pole_cannot_be_sold() {
        let mut mirror = shop(0);
        let mut sink = RecordingSink::default();
        let mut coordinator = MutationCoordinator::default();
        coordinator
            .equip_pole(&mut mirror, &mut sink, "p1", "pole_1")
            .unwrap();

        let reason = rejected(coordinator.sell_item(&mut mirror, &mut sink, "p1", "pole_1", 0, 1));
        assert_eq!(reason, RejectReason::ItemEquipped {
            item_id: "pole_1".to_owned()
        });

        coordinator
            .unequip_pole(&mut mirror, &mut sink, "p1")
            .unwrap();
        assert!(mirror
            .players()
            .get(&"p1".to_owned())
            .unwrap()
            .equipped_pole_id
            .is_none());
    }

    #[test]
    fn equipping_an_unowned_pole_is_rejected() {
        let mut mirror = shop(0);
        let mut sink = RecordingSink::default();
        let mut coordinator = MutationCoordinator::default();
        let reason = rejected(coordinator.equip_pole(&mut mirror, &mut sink, "p1", "pole_2"));
        assert!(matches!(reason, RejectReason::ItemNotOwned { .. }));
    }

    #[test]
    fn quest_prerequisites_are_enforced() {
        let mut mirror = shop(0);
        let mut sink = RecordingSink::default();
        let mut coordinator = MutationCoordinator::default();

        let reason = rejected(coordinator.accept_quest(&mut mirror, &mut sink, "p1", "story_2"));
        assert_eq!(reason, RejectReason::PrerequisiteMissing {
            quest_id: "story_2".to_owned(),
            prerequisite: "story_1".to_owned()
        });

        coordinator
            .accept_quest(&mut mirror, &mut sink, "p1", "story_1")
            .unwrap();
        let record = mirror
            .player_quests()
            .get(&("p1".to_owned(), "story_1".to_owned()))
            .unwrap();
        assert_eq!(record.status, QuestStatus::Active);
        let reason = rejected(coordinator.accept_quest(&mut mirror, &mut sink, "p1", "story_1"));
        assert!(matches!(reason, RejectReason::QuestAlreadyActive { .. }));
    }

    #[test]
    fn completing_pays_the_reward_once_requirements_are_met() {
        let mut mirror = shop(10);
        let mut sink = RecordingSink::default();
        let mut coordinator = MutationCoordinator::default();
        mirror.put(
            RowKey::PlayerQuest("p1".to_owned(), "story_1".to_owned()),
            RowValue::PlayerQuest(player_quest("p1", "story_1", QuestStatus::Active, r#"{"total": 1}"#)),
        );

        let reason = rejected(coordinator.complete_quest(&mut mirror, &mut sink, "p1", "story_1"));
        assert!(matches!(reason, RejectReason::RequirementsNotMet { .. }));

        mirror.put(
            RowKey::PlayerQuest("p1".to_owned(), "story_1".to_owned()),
            RowValue::PlayerQuest(player_quest("p1", "story_1", QuestStatus::Active, r#"{"total": 2}"#)),
        );
        coordinator
            .complete_quest(&mut mirror, &mut sink, "p1", "story_1")
            .unwrap();
        assert_eq!(gold(&mirror), 40);

        let reason = rejected(coordinator.accept_quest(&mut mirror, &mut sink, "p1", "story_1"));
        assert!(matches!(reason, RejectReason::QuestAlreadyCompleted { .. }));
    }

    #[test]
    fn completed_daily_quest_can_be_taken_again() {
        let mut mirror = shop(0);
        let mut sink = RecordingSink::default();
        let mut coordinator = MutationCoordinator::default();
        mirror.put(
            RowKey::PlayerQuest("p1".to_owned(), "daily_1".to_owned()),
            RowValue::PlayerQuest(player_quest("p1", "daily_1", QuestStatus::Completed, "{}")),
        );
        coordinator
            .accept_quest(&mut mirror, &mut sink, "p1", "daily_1")
            .unwrap();
        assert_eq!(sink.sent.len(), 1);
    }

    #[test]
    fn offline_mutations_fail_fast() {
        let mut mirror = shop(100);
        let mut sink = RecordingSink {
            offline: true,
            ..RecordingSink::default()
        };
        let mut coordinator = MutationCoordinator::default();
        let result = coordinator.buy_item(&mut mirror, &mut sink, "p1", "pole_2");
        assert_eq!(result, Err(SyncError::NotConnected));
        assert_eq!(
            coordinator.stop_casting(&mut sink, "p1"),
            Err(SyncError::NotConnected)
        );
    }

    #[test]
    fn failed_dispatch_reverts_the_speculation() {
        let observer = Arc::new(CollectingObserver::new());
        let mut mirror = shop(100);
        let before = mirror.checksum();
        let mut sink = RecordingSink {
            broken: true,
            ..RecordingSink::default()
        };
        let mut coordinator = MutationCoordinator::new(Some(observer.clone()));

        let result = coordinator.buy_item(&mut mirror, &mut sink, "p1", "pole_2");

        assert!(matches!(result, Err(SyncError::DispatchFailed {
            reducer: "buy_item",
            ..
        })));
        assert_eq!(mirror.checksum(), before);
        assert!(coordinator.pending().is_empty());
        crate::assert_violation!(observer, ViolationKind::Mutation);
    }

    #[test]
    fn unconfirmed_edits_expire() {
        let observer = Arc::new(CollectingObserver::new());
        let mut mirror = shop(100);
        let mut sink = RecordingSink::default();
        let mut coordinator = MutationCoordinator::new(Some(observer.clone()));
        coordinator
            .equip_pole(&mut mirror, &mut sink, "p1", "pole_1")
            .unwrap();

        let later = Instant::now() + Duration::from_secs(60);
        let reverted = coordinator.expire(&mut mirror, later, Duration::from_secs(15));

        assert_eq!(reverted.len(), 1);
        assert_eq!(reverted[0].reducer, "equip_pole");
        assert!(mirror
            .players()
            .get(&"p1".to_owned())
            .unwrap()
            .equipped_pole_id
            .is_none());
        crate::assert_violation!(observer, ViolationKind::Optimistic);
    }

    #[test]
    fn empty_names_are_refused() {
        let mut sink = RecordingSink::default();
        let mut coordinator = MutationCoordinator::default();
        assert!(matches!(
            coordinator.update_player_name(&mut sink, "p1", "   "),
            Err(SyncError::InvalidRequest { .. })
        ));
        coordinator
            .update_player_name(&mut sink, "p1", " Wren ")
            .unwrap();
        assert_eq!(
            sink.sent[0],
            Reducer::UpdatePlayerName(UpdateNameArgs {
                player_id: "p1".to_owned(),
                name: "Wren".to_owned(),
            })
        );
    }
}
