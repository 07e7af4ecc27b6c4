//! Bookkeeping for speculative edits that the server has not confirmed yet.
//!
//! Every speculative edit is recorded with the prior value of each row it touched (`None` when
//! the row did not exist). An authoritative change to one of those rows confirms that row: the
//! authoritative value is already in the mirror, so the prior is dropped. Whatever is still
//! unconfirmed when an edit is reverted gets its prior value restored.
//!
//! When two pending edits touched the same row, the newer one captured the older one's
//! speculative value as its prior. Reverting the older edit alone cannot separate the two, so
//! its prior is handed to the newer edit instead of being restored. If the newer edit is later
//! reverted too, the row returns to its state before both.

use std::collections::VecDeque;
use std::time::Duration;

use web_time::Instant;

use crate::mirror::{ChangeKind, MirrorChange, RowKey, RowValue, TableMirror};
use crate::schema::{InventoryItem, InventoryKey};

/// Identifies one speculative edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EditId(u64);

impl EditId {
    /// The raw sequence number.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

/// A speculative edit awaiting authoritative confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEdit {
    id: EditId,
    reducer: &'static str,
    issued_at: Instant,
    priors: Vec<(RowKey, Option<RowValue>)>,
}

impl PendingEdit {
    /// This edit's id.
    #[must_use]
    pub const fn id(&self) -> EditId {
        self.id
    }

    /// The reducer whose effect was speculated.
    #[must_use]
    pub const fn reducer(&self) -> &'static str {
        self.reducer
    }

    /// When the edit was applied.
    #[must_use]
    pub const fn issued_at(&self) -> Instant {
        self.issued_at
    }

    /// Keys still waiting for an authoritative value.
    pub fn unconfirmed(&self) -> impl Iterator<Item = &RowKey> + '_ {
        self.priors.iter().map(|(key, _)| key)
    }

    /// Whether every touched row has been confirmed.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.priors.is_empty()
    }

    fn touches(&self, key: &RowKey) -> bool {
        self.priors.iter().any(|(touched, _)| touched == key)
    }
}

/// A speculative edit that was rolled back.
#[derive(Debug, Clone, PartialEq)]
pub struct RevertedEdit {
    /// The edit's id.
    pub id: EditId,
    /// The reducer whose effect was speculated.
    pub reducer: &'static str,
    /// The mirror changes the rollback made.
    pub changes: Vec<MirrorChange>,
}

/// All pending speculative edits, oldest first.
#[derive(Debug, Clone, Default)]
pub struct PendingEdits {
    edits: VecDeque<PendingEdit>,
    next_id: u64,
}

impl PendingEdits {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of edits still pending.
    #[must_use]
    pub fn len(&self) -> usize {
        self.edits.len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Pending edits, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &PendingEdit> + '_ {
        self.edits.iter()
    }

    /// Looks up a pending edit.
    #[must_use]
    pub fn get(&self, id: EditId) -> Option<&PendingEdit> {
        self.edits.iter().find(|edit| edit.id == id)
    }

    /// Whether any pending edit still waits for `key`.
    #[must_use]
    pub fn is_pending(&self, key: &RowKey) -> bool {
        self.edits.iter().any(|edit| edit.touches(key))
    }

    pub(crate) fn record(
        &mut self,
        reducer: &'static str,
        issued_at: Instant,
        priors: Vec<(RowKey, Option<RowValue>)>,
    ) -> EditId {
        self.next_id += 1;
        let id = EditId(self.next_id);
        if !priors.is_empty() {
            self.edits.push_back(PendingEdit {
                id,
                reducer,
                issued_at,
                priors,
            });
        }
        id
    }

    /// Marks `key` as authoritatively known in every pending edit. Returns how many edits were
    /// waiting for it.
    pub fn confirm(&mut self, key: &RowKey) -> usize {
        let mut confirmed = 0;
        for edit in &mut self.edits {
            let before = edit.priors.len();
            edit.priors.retain(|(touched, _)| touched != key);
            if edit.priors.len() != before {
                confirmed += 1;
            }
        }
        self.edits.retain(|edit| !edit.is_settled());
        confirmed
    }

    /// Drops the oldest placeholder of the same owner, item and rarity as the authoritative
    /// row `item`. The placeholder is superseded, never merged: quantities are not summed.
    pub(crate) fn supersede_placeholder(
        &mut self,
        mirror: &mut TableMirror,
        item: &InventoryItem,
    ) -> Option<MirrorChange> {
        let key = self.edits.iter().find_map(|edit| {
            edit.priors.iter().find_map(|(key, _)| match key {
                RowKey::Inventory(InventoryKey::Placeholder(n)) => {
                    let placeholder = InventoryKey::Placeholder(*n);
                    mirror
                        .inventory()
                        .get(&placeholder)
                        .filter(|row| row.same_kind(&item.player_id, &item.item_id, item.rarity))
                        .map(|_| key.clone())
                },
                _ => None,
            })
        })?;
        self.confirm(&key);
        let previous = mirror.remove(&key)?;
        tracing::debug!(?key, row_id = item.id, "placeholder superseded by authoritative row");
        Some(MirrorChange {
            table: key.table(),
            kind: ChangeKind::Delete,
            key,
            row: None,
            previous: Some(previous),
        })
    }

    /// Rolls back one edit, restoring the prior value of every row it still has unconfirmed.
    pub(crate) fn revert(&mut self, id: EditId, mirror: &mut TableMirror) -> Option<RevertedEdit> {
        let index = self.edits.iter().position(|edit| edit.id == id)?;
        let edit = self.edits.remove(index)?;
        let mut changes = Vec::new();

        for (key, prior) in edit.priors {
            let newer = self
                .edits
                .iter_mut()
                .skip(index)
                .find(|other| other.touches(&key));
            if let Some(newer) = newer {
                if let Some(slot) = newer.priors.iter_mut().find(|(touched, _)| *touched == key) {
                    slot.1 = prior;
                }
                continue;
            }
            if let Some(change) = restore(mirror, key, prior) {
                changes.push(change);
            }
        }

        Some(RevertedEdit {
            id: edit.id,
            reducer: edit.reducer,
            changes,
        })
    }

    /// Reverts every edit issued at or before `now - timeout`, oldest first.
    pub(crate) fn expire(
        &mut self,
        mirror: &mut TableMirror,
        now: Instant,
        timeout: Duration,
    ) -> Vec<RevertedEdit> {
        let expired: Vec<EditId> = self
            .edits
            .iter()
            .filter(|edit| now.saturating_duration_since(edit.issued_at) >= timeout)
            .map(|edit| edit.id)
            .collect();
        expired
            .into_iter()
            .filter_map(|id| self.revert(id, mirror))
            .collect()
    }

    /// Forgets every pending edit without touching the mirror.
    pub fn clear(&mut self) {
        self.edits.clear();
    }
}

fn restore(mirror: &mut TableMirror, key: RowKey, prior: Option<RowValue>) -> Option<MirrorChange> {
    match prior {
        Some(value) => {
            let previous = mirror.put(key.clone(), value.clone());
            Some(MirrorChange {
                table: key.table(),
                kind: if previous.is_some() {
                    ChangeKind::Update
                } else {
                    ChangeKind::Insert
                },
                key,
                row: Some(value),
                previous,
            })
        },
        None => {
            let previous = mirror.remove(&key)?;
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

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::mirror::{Snapshot, TableDiff};
    use crate::test_config::{player, pole};
    use crate::TableName;

    fn gold(mirror: &TableMirror) -> u32 {
        mirror.players().get(&"p1".to_owned()).unwrap().gold
    }

    fn mirror_with_player(gold: u32) -> TableMirror {
        let mut mirror = TableMirror::new(8);
        mirror
            .load_snapshot(
                Snapshot::default()
                    .with_rows(TableName::Player, vec![RowValue::Player(player("p1", gold))]),
            )
            .unwrap();
        mirror
    }

    fn speculate_gold(pending: &mut PendingEdits, mirror: &mut TableMirror, to: u32) -> EditId {
        let key = RowKey::Player("p1".to_owned());
        let prior = mirror.row(&key);
        mirror.put(key.clone(), RowValue::Player(player("p1", to)));
        pending.record("buy_item", Instant::now(), vec![(key, prior)])
    }

    #[test]
    fn confirmation_settles_the_edit() {
        let mut mirror = mirror_with_player(100);
        let mut pending = PendingEdits::new();
        speculate_gold(&mut pending, &mut mirror, 50);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending.confirm(&RowKey::Player("p1".to_owned())), 1);
        assert!(pending.is_empty());
    }

    #[test]
    fn revert_restores_unconfirmed_rows() {
        let mut mirror = mirror_with_player(100);
        let mut pending = PendingEdits::new();
        let id = speculate_gold(&mut pending, &mut mirror, 50);
        let reverted = pending.revert(id, &mut mirror).unwrap();
        assert_eq!(reverted.reducer, "buy_item");
        assert_eq!(reverted.changes.len(), 1);
        assert_eq!(gold(&mirror), 100);
    }

    #[test]
    fn reverting_the_older_of_two_edits_hands_over_its_prior() {
        let mut mirror = mirror_with_player(100);
        let mut pending = PendingEdits::new();
        let first = speculate_gold(&mut pending, &mut mirror, 50);
        let second = speculate_gold(&mut pending, &mut mirror, 0);

        let reverted = pending.revert(first, &mut mirror).unwrap();
        assert!(reverted.changes.is_empty());
        assert_eq!(gold(&mirror), 0);

        pending.revert(second, &mut mirror).unwrap();
        assert_eq!(gold(&mirror), 100);
    }

    #[test]
    fn placeholder_is_superseded_not_merged() {
        let mut mirror = mirror_with_player(100);
        let mut pending = PendingEdits::new();
        let key = mirror.insert_placeholder(pole(0, "p1", "pole_2"));
        pending.record("buy_item", Instant::now(), vec![(RowKey::Inventory(key), None)]);

        let authoritative = pole(41, "p1", "pole_2");
        mirror.apply_diff(TableDiff::Insert(RowValue::Inventory(authoritative.clone())));
        let change = pending
            .supersede_placeholder(&mut mirror, &authoritative)
            .unwrap();

        assert_eq!(change.key, RowKey::Inventory(key));
        assert_eq!(mirror.inventory().len(), 1);
        assert_eq!(
            mirror.inventory().get(&InventoryKey::Row(41)).unwrap().quantity,
            1
        );
        assert!(pending.is_empty());
    }

    #[test]
    fn other_items_do_not_supersede_a_placeholder() {
        let mut mirror = mirror_with_player(100);
        let mut pending = PendingEdits::new();
        let key = mirror.insert_placeholder(pole(0, "p1", "pole_2"));
        pending.record("buy_item", Instant::now(), vec![(RowKey::Inventory(key), None)]);
        assert!(pending
            .supersede_placeholder(&mut mirror, &pole(41, "p1", "pole_3"))
            .is_none());
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn expiry_only_reverts_old_edits() {
        let mut mirror = mirror_with_player(100);
        let mut pending = PendingEdits::new();
        speculate_gold(&mut pending, &mut mirror, 50);
        let issued = pending.iter().next().unwrap().issued_at();

        let early = pending.expire(&mut mirror, issued, Duration::from_secs(15));
        assert!(early.is_empty());
        assert_eq!(gold(&mirror), 50);

        let late = pending.expire(&mut mirror, issued + Duration::from_secs(15), Duration::from_secs(15));
        assert_eq!(late.len(), 1);
        assert_eq!(gold(&mirror), 100);
        assert!(pending.is_empty());
    }

    #[test]
    fn empty_edits_are_not_tracked() {
        let mut pending = PendingEdits::new();
        let first = pending.record("unequip_pole", Instant::now(), Vec::new());
        let second = pending.record("unequip_pole", Instant::now(), Vec::new());
        assert_ne!(first, second);
        assert!(pending.is_empty());
    }
}
