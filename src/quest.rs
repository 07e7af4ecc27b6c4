//! Quest requirement, progress and reward blobs.
//!
//! The server stores these as JSON strings on the quest and progress rows:
//!
//! - requirements: `{"fish": {"fish_pond_1": 2}, "total_fish": 5, "min_rarity": 2}`, optionally
//!   nested under `"objectives"`
//! - progress: `{"fish_pond_1": 2, "total": 3, "max_rarity": 2}`
//! - rewards: `{"gold": 100, "items": [{"item_id": "pole_2", "quantity": 1}]}`
//!
//! The client only evaluates them to reject hopeless mutations early and to render progress.
//! The server stays the judge.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::SyncError;

/// What a quest asks for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestRequirements {
    /// Per-fish counts.
    #[serde(default)]
    pub fish: BTreeMap<String, u32>,
    /// Fish of any kind.
    #[serde(default)]
    pub total_fish: Option<u32>,
    /// At least one fish of this rarity or better.
    #[serde(default)]
    pub min_rarity: Option<u32>,
}

impl QuestRequirements {
    /// Parses a requirements blob in either the flat or the `objectives` form.
    pub fn parse(json: &str) -> Result<Self, SyncError> {
        let value: serde_json::Value = serde_json::from_str(json).map_err(|err| {
            SyncError::SerializationError {
                context: format!("quest requirements: {err}"),
            }
        })?;
        let objectives = match value.get("objectives") {
            Some(nested) => nested.clone(),
            None => value,
        };
        serde_json::from_value(objectives).map_err(|err| SyncError::SerializationError {
            context: format!("quest requirements: {err}"),
        })
    }
}

/// A player's counters towards a quest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestProgress {
    counts: BTreeMap<String, u32>,
}

impl QuestProgress {
    /// Parses a progress blob. Non-numeric entries are ignored; an empty string is no progress.
    pub fn parse(json: &str) -> Result<Self, SyncError> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        let raw: BTreeMap<String, serde_json::Value> =
            serde_json::from_str(json).map_err(|err| SyncError::SerializationError {
                context: format!("quest progress: {err}"),
            })?;
        let counts = raw
            .into_iter()
            .filter_map(|(key, value)| {
                let count = value.as_u64()?;
                Some((key, u32::try_from(count).unwrap_or(u32::MAX)))
            })
            .collect();
        Ok(Self { counts })
    }

    /// Fish of this item caught so far.
    #[must_use]
    pub fn caught(&self, item_id: &str) -> u32 {
        self.counts.get(item_id).copied().unwrap_or(0)
    }

    /// Fish of any kind caught so far.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.caught("total")
    }

    /// Best rarity caught so far.
    #[must_use]
    pub fn max_rarity(&self) -> u32 {
        self.caught("max_rarity")
    }

    /// Whether these counters satisfy `requirements`.
    #[must_use]
    pub fn satisfies(&self, requirements: &QuestRequirements) -> bool {
        let fish_ok = requirements
            .fish
            .iter()
            .all(|(item_id, required)| self.caught(item_id) >= *required);
        let total_ok = requirements
            .total_fish
            .is_none_or(|required| self.total() >= required);
        let rarity_ok = requirements
            .min_rarity
            .is_none_or(|required| self.max_rarity() >= required);
        fish_ok && total_ok && rarity_ok
    }
}

/// An item granted on completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardItem {
    /// Item type id.
    pub item_id: String,
    /// How many.
    pub quantity: u32,
}

/// What completing a quest pays out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestRewards {
    /// Gold added to the balance.
    #[serde(default)]
    pub gold: u32,
    /// Items granted.
    #[serde(default)]
    pub items: Vec<RewardItem>,
}

impl QuestRewards {
    /// Parses a rewards blob.
    pub fn parse(json: &str) -> Result<Self, SyncError> {
        serde_json::from_str(json).map_err(|err| SyncError::SerializationError {
            context: format!("quest rewards: {err}"),
        })
    }
}

/// Whether `progress` satisfies `requirements`. Unreadable blobs count as not met.
#[must_use]
pub fn requirements_met(requirements: &str, progress: &str) -> bool {
    match (QuestRequirements::parse(requirements), QuestProgress::parse(progress)) {
        (Ok(requirements), Ok(progress)) => progress.satisfies(&requirements),
        _ => false,
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn total_fish_requirement() {
        assert!(!requirements_met(r#"{"total_fish": 2}"#, r#"{"total": 1}"#));
        assert!(requirements_met(r#"{"total_fish": 2}"#, r#"{"total": 2}"#));
    }

    #[test]
    fn specific_fish_and_rarity() {
        let req = r#"{"fish": {"fish_pond_1": 2}, "min_rarity": 3}"#;
        assert!(!requirements_met(req, r#"{"fish_pond_1": 2, "max_rarity": 2}"#));
        assert!(!requirements_met(req, r#"{"fish_pond_1": 1, "max_rarity": 3}"#));
        assert!(requirements_met(req, r#"{"fish_pond_1": 2, "max_rarity": 3}"#));
    }

    #[test]
    fn objectives_form_is_unwrapped() {
        let req = r#"{"objectives": {"total_fish": 5}, "unlock_conditions": {}}"#;
        assert!(!requirements_met(req, r#"{"total": 4}"#));
        assert!(requirements_met(req, r#"{"total": 5}"#));
    }

    #[test]
    fn empty_requirements_are_met_by_empty_progress() {
        assert!(requirements_met("{}", "{}"));
        assert!(requirements_met("{}", ""));
    }

    #[test]
    fn unreadable_blobs_are_not_met() {
        assert!(!requirements_met("not json", "{}"));
        assert!(!requirements_met("{}", "[1, 2]"));
    }

    #[test]
    fn rewards_parse_with_defaults() {
        let rewards =
            QuestRewards::parse(r#"{"gold": 100, "items": [{"item_id": "pole_2", "quantity": 1}]}"#)
                .unwrap();
        assert_eq!(rewards.gold, 100);
        assert_eq!(rewards.items[0].item_id, "pole_2");
        assert_eq!(QuestRewards::parse("{}").unwrap(), QuestRewards::default());
    }

    #[test]
    fn non_numeric_progress_entries_are_ignored() {
        let progress = QuestProgress::parse(r#"{"total": 3, "note": "hi"}"#).unwrap();
        assert_eq!(progress.total(), 3);
        assert_eq!(progress.caught("note"), 0);
    }
}
