//! Remote mutation calls and their parameter records.
//!
//! Each reducer takes exactly one parameter record, never positional arguments.

use serde::{Deserialize, Serialize};

use crate::network::codec;
use crate::SyncError;

/// Enter the world, or come back online.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinWorldArgs {
    /// Acting player.
    pub player_id: String,
    /// Display name.
    pub name: String,
    /// ARGB color.
    pub color: u32,
}

/// Acting player only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerArgs {
    /// Acting player.
    pub player_id: String,
}

/// New position and facing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePositionArgs {
    /// Acting player.
    pub player_id: String,
    /// World x.
    pub x: f32,
    /// World y.
    pub y: f32,
    /// Facing angle in radians.
    pub facing_angle: f32,
}

/// Where the line lands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartCastingArgs {
    /// Acting player.
    pub player_id: String,
    /// Target x.
    pub target_x: f32,
    /// Target y.
    pub target_y: f32,
}

/// A landed fish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchFishArgs {
    /// Acting player.
    pub player_id: String,
    /// Fish item id.
    pub item_id: String,
    /// Fish species label.
    pub fish_type: String,
    /// Fish size.
    pub size: f32,
    /// Star rarity.
    pub rarity: u8,
    /// Water body the fish came from.
    pub water_body_id: String,
}

/// Items to sell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellItemArgs {
    /// Acting player.
    pub player_id: String,
    /// Item id.
    pub item_id: String,
    /// Rarity of the stacks to sell from.
    pub rarity: u8,
    /// How many.
    pub quantity: u32,
}

/// One item to buy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyItemArgs {
    /// Acting player.
    pub player_id: String,
    /// Item id.
    pub item_id: String,
}

/// Pole to equip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipPoleArgs {
    /// Acting player.
    pub player_id: String,
    /// Pole item id.
    pub pole_item_id: String,
}

/// Quest to accept or complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestArgs {
    /// Acting player.
    pub player_id: String,
    /// Quest id.
    pub quest_id: String,
}

/// New display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateNameArgs {
    /// Acting player.
    pub player_id: String,
    /// New name.
    pub name: String,
}

/// A named remote mutation with its parameter record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum Reducer {
    JoinWorld(JoinWorldArgs),
    LeaveWorld(PlayerArgs),
    UpdatePosition(UpdatePositionArgs),
    StartCasting(StartCastingArgs),
    StopCasting(PlayerArgs),
    CatchFish(CatchFishArgs),
    SellItem(SellItemArgs),
    BuyItem(BuyItemArgs),
    EquipPole(EquipPoleArgs),
    UnequipPole(PlayerArgs),
    AcceptQuest(QuestArgs),
    CompleteQuest(QuestArgs),
    UpdatePlayerName(UpdateNameArgs),
}

impl Reducer {
    /// The reducer's name on the server.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::JoinWorld(_) => "join_world",
            Self::LeaveWorld(_) => "leave_world",
            Self::UpdatePosition(_) => "update_position",
            Self::StartCasting(_) => "start_casting",
            Self::StopCasting(_) => "stop_casting",
            Self::CatchFish(_) => "catch_fish",
            Self::SellItem(_) => "sell_item",
            Self::BuyItem(_) => "buy_item",
            Self::EquipPole(_) => "equip_pole",
            Self::UnequipPole(_) => "unequip_pole",
            Self::AcceptQuest(_) => "accept_quest",
            Self::CompleteQuest(_) => "complete_quest",
            Self::UpdatePlayerName(_) => "update_player_name",
        }
    }

    /// Whether this reducer edits the mirror speculatively before the server answers.
    #[must_use]
    pub const fn is_optimistic(&self) -> bool {
        matches!(
            self,
            Self::SellItem(_)
                | Self::BuyItem(_)
                | Self::EquipPole(_)
                | Self::UnequipPole(_)
                | Self::AcceptQuest(_)
                | Self::CompleteQuest(_)
        )
    }

    /// Encodes only the parameter record, for transports that frame the name separately.
    pub fn encode_args(&self) -> Result<Vec<u8>, SyncError> {
        let bytes = match self {
            Self::JoinWorld(args) => codec::encode(args),
            Self::LeaveWorld(args) | Self::StopCasting(args) | Self::UnequipPole(args) => {
                codec::encode(args)
            },
            Self::UpdatePosition(args) => codec::encode(args),
            Self::StartCasting(args) => codec::encode(args),
            Self::CatchFish(args) => codec::encode(args),
            Self::SellItem(args) => codec::encode(args),
            Self::BuyItem(args) => codec::encode(args),
            Self::EquipPole(args) => codec::encode(args),
            Self::AcceptQuest(args) | Self::CompleteQuest(args) => codec::encode(args),
            Self::UpdatePlayerName(args) => codec::encode(args),
        };
        bytes.map_err(|err| SyncError::DispatchFailed {
            reducer: self.name(),
            context: err.to_string(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn economy_reducers_are_optimistic() {
        let buy = Reducer::BuyItem(BuyItemArgs {
            player_id: "p1".to_owned(),
            item_id: "pole_2".to_owned(),
        });
        let leave = Reducer::LeaveWorld(PlayerArgs {
            player_id: "p1".to_owned(),
        });
        assert!(buy.is_optimistic());
        assert!(!leave.is_optimistic());
        assert_eq!(buy.name(), "buy_item");
    }

    #[test]
    fn args_encode_without_the_variant_tag() {
        let args = QuestArgs {
            player_id: "p1".to_owned(),
            quest_id: "q1".to_owned(),
        };
        let whole = codec::encode(&Reducer::AcceptQuest(args.clone())).unwrap();
        let bare = Reducer::AcceptQuest(args.clone()).encode_args().unwrap();
        assert_eq!(bare, codec::encode(&args).unwrap());
        assert!(whole.len() > bare.len());
    }
}
