use std::error::Error;
use std::fmt;
use std::fmt::Display;

use crate::TableName;

/// This enum contains all error messages this library can return. Most API functions return a
/// [`Result<T, SyncError>`].
///
/// Connection-level failures never escape [`SyncClient::connect`], which reports them as `false`
/// and through the observer instead.
///
/// [`Result<T, SyncError>`]: std::result::Result
/// [`SyncClient::connect`]: crate::SyncClient::connect
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SyncError {
    /// The transport could not establish the persistent connection, or lost it.
    ConnectionFailed {
        /// What the transport reported.
        context: String,
    },
    /// The operation needs a live connection and there is none.
    NotConnected,
    /// A subscription query failed to apply. This is fatal: the mirror is left as it was and
    /// the session must be rebuilt after a schema or version fix.
    SubscriptionFailed {
        /// The table whose query failed, if the remote store said which one.
        table: Option<TableName>,
        /// The reason given by the remote store.
        reason: String,
    },
    /// Rows for a table did not have the shape this client expects.
    SchemaMismatch {
        /// The table whose rows could not be read.
        table: TableName,
        /// What went wrong while reading them.
        context: String,
    },
    /// A mutation was rejected locally because its preconditions do not hold against the
    /// current mirror. No remote call was issued.
    Rejected {
        /// Which precondition failed.
        reason: RejectReason,
    },
    /// The remote mutation call could not be handed to the transport.
    DispatchFailed {
        /// Name of the remote mutation.
        reducer: &'static str,
        /// What the transport reported.
        context: String,
    },
    /// Encoding or decoding a payload failed.
    SerializationError {
        /// A description of what failed to serialize/deserialize.
        context: String,
    },
    /// Reading or writing persisted credentials failed.
    StorageError {
        /// A description of the storage failure.
        context: String,
    },
    /// A caller-imposed deadline elapsed.
    Timeout {
        /// What was being waited on.
        operation: &'static str,
    },
    /// You made an invalid request, usually by using wrong parameters for function calls.
    InvalidRequest {
        /// Further specifies why the request was invalid.
        info: String,
    },
}

/// Why a mutation was rejected before reaching the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RejectReason {
    /// The acting player has no row in the mirror yet.
    PlayerNotMirrored {
        /// The player that was looked up.
        player_id: String,
    },
    /// The player cannot afford the purchase.
    InsufficientGold {
        /// Gold the purchase costs.
        required: u32,
        /// Gold the player currently has.
        available: u32,
    },
    /// No item definition exists for this item.
    UnknownItem {
        /// The item that was looked up.
        item_id: String,
    },
    /// The item exists but cannot be bought.
    NotPurchasable {
        /// The item that was requested.
        item_id: String,
    },
    /// The player does not hold enough of the item.
    ItemNotOwned {
        /// The item that was requested.
        item_id: String,
        /// How many were needed.
        required: u32,
        /// How many the player holds.
        owned: u32,
    },
    /// The pole is equipped and cannot be sold.
    ItemEquipped {
        /// The equipped item.
        item_id: String,
    },
    /// Quantity must be greater than zero.
    ZeroQuantity,
    /// No quest definition exists for this quest.
    UnknownQuest {
        /// The quest that was looked up.
        quest_id: String,
    },
    /// The quest is already in progress.
    QuestAlreadyActive {
        /// The quest in question.
        quest_id: String,
    },
    /// A story quest that was already completed cannot be taken again.
    QuestAlreadyCompleted {
        /// The quest in question.
        quest_id: String,
    },
    /// The quest is not in progress, so it cannot be completed.
    QuestNotActive {
        /// The quest in question.
        quest_id: String,
    },
    /// The prerequisite quest has not been completed.
    PrerequisiteMissing {
        /// The quest being accepted.
        quest_id: String,
        /// The quest that must be completed first.
        prerequisite: String,
    },
    /// The recorded progress does not satisfy the quest's requirements.
    RequirementsNotMet {
        /// The quest in question.
        quest_id: String,
    },
}

impl Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlayerNotMirrored { player_id } => {
                write!(f, "player {} is not mirrored", player_id)
            },
            Self::InsufficientGold {
                required,
                available,
            } => write!(f, "needs {}g but only {}g available", required, available),
            Self::UnknownItem { item_id } => write!(f, "unknown item {}", item_id),
            Self::NotPurchasable { item_id } => write!(f, "item {} cannot be bought", item_id),
            Self::ItemNotOwned {
                item_id,
                required,
                owned,
            } => write!(
                f,
                "needs {} of {} but only {} owned",
                required, item_id, owned
            ),
            Self::ItemEquipped { item_id } => write!(f, "item {} is equipped", item_id),
            Self::ZeroQuantity => write!(f, "quantity must be greater than zero"),
            Self::UnknownQuest { quest_id } => write!(f, "unknown quest {}", quest_id),
            Self::QuestAlreadyActive { quest_id } => {
                write!(f, "quest {} is already active", quest_id)
            },
            Self::QuestAlreadyCompleted { quest_id } => {
                write!(f, "quest {} is already completed", quest_id)
            },
            Self::QuestNotActive { quest_id } => write!(f, "quest {} is not active", quest_id),
            Self::PrerequisiteMissing {
                quest_id,
                prerequisite,
            } => write!(
                f,
                "quest {} requires {} to be completed first",
                quest_id, prerequisite
            ),
            Self::RequirementsNotMet { quest_id } => {
                write!(f, "requirements for quest {} are not met", quest_id)
            },
        }
    }
}

impl Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::ConnectionFailed { context } => {
                write!(f, "Connection failed: {}", context)
            },
            SyncError::NotConnected => write!(f, "The client is not connected."),
            SyncError::SubscriptionFailed { table, reason } => match table {
                Some(table) => write!(f, "Subscription to {} failed: {}", table, reason),
                None => write!(f, "Subscription failed: {}", reason),
            },
            SyncError::SchemaMismatch { table, context } => {
                write!(f, "Rows of table {} have an unexpected shape: {}", table, context)
            },
            SyncError::Rejected { reason } => write!(f, "Mutation rejected: {}", reason),
            SyncError::DispatchFailed { reducer, context } => {
                write!(f, "Could not dispatch {}: {}", reducer, context)
            },
            SyncError::SerializationError { context } => {
                write!(f, "Serialization error: {}", context)
            },
            SyncError::StorageError { context } => write!(f, "Storage error: {}", context),
            SyncError::Timeout { operation } => write!(f, "Timed out waiting for {}", operation),
            SyncError::InvalidRequest { info } => write!(f, "Invalid Request: {}", info),
        }
    }
}

impl Error for SyncError {}

impl From<RejectReason> for SyncError {
    fn from(reason: RejectReason) -> Self {
        Self::Rejected { reason }
    }
}

impl SyncError {
    /// Returns `true` for failures that require a schema or version fix rather than a retry.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SubscriptionFailed { .. } | Self::SchemaMismatch { .. }
        )
    }
}
