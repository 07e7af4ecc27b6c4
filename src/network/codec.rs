//! Binary codec for row payloads, reducer arguments and persisted credentials.
//!
//! The bincode configuration is defined once here so every encoded payload in the crate uses the
//! same layout: `standard()` with fixed-size integers.
//!
//! A snapshot table may arrive as an opaque [`RowSet::Encoded`](crate::RowSet::Encoded) payload.
//! [`decode_rows`] turns it into typed rows; when it fails, the client's expected row shape has
//! diverged from the server's.
//!
//! # Examples
//!
//! ```
//! use lurelands_sync::network::codec::{encode, decode_value};
//!
//! let bytes = encode(&42u32).expect("encoding should succeed");
//! let decoded: u32 = decode_value(&bytes).expect("decoding should succeed");
//! assert_eq!(decoded, 42);
//! ```

use serde::{de::DeserializeOwned, Serialize};
use std::fmt;

use crate::schema::{
    GameEvent, InventoryItem, ItemDefinition, Ocean, Player, PlayerQuest, PlayerStats, Pond,
    Quest, River, SpawnPoint,
};
use crate::{RowValue, SyncError, TableName};

fn config() -> impl bincode::config::Config {
    bincode::config::standard().with_fixed_int_encoding()
}

/// What was being encoded or decoded when a codec error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecOperation {
    /// Encoding a list of rows.
    EncodeRows,
    /// Decoding a list of rows.
    DecodeRows,
    /// Encoding a reducer's parameter record.
    EncodeArgs,
    /// A generic encoding operation.
    Encode,
    /// A generic decoding operation.
    Decode,
}

impl fmt::Display for CodecOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EncodeRows => write!(f, "encoding rows"),
            Self::DecodeRows => write!(f, "decoding rows"),
            Self::EncodeArgs => write!(f, "encoding reducer arguments"),
            Self::Encode => write!(f, "encoding"),
            Self::Decode => write!(f, "decoding"),
        }
    }
}

/// Errors that can occur during encoding or decoding.
///
/// Bincode errors are opaque, so the underlying message is kept as a `String`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CodecError {
    /// The encoding operation failed.
    EncodeError {
        /// The underlying bincode error message.
        message: String,
        /// The operation that was being performed.
        operation: CodecOperation,
    },
    /// The decoding operation failed.
    DecodeError {
        /// The underlying bincode error message.
        message: String,
        /// The operation that was being performed.
        operation: CodecOperation,
    },
    /// Decoding succeeded but left unread bytes behind.
    TrailingBytes {
        /// Bytes consumed by the decoder.
        consumed: usize,
        /// Total payload length.
        total: usize,
    },
}

impl CodecError {
    /// Creates a new encode error with the given message and operation.
    pub fn encode(message: impl Into<String>, operation: CodecOperation) -> Self {
        Self::EncodeError {
            message: message.into(),
            operation,
        }
    }

    /// Creates a new decode error with the given message and operation.
    pub fn decode(message: impl Into<String>, operation: CodecOperation) -> Self {
        Self::DecodeError {
            message: message.into(),
            operation,
        }
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EncodeError { message, operation } => {
                write!(f, "encoding failed while {operation}: {message}")
            },
            Self::DecodeError { message, operation } => {
                write!(f, "decoding failed while {operation}: {message}")
            },
            Self::TrailingBytes { consumed, total } => {
                write!(f, "decoded {consumed} of {total} bytes, payload has trailing data")
            },
        }
    }
}

impl std::error::Error for CodecError {}

impl From<CodecError> for SyncError {
    fn from(err: CodecError) -> Self {
        Self::SerializationError {
            context: err.to_string(),
        }
    }
}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Encodes a value into a new `Vec<u8>`.
pub fn encode<T: Serialize>(value: &T) -> CodecResult<Vec<u8>> {
    bincode::serde::encode_to_vec(value, config())
        .map_err(|e| CodecError::encode(e.to_string(), CodecOperation::Encode))
}

/// Decodes a value from a byte slice.
///
/// Returns the decoded value and the number of bytes consumed.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<(T, usize)> {
    bincode::serde::decode_from_slice(bytes, config())
        .map_err(|e| CodecError::decode(e.to_string(), CodecOperation::Decode))
}

/// Decodes a value from a byte slice, ignoring the bytes consumed.
pub fn decode_value<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    decode(bytes).map(|(value, _)| value)
}

/// Encodes typed rows as a snapshot payload.
///
/// # Examples
///
/// ```
/// use lurelands_sync::network::codec::{decode_rows, encode_rows};
/// use lurelands_sync::schema::Pond;
/// use lurelands_sync::TableName;
///
/// let ponds = vec![Pond { id: "pond_1".into(), x: 10.0, y: 20.0, radius: 5.0 }];
/// let bytes = encode_rows(&ponds).expect("encoding should succeed");
/// let rows = decode_rows(TableName::Pond, &bytes).expect("decoding should succeed");
/// assert_eq!(rows.len(), 1);
/// ```
pub fn encode_rows<R: Serialize>(rows: &[R]) -> CodecResult<Vec<u8>> {
    bincode::serde::encode_to_vec(rows, config())
        .map_err(|e| CodecError::encode(e.to_string(), CodecOperation::EncodeRows))
}

fn decode_exact<R: DeserializeOwned>(bytes: &[u8]) -> CodecResult<Vec<R>> {
    let (rows, consumed): (Vec<R>, usize) = bincode::serde::decode_from_slice(bytes, config())
        .map_err(|e| CodecError::decode(e.to_string(), CodecOperation::DecodeRows))?;
    if consumed != bytes.len() {
        return Err(CodecError::TrailingBytes {
            consumed,
            total: bytes.len(),
        });
    }
    Ok(rows)
}

/// Decodes an encoded snapshot payload into rows of `table`.
///
/// The payload must be exactly one bincode-encoded list of the table's row type.
pub fn decode_rows(table: TableName, bytes: &[u8]) -> CodecResult<Vec<RowValue>> {
    Ok(match table {
        TableName::Player => decode_exact::<Player>(bytes)?
            .into_iter()
            .map(RowValue::Player)
            .collect(),
        TableName::Inventory => decode_exact::<InventoryItem>(bytes)?
            .into_iter()
            .map(RowValue::Inventory)
            .collect(),
        TableName::ItemDefinition => decode_exact::<ItemDefinition>(bytes)?
            .into_iter()
            .map(RowValue::ItemDefinition)
            .collect(),
        TableName::Quest => decode_exact::<Quest>(bytes)?
            .into_iter()
            .map(RowValue::Quest)
            .collect(),
        TableName::PlayerQuest => decode_exact::<PlayerQuest>(bytes)?
            .into_iter()
            .map(RowValue::PlayerQuest)
            .collect(),
        TableName::GameEvent => decode_exact::<GameEvent>(bytes)?
            .into_iter()
            .map(RowValue::GameEvent)
            .collect(),
        TableName::PlayerStats => decode_exact::<PlayerStats>(bytes)?
            .into_iter()
            .map(RowValue::PlayerStats)
            .collect(),
        TableName::SpawnPoint => decode_exact::<SpawnPoint>(bytes)?
            .into_iter()
            .map(RowValue::SpawnPoint)
            .collect(),
        TableName::Pond => decode_exact::<Pond>(bytes)?
            .into_iter()
            .map(RowValue::Pond)
            .collect(),
        TableName::River => decode_exact::<River>(bytes)?
            .into_iter()
            .map(RowValue::River)
            .collect(),
        TableName::Ocean => decode_exact::<Ocean>(bytes)?
            .into_iter()
            .map(RowValue::Ocean)
            .collect(),
    })
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
    use crate::schema::Timestamp;

    fn fish(id: u64, quantity: u32) -> InventoryItem {
        InventoryItem {
            id,
            player_id: "p1".to_owned(),
            item_id: "fish_pond_1".to_owned(),
            rarity: 1,
            quantity,
        }
    }

    #[test]
    fn inventory_rows_decode_as_typed_values() {
        let bytes = encode_rows(&[fish(1, 3), fish(2, 5)]).unwrap();
        let rows = decode_rows(TableName::Inventory, &bytes).unwrap();
        assert_eq!(rows, vec![
            RowValue::Inventory(fish(1, 3)),
            RowValue::Inventory(fish(2, 5))
        ]);
    }

    #[test]
    fn garbage_payload_is_a_decode_error() {
        let err = decode_rows(TableName::Player, &[0xff, 0xff, 0xff]).unwrap_err();
        assert!(matches!(err, CodecError::DecodeError { .. }));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = encode_rows(&[fish(1, 1)]).unwrap();
        bytes.push(0);
        let err = decode_rows(TableName::Inventory, &bytes).unwrap_err();
        assert!(matches!(err, CodecError::TrailingBytes { .. }));
    }

    #[test]
    fn rows_of_another_table_do_not_decode_silently() {
        let events = vec![GameEvent {
            id: 9,
            player_id: "p1".to_owned(),
            event_type: crate::schema::GameEventType::FishCaught,
            item_id: None,
            quantity: None,
            gold_amount: None,
            rarity: None,
            created_at: Timestamp(5),
        }];
        let bytes = encode_rows(&events).unwrap();
        assert!(decode_rows(TableName::Player, &bytes).is_err());
    }

    #[test]
    fn codec_errors_become_serialization_errors() {
        let err: SyncError = CodecError::decode("eof", CodecOperation::Decode).into();
        assert!(matches!(err, SyncError::SerializationError { .. }));
    }
}
