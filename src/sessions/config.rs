//! Configuration types for sync clients.
//!
//! | Config Type | Purpose | Key Presets |
//! |-------------|---------|-------------|
//! | `ClientConfig` | Subscriptions, buffer sizes, timeouts | `minimal()`, `world_only()` |
//! | `ReconnectConfig` | Backoff around `connect()` | `patient()`, `aggressive()` |
//!
//! # Example
//!
//! ```
//! use lurelands_sync::{ClientBuilder, ClientConfig, ReconnectConfig};
//! use web_time::Duration;
//!
//! let builder = ClientBuilder::new()
//!     .with_config(ClientConfig {
//!         pending_timeout: Some(Duration::from_secs(5)),
//!         ..ClientConfig::default()
//!     })
//!     .with_reconnect_config(ReconnectConfig::patient());
//! # let _ = builder;
//! ```

use web_time::Duration;

use crate::{SyncError, TableName};

/// Configuration of a [`SyncClient`](crate::SyncClient).
///
/// # Forward Compatibility
///
/// New fields may be added to this struct in future versions. Construct instances with the
/// `..ClientConfig::default()` pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "ClientConfig has no effect unless passed to ClientBuilder::with_config()"]
pub struct ClientConfig {
    /// Tables subscribed to right after connecting, in load order.
    ///
    /// Default: every table in [`TableName::ALL`]
    pub subscriptions: Vec<TableName>,

    /// Maximum number of game events kept in the mirror's log.
    ///
    /// Default: 100
    pub event_log_capacity: usize,

    /// Maximum number of dispatched events kept for inspection.
    ///
    /// Default: 64
    pub history_capacity: usize,

    /// How long a speculative edit may stay unconfirmed before
    /// [`SyncClient::expire_pending`](crate::SyncClient::expire_pending) reverts it. `None`
    /// keeps speculative edits until overwritten.
    ///
    /// Default: 15 seconds
    pub pending_timeout: Option<Duration>,

    /// Deadline for a single connect attempt when using the `tokio` helpers.
    ///
    /// Default: `None` (wait for the transport)
    pub connect_timeout: Option<Duration>,
}

impl ClientConfig {
    /// Default [`event_log_capacity`](Self::event_log_capacity).
    pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 100;

    /// Default [`history_capacity`](Self::history_capacity).
    pub const DEFAULT_HISTORY_CAPACITY: usize = 64;

    /// Default [`pending_timeout`](Self::pending_timeout).
    pub const DEFAULT_PENDING_TIMEOUT: Duration = Duration::from_secs(15);

    /// Creates a `ClientConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Small buffers for memory-constrained clients.
    pub fn minimal() -> Self {
        Self {
            event_log_capacity: 16,
            history_capacity: 8,
            ..Self::default()
        }
    }

    /// Subscribes only to the static world tables and item definitions. Useful for map
    /// previews that never act as a player.
    pub fn world_only() -> Self {
        Self {
            subscriptions: vec![
                TableName::ItemDefinition,
                TableName::SpawnPoint,
                TableName::Pond,
                TableName::River,
                TableName::Ocean,
            ],
            pending_timeout: None,
            ..Self::default()
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidRequest`] if no table is subscribed, a table is listed
    /// twice, or a capacity is zero.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.subscriptions.is_empty() {
            return Err(SyncError::InvalidRequest {
                info: "at least one table must be subscribed".to_owned(),
            });
        }
        for (index, table) in self.subscriptions.iter().enumerate() {
            if self.subscriptions.iter().take(index).any(|earlier| earlier == table) {
                return Err(SyncError::InvalidRequest {
                    info: format!("table {} is subscribed twice", table),
                });
            }
        }
        if self.event_log_capacity == 0 {
            return Err(SyncError::InvalidRequest {
                info: "event_log_capacity must be at least 1".to_owned(),
            });
        }
        if self.history_capacity == 0 {
            return Err(SyncError::InvalidRequest {
                info: "history_capacity must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            subscriptions: TableName::ALL.to_vec(),
            event_log_capacity: Self::DEFAULT_EVENT_LOG_CAPACITY,
            history_capacity: Self::DEFAULT_HISTORY_CAPACITY,
            pending_timeout: Some(Self::DEFAULT_PENDING_TIMEOUT),
            connect_timeout: None,
        }
    }
}

/// Exponential backoff settings for reconnect loops.
///
/// The delay before attempt `n` (starting at zero) is
/// `min(initial_delay * multiplier^n, max_delay)`, scaled by a random factor in
/// `[1 - jitter, 1 + jitter]`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[must_use = "ReconnectConfig has no effect unless passed to ClientBuilder::with_reconnect_config()"]
pub struct ReconnectConfig {
    /// Delay before the first retry.
    ///
    /// Default: 500ms
    pub initial_delay: Duration,

    /// Upper bound on any single delay.
    ///
    /// Default: 30s
    pub max_delay: Duration,

    /// Growth factor between attempts.
    ///
    /// Default: 2.0
    pub multiplier: f64,

    /// Relative jitter, between 0 and 1.
    ///
    /// Default: 0.2
    pub jitter: f64,

    /// Give up after this many attempts. `None` retries forever.
    ///
    /// Default: `Some(10)`
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.2,
            max_attempts: Some(10),
        }
    }
}

impl ReconnectConfig {
    /// Creates a `ReconnectConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Slow, unbounded retries for idle clients that should eventually come back.
    pub fn patient() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(120),
            multiplier: 1.5,
            jitter: 0.3,
            max_attempts: None,
        }
    }

    /// Quick retries for a player who is actively waiting.
    pub fn aggressive() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: 0.1,
            max_attempts: Some(20),
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidRequest`] if the initial delay is zero or exceeds the
    /// maximum, the multiplier is below 1, or the jitter lies outside `0..=1`.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.initial_delay.is_zero() {
            return Err(SyncError::InvalidRequest {
                info: "initial_delay must be greater than zero".to_owned(),
            });
        }
        if self.initial_delay > self.max_delay {
            return Err(SyncError::InvalidRequest {
                info: format!(
                    "initial_delay ({:?}) exceeds max_delay ({:?})",
                    self.initial_delay, self.max_delay
                ),
            });
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(SyncError::InvalidRequest {
                info: format!("multiplier must be at least 1.0, got {}", self.multiplier),
            });
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(SyncError::InvalidRequest {
                info: format!("jitter must be within 0.0..=1.0, got {}", self.jitter),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_subscribe_to_everything() {
        let config = ClientConfig::default();
        assert_eq!(config.subscriptions.len(), TableName::ALL.len());
        assert_eq!(config.event_log_capacity, 100);
        assert_eq!(config.pending_timeout, Some(Duration::from_secs(15)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn presets_are_valid() {
        assert!(ClientConfig::minimal().validate().is_ok());
        assert!(ClientConfig::world_only().validate().is_ok());
        assert!(ReconnectConfig::default().validate().is_ok());
        assert!(ReconnectConfig::patient().validate().is_ok());
        assert!(ReconnectConfig::aggressive().validate().is_ok());
    }

    #[test]
    fn duplicate_subscription_is_rejected() {
        let config = ClientConfig {
            subscriptions: vec![TableName::Player, TableName::Player],
            ..ClientConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SyncError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn empty_subscription_is_rejected() {
        let config = ClientConfig {
            subscriptions: Vec::new(),
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = ClientConfig {
            event_log_capacity: 0,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_backoff_is_rejected() {
        let shrinking = ReconnectConfig {
            multiplier: 0.5,
            ..ReconnectConfig::default()
        };
        let wild = ReconnectConfig {
            jitter: 1.5,
            ..ReconnectConfig::default()
        };
        let inverted = ReconnectConfig {
            initial_delay: Duration::from_secs(60),
            ..ReconnectConfig::default()
        };
        assert!(shrinking.validate().is_err());
        assert!(wild.validate().is_err());
        assert!(inverted.validate().is_err());
    }
}
