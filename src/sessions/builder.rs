use std::sync::Arc;

use crate::sessions::connection::ConnectionManager;
use crate::telemetry::ViolationObserver;
use crate::token::{MemoryTokenStore, TokenStore};
use crate::{ClientConfig, ReconnectConfig, SyncClient, SyncError, Transport};

/// Default ARGB color for a newly joining player.
const DEFAULT_COLOR: u32 = 0xFF4A_90D9;

/// Builds a [`SyncClient`].
///
/// ```
/// use lurelands_sync::{ClientBuilder, FileTokenStore};
/// use lurelands_sync::network::memory::MemoryServer;
/// use std::sync::Arc;
///
/// let server = MemoryServer::new();
/// let client = ClientBuilder::new()
///     .with_token_store(Arc::new(FileTokenStore::new("lurelands-token.bin")))
///     .with_local_name("Wren")
///     .build(server.transport())?;
/// # let _ = client;
/// # Ok::<(), lurelands_sync::SyncError>(())
/// ```
#[must_use = "ClientBuilder does nothing until build() is called"]
pub struct ClientBuilder {
    config: ClientConfig,
    reconnect_config: ReconnectConfig,
    token_store: Option<Arc<dyn TokenStore>>,
    violation_observer: Option<Arc<dyn ViolationObserver>>,
    local_name: Option<String>,
    color: u32,
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Destructure so a new field cannot be forgotten here.
        let Self {
            config,
            reconnect_config,
            token_store,
            violation_observer,
            local_name,
            color,
        } = self;

        f.debug_struct("ClientBuilder")
            .field("config", config)
            .field("reconnect_config", reconnect_config)
            .field("has_token_store", &token_store.is_some())
            .field("has_violation_observer", &violation_observer.is_some())
            .field("local_name", local_name)
            .field("color", color)
            .finish()
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    /// Construct a new builder with all values set to their defaults.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            reconnect_config: ReconnectConfig::default(),
            token_store: None,
            violation_observer: None,
            local_name: None,
            color: DEFAULT_COLOR,
        }
    }

    /// Sets subscriptions, buffer sizes and timeouts.
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the backoff used by the reconnect helper.
    pub fn with_reconnect_config(mut self, reconnect_config: ReconnectConfig) -> Self {
        self.reconnect_config = reconnect_config;
        self
    }

    /// Sets where the identity token is kept. Defaults to an in-memory store, which loses the
    /// identity when the process exits.
    pub fn with_token_store(mut self, token_store: Arc<dyn TokenStore>) -> Self {
        self.token_store = Some(token_store);
        self
    }

    /// Sets a custom observer for sync failures. Without one, failures are logged through
    /// `tracing`.
    ///
    /// ```
    /// use lurelands_sync::ClientBuilder;
    /// use lurelands_sync::telemetry::CollectingObserver;
    /// use std::sync::Arc;
    ///
    /// let observer = Arc::new(CollectingObserver::new());
    /// let builder = ClientBuilder::new().with_violation_observer(observer.clone());
    /// # let _ = builder;
    /// ```
    pub fn with_violation_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    /// Joins the world under this name after every successful connect, and leaves it on
    /// [`SyncClient::disconnect`].
    pub fn with_local_name(mut self, name: impl Into<String>) -> Self {
        self.local_name = Some(name.into());
        self
    }

    /// ARGB color sent when joining.
    pub fn with_color(mut self, color: u32) -> Self {
        self.color = color;
        self
    }

    /// Consumes the builder to construct a disconnected [`SyncClient`].
    ///
    /// # Errors
    /// - Returns [`InvalidRequest`] if either configuration is invalid or the local name is
    ///   blank.
    ///
    /// [`InvalidRequest`]: SyncError::InvalidRequest
    pub fn build<T: Transport>(self, transport: T) -> Result<SyncClient<T>, SyncError> {
        self.config.validate()?;
        self.reconnect_config.validate()?;
        if self
            .local_name
            .as_deref()
            .is_some_and(|name| name.trim().is_empty())
        {
            return Err(SyncError::InvalidRequest {
                info: "local name must not be blank".to_owned(),
            });
        }

        let token_store: Arc<dyn TokenStore> = match self.token_store {
            Some(store) => store,
            None => Arc::new(MemoryTokenStore::new()),
        };
        let connection = ConnectionManager::new(
            transport,
            self.config.subscriptions.clone(),
            token_store,
            self.violation_observer.clone(),
        );
        Ok(SyncClient::new(
            connection,
            self.config,
            self.reconnect_config,
            self.violation_observer,
            self.local_name.map(|name| (name, self.color)),
        ))
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::network::memory::MemoryServer;
    use crate::ConnectionState;

    #[test]
    fn builds_a_disconnected_client() {
        let server = MemoryServer::new();
        let client = ClientBuilder::new().build(server.transport()).unwrap();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(client.identity().is_none());
        assert!(client.mirror().is_empty());
    }

    #[test]
    fn invalid_config_is_refused() {
        let server = MemoryServer::new();
        let result = ClientBuilder::new()
            .with_config(ClientConfig {
                subscriptions: Vec::new(),
                ..ClientConfig::default()
            })
            .build(server.transport());
        assert!(matches!(result, Err(SyncError::InvalidRequest { .. })));
    }

    #[test]
    fn blank_name_is_refused() {
        let server = MemoryServer::new();
        let result = ClientBuilder::new()
            .with_local_name("  ")
            .build(server.transport());
        assert!(result.is_err());
    }
}
