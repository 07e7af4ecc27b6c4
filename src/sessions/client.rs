use std::sync::Arc;

use web_time::Instant;

use crate::dispatch::{EventDispatcher, SyncEvent};
use crate::mirror::{ChangeKind, MirrorChange, RowValue, TableMirror};
use crate::optimistic::pending::PendingEdits;
use crate::optimistic::reducers::CatchFishArgs;
use crate::optimistic::MutationCoordinator;
use crate::report_violation_to;
use crate::sessions::connection::{ConnectionManager, ConnectionState};
use crate::telemetry::{ViolationKind, ViolationObserver, ViolationSeverity};
use crate::views;
use crate::{
    ClientConfig, Identity, ReconnectConfig, ServerMessage, SyncError, TableName, Transport,
};

/// The replicated-state client.
///
/// Owns the connection, the [`TableMirror`], the pending speculative edits and the
/// [`EventDispatcher`]. Everything runs on the caller's thread: [`connect`](Self::connect) is
/// the only await point, and [`poll`](Self::poll) pumps received messages into the mirror and out
/// to listeners.
///
/// Built with [`ClientBuilder`](crate::ClientBuilder).
pub struct SyncClient<T> {
    connection: ConnectionManager<T>,
    mirror: TableMirror,
    coordinator: MutationCoordinator,
    dispatcher: EventDispatcher,
    config: ClientConfig,
    reconnect: ReconnectConfig,
    observer: Option<Arc<dyn ViolationObserver>>,
    local: Option<(String, u32)>,
    /// Set once a subscription or snapshot failed. Nothing recovers from it.
    fatal: Option<SyncError>,
}

impl<T> std::fmt::Debug for SyncClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncClient")
            .field("connection", &self.connection)
            .field("pending", &self.coordinator.pending().len())
            .field("dispatcher", &self.dispatcher)
            .field("config", &self.config)
            .field("local", &self.local)
            .field("fatal", &self.fatal)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> SyncClient<T> {
    pub(crate) fn new(
        connection: ConnectionManager<T>,
        config: ClientConfig,
        reconnect: ReconnectConfig,
        observer: Option<Arc<dyn ViolationObserver>>,
        local: Option<(String, u32)>,
    ) -> Self {
        Self {
            connection,
            mirror: TableMirror::new(config.event_log_capacity),
            coordinator: MutationCoordinator::new(observer.clone()),
            dispatcher: EventDispatcher::new(config.history_capacity),
            config,
            reconnect,
            observer,
            local,
            fatal: None,
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Connects, saves the identity token and subscribes to every configured table.
    ///
    /// Returns whether the connection is up. Failures never propagate: they are reported to the
    /// violation observer, emitted as [`SyncEvent::ConnectionFailed`] and kept in
    /// [`last_error`](Self::last_error). Calling it again after a failure retries with the saved
    /// token. After a fatal subscription failure it always returns `false`.
    ///
    /// With a local name configured, the client joins the world right after connecting.
    pub async fn connect(&mut self) -> bool {
        if let Some(err) = &self.fatal {
            tracing::warn!(error = %err, "not reconnecting after a fatal subscription failure");
            return false;
        }
        if self.connection.state().is_connected() {
            return true;
        }
        match self.connection.connect().await {
            Ok(identity) => {
                self.dispatcher.emit(SyncEvent::Connected {
                    identity: identity.clone(),
                });
                self.join_local(&identity);
                true
            },
            Err(err) => {
                self.dispatcher.emit(SyncEvent::ConnectionFailed {
                    reason: err.to_string(),
                });
                false
            },
        }
    }

    /// Applies every message received since the last call, in arrival order.
    ///
    /// Returns how many messages were handled. Expired speculative edits are reverted
    /// afterwards when [`ClientConfig::pending_timeout`] is set.
    ///
    /// # Errors
    /// - Returns [`SubscriptionFailed`] or [`SchemaMismatch`] once a subscription failed to
    ///   apply. The mirror is left as it was before the failing snapshot, and every later call
    ///   returns the same error.
    ///
    /// [`SubscriptionFailed`]: SyncError::SubscriptionFailed
    /// [`SchemaMismatch`]: SyncError::SchemaMismatch
    pub fn poll(&mut self) -> Result<usize, SyncError> {
        if let Some(err) = &self.fatal {
            return Err(err.clone());
        }
        let messages = self.connection.receive();
        let handled = messages.len();
        for message in messages {
            self.handle_message(message)?;
        }
        if self.config.pending_timeout.is_some() {
            self.expire_pending();
        }
        Ok(handled)
    }

    /// Leaves the world, closes the connection and clears the mirror and pending edits.
    ///
    /// The identity token is kept, so the next [`connect`](Self::connect) resumes as the same
    /// player.
    pub fn disconnect(&mut self) {
        let was_connected = self.connection.state().is_connected();
        if was_connected {
            if let (Some(identity), Some(_)) = (self.connection.identity().cloned(), &self.local) {
                if let Err(err) = self.coordinator.leave_world(&mut self.connection, identity.as_str()) {
                    tracing::debug!(error = %err, "could not leave the world before disconnecting");
                }
            }
        }
        self.connection.disconnect();
        self.mirror.clear();
        self.coordinator.clear();
        if was_connected {
            tracing::info!("disconnected");
            self.dispatcher.emit(SyncEvent::Disconnected {
                reason: "disconnected by client".to_owned(),
            });
        }
    }

    /// Drops the saved identity token. The next connect acts as a brand-new player.
    pub fn forget_identity(&mut self) -> Result<(), SyncError> {
        self.connection.forget_identity()
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// The mirrored tables. Read them directly or through [`views`].
    #[must_use]
    pub const fn mirror(&self) -> &TableMirror {
        &self.mirror
    }

    /// Where listeners register.
    #[must_use]
    pub const fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Who we are, while connected.
    #[must_use]
    pub const fn identity(&self) -> Option<&Identity> {
        self.connection.identity()
    }

    /// Where the connection stands.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Whether reducer calls can be sent.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connection.state().is_connected()
    }

    /// The error that ended the last connect attempt or the session.
    #[must_use]
    pub fn last_error(&self) -> Option<&SyncError> {
        self.fatal.as_ref().or_else(|| self.connection.last_error())
    }

    /// Speculative edits awaiting confirmation.
    #[must_use]
    pub const fn pending(&self) -> &PendingEdits {
        self.coordinator.pending()
    }

    /// The configuration the client was built with.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The backoff used by the reconnect helper.
    #[must_use]
    pub const fn reconnect_config(&self) -> &ReconnectConfig {
        &self.reconnect
    }

    /// The underlying transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        self.connection.transport()
    }

    /// Returns the violation observer, if one was configured.
    #[must_use]
    pub fn violation_observer(&self) -> Option<&Arc<dyn ViolationObserver>> {
        self.observer.as_ref()
    }

    // ------------------------------------------------------------------
    // Speculative edit expiry
    // ------------------------------------------------------------------

    /// Reverts speculative edits older than [`ClientConfig::pending_timeout`]. Returns how many
    /// were reverted; always zero without a timeout.
    pub fn expire_pending(&mut self) -> usize {
        self.expire_pending_at(Instant::now())
    }

    /// [`expire_pending`](Self::expire_pending) against an explicit clock reading.
    pub fn expire_pending_at(&mut self, now: Instant) -> usize {
        let Some(timeout) = self.config.pending_timeout else {
            return 0;
        };
        let reverted = self.coordinator.expire(&mut self.mirror, now, timeout);
        let count = reverted.len();
        for edit in reverted {
            self.dispatcher.emit(SyncEvent::EditReverted {
                id: edit.id,
                reducer: edit.reducer,
            });
            self.publish(edit.changes);
        }
        count
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Enters the world under `name`, or comes back online.
    pub fn join_world(&mut self, name: &str, color: u32) -> Result<(), SyncError> {
        let player_id = self.local_id()?;
        self.coordinator
            .join_world(&mut self.connection, &player_id, name, color)
    }

    /// Goes offline without disconnecting.
    pub fn leave_world(&mut self) -> Result<(), SyncError> {
        let player_id = self.local_id()?;
        self.coordinator.leave_world(&mut self.connection, &player_id)
    }

    /// Reports the local player's position.
    pub fn update_position(&mut self, x: f32, y: f32, facing_angle: f32) -> Result<(), SyncError> {
        let player_id = self.local_id()?;
        self.coordinator
            .update_position(&mut self.connection, &player_id, x, y, facing_angle)
    }

    /// Casts the line at a target.
    pub fn start_casting(&mut self, target_x: f32, target_y: f32) -> Result<(), SyncError> {
        let player_id = self.local_id()?;
        self.coordinator
            .start_casting(&mut self.connection, &player_id, target_x, target_y)
    }

    /// Reels the line in.
    pub fn stop_casting(&mut self) -> Result<(), SyncError> {
        let player_id = self.local_id()?;
        self.coordinator.stop_casting(&mut self.connection, &player_id)
    }

    /// Reports a landed fish.
    pub fn catch_fish(
        &mut self,
        item_id: &str,
        fish_type: &str,
        size: f32,
        rarity: u8,
        water_body_id: &str,
    ) -> Result<(), SyncError> {
        let player_id = self.local_id()?;
        self.coordinator.catch_fish(
            &mut self.connection,
            CatchFishArgs {
                player_id,
                item_id: item_id.to_owned(),
                fish_type: fish_type.to_owned(),
                size,
                rarity,
                water_body_id: water_body_id.to_owned(),
            },
        )
    }

    /// Renames the local player.
    pub fn update_player_name(&mut self, name: &str) -> Result<(), SyncError> {
        let player_id = self.local_id()?;
        self.coordinator
            .update_player_name(&mut self.connection, &player_id, name)
    }

    /// Buys one unit of `item_id`. Gold and inventory change before the server answers.
    ///
    /// # Errors
    /// - [`SyncError::Rejected`] when the purchase cannot succeed; no call is sent.
    /// - [`SyncError::NotConnected`] or [`SyncError::DispatchFailed`] when the call could not be
    ///   sent; the mirror is left unchanged.
    pub fn buy_item(&mut self, item_id: &str) -> Result<(), SyncError> {
        let player_id = self.local_id()?;
        let changes =
            self.coordinator
                .buy_item(&mut self.mirror, &mut self.connection, &player_id, item_id)?;
        self.publish(changes);
        Ok(())
    }

    /// Sells `quantity` units of `item_id` at `rarity`.
    pub fn sell_item(&mut self, item_id: &str, rarity: u8, quantity: u32) -> Result<(), SyncError> {
        let player_id = self.local_id()?;
        let changes = self.coordinator.sell_item(
            &mut self.mirror,
            &mut self.connection,
            &player_id,
            item_id,
            rarity,
            quantity,
        )?;
        self.publish(changes);
        Ok(())
    }

    /// Equips an owned pole.
    pub fn equip_pole(&mut self, pole_item_id: &str) -> Result<(), SyncError> {
        let player_id = self.local_id()?;
        let changes = self.coordinator.equip_pole(
            &mut self.mirror,
            &mut self.connection,
            &player_id,
            pole_item_id,
        )?;
        self.publish(changes);
        Ok(())
    }

    /// Unequips the current pole.
    pub fn unequip_pole(&mut self) -> Result<(), SyncError> {
        let player_id = self.local_id()?;
        let changes =
            self.coordinator
                .unequip_pole(&mut self.mirror, &mut self.connection, &player_id)?;
        self.publish(changes);
        Ok(())
    }

    /// Accepts a quest.
    pub fn accept_quest(&mut self, quest_id: &str) -> Result<(), SyncError> {
        let player_id = self.local_id()?;
        let changes = self.coordinator.accept_quest(
            &mut self.mirror,
            &mut self.connection,
            &player_id,
            quest_id,
        )?;
        self.publish(changes);
        Ok(())
    }

    /// Hands in a quest whose requirements are met.
    pub fn complete_quest(&mut self, quest_id: &str) -> Result<(), SyncError> {
        let player_id = self.local_id()?;
        let changes = self.coordinator.complete_quest(
            &mut self.mirror,
            &mut self.connection,
            &player_id,
            quest_id,
        )?;
        self.publish(changes);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn local_id(&self) -> Result<String, SyncError> {
        self.connection
            .identity()
            .map(|identity| identity.as_str().to_owned())
            .ok_or(SyncError::NotConnected)
    }

    fn join_local(&mut self, identity: &Identity) {
        let Some((name, color)) = &self.local else {
            return;
        };
        if let Err(err) =
            self.coordinator
                .join_world(&mut self.connection, identity.as_str(), name, *color)
        {
            tracing::warn!(error = %err, "could not join the world after connecting");
        }
    }

    fn handle_message(&mut self, message: ServerMessage) -> Result<(), SyncError> {
        match message {
            ServerMessage::SubscriptionApplied(snapshot) => match self.mirror.load_snapshot(snapshot) {
                Ok(tables) => {
                    self.coordinator.clear();
                    self.connection.mark_live();
                    tracing::info!(
                        tables = tables.len(),
                        players = self.mirror.players().len(),
                        "snapshot loaded"
                    );
                    self.dispatcher.emit(SyncEvent::StateReady);
                    self.emit_projections(true, true, true);
                },
                Err(err) => {
                    let table = match &err {
                        SyncError::SchemaMismatch { table, .. } => Some(*table),
                        _ => None,
                    };
                    report_violation_to!(
                        self.observer,
                        table = table;
                        ViolationSeverity::Critical,
                        ViolationKind::Schema,
                        "snapshot load abandoned, mirror left as it was: {}",
                        err
                    );
                    self.dispatcher.emit(SyncEvent::SubscriptionFailed {
                        table,
                        reason: err.to_string(),
                    });
                    return Err(self.fail(err));
                },
            },
            ServerMessage::SubscriptionError { table, reason } => {
                let err = SyncError::SubscriptionFailed {
                    table,
                    reason: reason.clone(),
                };
                report_violation_to!(
                    self.observer,
                    table = table;
                    ViolationSeverity::Critical,
                    ViolationKind::Subscription,
                    "{}",
                    err
                );
                self.dispatcher
                    .emit(SyncEvent::SubscriptionFailed { table, reason });
                return Err(self.fail(err));
            },
            ServerMessage::Diff(diff) => {
                if !self.mirror.is_loaded() {
                    report_violation_to!(
                        self.observer,
                        table = diff.table();
                        ViolationSeverity::Warning,
                        ViolationKind::Mirror,
                        "diff arrived before the snapshot"
                    );
                }
                let Some(change) = self.mirror.apply_diff(diff) else {
                    return Ok(());
                };
                let superseded = self.coordinator.reconcile(&mut self.mirror, &change);
                let mut changes = Vec::with_capacity(1 + superseded.len());
                changes.push(change);
                changes.extend(superseded);
                self.publish(changes);
            },
            ServerMessage::Event(event) => {
                self.dispatcher.emit(SyncEvent::Server(event));
            },
            ServerMessage::Disconnected { reason } => {
                report_violation_to!(
                    self.observer,
                    ViolationSeverity::Warning,
                    ViolationKind::Connection,
                    "connection lost: {}",
                    reason
                );
                self.dispatcher.emit(SyncEvent::Disconnected { reason });
            },
        }
        Ok(())
    }

    fn fail(&mut self, err: SyncError) -> SyncError {
        self.connection.mark_failed(err.clone());
        self.coordinator.clear();
        self.fatal = Some(err.clone());
        err
    }

    /// Broadcasts mirror changes, then the projections they affect.
    fn publish(&self, changes: Vec<MirrorChange>) {
        if changes.is_empty() {
            return;
        }
        let local = self.connection.identity().map(Identity::as_str);
        let mut players = false;
        let mut inventory = false;
        let mut quests = false;
        for change in changes {
            match change.table {
                TableName::Player => players = true,
                TableName::Quest => quests = true,
                TableName::Inventory => inventory |= local.is_some_and(|id| owned_by(&change, id)),
                TableName::PlayerQuest => quests |= local.is_some_and(|id| owned_by(&change, id)),
                _ => {},
            }
            let logged = match (&change.kind, &change.row) {
                (ChangeKind::Insert, Some(RowValue::GameEvent(event))) => Some(event.clone()),
                _ => None,
            };
            self.dispatcher.emit(SyncEvent::RowChanged(change));
            if let Some(event) = logged {
                self.dispatcher.emit(SyncEvent::GameEventLogged(event));
            }
        }
        self.emit_projections(players, inventory, quests);
    }

    fn emit_projections(&self, players: bool, inventory: bool, quests: bool) {
        if players {
            self.dispatcher.emit(SyncEvent::PlayersChanged(
                self.mirror.players().iter().cloned().collect(),
            ));
        }
        let Some(local) = self.connection.identity() else {
            return;
        };
        if inventory {
            self.dispatcher.emit(SyncEvent::InventoryChanged {
                player_id: local.as_str().to_owned(),
                items: views::inventory_of(&self.mirror, local.as_str()),
            });
        }
        if quests {
            self.dispatcher.emit(SyncEvent::QuestsChanged {
                player_id: local.as_str().to_owned(),
                quests: views::quests_and_progress_of(&self.mirror, local.as_str()),
            });
        }
    }
}

#[cfg(feature = "tokio")]
impl<T: Transport> SyncClient<T> {
    /// [`connect`](Self::connect) with a deadline.
    ///
    /// A connect still in flight when `timeout` elapses is abandoned and the client is left
    /// disconnected.
    ///
    /// # Errors
    /// - [`SyncError::Timeout`] when the deadline passed.
    /// - The connect failure otherwise.
    pub async fn connect_with_timeout(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<Identity, SyncError> {
        match tokio::time::timeout(timeout, self.connect()).await {
            Ok(true) => self.identity().cloned().ok_or(SyncError::NotConnected),
            Ok(false) => Err(self
                .last_error()
                .cloned()
                .unwrap_or(SyncError::NotConnected)),
            Err(_elapsed) => {
                let err = SyncError::Timeout {
                    operation: "connect",
                };
                report_violation_to!(
                    self.observer,
                    ViolationSeverity::Error,
                    ViolationKind::Connection,
                    "connect did not finish within {:?}",
                    timeout
                );
                self.connection.abort_connect(err.clone());
                self.dispatcher.emit(SyncEvent::ConnectionFailed {
                    reason: err.to_string(),
                });
                Err(err)
            },
        }
    }

    /// Retries [`connect`](Self::connect) with exponential backoff until it succeeds, the
    /// attempts run out or the session failed fatally.
    ///
    /// Each attempt honors [`ClientConfig::connect_timeout`].
    pub async fn reconnect_with_backoff(&mut self) -> bool {
        let mut backoff = crate::Backoff::new(self.reconnect);
        loop {
            let connected = match self.config.connect_timeout {
                Some(limit) => self.connect_with_timeout(limit).await.is_ok(),
                None => self.connect().await,
            };
            if connected {
                return true;
            }
            if self.fatal.is_some() {
                return false;
            }
            let Some(delay) = backoff.next_delay() else {
                tracing::warn!(attempts = backoff.attempts(), "giving up reconnecting");
                return false;
            };
            tracing::debug!(
                attempt = backoff.attempts(),
                delay_ms = delay.as_millis() as u64,
                "retrying connect"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn owned_by(change: &MirrorChange, player_id: &str) -> bool {
    [change.row.as_ref(), change.previous.as_ref()]
        .into_iter()
        .flatten()
        .any(|row| match row {
            RowValue::Inventory(item) => item.player_id == player_id,
            RowValue::PlayerQuest(record) => record.player_id == player_id,
            _ => false,
        })
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;
    use crate::mirror::{Snapshot, TableDiff};
    use crate::network::memory::{MemoryServer, MemoryTransport};
    use crate::telemetry::CollectingObserver;
    use crate::test_config::{fish, item_definition, player};
    use crate::{ClientBuilder, EventKind};

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap()
            .block_on(future)
    }

    fn live_client(server: &MemoryServer) -> SyncClient<MemoryTransport> {
        server.set_snapshot(
            Snapshot::default()
                .with_rows(TableName::Player, vec![RowValue::Player(player("player-1", 100))])
                .with_rows(TableName::ItemDefinition, vec![RowValue::ItemDefinition(
                    item_definition("pole_basic", 50, 1),
                )]),
        );
        let mut client = ClientBuilder::new().build(server.transport()).unwrap();
        assert!(block_on(client.connect()));
        client.poll().unwrap();
        client
    }

    #[test]
    fn snapshot_makes_the_client_live() {
        let server = MemoryServer::new();
        let client = live_client(&server);
        assert_eq!(client.state(), ConnectionState::Live);
        assert_eq!(client.mirror().players().len(), 1);
        assert!(client
            .dispatcher()
            .history()
            .iter()
            .any(|event| *event == SyncEvent::StateReady));
    }

    #[test]
    fn local_name_joins_after_connect() {
        let server = MemoryServer::new();
        let mut client = ClientBuilder::new()
            .with_local_name("Wren")
            .build(server.transport())
            .unwrap();
        assert!(block_on(client.connect()));
        let calls = server.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name(), "join_world");
    }

    #[test]
    fn failed_connect_is_a_false_and_an_event() {
        let server = MemoryServer::new();
        server.fail_next_connect("no route");
        let mut client = ClientBuilder::new().build(server.transport()).unwrap();
        assert!(!block_on(client.connect()));
        assert!(matches!(
            client.last_error(),
            Some(SyncError::ConnectionFailed { .. })
        ));
        assert!(matches!(
            client.dispatcher().history().first(),
            Some(SyncEvent::ConnectionFailed { .. })
        ));
        assert!(block_on(client.connect()));
    }

    #[test]
    fn own_inventory_diff_emits_an_inventory_projection() {
        let server = MemoryServer::new();
        let mut client = live_client(&server);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        client
            .dispatcher()
            .on(EventKind::InventoryChanged, move |event: &SyncEvent| {
                if let SyncEvent::InventoryChanged { items, .. } = event {
                    sink.lock().push(items.len());
                }
            });

        server.push_diff(TableDiff::Insert(RowValue::Inventory(fish(1, "player-1", 3))));
        server.push_diff(TableDiff::Insert(RowValue::Inventory(fish(2, "player-9", 3))));
        assert_eq!(client.poll().unwrap(), 2);

        assert_eq!(*seen.lock(), vec![1]);
    }

    #[test]
    fn subscription_error_is_fatal() {
        let server = MemoryServer::new();
        server.fail_subscription(Some(TableName::Quest), "no such column: storyline");
        let observer = Arc::new(CollectingObserver::new());
        let mut client = ClientBuilder::new()
            .with_violation_observer(observer.clone())
            .build(server.transport())
            .unwrap();

        assert!(block_on(client.connect()));
        let err = client.poll().unwrap_err();
        assert!(matches!(err, SyncError::SubscriptionFailed { .. }));
        assert_eq!(client.state(), ConnectionState::Failed);
        assert_eq!(client.poll(), Err(err));
        assert!(!block_on(client.connect()));
        crate::assert_violation!(observer, ViolationKind::Subscription);
    }

    #[test]
    fn explicit_disconnect_clears_the_mirror() {
        let server = MemoryServer::new();
        let mut client = live_client(&server);
        client.buy_item("pole_basic").unwrap();
        assert_eq!(client.pending().len(), 1);

        client.disconnect();

        assert!(client.mirror().is_empty());
        assert!(client.pending().is_empty());
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(client.buy_item("pole_basic"), Err(SyncError::NotConnected));
    }

    #[test]
    fn remote_disconnect_keeps_stale_rows() {
        let server = MemoryServer::new();
        let mut client = live_client(&server);
        server.drop_connection("server restart");
        client.poll().unwrap();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(client.mirror().players().len(), 1);
    }

    #[test]
    fn expired_edits_are_reverted_and_announced() {
        let server = MemoryServer::new();
        let mut client = live_client(&server);
        client.buy_item("pole_basic").unwrap();
        assert_eq!(views::player(client.mirror(), "player-1").unwrap().gold, 50);

        let later = Instant::now() + Duration::from_secs(60);
        assert_eq!(client.expire_pending_at(later), 1);

        assert_eq!(views::player(client.mirror(), "player-1").unwrap().gold, 100);
        assert!(views::inventory_of(client.mirror(), "player-1").is_empty());
        assert!(client
            .dispatcher()
            .history()
            .iter()
            .any(|event| matches!(event, SyncEvent::EditReverted { reducer: "buy_item", .. })));
    }

    #[test]
    fn mutations_need_an_identity() {
        let server = MemoryServer::new();
        let mut client = ClientBuilder::new().build(server.transport()).unwrap();
        assert_eq!(client.update_position(1.0, 2.0, 0.0), Err(SyncError::NotConnected));
        assert!(server.calls().is_empty());
    }
}
