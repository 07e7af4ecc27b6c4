//! Fan-out of mirror changes and server events to registered callbacks.
//!
//! Listeners register for one [`EventKind`] and receive every matching [`SyncEvent`].
//! Registration and removal are safe from inside a callback: [`EventDispatcher::emit`] takes a
//! snapshot of the matching listeners, releases the lock and checks each listener is still
//! registered right before calling it. A listener removed mid-dispatch is not called afterwards;
//! one added mid-dispatch first sees the next event. No other listener is skipped or called twice.
//!
//! Every emitted event is also kept in a bounded, newest-first history.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::mirror::MirrorChange;
use crate::optimistic::pending::EditId;
use crate::ring::RingBuffer;
use crate::schema::{GameEvent, Player};
use crate::views::{InventoryEntry, QuestWithProgress};
use crate::{Identity, ServerEvent, TableName};

/// Something the client wants the application to know about.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SyncEvent {
    /// The connection is up and the identity is known.
    Connected {
        /// Who we are.
        identity: Identity,
    },
    /// The connection went away.
    Disconnected {
        /// Why.
        reason: String,
    },
    /// A connect attempt failed.
    ConnectionFailed {
        /// What the transport reported.
        reason: String,
    },
    /// A subscription failed to apply. The session is unusable until rebuilt.
    SubscriptionFailed {
        /// The failing table, if known.
        table: Option<TableName>,
        /// What went wrong.
        reason: String,
    },
    /// The snapshot loaded; the mirror is complete.
    StateReady,
    /// One row changed.
    RowChanged(MirrorChange),
    /// The player list changed. Carries every mirrored player.
    PlayersChanged(Vec<Player>),
    /// The local player's inventory changed.
    InventoryChanged {
        /// Owner.
        player_id: String,
        /// The whole inventory after the change.
        items: Vec<InventoryEntry>,
    },
    /// The local player's quest list or progress changed.
    QuestsChanged {
        /// Owner.
        player_id: String,
        /// Every quest with its progress after the change.
        quests: Vec<QuestWithProgress>,
    },
    /// A new game event was logged.
    GameEventLogged(GameEvent),
    /// A one-shot server event.
    Server(ServerEvent),
    /// A speculative edit was rolled back.
    EditReverted {
        /// Which edit.
        id: EditId,
        /// The reducer it belonged to.
        reducer: &'static str,
    },
}

impl SyncEvent {
    /// Whether a listener for `kind` receives this event.
    #[must_use]
    pub fn matches(&self, kind: EventKind) -> bool {
        match (kind, self) {
            (EventKind::Any, _) => true,
            (EventKind::Table(table), Self::RowChanged(change)) => change.table == table,
            (kind, event) => event.kind() == Some(kind),
        }
    }

    fn kind(&self) -> Option<EventKind> {
        Some(match self {
            Self::Connected { .. } => EventKind::Connected,
            Self::Disconnected { .. } => EventKind::Disconnected,
            Self::ConnectionFailed { .. } => EventKind::ConnectionFailed,
            Self::SubscriptionFailed { .. } => EventKind::SubscriptionFailed,
            Self::StateReady => EventKind::StateReady,
            Self::RowChanged(_) => return None,
            Self::PlayersChanged(_) => EventKind::PlayersChanged,
            Self::InventoryChanged { .. } => EventKind::InventoryChanged,
            Self::QuestsChanged { .. } => EventKind::QuestsChanged,
            Self::GameEventLogged(_) => EventKind::GameEventLogged,
            Self::Server(_) => EventKind::Server,
            Self::EditReverted { .. } => EventKind::EditReverted,
        })
    }
}

/// What a listener subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum EventKind {
    Connected,
    Disconnected,
    ConnectionFailed,
    SubscriptionFailed,
    StateReady,
    /// Row changes of one table.
    Table(TableName),
    PlayersChanged,
    InventoryChanged,
    QuestsChanged,
    GameEventLogged,
    Server,
    EditReverted,
    /// Everything.
    Any,
}

/// Handle returned by [`EventDispatcher::on`], used to deregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

type Callback = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

struct Listener {
    id: ListenerId,
    kind: EventKind,
    callback: Callback,
}

struct Registry {
    listeners: Vec<Listener>,
    next_id: u64,
    history: RingBuffer<SyncEvent>,
}

/// Registers callbacks and broadcasts [`SyncEvent`]s to them.
///
/// Cloning is cheap; clones share listeners and history.
#[derive(Clone)]
pub struct EventDispatcher {
    registry: Arc<Mutex<Registry>>,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.lock();
        f.debug_struct("EventDispatcher")
            .field("listeners", &registry.listeners.len())
            .field("history", &registry.history.len())
            .finish()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(crate::ClientConfig::DEFAULT_HISTORY_CAPACITY)
    }
}

impl EventDispatcher {
    /// Creates a dispatcher remembering at most `history_capacity` recent events.
    #[must_use]
    pub fn new(history_capacity: usize) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                listeners: Vec::new(),
                next_id: 0,
                history: RingBuffer::new(history_capacity),
            })),
        }
    }

    /// Registers `callback` for events of `kind`.
    ///
    /// Callbacks run on the thread that polls the client and must not block.
    pub fn on<F>(&self, kind: EventKind, callback: F) -> ListenerId
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        registry.next_id += 1;
        let id = ListenerId(registry.next_id);
        registry.listeners.push(Listener {
            id,
            kind,
            callback: Arc::new(callback),
        });
        id
    }

    /// Removes a listener. Returns `false` if it was already gone.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut registry = self.registry.lock();
        let before = registry.listeners.len();
        registry.listeners.retain(|listener| listener.id != id);
        registry.listeners.len() != before
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.registry.lock().listeners.len()
    }

    /// Recently emitted events, newest first.
    #[must_use]
    pub fn history(&self) -> Vec<SyncEvent> {
        self.registry.lock().history.iter().cloned().collect()
    }

    /// Broadcasts `event` to every matching listener, in registration order.
    pub fn emit(&self, event: SyncEvent) {
        let targets: SmallVec<[(ListenerId, Callback); 8]> = {
            let mut registry = self.registry.lock();
            registry.history.push_front(event.clone());
            registry
                .listeners
                .iter()
                .filter(|listener| event.matches(listener.kind))
                .map(|listener| (listener.id, Arc::clone(&listener.callback)))
                .collect()
        };

        for (id, callback) in targets {
            if self.is_registered(id) {
                callback(&event);
            }
        }
    }

    fn is_registered(&self, id: ListenerId) -> bool {
        self.registry
            .lock()
            .listeners
            .iter()
            .any(|listener| listener.id == id)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::mirror::{ChangeKind, RowKey};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter(dispatcher: &EventDispatcher, kind: EventKind) -> (ListenerId, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let id = dispatcher.on(kind, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (id, count)
    }

    fn row_change(table: TableName) -> SyncEvent {
        SyncEvent::RowChanged(MirrorChange {
            table,
            kind: ChangeKind::Delete,
            key: RowKey::Quest("q1".to_owned()),
            row: None,
            previous: None,
        })
    }

    #[test]
    fn listeners_receive_matching_events_only() {
        let dispatcher = EventDispatcher::new(8);
        let (_, ready) = counter(&dispatcher, EventKind::StateReady);
        let (_, quests) = counter(&dispatcher, EventKind::Table(TableName::Quest));
        let (_, all) = counter(&dispatcher, EventKind::Any);

        dispatcher.emit(SyncEvent::StateReady);
        dispatcher.emit(row_change(TableName::Quest));
        dispatcher.emit(row_change(TableName::Player));

        assert_eq!(ready.load(Ordering::SeqCst), 1);
        assert_eq!(quests.load(Ordering::SeqCst), 1);
        assert_eq!(all.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn off_stops_delivery() {
        let dispatcher = EventDispatcher::new(8);
        let (id, count) = counter(&dispatcher, EventKind::StateReady);
        assert!(dispatcher.off(id));
        assert!(!dispatcher.off(id));
        dispatcher.emit(SyncEvent::StateReady);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.listener_count(), 0);
    }

    #[test]
    fn listener_may_remove_itself_during_dispatch() {
        let dispatcher = EventDispatcher::new(8);
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicUsize::new(0));

        let (_, before) = counter(&dispatcher, EventKind::StateReady);
        let handle = dispatcher.clone();
        let own_id = Arc::clone(&slot);
        let own_calls = Arc::clone(&calls);
        let id = dispatcher.on(EventKind::StateReady, move |_| {
            own_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = *own_id.lock() {
                handle.off(id);
            }
        });
        *slot.lock() = Some(id);
        let (_, after) = counter(&dispatcher, EventKind::StateReady);

        dispatcher.emit(SyncEvent::StateReady);
        dispatcher.emit(SyncEvent::StateReady);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(before.load(Ordering::SeqCst), 2);
        assert_eq!(after.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn listener_removed_by_an_earlier_one_is_not_called() {
        let dispatcher = EventDispatcher::new(8);
        let victim: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));
        let handle = dispatcher.clone();
        let target = Arc::clone(&victim);
        dispatcher.on(EventKind::StateReady, move |_| {
            if let Some(id) = target.lock().take() {
                handle.off(id);
            }
        });
        let (id, count) = counter(&dispatcher, EventKind::StateReady);
        *victim.lock() = Some(id);

        dispatcher.emit(SyncEvent::StateReady);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn listener_added_during_dispatch_waits_for_the_next_event() {
        let dispatcher = EventDispatcher::new(8);
        let added = Arc::new(AtomicUsize::new(0));
        let handle = dispatcher.clone();
        let added_calls = Arc::clone(&added);
        let once = Arc::new(Mutex::new(false));
        dispatcher.on(EventKind::StateReady, move |_| {
            let mut done = once.lock();
            if !*done {
                *done = true;
                let calls = Arc::clone(&added_calls);
                handle.on(EventKind::StateReady, move |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        dispatcher.emit(SyncEvent::StateReady);
        assert_eq!(added.load(Ordering::SeqCst), 0);
        dispatcher.emit(SyncEvent::StateReady);
        assert_eq!(added.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn history_is_bounded_newest_first() {
        let dispatcher = EventDispatcher::new(2);
        dispatcher.emit(SyncEvent::StateReady);
        dispatcher.emit(SyncEvent::Disconnected {
            reason: "a".to_owned(),
        });
        dispatcher.emit(SyncEvent::Disconnected {
            reason: "b".to_owned(),
        });
        assert_eq!(dispatcher.history(), vec![
            SyncEvent::Disconnected {
                reason: "b".to_owned()
            },
            SyncEvent::Disconnected {
                reason: "a".to_owned()
            },
        ]);
    }
}
