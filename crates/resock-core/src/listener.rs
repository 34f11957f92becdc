//! Registry of external raw-event listeners.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::message::{EventKind, SocketEvent};

/// Token identifying one registered listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ListenerId(u64);

/// A raw-event listener callback.
pub type Listener = Arc<dyn Fn(&SocketEvent) + Send + Sync>;

/// Listeners grouped by event kind, each group kept in registration order.
#[derive(Default)]
pub struct ListenerRegistry {
    by_kind: BTreeMap<EventKind, Vec<(ListenerId, Listener)>>,
    next_id: u64,
}

impl ListenerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `kind` and return its token.
    pub fn add(&mut self, kind: EventKind, listener: Listener) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.by_kind.entry(kind).or_default().push((id, listener));
        id
    }

    /// Remove the exact (`kind`, `id`) pair.
    ///
    /// Returns `false` when the pair was not registered; that is not an error.
    pub fn remove(&mut self, kind: EventKind, id: ListenerId) -> bool {
        let Some(listeners) = self.by_kind.get_mut(&kind) else {
            return false;
        };
        let Some(index) = listeners.iter().position(|(listener_id, _)| *listener_id == id) else {
            return false;
        };
        listeners.remove(index);
        if listeners.is_empty() {
            self.by_kind.remove(&kind);
        }
        true
    }

    /// Listeners for `kind`, in registration order.
    ///
    /// The returned handles are clones, so they can be invoked after the
    /// registry's owner has released its lock.
    pub fn listeners(&self, kind: EventKind) -> Vec<Listener> {
        self.by_kind
            .get(&kind)
            .map(|listeners| listeners.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default()
    }

    /// Tokens registered for `kind`, in registration order.
    pub fn ids(&self, kind: EventKind) -> Vec<ListenerId> {
        self.by_kind
            .get(&kind)
            .map(|listeners| listeners.iter().map(|(id, _)| *id).collect())
            .unwrap_or_default()
    }

    /// Number of listeners registered for `kind`.
    pub fn len(&self, kind: EventKind) -> usize {
        self.by_kind.get(&kind).map_or(0, Vec::len)
    }

    /// Total number of listeners across all kinds.
    pub fn total(&self) -> usize {
        self.by_kind.values().map(Vec::len).sum()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }

    /// Per-kind listener counts, for debug displays.
    pub fn summary(&self) -> BTreeMap<EventKind, usize> {
        self.by_kind
            .iter()
            .map(|(kind, listeners)| (*kind, listeners.len()))
            .collect()
    }

    /// Remove every listener.
    pub fn clear(&mut self) {
        self.by_kind.clear();
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.summary())
            .finish()
    }
}
