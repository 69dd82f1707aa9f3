use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use psar_types::events::GatewayEvent;

/// A live client transport session held by the registry. One user may own
/// several of these at once (multiple open tabs).
#[derive(Clone)]
pub struct ConnectionHandle {
    pub conn_id: Uuid,
    pub user_id: Uuid,
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

impl ConnectionHandle {
    /// Enqueue an event for this connection's writer task.
    /// Returns false if the connection is gone; callers log and move on.
    pub fn send(&self, event: GatewayEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Maps conversation rooms to the connections currently viewing them.
///
/// Explicitly instantiated at server start and injected where needed —
/// never a module-level singleton, so tests can run isolated instances.
/// Scoped to one server process; there is no cross-instance backplane.
#[derive(Clone)]
pub struct RoomRegistry {
    inner: Arc<RwLock<RegistryState>>,
}

/// Connections and room membership live behind one lock so a racing
/// join/leave/disconnect on the same (connection, room) pair cannot
/// interleave into a lost update.
#[derive(Default)]
struct RegistryState {
    connections: HashMap<Uuid, ConnectionHandle>,
    rooms: HashMap<Uuid, HashSet<Uuid>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryState::default())),
        }
    }

    /// Register a freshly-handshaken connection with zero room memberships.
    /// Returns the connection id and the receiver its writer task drains.
    pub async fn register(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ConnectionHandle {
            conn_id,
            user_id,
            tx,
        };
        self.inner.write().await.connections.insert(conn_id, handle);
        (conn_id, rx)
    }

    /// Add a connection to a room. Idempotent; rooms are created implicitly
    /// on first join. A join from an unregistered connection is ignored.
    pub async fn join(&self, conn_id: Uuid, room_id: Uuid) {
        let mut state = self.inner.write().await;
        if !state.connections.contains_key(&conn_id) {
            return;
        }
        state.rooms.entry(room_id).or_default().insert(conn_id);
    }

    /// Remove a connection from a room. Idempotent — no error if it was
    /// never a member. Empty rooms are dropped from the map.
    pub async fn leave(&self, conn_id: Uuid, room_id: Uuid) {
        let mut state = self.inner.write().await;
        if let Some(members) = state.rooms.get_mut(&room_id) {
            members.remove(&conn_id);
            if members.is_empty() {
                state.rooms.remove(&room_id);
            }
        }
    }

    /// Snapshot of the room's current member connections. May be empty.
    pub async fn members_of(&self, room_id: Uuid) -> Vec<ConnectionHandle> {
        let state = self.inner.read().await;
        match state.rooms.get(&room_id) {
            Some(members) => members
                .iter()
                .filter_map(|conn_id| state.connections.get(conn_id).cloned())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Transport-level disconnect cleanup: the connection leaves every room
    /// it was a member of, explicit leave or not.
    pub async fn on_disconnect(&self, conn_id: Uuid) {
        let mut state = self.inner.write().await;
        state.connections.remove(&conn_id);
        state.rooms.retain(|_, members| {
            members.remove(&conn_id);
            !members.is_empty()
        });
    }

    /// Number of rooms with at least one member.
    pub async fn room_count(&self) -> usize {
        self.inner.read().await.rooms.len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_is_idempotent() {
        let registry = RoomRegistry::new();
        let room = Uuid::new_v4();
        let (conn, _rx) = registry.register(Uuid::new_v4()).await;

        registry.join(conn, room).await;
        registry.join(conn, room).await;
        registry.join(conn, room).await;

        assert_eq!(registry.members_of(room).await.len(), 1);
    }

    #[tokio::test]
    async fn leave_is_idempotent() {
        let registry = RoomRegistry::new();
        let room = Uuid::new_v4();
        let (conn, _rx) = registry.register(Uuid::new_v4()).await;

        // Leave before ever joining — no error, no membership
        registry.leave(conn, room).await;
        assert!(registry.members_of(room).await.is_empty());

        registry.join(conn, room).await;
        registry.leave(conn, room).await;
        registry.leave(conn, room).await;
        assert!(registry.members_of(room).await.is_empty());
    }

    #[tokio::test]
    async fn membership_matches_net_effect_of_sequence() {
        let registry = RoomRegistry::new();
        let room = Uuid::new_v4();
        let (conn, _rx) = registry.register(Uuid::new_v4()).await;

        // join, leave, join => present
        registry.join(conn, room).await;
        registry.leave(conn, room).await;
        registry.join(conn, room).await;
        assert_eq!(registry.members_of(room).await.len(), 1);

        // join then disconnect => absent
        registry.on_disconnect(conn).await;
        assert!(registry.members_of(room).await.is_empty());
    }

    #[tokio::test]
    async fn disconnect_removes_from_every_room() {
        let registry = RoomRegistry::new();
        let (conn, _rx) = registry.register(Uuid::new_v4()).await;
        let rooms: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();

        for &room in &rooms {
            registry.join(conn, room).await;
        }
        assert_eq!(registry.room_count().await, 3);

        registry.on_disconnect(conn).await;
        for &room in &rooms {
            assert!(registry.members_of(room).await.is_empty());
        }
        assert_eq!(registry.room_count().await, 0);
    }

    #[tokio::test]
    async fn empty_rooms_are_dropped() {
        let registry = RoomRegistry::new();
        let room = Uuid::new_v4();
        let (a, _rxa) = registry.register(Uuid::new_v4()).await;
        let (b, _rxb) = registry.register(Uuid::new_v4()).await;

        registry.join(a, room).await;
        registry.join(b, room).await;
        registry.leave(a, room).await;
        assert_eq!(registry.room_count().await, 1);

        registry.leave(b, room).await;
        assert_eq!(registry.room_count().await, 0);
    }

    #[tokio::test]
    async fn one_user_many_connections() {
        let registry = RoomRegistry::new();
        let room = Uuid::new_v4();
        let user = Uuid::new_v4();

        // Same user, two tabs: both connections are members
        let (a, _rxa) = registry.register(user).await;
        let (b, _rxb) = registry.register(user).await;
        registry.join(a, room).await;
        registry.join(b, room).await;

        let members = registry.members_of(room).await;
        assert_eq!(members.len(), 2);
        assert!(members.iter().all(|m| m.user_id == user));
    }

    #[tokio::test]
    async fn join_from_unregistered_connection_is_ignored() {
        let registry = RoomRegistry::new();
        let room = Uuid::new_v4();

        registry.join(Uuid::new_v4(), room).await;
        assert!(registry.members_of(room).await.is_empty());
        assert_eq!(registry.room_count().await, 0);
    }
}
