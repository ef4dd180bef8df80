use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use tokio::sync::{broadcast, Mutex, RwLock};
use uuid::Uuid;

use crate::auth::Identity;

use super::protocol::ServerEvent;

pub type ConnId = Uuid;

const GROUP_CAPACITY: usize = 256;

/// An event on a room's broadcast group. `origin` is the connection that
/// caused it, which does not receive its own copy.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub origin: Option<ConnId>,
    pub event: ServerEvent,
}

struct RoomGroup {
    tx: broadcast::Sender<Envelope>,
    /// Held across persist + publish so members see messages in the order
    /// they were stored.
    writer: Arc<Mutex<()>>,
}

impl RoomGroup {
    fn new() -> RoomGroup {
        RoomGroup {
            tx: broadcast::channel(GROUP_CAPACITY).0,
            writer: Arc::new(Mutex::new(())),
        }
    }

    /// No subscribers and nobody holding the writer.
    fn is_idle(&self) -> bool {
        self.tx.receiver_count() == 0 && Arc::strong_count(&self.writer) == 1
    }
}

/// Live state of one socket connection.
#[derive(Debug, Clone)]
pub struct ConnectionSession {
    pub user_id: Uuid,
    pub name: String,
    pub rooms: HashSet<Uuid>,
}

#[derive(Default)]
struct HubInner {
    groups: RwLock<HashMap<Uuid, RoomGroup>>,
    sessions: RwLock<HashMap<ConnId, ConnectionSession>>,
}

/// Room broadcast groups plus the session table of live connections.
#[derive(Clone, Default)]
pub struct Hub {
    inner: Arc<HubInner>,
}

impl Hub {
    pub fn new() -> Hub {
        Hub::default()
    }

    pub async fn subscribe(&self, room_id: Uuid) -> broadcast::Receiver<Envelope> {
        let mut groups = self.inner.groups.write().await;
        groups.entry(room_id).or_insert_with(RoomGroup::new).tx.subscribe()
    }

    /// Returns how many connections the event reached.
    pub async fn publish(&self, room_id: Uuid, origin: Option<ConnId>, event: ServerEvent) -> usize {
        let groups = self.inner.groups.read().await;
        let Some(group) = groups.get(&room_id) else {
            return 0;
        };
        group.tx.send(Envelope { origin, event }).unwrap_or(0)
    }

    pub async fn writer(&self, room_id: Uuid) -> Arc<Mutex<()>> {
        let mut groups = self.inner.groups.write().await;
        groups.entry(room_id).or_insert_with(RoomGroup::new).writer.clone()
    }

    /// Drops the room's group if it is idle. Called once a writer handle
    /// from [`Hub::writer`] has been released.
    pub async fn release(&self, room_id: Uuid) {
        let mut groups = self.inner.groups.write().await;
        if groups.get(&room_id).is_some_and(RoomGroup::is_idle) {
            groups.remove(&room_id);
        }
    }

    /// Records a new connection. True if it is the user's first live one.
    pub async fn register(&self, conn_id: ConnId, identity: &Identity) -> bool {
        let mut sessions = self.inner.sessions.write().await;
        let first = !sessions.values().any(|s| s.user_id == identity.user_id);
        sessions.insert(
            conn_id,
            ConnectionSession {
                user_id: identity.user_id,
                name: identity.name.clone(),
                rooms: HashSet::new(),
            },
        );
        first
    }

    pub async fn record_join(&self, conn_id: ConnId, room_id: Uuid) {
        if let Some(session) = self.inner.sessions.write().await.get_mut(&conn_id) {
            session.rooms.insert(room_id);
        }
    }

    pub async fn is_joined(&self, conn_id: ConnId, room_id: Uuid) -> bool {
        self.inner
            .sessions
            .read()
            .await
            .get(&conn_id)
            .is_some_and(|s| s.rooms.contains(&room_id))
    }

    /// Drops a connection's session. The flag is true when that was the
    /// user's last live connection.
    pub async fn unregister(&self, conn_id: ConnId) -> Option<(ConnectionSession, bool)> {
        let (session, last) = {
            let mut sessions = self.inner.sessions.write().await;
            let session = sessions.remove(&conn_id)?;
            let last = !sessions.values().any(|s| s.user_id == session.user_id);
            (session, last)
        };

        let mut groups = self.inner.groups.write().await;
        for room_id in &session.rooms {
            if groups.get(room_id).is_some_and(RoomGroup::is_idle) {
                groups.remove(room_id);
            }
        }

        Some((session, last))
    }

    pub async fn online_users(&self) -> HashSet<Uuid> {
        self.inner.sessions.read().await.values().map(|s| s.user_id).collect()
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    pub async fn group_count(&self) -> usize {
        self.inner.groups.read().await.len()
    }
}
