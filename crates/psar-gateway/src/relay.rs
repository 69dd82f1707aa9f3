use tracing::{debug, warn};
use uuid::Uuid;

use psar_types::events::GatewayEvent;
use psar_types::models::Message;

use crate::registry::RoomRegistry;

/// Server-side fan-out of persisted messages to live room members.
///
/// Invoked by the write path after the message commits. Delivery is
/// best-effort, at-most-once: a dead connection is logged and skipped,
/// and nothing here can fail the write that triggered it. Recipients
/// that miss a relay pick the message up on their next fetch.
#[derive(Clone)]
pub struct MessageRelay {
    registry: RoomRegistry,
}

impl MessageRelay {
    pub fn new(registry: RoomRegistry) -> Self {
        Self { registry }
    }

    /// Fan a persisted message out to every connection in the room,
    /// including the sender's own connections — a user with the thread
    /// open in two tabs wants both to update. Self-echo suppression is
    /// the receiving client's job, keyed on sender id.
    ///
    /// An empty room is a normal no-op, not an error.
    pub async fn relay(&self, room_id: Uuid, message: &Message) -> usize {
        let members = self.registry.members_of(room_id).await;
        if members.is_empty() {
            debug!("relay to {}: no live members, skipping", room_id);
            return 0;
        }

        let mut delivered = 0;
        for member in &members {
            let event = GatewayEvent::NewMessage {
                room_id,
                message: message.clone(),
            };
            // Enqueues onto the connection's own writer; one slow or dead
            // socket never stalls the others.
            if member.send(event) {
                delivered += 1;
            } else {
                warn!(
                    "relay to {}: connection {} unreachable, dropping",
                    room_id, member.conn_id
                );
            }
        }

        debug!(
            "relayed message {} to {}/{} members of {}",
            message.id,
            delivered,
            members.len(),
            room_id
        );
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message(sender_id: Uuid, thread_id: Uuid) -> Message {
        Message {
            id: Uuid::new_v4(),
            thread_id,
            sender_id,
            body: "hello".into(),
            read: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn empty_room_is_a_silent_noop() {
        let registry = RoomRegistry::new();
        let relay = MessageRelay::new(registry);
        let room = Uuid::new_v4();

        let delivered = relay.relay(room, &message(Uuid::new_v4(), room)).await;
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn every_member_receives_exactly_once_including_sender() {
        let registry = RoomRegistry::new();
        let relay = MessageRelay::new(registry.clone());
        let room = Uuid::new_v4();
        let sender = Uuid::new_v4();

        // Sender's own connection A plus counterpart connection B
        let (conn_a, mut rx_a) = registry.register(sender).await;
        let (conn_b, mut rx_b) = registry.register(Uuid::new_v4()).await;
        registry.join(conn_a, room).await;
        registry.join(conn_b, room).await;

        let msg = message(sender, room);
        let delivered = relay.relay(room, &msg).await;
        assert_eq!(delivered, 2);

        // The relay does NOT filter the sender — that is the reconciler's job
        for rx in [&mut rx_a, &mut rx_b] {
            match rx.recv().await.unwrap() {
                GatewayEvent::NewMessage { room_id, message } => {
                    assert_eq!(room_id, room);
                    assert_eq!(message.id, msg.id);
                }
                other => panic!("unexpected event: {:?}", other),
            }
            assert!(rx.try_recv().is_err(), "exactly one copy per connection");
        }
    }

    #[tokio::test]
    async fn per_room_order_follows_relay_order() {
        let registry = RoomRegistry::new();
        let relay = MessageRelay::new(registry.clone());
        let room = Uuid::new_v4();

        let (conn, mut rx) = registry.register(Uuid::new_v4()).await;
        registry.join(conn, room).await;

        let first = message(Uuid::new_v4(), room);
        let second = message(Uuid::new_v4(), room);
        relay.relay(room, &first).await;
        relay.relay(room, &second).await;

        let ids: Vec<Uuid> = [rx.recv().await.unwrap(), rx.recv().await.unwrap()]
            .into_iter()
            .map(|ev| match ev {
                GatewayEvent::NewMessage { message, .. } => message.id,
                other => panic!("unexpected event: {:?}", other),
            })
            .collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn dead_connection_does_not_affect_the_rest() {
        let registry = RoomRegistry::new();
        let relay = MessageRelay::new(registry.clone());
        let room = Uuid::new_v4();

        let (conn_a, rx_a) = registry.register(Uuid::new_v4()).await;
        let (conn_b, mut rx_b) = registry.register(Uuid::new_v4()).await;
        registry.join(conn_a, room).await;
        registry.join(conn_b, room).await;

        // Writer task is gone but no disconnect signal has arrived yet
        drop(rx_a);

        let msg = message(Uuid::new_v4(), room);
        let delivered = relay.relay(room, &msg).await;
        assert_eq!(delivered, 1);
        assert!(rx_b.recv().await.is_some());
    }
}
