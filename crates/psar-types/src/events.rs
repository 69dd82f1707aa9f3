use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

/// Events sent over the WebSocket gateway, server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid },

    /// A persisted message is being fanned out to room members.
    /// Delivered to every connection in the room, including the
    /// sender's own — clients drop their own echo on receipt.
    NewMessage { room_id: Uuid, message: Message },
}

/// Commands sent FROM client TO server over WebSocket.
///
/// There is deliberately no client-side "send message" command: messages
/// are written through the HTTP API, which relays after the write commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Start receiving events for a conversation thread. Idempotent.
    JoinRoom { room_id: Uuid },

    /// Stop receiving events for a conversation thread. Idempotent.
    LeaveRoom { room_id: Uuid },
}
