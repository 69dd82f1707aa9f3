//! Client-side view reconciliation for one conversation thread.
//!
//! A sender appends its own message optimistically the moment it is typed,
//! before the HTTP write returns. The relay later echoes that same message
//! back to every connection in the room, the sender's included, so the
//! relayed self-copy must be discarded or the sender renders it twice.

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use psar_types::events::GatewayCommand;
use psar_types::models::Message;

/// Where the reconciler sends join/leave commands. A seam so view logic
/// tests run without a live gateway connection.
pub trait CommandSink {
    fn send_command(&self, cmd: GatewayCommand);
}

impl CommandSink for tokio::sync::mpsc::UnboundedSender<GatewayCommand> {
    fn send_command(&self, cmd: GatewayCommand) {
        // Connection may already be gone; reconnect logic re-asserts rooms
        let _ = self.send(cmd);
    }
}

/// What became of a relayed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// Our own message echoed back — already in the view optimistically.
    SelfEcho,
    /// Already rendered (duplicate delivery).
    Duplicate,
    /// Appended to the view. `mark_read` is set when this thread is the
    /// active view and the caller owes the server a mark-read call.
    Appended { mark_read: bool },
}

/// Pure merge of optimistic local sends with relayed authoritative events:
/// the sender's own relayed copies are dropped in favor of the optimistic
/// ones, duplicates collapse by id, and the result is ordered by creation
/// time.
pub fn merge_view(optimistic: &[Message], relayed: &[Message], self_id: Uuid) -> Vec<Message> {
    let mut view: Vec<Message> = optimistic.to_vec();

    for message in relayed {
        if message.sender_id == self_id {
            continue;
        }
        if view.iter().any(|m| m.id == message.id) {
            continue;
        }
        view.push(message.clone());
    }

    view.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    view
}

/// Ordered view state for one open thread.
pub struct ThreadView {
    pub thread_id: Uuid,
    self_id: Uuid,
    /// Whether this thread is the currently-visible one.
    active: bool,
    messages: Vec<Message>,
}

impl ThreadView {
    pub fn new(thread_id: Uuid, self_id: Uuid, history: Vec<Message>) -> Self {
        Self {
            thread_id,
            self_id,
            active: false,
            messages: history,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Open the thread: join its room and report whether unread counterpart
    /// messages are already in view (the caller then marks the thread read).
    pub fn on_opened(&mut self, sink: &impl CommandSink) -> bool {
        self.active = true;
        sink.send_command(GatewayCommand::JoinRoom {
            room_id: self.thread_id,
        });
        self.messages
            .iter()
            .any(|m| m.sender_id != self.self_id && !m.read)
    }

    /// Close the thread: leave the room so fan-out effort stops.
    pub fn on_closed(&mut self, sink: &impl CommandSink) {
        self.active = false;
        sink.send_command(GatewayCommand::LeaveRoom {
            room_id: self.thread_id,
        });
    }

    /// Append a locally-synthesized message immediately, without waiting for
    /// the network round-trip. The id is temporary; the relayed copy that
    /// would carry the real id is discarded as self-echo anyway.
    pub fn on_local_send(&mut self, body: &str) -> Message {
        let message = Message {
            id: Uuid::new_v4(),
            thread_id: self.thread_id,
            sender_id: self.self_id,
            body: body.to_string(),
            read: false,
            created_at: Utc::now(),
        };
        self.messages.push(message.clone());
        message
    }

    /// Merge one relayed event into the view.
    pub fn on_relayed(&mut self, message: Message) -> Reconciled {
        if message.sender_id == self.self_id {
            debug!("discarding self-echo of message {}", message.id);
            return Reconciled::SelfEcho;
        }
        if self.messages.iter().any(|m| m.id == message.id) {
            return Reconciled::Duplicate;
        }
        self.messages.push(message);
        Reconciled::Appended {
            mark_read: self.active,
        }
    }
}
