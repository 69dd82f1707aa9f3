use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A chat message as seen by clients. Owned by the persistence layer —
/// the real-time core only relays and merges fully-formed messages,
/// never mutates their fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Status of a boost/purchase payment awaiting confirmation.
/// `Active` is terminal — there is no reverse edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Active,
}

/// One boost/purchase awaiting external payment confirmation,
/// keyed by its opaque tracking hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingPayment {
    pub tracking_hash: String,
    pub purchase_id: String,
    pub amount: f64,
    pub currency: String,
    pub duration_hours: i64,
    pub status: PaymentStatus,
    pub qr_payload: String,
    pub created_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Wall-clock horizon after which pollers should give up.
    pub poll_deadline: DateTime<Utc>,
}
