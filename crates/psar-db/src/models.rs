/// Database row types — these map directly to SQLite rows.
/// Distinct from psar-types API models to keep the DB layer independent.

pub struct MessageRow {
    pub id: String,
    pub thread_id: String,
    pub sender_id: String,
    pub body: String,
    pub read: bool,
    pub created_at: String,
}

#[derive(Clone)]
pub struct PendingPaymentRow {
    pub tracking_hash: String,
    pub purchase_id: String,
    pub amount: f64,
    pub currency: String,
    pub duration_hours: i64,
    pub status: String,
    pub qr_payload: String,
    pub created_at: String,
    pub activated_at: Option<String>,
    pub expires_at: Option<String>,
    pub poll_deadline: String,
}
