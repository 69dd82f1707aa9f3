use crate::Database;
use crate::models::{MessageRow, PendingPaymentRow};
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    // -- Messages --

    pub fn insert_message(
        &self,
        id: &str,
        thread_id: &str,
        sender_id: &str,
        body: &str,
        created_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, thread_id, sender_id, body, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, thread_id, sender_id, body, created_at],
            )?;
            Ok(())
        })
    }

    pub fn get_messages(
        &self,
        thread_id: &str,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_messages(conn, thread_id, limit, before))
    }

    /// Mark every message in a thread that was NOT sent by `reader_id` as read.
    /// Returns the number of rows flipped.
    pub fn mark_thread_read(&self, thread_id: &str, reader_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE messages SET read = 1 WHERE thread_id = ?1 AND sender_id != ?2 AND read = 0",
                rusqlite::params![thread_id, reader_id],
            )?;
            Ok(n)
        })
    }

    // -- Pending payments --

    /// Returns false when the row lost a uniqueness race (same purchase id
    /// or tracking hash already tracked) — callers re-read the winner.
    pub fn insert_pending_payment(&self, row: &PendingPaymentRow) -> Result<bool> {
        self.with_conn(|conn| {
            let result = conn.execute(
                "INSERT INTO pending_payments
                 (tracking_hash, purchase_id, amount, currency, duration_hours, status, qr_payload, created_at, poll_deadline)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    row.tracking_hash,
                    row.purchase_id,
                    row.amount,
                    row.currency,
                    row.duration_hours,
                    row.status,
                    row.qr_payload,
                    row.created_at,
                    row.poll_deadline,
                ],
            );
            match result {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_pending_payment(&self, tracking_hash: &str) -> Result<Option<PendingPaymentRow>> {
        self.with_conn(|conn| query_payment(conn, "tracking_hash", tracking_hash))
    }

    pub fn get_payment_by_purchase(&self, purchase_id: &str) -> Result<Option<PendingPaymentRow>> {
        self.with_conn(|conn| query_payment(conn, "purchase_id", purchase_id))
    }

    /// The pending->active transition. Conditional on the row still being
    /// pending, so concurrent callers cannot both win: exactly one caller
    /// sees `true`, everyone else sees `false` and must re-read.
    pub fn activate_payment(
        &self,
        tracking_hash: &str,
        activated_at: &str,
        expires_at: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE pending_payments
                 SET status = 'active', activated_at = ?2, expires_at = ?3
                 WHERE tracking_hash = ?1 AND status = 'pending'",
                rusqlite::params![tracking_hash, activated_at, expires_at],
            )?;
            Ok(n == 1)
        })
    }
}

fn query_messages(
    conn: &Connection,
    thread_id: &str,
    limit: u32,
    before: Option<&str>,
) -> Result<Vec<MessageRow>> {
    // Cursor-based pagination: `before` is the created_at of the oldest
    // message from the previous page.
    let mut stmt = conn.prepare(
        "SELECT id, thread_id, sender_id, body, read, created_at
         FROM messages
         WHERE thread_id = ?1 AND (?2 IS NULL OR created_at < ?2)
         ORDER BY created_at DESC
         LIMIT ?3",
    )?;

    let mut rows = stmt
        .query_map(rusqlite::params![thread_id, before, limit], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                thread_id: row.get(1)?,
                sender_id: row.get(2)?,
                body: row.get(3)?,
                read: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    // Fetched newest-first for the LIMIT; callers render oldest-first.
    rows.reverse();
    Ok(rows)
}

fn query_payment(conn: &Connection, column: &str, value: &str) -> Result<Option<PendingPaymentRow>> {
    let sql = format!(
        "SELECT tracking_hash, purchase_id, amount, currency, duration_hours, status, qr_payload,
                created_at, activated_at, expires_at, poll_deadline
         FROM pending_payments WHERE {} = ?1",
        column
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(PendingPaymentRow {
                tracking_hash: row.get(0)?,
                purchase_id: row.get(1)?,
                amount: row.get(2)?,
                currency: row.get(3)?,
                duration_hours: row.get(4)?,
                status: row.get(5)?,
                qr_payload: row.get(6)?,
                created_at: row.get(7)?,
                activated_at: row.get(8)?,
                expires_at: row.get(9)?,
                poll_deadline: row.get(10)?,
            })
        })
        .optional()?;

    Ok(row)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn message_roundtrip_and_cursor() {
        let db = db();
        for i in 0..5 {
            db.insert_message(
                &format!("m{}", i),
                "t1",
                "u1",
                "hello",
                &format!("2026-01-01T00:00:0{}Z", i),
            )
            .unwrap();
        }

        let all = db.get_messages("t1", 50, None).unwrap();
        assert_eq!(all.len(), 5);
        // Oldest first after the reverse
        assert_eq!(all[0].id, "m0");
        assert_eq!(all[4].id, "m4");

        let older = db
            .get_messages("t1", 50, Some("2026-01-01T00:00:02Z"))
            .unwrap();
        assert_eq!(older.len(), 2);
        assert_eq!(older.last().unwrap().id, "m1");
    }

    #[test]
    fn mark_read_skips_own_messages() {
        let db = db();
        db.insert_message("m1", "t1", "alice", "hi", "2026-01-01T00:00:00Z")
            .unwrap();
        db.insert_message("m2", "t1", "bob", "hey", "2026-01-01T00:00:01Z")
            .unwrap();

        let flipped = db.mark_thread_read("t1", "alice").unwrap();
        assert_eq!(flipped, 1);

        let rows = db.get_messages("t1", 50, None).unwrap();
        let m1 = rows.iter().find(|r| r.id == "m1").unwrap();
        let m2 = rows.iter().find(|r| r.id == "m2").unwrap();
        assert!(!m1.read, "own message is never marked read by the sender");
        assert!(m2.read);

        // Second pass is a no-op
        assert_eq!(db.mark_thread_read("t1", "alice").unwrap(), 0);
    }

    #[test]
    fn activate_payment_is_conditional_on_pending() {
        let db = db();
        db.insert_pending_payment(&crate::models::PendingPaymentRow {
            tracking_hash: "ABC123".into(),
            purchase_id: "boost-1".into(),
            amount: 1.5,
            currency: "USD".into(),
            duration_hours: 168,
            status: "pending".into(),
            qr_payload: "qr".into(),
            created_at: "2026-01-01T00:00:00Z".into(),
            activated_at: None,
            expires_at: None,
            poll_deadline: "2026-01-01T00:10:00Z".into(),
        })
        .unwrap();

        assert!(
            db.activate_payment("ABC123", "2026-01-01T00:01:00Z", "2026-01-08T00:01:00Z")
                .unwrap()
        );
        // Second activation loses the conditional write
        assert!(
            !db.activate_payment("ABC123", "2026-01-01T00:02:00Z", "2026-01-08T00:02:00Z")
                .unwrap()
        );

        let row = db.get_pending_payment("ABC123").unwrap().unwrap();
        assert_eq!(row.status, "active");
        // First writer's timestamps stick
        assert_eq!(row.activated_at.as_deref(), Some("2026-01-01T00:01:00Z"));
    }

    #[test]
    fn duplicate_pending_payment_is_reported_not_raised() {
        let db = db();
        let row = crate::models::PendingPaymentRow {
            tracking_hash: "H1".into(),
            purchase_id: "boost-1".into(),
            amount: 1.5,
            currency: "USD".into(),
            duration_hours: 168,
            status: "pending".into(),
            qr_payload: "qr".into(),
            created_at: "2026-01-01T00:00:00Z".into(),
            activated_at: None,
            expires_at: None,
            poll_deadline: "2026-01-01T00:10:00Z".into(),
        };
        assert!(db.insert_pending_payment(&row).unwrap());

        // Same purchase, different hash: the UNIQUE constraint reports
        // a lost race instead of surfacing an error
        let rival = crate::models::PendingPaymentRow {
            tracking_hash: "H2".into(),
            ..row
        };
        assert!(!db.insert_pending_payment(&rival).unwrap());

        let stored = db.get_payment_by_purchase("boost-1").unwrap().unwrap();
        assert_eq!(stored.tracking_hash, "H1");
    }

    #[test]
    fn unknown_hash_is_none() {
        let db = db();
        assert!(db.get_pending_payment("ZZZ").unwrap().is_none());
        assert!(!db.activate_payment("ZZZ", "t", "t").unwrap());
    }
}
