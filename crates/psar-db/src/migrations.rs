use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS messages (
            id          TEXT PRIMARY KEY,
            thread_id   TEXT NOT NULL,
            sender_id   TEXT NOT NULL,
            body        TEXT NOT NULL,
            read        INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_thread
            ON messages(thread_id, created_at);

        CREATE TABLE IF NOT EXISTS pending_payments (
            tracking_hash   TEXT PRIMARY KEY,
            purchase_id     TEXT NOT NULL UNIQUE,
            amount          REAL NOT NULL,
            currency        TEXT NOT NULL,
            duration_hours  INTEGER NOT NULL,
            status          TEXT NOT NULL DEFAULT 'pending',
            qr_payload      TEXT NOT NULL,
            created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            activated_at    TEXT,
            expires_at      TEXT,
            poll_deadline   TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_payments_purchase
            ON pending_payments(purchase_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
