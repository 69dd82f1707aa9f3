use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use psar_db::Database;
use psar_db::models::PendingPaymentRow;
use psar_types::models::{PaymentStatus, PendingPayment};

use crate::verifier::PaymentVerifier;
use crate::{PaymentError, tracking_hash};

/// How long a freshly-minted payment stays worth polling.
const POLL_HORIZON_MINUTES: i64 = 30;

/// What a status poll learned. `Activated` is reported to exactly one
/// caller per payment; every later (or concurrently losing) caller gets
/// `AlreadyActive` with the original timestamps.
#[derive(Debug, Clone, PartialEq)]
pub enum Activation {
    NotPaid,
    Activated(ActivatedBoost),
    AlreadyActive(ActivatedBoost),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActivatedBoost {
    pub purchase_id: String,
    pub activated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Drives pending payments to their terminal `active` state.
#[derive(Clone)]
pub struct PaymentConfirmer {
    db: Arc<Database>,
    verifier: Arc<dyn PaymentVerifier>,
}

impl PaymentConfirmer {
    pub fn new(db: Arc<Database>, verifier: Arc<dyn PaymentVerifier>) -> Self {
        Self { db, verifier }
    }

    /// Run blocking store access off the async runtime, same discipline as
    /// the HTTP handlers.
    async fn with_db<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| anyhow::anyhow!("blocking task join error: {}", e))?
    }

    /// Mint a trackable payment for a purchase. Creating twice for the same
    /// purchase id hands back the existing record instead of a second hash,
    /// so a double-submitted boost cannot race itself.
    pub async fn create(
        &self,
        purchase_id: &str,
        amount: f64,
        currency: &str,
        duration_hours: i64,
    ) -> Result<PendingPayment> {
        let pid = purchase_id.to_string();
        if let Some(existing) = self.with_db(move |db| db.get_payment_by_purchase(&pid)).await? {
            return row_to_payment(existing);
        }

        let qr_payload = self
            .verifier
            .generate_qr(purchase_id, amount, currency)
            .await?;
        let hash = tracking_hash(&qr_payload);
        let now = Utc::now();
        let poll_deadline = now + Duration::minutes(POLL_HORIZON_MINUTES);

        let row = PendingPaymentRow {
            tracking_hash: hash,
            purchase_id: purchase_id.to_string(),
            amount,
            currency: currency.to_string(),
            duration_hours,
            status: "pending".into(),
            qr_payload,
            created_at: now.to_rfc3339(),
            activated_at: None,
            expires_at: None,
            poll_deadline: poll_deadline.to_rfc3339(),
        };
        let insert_row = row.clone();
        let inserted = self
            .with_db(move |db| db.insert_pending_payment(&insert_row))
            .await?;

        if !inserted {
            // A concurrent create for this purchase won the insert; hand
            // back the winner's record, mirroring the activation write.
            let pid = purchase_id.to_string();
            let existing = self
                .with_db(move |db| db.get_payment_by_purchase(&pid))
                .await?
                .context("payment row vanished after losing a create race")?;
            return row_to_payment(existing);
        }

        info!(
            "created pending payment {} for purchase {}",
            row.tracking_hash, purchase_id
        );
        row_to_payment(row)
    }

    /// One poll tick for a tracked payment.
    ///
    /// Safe to call from any number of racing pollers: the already-active
    /// short-circuit plus the conditional pending->active write in the store
    /// guarantee at most one activation per tracking hash, and the
    /// activation timestamp is never re-stamped.
    pub async fn check_and_activate(&self, hash: &str) -> Result<Activation, PaymentError> {
        let h = hash.to_string();
        let row = self
            .with_db(move |db| db.get_pending_payment(&h))
            .await?
            .ok_or(PaymentError::NotFound)?;

        // Idempotent short-circuit: terminal state, nothing left to do
        if row.status == "active" {
            return Ok(Activation::AlreadyActive(activated_info(&row)?));
        }

        // A verifier failure is "not paid yet, ask again next tick" —
        // never an activation, never a state change.
        let paid = match self.verifier.check(hash).await {
            Ok(paid) => paid,
            Err(e) => {
                warn!("verifier check for {} failed: {:#}", hash, e);
                return Ok(Activation::NotPaid);
            }
        };
        if !paid {
            return Ok(Activation::NotPaid);
        }

        let activated_at = Utc::now();
        let expires_at = activated_at + Duration::hours(row.duration_hours);
        let h = hash.to_string();
        let won = self
            .with_db(move |db| {
                db.activate_payment(&h, &activated_at.to_rfc3339(), &expires_at.to_rfc3339())
            })
            .await?;

        if won {
            info!(
                "activated purchase {} (expires {})",
                row.purchase_id, expires_at
            );
            return Ok(Activation::Activated(ActivatedBoost {
                purchase_id: row.purchase_id,
                activated_at,
                expires_at,
            }));
        }

        // Lost the conditional write to a concurrent caller — report the
        // winner's timestamps, not ours.
        let h = hash.to_string();
        let row = self
            .with_db(move |db| db.get_pending_payment(&h))
            .await?
            .ok_or(PaymentError::NotFound)?;
        Ok(Activation::AlreadyActive(activated_info(&row)?))
    }
}

fn activated_info(row: &PendingPaymentRow) -> Result<ActivatedBoost, PaymentError> {
    let activated_at = row
        .activated_at
        .as_deref()
        .context("active payment missing activated_at")?;
    let expires_at = row
        .expires_at
        .as_deref()
        .context("active payment missing expires_at")?;
    Ok(ActivatedBoost {
        purchase_id: row.purchase_id.clone(),
        activated_at: parse_ts(activated_at)?,
        expires_at: parse_ts(expires_at)?,
    })
}

fn row_to_payment(row: PendingPaymentRow) -> Result<PendingPayment> {
    let status = match row.status.as_str() {
        "active" => PaymentStatus::Active,
        _ => PaymentStatus::Pending,
    };
    Ok(PendingPayment {
        status,
        created_at: parse_ts(&row.created_at)?,
        activated_at: row.activated_at.as_deref().map(parse_ts).transpose()?,
        expires_at: row.expires_at.as_deref().map(parse_ts).transpose()?,
        poll_deadline: parse_ts(&row.poll_deadline)?,
        tracking_hash: row.tracking_hash,
        purchase_id: row.purchase_id,
        amount: row.amount,
        currency: row.currency,
        duration_hours: row.duration_hours,
        qr_payload: row.qr_payload,
    })
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("bad stored timestamp: {}", s))
}
