use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::error;

use psar_payments::PaymentError;
use psar_payments::confirm::Activation;
use psar_types::api::{Claims, CreatePaymentRequest, CreatePaymentResponse, PaymentStatusResponse};

/// Mint a trackable boost payment. Idempotent per purchase id — the second
/// click on "boost listing" gets the same QR back, not a second one.
pub async fn create_payment(
    State(state): State<crate::AppState>,
    Extension(_claims): Extension<Claims>,
    Json(req): Json<CreatePaymentRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.amount <= 0.0 || req.duration_hours <= 0 || req.purchase_id.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let payment = state
        .confirmer
        .create(&req.purchase_id, req.amount, &req.currency, req.duration_hours)
        .await
        .map_err(|e| {
            error!("payment creation for {} failed: {:#}", req.purchase_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok((
        StatusCode::CREATED,
        Json(CreatePaymentResponse {
            tracking_hash: payment.tracking_hash,
            qr_payload: payment.qr_payload,
            amount: payment.amount,
            currency: payment.currency,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub hash: String,
}

/// One poll tick from a client. Unknown hash is a real 404; a transient
/// verifier failure is NOT — the poller just sees "not paid yet" and
/// tries again on its next tick.
pub async fn payment_status(
    State(state): State<crate::AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let activation = state
        .confirmer
        .check_and_activate(&query.hash)
        .await
        .map_err(|e| match e {
            PaymentError::NotFound => StatusCode::NOT_FOUND,
            PaymentError::Db(e) => {
                error!("payment status for {} failed: {:#}", query.hash, e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        })?;

    Ok(Json(status_response(activation)))
}

fn status_response(activation: Activation) -> PaymentStatusResponse {
    match activation {
        Activation::NotPaid => PaymentStatusResponse {
            paid: false,
            activated: false,
            purchase_id: None,
            activated_at: None,
            expires_at: None,
        },
        Activation::Activated(info) | Activation::AlreadyActive(info) => PaymentStatusResponse {
            paid: true,
            activated: true,
            purchase_id: Some(info.purchase_id),
            activated_at: Some(info.activated_at),
            expires_at: Some(info.expires_at),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use psar_payments::confirm::ActivatedBoost;

    #[test]
    fn not_paid_carries_no_activation_fields() {
        let resp = status_response(Activation::NotPaid);
        assert!(!resp.paid);
        assert!(!resp.activated);
        assert!(resp.purchase_id.is_none());
        assert!(resp.activated_at.is_none());
    }

    #[test]
    fn first_and_repeat_activation_serialize_identically() {
        let info = ActivatedBoost {
            purchase_id: "boost-1".into(),
            activated_at: Utc::now(),
            expires_at: Utc::now(),
        };

        let first = status_response(Activation::Activated(info.clone()));
        let repeat = status_response(Activation::AlreadyActive(info));
        assert!(first.paid && first.activated);
        assert_eq!(first.activated_at, repeat.activated_at);
        assert_eq!(first.expires_at, repeat.expires_at);
        assert_eq!(first.purchase_id, repeat.purchase_id);
    }
}
