pub mod confirm;
pub mod verifier;

use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaymentError {
    /// Unknown tracking hash — distinct from "not yet paid".
    #[error("no pending payment for that tracking hash")]
    NotFound,

    #[error("payment store error: {0}")]
    Db(#[from] anyhow::Error),
}

/// Derive the opaque tracking hash correlating a generated QR payload
/// with its pending-payment record.
pub fn tracking_hash(qr_payload: &str) -> String {
    let digest = Sha256::digest(qr_payload.as_bytes());
    hex::encode(digest)
}
