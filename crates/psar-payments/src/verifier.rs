use anyhow::{Context, Result, anyhow};
use futures_util::future::BoxFuture;
use serde::Deserialize;
use tracing::debug;

/// The external payment provider, treated as an opaque collaborator:
/// it mints trackable QR payloads and answers "has this been paid yet".
///
/// Boxed futures keep the trait object-safe so the confirmer can hold
/// `Arc<dyn PaymentVerifier>` and tests can swap in a stub.
pub trait PaymentVerifier: Send + Sync {
    /// Generate a payment QR payload for a purchase.
    fn generate_qr<'a>(
        &'a self,
        purchase_id: &'a str,
        amount: f64,
        currency: &'a str,
    ) -> BoxFuture<'a, Result<String>>;

    /// Ask the provider whether the payment behind this hash has settled.
    fn check<'a>(&'a self, tracking_hash: &'a str) -> BoxFuture<'a, Result<bool>>;
}

/// Provider connection settings, injected from the environment by the server.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    pub base_url: String,
    pub api_token: String,
    pub merchant_name: String,
}

/// HTTP client for the hosted QR-payment provider.
pub struct HttpVerifier {
    client: reqwest::Client,
    config: VerifierConfig,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    qr: String,
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    #[serde(rename = "responseCode")]
    response_code: i64,
}

impl HttpVerifier {
    pub fn new(config: VerifierConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

impl PaymentVerifier for HttpVerifier {
    fn generate_qr<'a>(
        &'a self,
        purchase_id: &'a str,
        amount: f64,
        currency: &'a str,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let url = format!("{}/v1/generate", self.config.base_url);
            let resp = self
                .client
                .post(&url)
                .bearer_auth(&self.config.api_token)
                .json(&serde_json::json!({
                    "merchantName": self.config.merchant_name,
                    "billNumber": purchase_id,
                    "amount": amount,
                    "currency": currency,
                }))
                .send()
                .await
                .context("QR generation request failed")?
                .error_for_status()
                .context("QR generation rejected by provider")?;

            let body: GenerateResponse = resp
                .json()
                .await
                .context("malformed QR generation response")?;
            Ok(body.qr)
        })
    }

    fn check<'a>(&'a self, tracking_hash: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let url = format!("{}/v1/check_transaction_by_md5", self.config.base_url);
            let resp = self
                .client
                .post(&url)
                .bearer_auth(&self.config.api_token)
                .json(&serde_json::json!({ "md5": tracking_hash }))
                .send()
                .await
                .context("verifier request failed")?;

            let status = resp.status();
            if !status.is_success() {
                return Err(anyhow!("verifier returned HTTP {}", status));
            }

            let body: CheckResponse = resp.json().await.context("malformed verifier response")?;
            debug!("verifier response code {} for {}", body.response_code, tracking_hash);
            // Provider convention: 0 = transaction found (paid)
            Ok(body.response_code == 0)
        })
    }
}
