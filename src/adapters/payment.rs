use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use tracing::instrument;

use crate::money;

use super::retry::{retry_transient, RetryPolicy};
use super::AdapterError;

type HmacSha256 = Hmac<Sha256>;

/// Request to open a payment intent at the gateway.
#[derive(Debug, Clone, Serialize)]
pub struct CreateIntentRequest {
    pub amount: Decimal,
    pub currency: String,
    /// Merchant-side reference, the order number.
    pub reference: String,
    pub metadata: serde_json::Value,
}

/// Gateway-side payment session the client completes off-band.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PaymentIntent {
    pub intent_id: String,
    pub client_secret: Option<String>,
    pub amount: Decimal,
    pub currency: String,
}

/// Interface to the external payment provider.
///
/// Signature verification is a pure function of its inputs plus the
/// server-held secret; client-supplied success flags are never trusted.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(&self, req: &CreateIntentRequest)
        -> Result<PaymentIntent, AdapterError>;

    fn verify_signature(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> bool;
}

/// Computes the expected callback signature: HMAC-SHA256 over
/// `"{gateway_order_id}|{gateway_payment_id}"`, hex-encoded.
pub fn compute_signature(secret: &str, gateway_order_id: &str, gateway_payment_id: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(format!("{gateway_order_id}|{gateway_payment_id}").as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

#[derive(Debug, Deserialize)]
struct GatewayOrderResponse {
    id: String,
    #[serde(default)]
    client_secret: Option<String>,
}

/// REST implementation of [`PaymentGateway`]. Amounts go over the wire in
/// integer minor units.
pub struct RestPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
    retry: RetryPolicy,
}

impl RestPaymentGateway {
    pub fn new(
        base_url: String,
        key_id: String,
        key_secret: String,
        timeout: Duration,
    ) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::Permanent(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            key_id,
            key_secret,
            retry: RetryPolicy::default(),
        })
    }
}

#[async_trait]
impl PaymentGateway for RestPaymentGateway {
    #[instrument(skip(self, req), fields(reference = %req.reference))]
    async fn create_intent(
        &self,
        req: &CreateIntentRequest,
    ) -> Result<PaymentIntent, AdapterError> {
        let url = format!("{}/v1/orders", self.base_url);
        let body = serde_json::json!({
            "amount": money::to_minor(req.amount),
            "currency": req.currency,
            "receipt": req.reference,
            "notes": req.metadata,
        });

        let response = retry_transient(&self.retry, "payment.create_intent", || {
            let request = self
                .client
                .post(&url)
                .basic_auth(&self.key_id, Some(&self.key_secret))
                .json(&body);
            async move {
                let resp = request.send().await?;

                let status = resp.status();
                if status.is_server_error() {
                    return Err(AdapterError::Transient(format!("gateway returned {status}")));
                }
                if !status.is_success() {
                    let detail = resp.text().await.unwrap_or_default();
                    return Err(AdapterError::Permanent(format!(
                        "gateway rejected intent ({status}): {detail}"
                    )));
                }
                resp.json::<GatewayOrderResponse>().await.map_err(|e| {
                    AdapterError::Permanent(format!("malformed gateway response: {e}"))
                })
            }
        })
        .await?;

        Ok(PaymentIntent {
            intent_id: response.id,
            client_secret: response.client_secret,
            amount: req.amount,
            currency: req.currency.clone(),
        })
    }

    fn verify_signature(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> bool {
        let expected = compute_signature(&self.key_secret, gateway_order_id, gateway_payment_id);
        constant_time_eq(&expected, signature)
    }
}
