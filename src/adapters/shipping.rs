use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum::{Display, EnumString};
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::retry::{retry_transient, RetryPolicy};
use super::AdapterError;

/// Carrier tokens are refreshed a little before they actually expire.
const TOKEN_LIFETIME_HOURS: i64 = 24;
const TOKEN_REFRESH_MARGIN_MINUTES: i64 = 30;

/// Parcel defaults used when an order carries no physical dimensions.
const DEFAULT_WEIGHT_KG: f64 = 0.5;
const DEFAULT_DIMENSION_CM: f64 = 10.0;

#[derive(Debug, Clone, Serialize)]
pub struct ShipmentItem {
    pub sku: String,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Order snapshot handed to the carrier when registering a shipment.
#[derive(Debug, Clone, Serialize)]
pub struct ShipmentRequest {
    pub order_id: Uuid,
    pub order_number: String,
    pub shipping_address: serde_json::Value,
    pub billing_address: Option<serde_json::Value>,
    pub items: Vec<ShipmentItem>,
    pub total: Decimal,
    pub cod: bool,
    pub weight_kg: f64,
    pub dimensions_cm: [f64; 3],
}

impl ShipmentRequest {
    /// Applies parcel defaults for orders with unknown physical dimensions.
    pub fn with_default_parcel(mut self) -> Self {
        if self.weight_kg <= 0.0 {
            self.weight_kg = DEFAULT_WEIGHT_KG;
        }
        if self.dimensions_cm.iter().any(|d| *d <= 0.0) {
            self.dimensions_cm = [DEFAULT_DIMENSION_CM; 3];
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarrierShipment {
    pub carrier_order_id: String,
    pub shipment_id: String,
    pub tracking_number: Option<String>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, Serialize, Deserialize, utoipa::ToSchema,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    Created,
    PickedUp,
    InTransit,
    OutForDelivery,
    Delivered,
    ReturnedToOrigin,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct TrackingInfo {
    pub status: TrackingStatus,
    pub description: Option<String>,
    pub location: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Interface to the external shipping carrier. Failures are non-fatal to
/// payment confirmation; the shipping queue retries registration out of band.
#[async_trait]
pub trait ShippingCarrier: Send + Sync {
    async fn register_shipment(&self, req: &ShipmentRequest)
        -> Result<CarrierShipment, AdapterError>;

    async fn track(&self, awb: &str) -> Result<TrackingInfo, AdapterError>;
}

/// Leased carrier credential: token plus expiry, refreshed by one writer at
/// a time while readers keep using the current lease.
#[derive(Debug, Clone)]
struct AuthLease {
    token: String,
    expires_at: DateTime<Utc>,
}

impl AuthLease {
    fn is_fresh(&self) -> bool {
        self.expires_at - ChronoDuration::minutes(TOKEN_REFRESH_MARGIN_MINUTES) > Utc::now()
    }
}

#[derive(Debug, Deserialize)]
struct CarrierLoginResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct CarrierOrderResponse {
    order_id: serde_json::Value,
    shipment_id: serde_json::Value,
    #[serde(default)]
    awb_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CarrierTrackResponse {
    #[serde(default)]
    current_status: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

/// REST implementation of [`ShippingCarrier`].
pub struct RestShippingCarrier {
    client: reqwest::Client,
    base_url: String,
    email: String,
    password: String,
    auth: RwLock<Option<AuthLease>>,
    retry: RetryPolicy,
}

impl RestShippingCarrier {
    pub fn new(
        base_url: String,
        email: String,
        password: String,
        timeout: Duration,
    ) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::Permanent(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            email,
            password,
            auth: RwLock::new(None),
            retry: RetryPolicy::default(),
        })
    }

    /// Returns a fresh auth token, logging in again when the lease is close
    /// to expiry. Concurrent readers share the lease; refresh is
    /// double-checked under the write lock so only one login runs.
    async fn auth_token(&self) -> Result<String, AdapterError> {
        if let Some(lease) = self.auth.read().await.as_ref() {
            if lease.is_fresh() {
                return Ok(lease.token.clone());
            }
        }

        let mut guard = self.auth.write().await;
        if let Some(lease) = guard.as_ref() {
            if lease.is_fresh() {
                return Ok(lease.token.clone());
            }
        }

        debug!("refreshing carrier auth token");
        let url = format!("{}/v1/auth/login", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "email": self.email,
                "password": self.password,
            }))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(if status.is_server_error() {
                AdapterError::Transient(format!("carrier login returned {status}"))
            } else {
                AdapterError::Permanent(format!("carrier login rejected ({status})"))
            });
        }
        let login: CarrierLoginResponse = resp
            .json()
            .await
            .map_err(|e| AdapterError::Permanent(format!("malformed login response: {e}")))?;

        let lease = AuthLease {
            token: login.token.clone(),
            expires_at: Utc::now() + ChronoDuration::hours(TOKEN_LIFETIME_HOURS),
        };
        *guard = Some(lease);
        Ok(login.token)
    }

    async fn post_authed(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, AdapterError> {
        let token = self.auth_token().await?;
        let url = format!("{}{}", self.base_url, path);
        let resp = self.client.post(&url).bearer_auth(token).json(body).send().await?;
        Ok(resp)
    }
}

#[async_trait]
impl ShippingCarrier for RestShippingCarrier {
    #[instrument(skip(self, req), fields(order_number = %req.order_number))]
    async fn register_shipment(
        &self,
        req: &ShipmentRequest,
    ) -> Result<CarrierShipment, AdapterError> {
        let req = req.clone().with_default_parcel();
        let body = serde_json::to_value(&req)
            .map_err(|e| AdapterError::Permanent(format!("unserializable shipment: {e}")))?;

        let parsed = retry_transient(&self.retry, "carrier.register_shipment", || {
            let body = &body;
            async move {
                let resp = self.post_authed("/v1/orders/create", body).await?;
                let status = resp.status();
                if status.is_server_error() {
                    return Err(AdapterError::Transient(format!("carrier returned {status}")));
                }
                if !status.is_success() {
                    let detail = resp.text().await.unwrap_or_default();
                    return Err(AdapterError::Permanent(format!(
                        "carrier rejected shipment ({status}): {detail}"
                    )));
                }
                resp.json::<CarrierOrderResponse>().await.map_err(|e| {
                    AdapterError::Permanent(format!("malformed carrier response: {e}"))
                })
            }
        })
        .await?;

        Ok(CarrierShipment {
            carrier_order_id: scalar_to_string(&parsed.order_id),
            shipment_id: scalar_to_string(&parsed.shipment_id),
            tracking_number: parsed.awb_code,
        })
    }

    #[instrument(skip(self))]
    async fn track(&self, awb: &str) -> Result<TrackingInfo, AdapterError> {
        let token = self.auth_token().await?;
        let url = format!("{}/v1/courier/track/awb/{awb}", self.base_url);
        let resp = self.client.get(&url).bearer_auth(token).send().await?;
        let status = resp.status();
        if status.is_server_error() {
            return Err(AdapterError::Transient(format!("carrier returned {status}")));
        }
        if !status.is_success() {
            return Err(AdapterError::Permanent(format!(
                "carrier tracking rejected ({status})"
            )));
        }
        let parsed: CarrierTrackResponse = resp
            .json()
            .await
            .map_err(|e| AdapterError::Permanent(format!("malformed tracking response: {e}")))?;

        let tracking_status = parsed
            .current_status
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(TrackingStatus::Unknown);

        Ok(TrackingInfo {
            status: tracking_status,
            description: parsed.description,
            location: parsed.location,
            updated_at: parsed.updated_at,
        })
    }
}

/// Carrier APIs return ids as either strings or numbers.
fn scalar_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
