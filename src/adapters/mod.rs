//! Outbound adapters for external collaborators.
//!
//! The orchestration core talks to the payment gateway and shipping carrier
//! through the traits defined here; the REST implementations own the wire
//! protocols and can be swapped without touching the services.

pub mod payment;
pub mod retry;
pub mod shipping;

use crate::errors::ServiceError;

/// Failure from an external adapter call, split by whether a retry can help.
///
/// Timeouts and 5xx responses are transient; 4xx and validation failures are
/// permanent. Only transient failures are retried automatically.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl AdapterError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AdapterError::Transient(_))
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            return AdapterError::Transient(err.to_string());
        }
        if let Some(status) = err.status() {
            if status.is_server_error() {
                return AdapterError::Transient(err.to_string());
            }
        }
        AdapterError::Permanent(err.to_string())
    }
}

impl From<AdapterError> for ServiceError {
    fn from(err: AdapterError) -> Self {
        ServiceError::ExternalServiceError(err.to_string())
    }
}
