//! Capability interfaces for collaborators the dispatch core does not own.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::AppError;
use crate::geo::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RouteEstimate {
    pub distance_km: f64,
    pub duration_min: f64,
}

/// Road-routed distance lookup. Best effort: callers fall back to the
/// straight-line estimate on any error.
#[async_trait]
pub trait RouteProvider: Send + Sync {
    async fn route(&self, origin: GeoPoint, destination: GeoPoint) -> Result<RouteEstimate, AppError>;
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Returns the provider's order id.
    async fn create_order(&self, amount: Decimal, reference: &str) -> Result<String, AppError>;
    async fn verify_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<bool, AppError>;
    /// Amount captured for the payment.
    async fn fetch_payment(&self, payment_id: &str) -> Result<Decimal, AppError>;
    /// Refunds `amount` of a captured payment. Returns the refund id.
    async fn refund(&self, payment_id: &str, amount: Decimal, reason: &str) -> Result<String, AppError>;
    /// Checks the signature the provider attached to a webhook delivery
    /// against the raw request body.
    async fn verify_webhook(&self, payload: &[u8], signature: &str) -> Result<bool, AppError>;
}

pub struct OfflineRoutes;

#[async_trait]
impl RouteProvider for OfflineRoutes {
    async fn route(&self, _origin: GeoPoint, _destination: GeoPoint) -> Result<RouteEstimate, AppError> {
        Err(AppError::Dependency("no routing provider configured".to_string()))
    }
}

pub struct UnconfiguredPayments;

#[async_trait]
impl PaymentProvider for UnconfiguredPayments {
    async fn create_order(&self, _amount: Decimal, _reference: &str) -> Result<String, AppError> {
        Err(unconfigured())
    }

    async fn verify_signature(&self, _order_id: &str, _payment_id: &str, _signature: &str) -> Result<bool, AppError> {
        Err(unconfigured())
    }

    async fn fetch_payment(&self, _payment_id: &str) -> Result<Decimal, AppError> {
        Err(unconfigured())
    }

    async fn refund(&self, _payment_id: &str, _amount: Decimal, _reason: &str) -> Result<String, AppError> {
        Err(unconfigured())
    }

    async fn verify_webhook(&self, _payload: &[u8], _signature: &str) -> Result<bool, AppError> {
        Err(unconfigured())
    }
}

fn unconfigured() -> AppError {
    AppError::Dependency("no payment provider configured".to_string())
}

/// Runs a collaborator call with an upper bound on its duration.
pub async fn bounded<T, F>(limit: Duration, what: &str, call: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(AppError::Dependency(msg))) => Err(AppError::Dependency(msg)),
        Ok(Err(err)) => Err(AppError::Dependency(format!("{what}: {err}"))),
        Err(_) => Err(AppError::Dependency(format!(
            "{what} timed out after {}ms",
            limit.as_millis()
        ))),
    }
}
