use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::Router;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use super::extract::Json;
use crate::engine::payments::{PaymentOrder, PaymentType, RefundReceipt, WebhookOutcome};
use crate::error::AppError;
use crate::models::booking::Booking;
use crate::models::context::RequestContext;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/payment/create-order", post(create_order))
        .route("/api/payment/verify", post(verify_payment))
        .route("/api/payment/refund", post(refund_payment))
        .route("/api/payment/cash-payment", post(cash_payment))
        .route("/api/payment/webhook", post(payment_webhook))
}

pub const WEBHOOK_SIGNATURE_HEADER: &str = "x-payment-signature";

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub booking_id: Uuid,
    #[serde(default)]
    pub payment_type: PaymentType,
}

#[derive(Deserialize)]
pub struct VerifyPaymentRequest {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
}

#[derive(Deserialize)]
pub struct RefundRequest {
    pub booking_id: Uuid,
    /// Defaults to the whole captured amount.
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct CashPaymentRequest {
    pub booking_id: Uuid,
    #[serde(default)]
    pub final_fare: Option<Decimal>,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<PaymentOrder>, AppError> {
    let order = state
        .payments
        .create_order(&ctx, payload.booking_id, payload.payment_type)
        .await?;
    Ok(Json(order))
}

async fn verify_payment(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Json(payload): Json<VerifyPaymentRequest>,
) -> Result<Json<Booking>, AppError> {
    let booking = state
        .payments
        .verify(&ctx, &payload.order_id, &payload.payment_id, &payload.signature)
        .await?;
    Ok(Json(booking))
}

async fn refund_payment(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Json(payload): Json<RefundRequest>,
) -> Result<Json<RefundReceipt>, AppError> {
    let receipt = state
        .payments
        .refund(&ctx, payload.booking_id, payload.amount, payload.reason)
        .await?;
    Ok(Json(receipt))
}

async fn cash_payment(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Json(payload): Json<CashPaymentRequest>,
) -> Result<Json<Booking>, AppError> {
    let booking = state
        .payments
        .record_cash_payment(&ctx, payload.booking_id, payload.final_fare)
        .await?;
    Ok(Json(booking))
}

/// Called by the payment provider, not by a user, so no identity headers.
async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookOutcome>, AppError> {
    let signature = headers
        .get(WEBHOOK_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Validation(format!("missing {WEBHOOK_SIGNATURE_HEADER} header")))?;
    Ok(Json(state.payments.handle_webhook(&body, signature).await?))
}
