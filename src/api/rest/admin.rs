use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use super::extract::Json;
use crate::engine::reports::{Dashboard, RevenueReport};
use crate::error::AppError;
use crate::models::booking::{Booking, BookingFilter, PaymentStatus};
use crate::models::context::{RequestContext, Role};
use crate::models::driver::{Driver, DriverFilter};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/admin/dashboard", get(dashboard))
        .route("/api/admin/drivers", get(list_drivers))
        .route("/api/admin/drivers/:id/verify", post(verify_driver))
        .route("/api/admin/bookings", get(list_bookings))
        .route("/api/admin/bookings/:id/assign", post(assign_driver))
        .route("/api/admin/bookings/:id/finalize", post(finalize_booking))
        .route("/api/admin/bookings/:id/cancel", post(cancel_booking))
        .route("/api/admin/reports/revenue", get(revenue_report))
}

#[derive(Deserialize)]
pub struct VerifyDriverRequest {
    #[serde(default = "default_verified")]
    pub is_verified: bool,
}

fn default_verified() -> bool {
    true
}

#[derive(Deserialize)]
pub struct AssignDriverRequest {
    pub driver_id: Uuid,
}

#[derive(Deserialize)]
pub struct FinalizeRequest {
    #[serde(default)]
    pub final_fare: Option<Decimal>,
    #[serde(default)]
    pub payment_status: Option<PaymentStatus>,
}

#[derive(Deserialize)]
pub struct RevenueQuery {
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

async fn dashboard(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
) -> Result<Json<Dashboard>, AppError> {
    Ok(Json(state.dispatch.dashboard(&ctx).await?))
}

async fn list_drivers(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Query(filter): Query<DriverFilter>,
) -> Result<Json<Vec<Driver>>, AppError> {
    Ok(Json(state.dispatch.registry().list(&ctx, &filter).await?))
}

async fn verify_driver(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<VerifyDriverRequest>,
) -> Result<Json<Driver>, AppError> {
    let driver = state
        .dispatch
        .registry()
        .verify(&ctx, id, payload.is_verified)
        .await?;
    Ok(Json(driver))
}

async fn list_bookings(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Query(filter): Query<BookingFilter>,
) -> Result<Json<Vec<Booking>>, AppError> {
    ctx.require(Role::Admin)?;
    Ok(Json(state.dispatch.bookings(&ctx, filter).await?))
}

async fn assign_driver(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignDriverRequest>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.dispatch.assign_driver(&ctx, id, payload.driver_id).await?))
}

async fn finalize_booking(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<FinalizeRequest>,
) -> Result<Json<Booking>, AppError> {
    let booking = state
        .dispatch
        .finalize(&ctx, id, payload.final_fare, payload.payment_status)
        .await?;
    Ok(Json(booking))
}

async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    ctx.require(Role::Admin)?;
    Ok(Json(state.dispatch.cancel(&ctx, id).await?))
}

async fn revenue_report(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Query(range): Query<RevenueQuery>,
) -> Result<Json<RevenueReport>, AppError> {
    let report = state
        .dispatch
        .revenue_report(&ctx, range.date_from, range.date_to)
        .await?;
    Ok(Json(report))
}
