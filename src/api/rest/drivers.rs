use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::extract::Json;
use crate::engine::dispatch::BookingMatch;
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::booking::{Booking, BookingFilter, BookingStatus};
use crate::models::context::RequestContext;
use crate::models::driver::{Driver, DriverStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/driver/register", post(register_driver))
        .route("/api/driver/profile", get(get_profile))
        .route("/api/driver/status", put(update_availability))
        .route("/api/driver/location", put(update_location))
        .route("/api/driver/bookings", get(my_bookings))
        .route("/api/driver/bookings/available", get(available_bookings))
        .route("/api/driver/bookings/:id/accept", post(accept_booking))
        .route("/api/driver/bookings/:id/status", put(update_booking_status))
}

#[derive(Deserialize)]
pub struct RegisterDriverRequest {
    pub license_number: String,
    #[serde(default)]
    pub service_area: Option<String>,
}

#[derive(Deserialize)]
pub struct AvailabilityRequest {
    pub status: DriverStatus,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
}

#[derive(Deserialize)]
pub struct BookingStatusRequest {
    pub status: BookingStatus,
}

async fn register_driver(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Json(payload): Json<RegisterDriverRequest>,
) -> Result<(StatusCode, Json<Driver>), AppError> {
    let driver = state
        .dispatch
        .registry()
        .register(&ctx, &payload.license_number, payload.service_area)
        .await?;
    Ok((StatusCode::CREATED, Json(driver)))
}

async fn get_profile(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
) -> Result<Json<Driver>, AppError> {
    Ok(Json(state.dispatch.registry().profile(&ctx).await?))
}

async fn update_availability(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Json(payload): Json<AvailabilityRequest>,
) -> Result<Json<Driver>, AppError> {
    let registry = state.dispatch.registry();
    let driver = registry.profile(&ctx).await?;
    Ok(Json(registry.set_availability(driver.id, payload.status).await?))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Driver>, AppError> {
    let registry = state.dispatch.registry();
    let driver = registry.profile(&ctx).await?;
    let driver = registry
        .update_location(driver.id, payload.location, Utc::now())
        .await?;
    Ok(Json(driver))
}

/// The driver's own trips. `driver_id` in the query is overridden.
async fn my_bookings(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Query(filter): Query<BookingFilter>,
) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.dispatch.bookings(&ctx, filter).await?))
}

async fn available_bookings(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
) -> Result<Json<Vec<BookingMatch>>, AppError> {
    Ok(Json(state.dispatch.available_bookings(&ctx).await?))
}

async fn accept_booking(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.dispatch.accept_booking(&ctx, id).await?))
}

async fn update_booking_status(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<BookingStatusRequest>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.dispatch.update_status(&ctx, id, payload.status).await?))
}
