use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use super::extract::Json;
use crate::engine::dispatch::{BookingCreated, BookingRequest, Quote};
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::booking::{Booking, BookingFilter};
use crate::models::context::RequestContext;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/bookings", post(create_booking).get(list_bookings))
        .route("/api/bookings/estimate", post(estimate))
        .route("/api/bookings/:id", get(get_booking))
        .route("/api/bookings/:id/cancel", post(cancel_booking))
        .route("/api/bookings/:id/rate", post(rate_booking))
}

#[derive(Deserialize)]
pub struct EstimateRequest {
    pub pickup: GeoPoint,
    pub drop: GeoPoint,
}

#[derive(Deserialize)]
pub struct RateRequest {
    pub rating: u8,
    #[serde(default)]
    pub feedback: Option<String>,
}

async fn create_booking(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Json(payload): Json<BookingRequest>,
) -> Result<(StatusCode, Json<BookingCreated>), AppError> {
    let created = state.dispatch.create_booking(&ctx, payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn estimate(
    State(state): State<Arc<AppState>>,
    _ctx: RequestContext,
    Json(payload): Json<EstimateRequest>,
) -> Result<Json<Quote>, AppError> {
    let quote = state.dispatch.quote(payload.pickup, payload.drop).await?;
    Ok(Json(quote))
}

async fn list_bookings(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Query(filter): Query<BookingFilter>,
) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.dispatch.bookings(&ctx, filter).await?))
}

/// Accepts either the booking id or its `SRTA-` code.
async fn get_booking(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(key): Path<String>,
) -> Result<Json<Booking>, AppError> {
    let booking = match key.parse::<Uuid>() {
        Ok(id) => state.dispatch.booking(&ctx, id).await?,
        Err(_) => state.dispatch.booking_by_code(&ctx, &key).await?,
    };
    Ok(Json(booking))
}

async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.dispatch.cancel(&ctx, id).await?))
}

async fn rate_booking(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<RateRequest>,
) -> Result<Json<Booking>, AppError> {
    let booking = state
        .dispatch
        .rate(&ctx, id, payload.rating, payload.feedback)
        .await?;
    Ok(Json(booking))
}
