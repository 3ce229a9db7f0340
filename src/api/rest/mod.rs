pub mod admin;
pub mod bookings;
pub mod drivers;
pub mod extract;
pub mod payments;
pub mod ws;

use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use uuid::Uuid;

use self::extract::Json;
use crate::error::AppError;
use crate::models::booking::BookingFilter;
use crate::models::context::{RequestContext, Role};
use crate::models::driver::{DriverFilter, DriverStatus};
use crate::state::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(bookings::router())
        .merge(drivers::router())
        .merge(admin::router())
        .merge(payments::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}

/// Identity resolved upstream and forwarded as headers.
#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(parts, USER_ID_HEADER)?
            .parse::<Uuid>()
            .map_err(|err| AppError::Unauthorized(format!("invalid {USER_ID_HEADER}: {err}")))?;
        let role = header(parts, USER_ROLE_HEADER)?.parse::<Role>()?;

        Ok(RequestContext::new(user_id, role))
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, AppError> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized(format!("missing {name} header")))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    bookings: usize,
    drivers: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, AppError> {
    let bookings = state.store.list_bookings(&BookingFilter::default()).await?;
    let drivers = state.store.list_drivers(&DriverFilter::default()).await?;

    Ok(Json(HealthResponse {
        status: "ok",
        bookings: bookings.len(),
        drivers: drivers.len(),
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let available = DriverFilter {
        status: Some(DriverStatus::Available),
        verified: Some(true),
    };
    match state.store.list_drivers(&available).await {
        Ok(drivers) => state.metrics.drivers_available.set(drivers.len() as i64),
        Err(err) => tracing::warn!(error = %err, "failed to count available drivers"),
    }

    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
