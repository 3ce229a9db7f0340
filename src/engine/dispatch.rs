use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::code::{is_booking_code, random_booking_code};
use crate::engine::fare::FareCalculator;
use crate::engine::lifecycle::BookingStateMachine;
use crate::engine::registry::DriverRegistry;
use crate::engine::reports::{self, Dashboard, RevenueReport};
use crate::error::AppError;
use crate::geo::{distance_km, round_km, GeoPoint};
use crate::models::booking::{
    Booking, BookingFilter, BookingStatus, Goods, PaymentMethod, PaymentStatus, Stop,
};
use crate::models::context::{RequestContext, Role};
use crate::models::driver::{Driver, DriverFilter};
use crate::models::event::BookingEvent;
use crate::observability::metrics::Metrics;
use crate::providers::{bounded, RouteProvider};
use crate::store::{BookingMutation, Committed, StoreHandle};

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub nearby_radius_km: f64,
    pub provider_timeout: Duration,
    pub code_attempts: u32,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            nearby_radius_km: 50.0,
            provider_timeout: Duration::from_millis(3_000),
            code_attempts: 8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub pickup: Stop,
    pub drop: Stop,
    pub goods: Goods,
    pub scheduled_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub distance_km: f64,
    pub estimated_duration_min: Option<f64>,
    pub estimated_fare: Decimal,
    pub routed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingCreated {
    pub booking: Booking,
    /// Informational only; nothing is reserved.
    pub nearby_drivers: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingMatch {
    pub booking: Booking,
    pub distance_from_driver: Option<f64>,
}

pub struct DispatchCoordinator {
    store: StoreHandle,
    fares: FareCalculator,
    registry: DriverRegistry,
    routes: Arc<dyn RouteProvider>,
    events: broadcast::Sender<BookingEvent>,
    metrics: Metrics,
    settings: DispatchSettings,
}

impl DispatchCoordinator {
    pub fn new(
        store: StoreHandle,
        fares: FareCalculator,
        routes: Arc<dyn RouteProvider>,
        events: broadcast::Sender<BookingEvent>,
        metrics: Metrics,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            registry: DriverRegistry::new(store.clone()),
            store,
            fares,
            routes,
            events,
            metrics,
            settings,
        }
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    pub fn fares(&self) -> &FareCalculator {
        &self.fares
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BookingEvent> {
        self.events.subscribe()
    }

    /// Routed distance when the provider answers in time, otherwise the
    /// straight-line estimate.
    pub async fn quote(&self, pickup: GeoPoint, drop: GeoPoint) -> Result<Quote, AppError> {
        pickup.validate("pickup")?;
        drop.validate("drop")?;

        let lookup = bounded(
            self.settings.provider_timeout,
            "route lookup",
            self.routes.route(pickup, drop),
        )
        .await;

        let (distance, duration, routed) = match lookup {
            Ok(route) if route.distance_km.is_finite() && route.distance_km >= 0.0 => (
                round_km(route.distance_km),
                Some(route.duration_min.round()),
                true,
            ),
            Ok(route) => {
                warn!(distance_km = route.distance_km, "route provider returned an unusable distance");
                self.metrics.route_fallbacks_total.inc();
                (distance_km(&pickup, &drop), None, false)
            }
            Err(err) => {
                debug!(error = %err, "falling back to straight-line distance");
                self.metrics.route_fallbacks_total.inc();
                (distance_km(&pickup, &drop), None, false)
            }
        };

        Ok(Quote {
            distance_km: distance,
            estimated_duration_min: duration,
            estimated_fare: self.fares.estimate(distance)?,
            routed,
        })
    }

    pub async fn create_booking(
        &self,
        ctx: &RequestContext,
        request: BookingRequest,
    ) -> Result<BookingCreated, AppError> {
        ctx.require(Role::Customer)?;
        validate_request(&request)?;

        let quote = self
            .quote(request.pickup.location, request.drop.location)
            .await?;
        let nearby_drivers = self
            .registry
            .find_nearby(&request.pickup.location, self.settings.nearby_radius_km)
            .await?
            .len();

        let now = Utc::now();
        let mut booking = Booking {
            id: Uuid::new_v4(),
            code: String::new(),
            customer_id: ctx.user_id,
            driver_id: None,
            pickup: request.pickup,
            drop: request.drop,
            goods: request.goods,
            distance_km: quote.distance_km,
            estimated_duration_min: quote.estimated_duration_min,
            estimated_fare: quote.estimated_fare,
            final_fare: None,
            commission: None,
            driver_earning: None,
            scheduled_date: request.scheduled_date,
            pickup_time: None,
            drop_time: None,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            payment_method: None,
            payment_order_id: None,
            payment_id: None,
            customer_rating: None,
            customer_feedback: None,
            created_at: now,
            updated_at: now,
        };

        self.insert_with_fresh_code(&mut booking, now).await?;

        self.metrics.bookings_created_total.inc();
        self.publish(&booking);
        info!(
            booking_code = %booking.code,
            distance_km = booking.distance_km,
            estimated_fare = %booking.estimated_fare,
            nearby_drivers,
            "booking created"
        );

        Ok(BookingCreated {
            booking,
            nearby_drivers,
        })
    }

    async fn insert_with_fresh_code(&self, booking: &mut Booking, now: DateTime<Utc>) -> Result<(), AppError> {
        for attempt in 1..=self.settings.code_attempts.max(1) {
            booking.code = random_booking_code(now);
            match self.store.insert_booking(booking.clone()).await {
                Ok(()) => return Ok(()),
                Err(AppError::Conflict(_)) => {
                    debug!(attempt, booking_code = %booking.code, "booking code collision");
                }
                Err(err) => return Err(err),
            }
        }

        Err(AppError::Conflict(
            "could not allocate a unique booking code".to_string(),
        ))
    }

    pub async fn booking(&self, ctx: &RequestContext, booking_id: Uuid) -> Result<Booking, AppError> {
        let booking = self.load(booking_id).await?;
        self.ensure_visible(ctx, booking).await
    }

    /// Same access rules as [`Self::booking`], keyed by the public code.
    pub async fn booking_by_code(&self, ctx: &RequestContext, code: &str) -> Result<Booking, AppError> {
        if !is_booking_code(code) {
            return Err(AppError::Validation(format!("malformed booking code: {code}")));
        }
        let booking = self
            .store
            .booking_by_code(code)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("booking {code} not found")))?;
        self.ensure_visible(ctx, booking).await
    }

    async fn ensure_visible(&self, ctx: &RequestContext, booking: Booking) -> Result<Booking, AppError> {
        let visible = match ctx.role {
            Role::Admin => true,
            Role::Customer => booking.customer_id == ctx.user_id,
            Role::Driver => {
                let driver = self.registry.profile(ctx).await?;
                booking.driver_id == Some(driver.id) || booking.status == BookingStatus::Pending
            }
        };

        if visible {
            Ok(booking)
        } else {
            Err(AppError::Forbidden(format!(
                "booking {} belongs to someone else",
                booking.code
            )))
        }
    }

    /// Customers see their own bookings, drivers the ones assigned to them,
    /// admins everything the filter matches.
    pub async fn bookings(&self, ctx: &RequestContext, mut filter: BookingFilter) -> Result<Vec<Booking>, AppError> {
        match ctx.role {
            Role::Admin => {}
            Role::Customer => {
                filter.customer_id = Some(ctx.user_id);
                filter.driver_id = None;
            }
            Role::Driver => {
                let driver = self.registry.profile(ctx).await?;
                filter.customer_id = None;
                filter.driver_id = Some(driver.id);
            }
        }
        self.store.list_bookings(&filter).await
    }

    /// Admin assignment of any verified, available driver.
    pub async fn assign_driver(
        &self,
        ctx: &RequestContext,
        booking_id: Uuid,
        driver_id: Uuid,
    ) -> Result<Booking, AppError> {
        ctx.require(Role::Admin)?;

        let booking = self.commit_assignment(booking_id, driver_id).await?;
        info!(booking_code = %booking.code, driver_id = %driver_id, "driver assigned by admin");
        Ok(booking)
    }

    /// Self-service accept by the calling driver.
    pub async fn accept_booking(&self, ctx: &RequestContext, booking_id: Uuid) -> Result<Booking, AppError> {
        let driver = self.registry.profile(ctx).await?;
        if !driver.can_take_work() {
            let err = AppError::DriverUnavailable(format!(
                "driver {} must be verified and available to accept bookings",
                driver.id
            ));
            self.reject(&err);
            return Err(err);
        }

        let booking = self.commit_assignment(booking_id, driver.id).await?;
        info!(booking_code = %booking.code, driver_id = %driver.id, "booking accepted by driver");
        Ok(booking)
    }

    async fn commit_assignment(&self, booking_id: Uuid, driver_id: Uuid) -> Result<Booking, AppError> {
        let now = Utc::now();
        let committed = self
            .commit(
                booking_id,
                Some(driver_id),
                Box::new(move |booking: &mut Booking, driver: Option<&mut Driver>| {
                    let driver = driver.ok_or_else(|| missing_driver(booking))?;
                    BookingStateMachine::assign(booking, driver, now)
                }),
            )
            .await?;
        Ok(committed.booking)
    }

    /// Pending bookings near the calling driver, nearest first. A driver who
    /// has never reported a location sees every pending booking.
    pub async fn available_bookings(&self, ctx: &RequestContext) -> Result<Vec<BookingMatch>, AppError> {
        let driver = self.registry.profile(ctx).await?;
        let filter = BookingFilter {
            status: Some(BookingStatus::Pending),
            ..BookingFilter::default()
        };
        let pending = self.store.list_bookings(&filter).await?;

        let Some(origin) = driver.location else {
            return Ok(pending
                .into_iter()
                .map(|booking| BookingMatch {
                    booking,
                    distance_from_driver: None,
                })
                .collect());
        };

        let radius = self.settings.nearby_radius_km;
        let mut matches: Vec<BookingMatch> = pending
            .into_iter()
            .filter_map(|booking| {
                let distance = distance_km(&origin, &booking.pickup.location);
                (distance <= radius).then_some(BookingMatch {
                    booking,
                    distance_from_driver: Some(distance),
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            let da = a.distance_from_driver.unwrap_or(f64::MAX);
            let db = b.distance_from_driver.unwrap_or(f64::MAX);
            da.total_cmp(&db)
                .then_with(|| a.booking.code.cmp(&b.booking.code))
        });
        Ok(matches)
    }

    /// Trip progress reported by the assigned driver (or an admin).
    pub async fn update_status(
        &self,
        ctx: &RequestContext,
        booking_id: Uuid,
        target: BookingStatus,
    ) -> Result<Booking, AppError> {
        let reporter = match ctx.role {
            Role::Admin => None,
            Role::Driver => Some(self.registry.profile(ctx).await?.id),
            Role::Customer => {
                return Err(AppError::Forbidden(
                    "customers cannot update trip status".to_string(),
                ));
            }
        };

        let now = Utc::now();
        let committed = self
            .commit(
                booking_id,
                None,
                Box::new(move |booking: &mut Booking, driver: Option<&mut Driver>| {
                    if let Some(reporter) = reporter
                        && booking.driver_id != Some(reporter)
                    {
                        return Err(AppError::Forbidden(format!(
                            "booking {} is not assigned to you",
                            booking.code
                        )));
                    }
                    let driver = driver.ok_or_else(|| {
                        AppError::InvalidState(format!("booking {} has no driver", booking.code))
                    })?;
                    BookingStateMachine::advance(booking, driver, target, now)
                }),
            )
            .await?;

        info!(booking_code = %committed.booking.code, status = %committed.booking.status, "trip status updated");
        Ok(committed.booking)
    }

    /// Customers may cancel their own bookings before a driver is assigned;
    /// admins may cancel any non-terminal booking.
    pub async fn cancel(&self, ctx: &RequestContext, booking_id: Uuid) -> Result<Booking, AppError> {
        let role = ctx.role;
        let user_id = ctx.user_id;
        if role == Role::Driver {
            return Err(AppError::Forbidden("drivers cannot cancel bookings".to_string()));
        }

        let now = Utc::now();
        let committed = self
            .commit(
                booking_id,
                None,
                Box::new(move |booking: &mut Booking, driver: Option<&mut Driver>| {
                    if role == Role::Customer {
                        if booking.customer_id != user_id {
                            return Err(AppError::Forbidden(format!(
                                "booking {} belongs to someone else",
                                booking.code
                            )));
                        }
                        if !matches!(booking.status, BookingStatus::Pending | BookingStatus::Confirmed) {
                            return Err(AppError::InvalidState(format!(
                                "booking {} is {} and can no longer be cancelled by the customer",
                                booking.code, booking.status
                            )));
                        }
                    }
                    BookingStateMachine::cancel(booking, driver, now)
                }),
            )
            .await?;

        info!(booking_code = %committed.booking.code, "booking cancelled");
        Ok(committed.booking)
    }

    /// Rates a completed booking, then recomputes the driver's average from
    /// every rated completed trip.
    pub async fn rate(
        &self,
        ctx: &RequestContext,
        booking_id: Uuid,
        rating: u8,
        feedback: Option<String>,
    ) -> Result<Booking, AppError> {
        ctx.require(Role::Customer)?;
        let user_id = ctx.user_id;

        let now = Utc::now();
        let committed = self
            .commit(
                booking_id,
                None,
                Box::new(move |booking: &mut Booking, _driver: Option<&mut Driver>| {
                    if booking.customer_id != user_id {
                        return Err(AppError::Forbidden(format!(
                            "booking {} belongs to someone else",
                            booking.code
                        )));
                    }
                    BookingStateMachine::rate(booking, rating, feedback, now)
                }),
            )
            .await?;

        if let Some(driver_id) = committed.booking.driver_id {
            let driver = self
                .store
                .refresh_driver_rating(
                    driver_id,
                    Box::new(|driver: &mut Driver, ratings: &[u8]| {
                        driver.rating = BookingStateMachine::mean_rating(ratings);
                        driver.updated_at = Utc::now();
                        Ok(())
                    }),
                )
                .await?;
            info!(driver_id = %driver.id, rating = driver.rating, "driver rating recomputed");
        }

        Ok(committed.booking)
    }

    /// Admin settlement of a completed booking.
    pub async fn finalize(
        &self,
        ctx: &RequestContext,
        booking_id: Uuid,
        final_fare: Option<Decimal>,
        payment_status: Option<PaymentStatus>,
    ) -> Result<Booking, AppError> {
        ctx.require(Role::Admin)?;
        self.settle(
            booking_id,
            final_fare,
            payment_status.unwrap_or(PaymentStatus::Paid),
            None,
        )
        .await
    }

    /// Fixes the final fare (defaulting to the estimate), splits it and
    /// credits the driver, all in one commit.
    pub(crate) async fn settle(
        &self,
        booking_id: Uuid,
        final_fare: Option<Decimal>,
        payment_status: PaymentStatus,
        payment_method: Option<PaymentMethod>,
    ) -> Result<Booking, AppError> {
        let fares = self.fares.clone();
        let now = Utc::now();
        let committed = self
            .commit(
                booking_id,
                None,
                Box::new(move |booking: &mut Booking, driver: Option<&mut Driver>| {
                    BookingStateMachine::check_settleable(booking)?;
                    let settlement = fares.settle(final_fare.unwrap_or(booking.estimated_fare))?;
                    BookingStateMachine::settle(
                        booking,
                        driver,
                        settlement,
                        payment_status,
                        payment_method,
                        now,
                    )
                }),
            )
            .await?;

        self.metrics.settlements_total.inc();
        let booking = committed.booking;
        info!(
            booking_code = %booking.code,
            final_fare = ?booking.final_fare,
            commission = ?booking.commission,
            driver_earning = ?booking.driver_earning,
            "booking settled"
        );
        Ok(booking)
    }

    pub async fn dashboard(&self, ctx: &RequestContext) -> Result<Dashboard, AppError> {
        ctx.require(Role::Admin)?;
        let bookings = self.store.list_bookings(&BookingFilter::default()).await?;
        let drivers = self.store.list_drivers(&DriverFilter::default()).await?;
        Ok(reports::dashboard(&bookings, &drivers, Utc::now()))
    }

    pub async fn revenue_report(
        &self,
        ctx: &RequestContext,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<RevenueReport, AppError> {
        ctx.require(Role::Admin)?;
        let filter = BookingFilter {
            status: Some(BookingStatus::Completed),
            ..BookingFilter::default()
        };
        let bookings = self.store.list_bookings(&filter).await?;
        Ok(reports::revenue_report(&bookings, from, to))
    }

    pub(crate) async fn load(&self, booking_id: Uuid) -> Result<Booking, AppError> {
        self.store
            .booking(booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id} not found")))
    }

    pub(crate) async fn find_by_order(&self, order_id: &str) -> Result<Booking, AppError> {
        let filter = BookingFilter {
            payment_order_id: Some(order_id.to_string()),
            ..BookingFilter::default()
        };
        self.store
            .list_bookings(&filter)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("no booking for payment order {order_id}")))
    }

    /// Applies a booking mutation through the store, publishing the result
    /// or counting the rejection.
    pub(crate) async fn commit(
        &self,
        booking_id: Uuid,
        driver_id: Option<Uuid>,
        mutation: BookingMutation,
    ) -> Result<Committed, AppError> {
        match self.store.update_booking(booking_id, driver_id, mutation).await {
            Ok(committed) => {
                self.publish(&committed.booking);
                Ok(committed)
            }
            Err(err) => {
                warn!(booking_id = %booking_id, error = %err, "booking update rejected");
                self.reject(&err);
                Err(err)
            }
        }
    }

    fn publish(&self, booking: &Booking) {
        self.metrics
            .booking_updates_total
            .with_label_values(&[booking.status.as_str()])
            .inc();
        let _ = self.events.send(BookingEvent::from(booking));
    }

    fn reject(&self, err: &AppError) {
        self.metrics
            .booking_rejections_total
            .with_label_values(&[err.kind()])
            .inc();
    }
}

fn validate_request(request: &BookingRequest) -> Result<(), AppError> {
    if request.pickup.address.trim().is_empty() {
        return Err(AppError::Validation("pickup address is required".to_string()));
    }
    if request.drop.address.trim().is_empty() {
        return Err(AppError::Validation("drop address is required".to_string()));
    }
    if request.goods.kind.trim().is_empty() {
        return Err(AppError::Validation("goods type is required".to_string()));
    }
    request.pickup.location.validate("pickup")?;
    request.drop.location.validate("drop")?;
    Ok(())
}

fn missing_driver(booking: &Booking) -> AppError {
    AppError::Internal(format!("driver row missing for booking {}", booking.code))
}
