//! Booking lifecycle.
//!
//! ```text
//! pending ──payment──▶ confirmed
//!    │
//!    └──assign──▶ driver_assigned ──▶ driver_reached ──▶ ongoing ──▶ completed
//!                       │                   │               ▲
//!                       └───────────────────┴───────────────┘
//! any non-terminal ──cancel──▶ cancelled
//! ```
//!
//! Every transition takes the rows it touches by `&mut` and either applies
//! all of its writes or returns an error having written nothing. The store
//! runs these inside a single commit so the guards are evaluated against the
//! latest committed rows.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::engine::fare::Settlement;
use crate::error::AppError;
use crate::models::booking::{Booking, BookingStatus, PaymentMethod, PaymentStatus};
use crate::models::driver::{Driver, DriverStatus};

pub struct BookingStateMachine;

impl BookingStateMachine {
    /// `pending → driver_assigned`, locking the driver as busy.
    pub fn assign(booking: &mut Booking, driver: &mut Driver, now: DateTime<Utc>) -> Result<(), AppError> {
        if booking.status != BookingStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "booking {} is {}, only pending bookings can be assigned",
                booking.code, booking.status
            )));
        }
        if !driver.is_verified {
            return Err(AppError::DriverUnavailable(format!(
                "driver {} is not verified",
                driver.id
            )));
        }
        if driver.status != DriverStatus::Available {
            return Err(AppError::DriverUnavailable(format!(
                "driver {} is not available",
                driver.id
            )));
        }

        booking.driver_id = Some(driver.id);
        booking.status = BookingStatus::DriverAssigned;
        booking.updated_at = now;
        driver.status = DriverStatus::Busy;
        driver.updated_at = now;
        Ok(())
    }

    /// Records a verified payment. Moves `pending → confirmed`; any other
    /// status keeps its lifecycle position and only the payment fields change.
    pub fn record_payment(
        booking: &mut Booking,
        payment_id: String,
        amount_paid: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if booking.status == BookingStatus::Cancelled {
            return Err(AppError::InvalidState(format!(
                "booking {} is cancelled",
                booking.code
            )));
        }
        if booking.payment_status == PaymentStatus::Paid {
            return Err(AppError::Conflict(format!(
                "booking {} is already paid",
                booking.code
            )));
        }

        if amount_paid >= booking.estimated_fare {
            booking.payment_status = PaymentStatus::Paid;
            booking.payment_method = Some(PaymentMethod::Online);
        } else {
            booking.payment_status = PaymentStatus::Partial;
            booking.payment_method = Some(PaymentMethod::Partial);
        }
        booking.payment_id = Some(payment_id);

        if booking.status == BookingStatus::Pending {
            booking.status = BookingStatus::Confirmed;
        }
        booking.updated_at = now;
        Ok(())
    }

    /// Driver-reported progress. `completed` is delegated to [`Self::complete`].
    pub fn advance(
        booking: &mut Booking,
        driver: &mut Driver,
        target: BookingStatus,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let from = booking.status;
        match (from, target) {
            (BookingStatus::DriverAssigned, BookingStatus::DriverReached) => {
                booking.pickup_time = Some(now);
            }
            (BookingStatus::DriverAssigned | BookingStatus::DriverReached, BookingStatus::Ongoing) => {
                booking.pickup_time.get_or_insert(now);
            }
            (_, BookingStatus::Completed) => return Self::complete(booking, driver, now),
            _ => {
                return Err(AppError::InvalidState(format!(
                    "booking {} cannot move from {from} to {target}",
                    booking.code
                )));
            }
        }

        booking.status = target;
        booking.updated_at = now;
        Ok(())
    }

    /// Any in-progress status `→ completed`; frees the driver.
    pub fn complete(booking: &mut Booking, driver: &mut Driver, now: DateTime<Utc>) -> Result<(), AppError> {
        if !booking.status.is_in_progress() {
            return Err(AppError::InvalidState(format!(
                "booking {} is {}, only bookings with a driver on the job can be completed",
                booking.code, booking.status
            )));
        }
        Self::ensure_assigned(booking, driver)?;

        booking.status = BookingStatus::Completed;
        booking.drop_time = Some(now);
        booking.updated_at = now;
        driver.total_trips += 1;
        driver.status = DriverStatus::Available;
        driver.updated_at = now;
        Ok(())
    }

    /// Any non-terminal status `→ cancelled`; a busy assigned driver is freed.
    pub fn cancel(booking: &mut Booking, driver: Option<&mut Driver>, now: DateTime<Utc>) -> Result<(), AppError> {
        if booking.status.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "booking {} is already {}",
                booking.code, booking.status
            )));
        }

        if let Some(driver) = driver
            && booking.driver_id == Some(driver.id)
            && driver.status == DriverStatus::Busy
        {
            driver.status = DriverStatus::Available;
            driver.updated_at = now;
        }

        booking.status = BookingStatus::Cancelled;
        booking.updated_at = now;
        Ok(())
    }

    /// One-time settlement of a completed booking. `final_fare` being set is
    /// the guard against crediting a driver twice.
    pub fn settle(
        booking: &mut Booking,
        driver: Option<&mut Driver>,
        settlement: Settlement,
        payment_status: PaymentStatus,
        payment_method: Option<PaymentMethod>,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        Self::check_settleable(booking)?;

        if let Some(driver) = driver {
            Self::ensure_assigned(booking, driver)?;
            let credit = settlement.driver_earning;
            let (Some(total_earnings), Some(wallet_balance)) = (
                driver.total_earnings.checked_add(credit),
                driver.wallet_balance.checked_add(credit),
            ) else {
                return Err(AppError::Validation(format!(
                    "crediting {credit} would overflow the wallet of driver {}",
                    driver.id
                )));
            };
            driver.total_earnings = total_earnings;
            driver.wallet_balance = wallet_balance;
            driver.updated_at = now;
        }

        booking.final_fare = Some(settlement.final_fare);
        booking.commission = Some(settlement.commission);
        booking.driver_earning = Some(settlement.driver_earning);
        booking.payment_status = payment_status;
        if payment_method.is_some() {
            booking.payment_method = payment_method;
        }
        booking.updated_at = now;
        Ok(())
    }

    pub fn check_settleable(booking: &Booking) -> Result<(), AppError> {
        if booking.status != BookingStatus::Completed {
            return Err(AppError::InvalidState(format!(
                "booking {} must be completed before settlement",
                booking.code
            )));
        }
        if booking.is_settled() {
            return Err(AppError::Conflict(format!(
                "booking {} is already settled",
                booking.code
            )));
        }
        Ok(())
    }

    pub fn rate(
        booking: &mut Booking,
        rating: u8,
        feedback: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if !(1..=5).contains(&rating) {
            return Err(AppError::Validation(format!(
                "rating must be between 1 and 5, got {rating}"
            )));
        }
        if booking.status != BookingStatus::Completed {
            return Err(AppError::InvalidState(format!(
                "booking {} can only be rated once completed",
                booking.code
            )));
        }
        if booking.customer_rating.is_some() {
            return Err(AppError::Conflict(format!(
                "booking {} is already rated",
                booking.code
            )));
        }

        booking.customer_rating = Some(rating);
        booking.customer_feedback = feedback.filter(|text| !text.trim().is_empty());
        booking.updated_at = now;
        Ok(())
    }

    /// Full recompute over every rated completed trip.
    pub fn mean_rating(ratings: &[u8]) -> f64 {
        if ratings.is_empty() {
            return 0.0;
        }

        let sum: u64 = ratings.iter().map(|&r| u64::from(r)).sum();
        sum as f64 / ratings.len() as f64
    }

    pub fn mark_refunded(booking: &mut Booking, now: DateTime<Utc>) -> Result<(), AppError> {
        if booking.status != BookingStatus::Cancelled {
            return Err(AppError::InvalidState(format!(
                "booking {} must be cancelled before a refund",
                booking.code
            )));
        }
        if booking.payment_id.is_none() {
            return Err(AppError::InvalidState(format!(
                "booking {} has no recorded payment",
                booking.code
            )));
        }
        if booking.payment_status == PaymentStatus::Refunded {
            return Err(AppError::Conflict(format!(
                "booking {} is already refunded",
                booking.code
            )));
        }

        booking.payment_status = PaymentStatus::Refunded;
        booking.updated_at = now;
        Ok(())
    }

    fn ensure_assigned(booking: &Booking, driver: &Driver) -> Result<(), AppError> {
        if booking.driver_id == Some(driver.id) {
            Ok(())
        } else {
            Err(AppError::Internal(format!(
                "driver {} is not assigned to booking {}",
                driver.id, booking.code
            )))
        }
    }
}
