pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::booking::{Booking, BookingFilter};
use crate::models::driver::{Driver, DriverFilter};

/// Runs against copies of a booking and (optionally) a driver; rows are
/// written back only if it returns `Ok`.
pub type BookingMutation =
    Box<dyn FnOnce(&mut Booking, Option<&mut Driver>) -> Result<(), AppError> + Send>;

pub type DriverMutation = Box<dyn FnOnce(&mut Driver) -> Result<(), AppError> + Send>;

/// Receives the driver and every rating on that driver's completed trips.
pub type RatingMutation = Box<dyn FnOnce(&mut Driver, &[u8]) -> Result<(), AppError> + Send>;

#[derive(Debug, Clone)]
pub struct Committed {
    pub booking: Booking,
    pub driver: Option<Driver>,
}

/// Persistence port for bookings and drivers.
///
/// Every `update_*` call is a single transaction: implementations must
/// serialize commits touching the same rows so that checks made inside a
/// mutation still hold when its writes land.
#[async_trait]
pub trait DispatchStore: Send + Sync {
    /// Fails with `Conflict` if the booking code is already taken.
    async fn insert_booking(&self, booking: Booking) -> Result<(), AppError>;
    async fn booking(&self, id: Uuid) -> Result<Option<Booking>, AppError>;
    async fn booking_by_code(&self, code: &str) -> Result<Option<Booking>, AppError>;
    /// Newest first.
    async fn list_bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>, AppError>;

    /// Loads the booking plus `driver_id` (or the booking's current driver
    /// when `None`) and applies `mutation` atomically.
    async fn update_booking(
        &self,
        booking_id: Uuid,
        driver_id: Option<Uuid>,
        mutation: BookingMutation,
    ) -> Result<Committed, AppError>;

    /// Fails with `Conflict` on a duplicate user or license number.
    async fn insert_driver(&self, driver: Driver) -> Result<(), AppError>;
    async fn driver(&self, id: Uuid) -> Result<Option<Driver>, AppError>;
    async fn driver_by_user(&self, user_id: Uuid) -> Result<Option<Driver>, AppError>;
    async fn list_drivers(&self, filter: &DriverFilter) -> Result<Vec<Driver>, AppError>;
    async fn update_driver(
        &self,
        driver_id: Uuid,
        mutation: DriverMutation,
    ) -> Result<Driver, AppError>;
    async fn refresh_driver_rating(
        &self,
        driver_id: Uuid,
        mutation: RatingMutation,
    ) -> Result<Driver, AppError>;
}

pub type StoreHandle = Arc<dyn DispatchStore>;
