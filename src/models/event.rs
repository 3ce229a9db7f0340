use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::booking::{Booking, BookingStatus, PaymentStatus};

/// Broadcast after every committed booking change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingEvent {
    pub booking_id: Uuid,
    pub code: String,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub driver_id: Option<Uuid>,
    pub at: DateTime<Utc>,
}

impl From<&Booking> for BookingEvent {
    fn from(booking: &Booking) -> Self {
        Self {
            booking_id: booking.id,
            code: booking.code.clone(),
            status: booking.status,
            payment_status: booking.payment_status,
            driver_id: booking.driver_id,
            at: booking.updated_at,
        }
    }
}
