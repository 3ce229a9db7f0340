use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    DriverAssigned,
    DriverReached,
    Ongoing,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// Statuses in which a driver is on the job.
    pub fn is_in_progress(self) -> bool {
        matches!(
            self,
            BookingStatus::DriverAssigned | BookingStatus::DriverReached | BookingStatus::Ongoing
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::DriverAssigned => "driver_assigned",
            BookingStatus::DriverReached => "driver_reached",
            BookingStatus::Ongoing => "ongoing",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Partial,
    Paid,
    Refunded,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Online,
    Partial,
    Cash,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stop {
    pub address: String,
    pub location: GeoPoint,
    #[serde(default)]
    pub city: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Goods {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub weight_kg: Option<u32>,
    #[serde(default)]
    pub volume_cubic_ft: Option<u32>,
    /// Opaque reference returned by the file-storage collaborator.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub special_instructions: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub code: String,
    pub customer_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub pickup: Stop,
    pub drop: Stop,
    pub goods: Goods,
    pub distance_km: f64,
    pub estimated_duration_min: Option<f64>,
    pub estimated_fare: Decimal,
    pub final_fare: Option<Decimal>,
    pub commission: Option<Decimal>,
    pub driver_earning: Option<Decimal>,
    pub scheduled_date: DateTime<Utc>,
    pub pickup_time: Option<DateTime<Utc>>,
    pub drop_time: Option<DateTime<Utc>>,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    pub payment_order_id: Option<String>,
    pub payment_id: Option<String>,
    pub customer_rating: Option<u8>,
    pub customer_feedback: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn is_settled(&self) -> bool {
        self.final_fare.is_some()
    }

    /// Fare counted towards revenue: the settled fare, else the estimate.
    pub fn revenue(&self) -> Decimal {
        self.final_fare.unwrap_or(self.estimated_fare)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingFilter {
    pub status: Option<BookingStatus>,
    pub customer_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
    pub payment_order_id: Option<String>,
}

impl BookingFilter {
    pub fn matches(&self, booking: &Booking) -> bool {
        self.status.is_none_or(|status| booking.status == status)
            && self.customer_id.is_none_or(|id| booking.customer_id == id)
            && self.driver_id.is_none_or(|id| booking.driver_id == Some(id))
            && self
                .payment_order_id
                .as_deref()
                .is_none_or(|order_id| booking.payment_order_id.as_deref() == Some(order_id))
    }
}
