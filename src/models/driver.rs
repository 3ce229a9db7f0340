use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    Offline,
    Available,
    Busy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Driver {
    pub id: Uuid,
    pub user_id: Uuid,
    pub license_number: String,
    pub service_area: Option<String>,
    pub status: DriverStatus,
    pub location: Option<GeoPoint>,
    pub location_updated_at: Option<DateTime<Utc>>,
    pub is_verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<Uuid>,
    pub total_trips: u32,
    pub total_earnings: Decimal,
    pub wallet_balance: Decimal,
    pub rating: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Driver {
    /// A freshly registered driver: offline and unverified.
    pub fn new(user_id: Uuid, license_number: String, service_area: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            license_number,
            service_area,
            status: DriverStatus::Offline,
            location: None,
            location_updated_at: None,
            is_verified: false,
            verified_at: None,
            verified_by: None,
            total_trips: 0,
            total_earnings: Decimal::ZERO,
            wallet_balance: Decimal::ZERO,
            rating: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn can_take_work(&self) -> bool {
        self.is_verified && self.status == DriverStatus::Available
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DriverFilter {
    pub status: Option<DriverStatus>,
    pub verified: Option<bool>,
}

impl DriverFilter {
    pub fn matches(&self, driver: &Driver) -> bool {
        self.status.is_none_or(|status| driver.status == status)
            && self.verified.is_none_or(|verified| driver.is_verified == verified)
    }
}
