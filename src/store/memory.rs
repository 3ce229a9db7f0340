use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::booking::{Booking, BookingFilter, BookingStatus};
use crate::models::driver::{Driver, DriverFilter};
use crate::store::{BookingMutation, Committed, DispatchStore, DriverMutation, RatingMutation};

/// DashMap-backed store.
///
/// Reads never block. Writes go through a single commit lock, which makes
/// each mutation a compare-and-swap against the latest committed rows.
#[derive(Default)]
pub struct InMemoryStore {
    bookings: DashMap<Uuid, Booking>,
    codes: DashMap<String, Uuid>,
    drivers: DashMap<Uuid, Driver>,
    commit: Mutex<()>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn load_booking(&self, id: Uuid) -> Result<Booking, AppError> {
        self.bookings
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("booking {id} not found")))
    }

    fn load_driver(&self, id: Uuid) -> Result<Driver, AppError> {
        self.drivers
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))
    }
}

#[async_trait]
impl DispatchStore for InMemoryStore {
    async fn insert_booking(&self, booking: Booking) -> Result<(), AppError> {
        let _guard = self.commit.lock().await;

        if self.codes.contains_key(&booking.code) {
            return Err(AppError::Conflict(format!(
                "booking code {} already exists",
                booking.code
            )));
        }

        self.codes.insert(booking.code.clone(), booking.id);
        self.bookings.insert(booking.id, booking);
        Ok(())
    }

    async fn booking(&self, id: Uuid) -> Result<Option<Booking>, AppError> {
        Ok(self.bookings.get(&id).map(|entry| entry.value().clone()))
    }

    async fn booking_by_code(&self, code: &str) -> Result<Option<Booking>, AppError> {
        let id = match self.codes.get(code) {
            Some(entry) => *entry.value(),
            None => return Ok(None),
        };
        self.booking(id).await
    }

    async fn list_bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>, AppError> {
        let mut bookings: Vec<Booking> = self
            .bookings
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        bookings.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.code.cmp(&b.code))
        });
        Ok(bookings)
    }

    async fn update_booking(
        &self,
        booking_id: Uuid,
        driver_id: Option<Uuid>,
        mutation: BookingMutation,
    ) -> Result<Committed, AppError> {
        let _guard = self.commit.lock().await;

        let mut booking = self.load_booking(booking_id)?;
        let mut driver = match driver_id.or(booking.driver_id) {
            Some(id) => Some(self.load_driver(id)?),
            None => None,
        };

        mutation(&mut booking, driver.as_mut())?;

        if let Some(driver) = &driver {
            self.drivers.insert(driver.id, driver.clone());
        }
        self.bookings.insert(booking.id, booking.clone());

        Ok(Committed { booking, driver })
    }

    async fn insert_driver(&self, driver: Driver) -> Result<(), AppError> {
        let _guard = self.commit.lock().await;

        let duplicate = self.drivers.iter().find_map(|entry| {
            let existing = entry.value();
            if existing.user_id == driver.user_id {
                Some("user already has a driver profile".to_string())
            } else if existing.license_number == driver.license_number {
                Some(format!(
                    "license number {} already registered",
                    driver.license_number
                ))
            } else {
                None
            }
        });

        if let Some(message) = duplicate {
            return Err(AppError::Conflict(message));
        }

        self.drivers.insert(driver.id, driver);
        Ok(())
    }

    async fn driver(&self, id: Uuid) -> Result<Option<Driver>, AppError> {
        Ok(self.drivers.get(&id).map(|entry| entry.value().clone()))
    }

    async fn driver_by_user(&self, user_id: Uuid) -> Result<Option<Driver>, AppError> {
        Ok(self
            .drivers
            .iter()
            .find(|entry| entry.value().user_id == user_id)
            .map(|entry| entry.value().clone()))
    }

    async fn list_drivers(&self, filter: &DriverFilter) -> Result<Vec<Driver>, AppError> {
        let mut drivers: Vec<Driver> = self
            .drivers
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        drivers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(drivers)
    }

    async fn update_driver(
        &self,
        driver_id: Uuid,
        mutation: DriverMutation,
    ) -> Result<Driver, AppError> {
        let _guard = self.commit.lock().await;

        let mut driver = self.load_driver(driver_id)?;
        mutation(&mut driver)?;
        self.drivers.insert(driver.id, driver.clone());

        Ok(driver)
    }

    async fn refresh_driver_rating(
        &self,
        driver_id: Uuid,
        mutation: RatingMutation,
    ) -> Result<Driver, AppError> {
        let _guard = self.commit.lock().await;

        let mut driver = self.load_driver(driver_id)?;
        let ratings: Vec<u8> = self
            .bookings
            .iter()
            .filter(|entry| {
                let booking = entry.value();
                booking.driver_id == Some(driver_id) && booking.status == BookingStatus::Completed
            })
            .filter_map(|entry| entry.value().customer_rating)
            .collect();

        mutation(&mut driver, &ratings)?;
        self.drivers.insert(driver.id, driver.clone());

        Ok(driver)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use super::InMemoryStore;
    use crate::error::AppError;
    use crate::geo::GeoPoint;
    use crate::models::booking::{Booking, BookingFilter, BookingStatus, Goods, PaymentStatus, Stop};
    use crate::models::driver::{Driver, DriverStatus};
    use crate::store::DispatchStore;

    fn booking(code: &str) -> Booking {
        let now = Utc::now();
        let stop = |address: &str| Stop {
            address: address.to_string(),
            location: GeoPoint::new(17.385, 78.4867),
            city: None,
        };
        Booking {
            id: Uuid::new_v4(),
            code: code.to_string(),
            customer_id: Uuid::new_v4(),
            driver_id: None,
            pickup: stop("Ameerpet"),
            drop: stop("Kukatpally"),
            goods: Goods {
                kind: "cement".to_string(),
                weight_kg: Some(500),
                volume_cubic_ft: None,
                image: None,
                special_instructions: None,
            },
            distance_km: 0.0,
            estimated_duration_min: None,
            estimated_fare: dec!(150),
            final_fare: None,
            commission: None,
            driver_earning: None,
            scheduled_date: now,
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
        }
    }

    #[tokio::test]
    async fn duplicate_booking_code_is_a_conflict() {
        let store = InMemoryStore::new();
        store.insert_booking(booking("SRTA-20260101-00001")).await.unwrap();

        let err = store
            .insert_booking(booking("SRTA-20260101-00001"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let found = store.booking_by_code("SRTA-20260101-00001").await.unwrap();
        assert!(found.is_some());
        assert_eq!(store.list_bookings(&BookingFilter::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_mutation_leaves_rows_untouched() {
        let store = InMemoryStore::new();
        let before = booking("SRTA-20260101-00002");
        let driver = Driver::new(Uuid::new_v4(), "TS09-1234".to_string(), None);
        store.insert_booking(before.clone()).await.unwrap();
        store.insert_driver(driver.clone()).await.unwrap();

        let err = store
            .update_booking(
                before.id,
                Some(driver.id),
                Box::new(|booking: &mut Booking, driver: Option<&mut Driver>| {
                    booking.status = BookingStatus::Cancelled;
                    if let Some(driver) = driver {
                        driver.status = DriverStatus::Busy;
                    }
                    Err(AppError::InvalidState("rejected".to_string()))
                }),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidState(_)));
        assert_eq!(store.booking(before.id).await.unwrap(), Some(before));
        assert_eq!(store.driver(driver.id).await.unwrap(), Some(driver));
    }

    #[tokio::test]
    async fn duplicate_driver_license_is_a_conflict() {
        let store = InMemoryStore::new();
        store
            .insert_driver(Driver::new(Uuid::new_v4(), "TS09-1234".to_string(), None))
            .await
            .unwrap();

        let err = store
            .insert_driver(Driver::new(Uuid::new_v4(), "TS09-1234".to_string(), None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn rating_refresh_sees_only_completed_rated_trips() {
        let store = InMemoryStore::new();
        let driver = Driver::new(Uuid::new_v4(), "TS09-9999".to_string(), None);
        store.insert_driver(driver.clone()).await.unwrap();

        for (code, status, rating) in [
            ("SRTA-20260101-00010", BookingStatus::Completed, Some(4)),
            ("SRTA-20260101-00011", BookingStatus::Completed, Some(5)),
            ("SRTA-20260101-00012", BookingStatus::Completed, None),
            ("SRTA-20260101-00013", BookingStatus::Cancelled, Some(1)),
        ] {
            let mut b = booking(code);
            b.driver_id = Some(driver.id);
            b.status = status;
            b.customer_rating = rating;
            store.insert_booking(b).await.unwrap();
        }

        let updated = store
            .refresh_driver_rating(
                driver.id,
                Box::new(|driver: &mut Driver, ratings: &[u8]| {
                    let mut sorted = ratings.to_vec();
                    sorted.sort_unstable();
                    assert_eq!(sorted, vec![4, 5]);
                    driver.rating = 4.5;
                    Ok(())
                }),
            )
            .await
            .unwrap();
        assert_eq!(updated.rating, 4.5);
    }
}
