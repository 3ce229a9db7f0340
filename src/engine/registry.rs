use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::{distance_km, GeoPoint};
use crate::models::context::{RequestContext, Role};
use crate::models::driver::{Driver, DriverFilter, DriverStatus};
use crate::store::{DriverMutation, StoreHandle};

#[derive(Debug, Clone, Serialize)]
pub struct NearbyDriver {
    pub driver: Driver,
    pub distance_km: f64,
}

/// Available, verified drivers with a known location within `radius_km`,
/// nearest first (ties by driver id).
pub fn rank_nearby<I>(drivers: I, point: &GeoPoint, radius_km: f64) -> Vec<NearbyDriver>
where
    I: IntoIterator<Item = Driver>,
{
    let mut nearby: Vec<NearbyDriver> = drivers
        .into_iter()
        .filter(Driver::can_take_work)
        .filter_map(|driver| {
            let location = driver.location?;
            let distance_km = distance_km(point, &location);
            (distance_km <= radius_km).then_some(NearbyDriver {
                driver,
                distance_km,
            })
        })
        .collect();

    nearby.sort_by(|a, b| {
        a.distance_km
            .total_cmp(&b.distance_km)
            .then_with(|| a.driver.id.cmp(&b.driver.id))
    });
    nearby
}

#[derive(Clone)]
pub struct DriverRegistry {
    store: StoreHandle,
}

impl DriverRegistry {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    pub async fn find_nearby(&self, point: &GeoPoint, radius_km: f64) -> Result<Vec<NearbyDriver>, AppError> {
        let filter = DriverFilter {
            status: Some(DriverStatus::Available),
            verified: Some(true),
        };
        let drivers = self.store.list_drivers(&filter).await?;
        Ok(rank_nearby(drivers, point, radius_km))
    }

    pub async fn register(
        &self,
        ctx: &RequestContext,
        license_number: &str,
        service_area: Option<String>,
    ) -> Result<Driver, AppError> {
        ctx.require(Role::Driver)?;

        let license_number = license_number.trim();
        if license_number.is_empty() {
            return Err(AppError::Validation("license number is required".to_string()));
        }

        let driver = Driver::new(ctx.user_id, license_number.to_string(), service_area);
        self.store.insert_driver(driver.clone()).await?;

        info!(driver_id = %driver.id, user_id = %ctx.user_id, "driver registered");
        Ok(driver)
    }

    pub async fn profile(&self, ctx: &RequestContext) -> Result<Driver, AppError> {
        ctx.require(Role::Driver)?;
        self.store
            .driver_by_user(ctx.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("driver profile not found".to_string()))
    }

    pub async fn driver(&self, driver_id: Uuid) -> Result<Driver, AppError> {
        self.store
            .driver(driver_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))
    }

    pub async fn list(&self, ctx: &RequestContext, filter: &DriverFilter) -> Result<Vec<Driver>, AppError> {
        ctx.require(Role::Admin)?;
        self.store.list_drivers(filter).await
    }

    /// Unconditional overwrite; no history is kept.
    pub async fn update_location(
        &self,
        driver_id: Uuid,
        point: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<Driver, AppError> {
        point.validate("driver")?;
        self.update(
            driver_id,
            Box::new(move |driver: &mut Driver| {
                driver.location = Some(point);
                driver.location_updated_at = Some(at);
                driver.updated_at = at;
                Ok(())
            }),
        )
        .await
    }

    /// Drivers toggle between `available` and `offline`; `busy` belongs to
    /// the booking lifecycle.
    pub async fn set_availability(&self, driver_id: Uuid, target: DriverStatus) -> Result<Driver, AppError> {
        if target == DriverStatus::Busy {
            return Err(AppError::Validation(
                "drivers can only switch between available and offline".to_string(),
            ));
        }

        let driver = self
            .update(
                driver_id,
                Box::new(move |driver: &mut Driver| {
                    if driver.status == DriverStatus::Busy {
                        return Err(AppError::Conflict(format!(
                            "driver {} is on an active booking",
                            driver.id
                        )));
                    }
                    driver.status = target;
                    driver.updated_at = Utc::now();
                    Ok(())
                }),
            )
            .await?;

        info!(driver_id = %driver.id, status = ?driver.status, "driver availability changed");
        Ok(driver)
    }

    pub async fn verify(&self, ctx: &RequestContext, driver_id: Uuid, verified: bool) -> Result<Driver, AppError> {
        ctx.require(Role::Admin)?;

        let admin_id = ctx.user_id;
        let driver = self
            .update(
                driver_id,
                Box::new(move |driver: &mut Driver| {
                    let now = Utc::now();
                    driver.is_verified = verified;
                    if verified {
                        driver.verified_at = Some(now);
                        driver.verified_by = Some(admin_id);
                    } else {
                        driver.verified_at = None;
                        driver.verified_by = None;
                    }
                    driver.updated_at = now;
                    Ok(())
                }),
            )
            .await?;

        info!(driver_id = %driver.id, verified, "driver verification updated");
        Ok(driver)
    }

    async fn update(&self, driver_id: Uuid, mutation: DriverMutation) -> Result<Driver, AppError> {
        self.store.update_driver(driver_id, mutation).await
    }
}
