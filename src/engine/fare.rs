use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq)]
pub struct FareConfig {
    pub base_fare: Decimal,
    pub per_km_rate: Decimal,
    pub commission_percent: Decimal,
    pub min_commission: Decimal,
    pub max_commission: Decimal,
}

impl Default for FareConfig {
    fn default() -> Self {
        Self {
            base_fare: Decimal::from(150),
            per_km_rate: Decimal::from(15),
            commission_percent: Decimal::from(10),
            min_commission: Decimal::from(100),
            max_commission: Decimal::from(300),
        }
    }
}

/// Outcome of settling a booking. `commission + driver_earning == final_fare`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Settlement {
    pub final_fare: Decimal,
    pub commission: Decimal,
    pub driver_earning: Decimal,
}

#[derive(Debug, Clone)]
pub struct FareCalculator {
    config: FareConfig,
}

impl FareCalculator {
    pub fn new(config: FareConfig) -> Result<Self, AppError> {
        if config.min_commission > config.max_commission {
            return Err(AppError::Internal(format!(
                "min commission {} exceeds max commission {}",
                config.min_commission, config.max_commission
            )));
        }
        if config.base_fare.is_sign_negative() || config.per_km_rate.is_sign_negative() {
            return Err(AppError::Internal("fare rates must not be negative".to_string()));
        }

        Ok(Self { config })
    }

    /// `base + km * rate`, rounded to the nearest multiple of 10.
    pub fn estimate(&self, distance_km: f64) -> Result<Decimal, AppError> {
        if !distance_km.is_finite() || distance_km < 0.0 {
            return Err(AppError::Validation(format!(
                "distance must be a non-negative number, got {distance_km}"
            )));
        }

        let km = Decimal::from_f64(distance_km)
            .ok_or_else(|| AppError::Validation(format!("distance {distance_km} is not representable")))?
            .round_dp(2);
        let raw = self.config.base_fare + km * self.config.per_km_rate;
        let tens = (raw / Decimal::TEN).round();

        Ok((tens * Decimal::TEN).normalize())
    }

    pub fn commission(&self, final_fare: Decimal) -> Result<Decimal, AppError> {
        let raw = final_fare
            .checked_mul(self.config.commission_percent)
            .and_then(|scaled| scaled.checked_div(Decimal::ONE_HUNDRED))
            .ok_or_else(|| overflow(final_fare))?;
        Ok(raw
            .clamp(self.config.min_commission, self.config.max_commission)
            .round_dp(2)
            .normalize())
    }

    pub fn settle(&self, final_fare: Decimal) -> Result<Settlement, AppError> {
        if final_fare < self.config.min_commission {
            return Err(AppError::Validation(format!(
                "final fare {final_fare} is below the minimum commission {}",
                self.config.min_commission
            )));
        }

        let commission = self.commission(final_fare)?;
        let driver_earning = final_fare
            .checked_sub(commission)
            .ok_or_else(|| overflow(final_fare))?;
        Ok(Settlement {
            final_fare: final_fare.normalize(),
            commission,
            driver_earning: driver_earning.normalize(),
        })
    }
}

fn overflow(final_fare: Decimal) -> AppError {
    AppError::Validation(format!("final fare {final_fare} is out of range"))
}

impl Default for FareCalculator {
    fn default() -> Self {
        Self {
            config: FareConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::{FareCalculator, FareConfig};
    use crate::error::AppError;
    use crate::geo::{distance_km, GeoPoint};

    #[test]
    fn estimate_rounds_to_nearest_ten() {
        let fares = FareCalculator::default();
        assert_eq!(fares.estimate(0.0).unwrap(), dec!(150));
        assert_eq!(fares.estimate(10.0).unwrap(), dec!(300));
        // 150 + 12.3 * 15 = 334.5
        assert_eq!(fares.estimate(12.3).unwrap(), dec!(330));
        // 150 + 12.7 * 15 = 340.5
        assert_eq!(fares.estimate(12.7).unwrap(), dec!(340));
    }

    #[test]
    fn estimate_for_hyderabad_to_warangal() {
        let fares = FareCalculator::default();
        let km = distance_km(
            &GeoPoint::new(17.3850, 78.4867),
            &GeoPoint::new(17.9689, 79.5941),
        );
        let fare = fares.estimate(km).unwrap();

        assert_eq!(fare % dec!(10), dec!(0));
        assert!(fare >= dec!(2000) && fare <= dec!(2200), "got {fare}");
    }

    #[test]
    fn estimate_rejects_negative_distance() {
        let fares = FareCalculator::default();
        assert!(matches!(fares.estimate(-1.0), Err(AppError::Validation(_))));
        assert!(matches!(fares.estimate(f64::NAN), Err(AppError::Validation(_))));
    }

    #[test]
    fn commission_is_ten_percent_inside_bounds() {
        let settlement = FareCalculator::default().settle(dec!(2000)).unwrap();
        assert_eq!(settlement.commission, dec!(200));
        assert_eq!(settlement.driver_earning, dec!(1800));
    }

    #[test]
    fn commission_is_clamped_to_minimum() {
        let settlement = FareCalculator::default().settle(dec!(500)).unwrap();
        assert_eq!(settlement.commission, dec!(100));
        assert_eq!(settlement.driver_earning, dec!(400));
    }

    #[test]
    fn commission_is_clamped_to_maximum() {
        let settlement = FareCalculator::default().settle(dec!(10000)).unwrap();
        assert_eq!(settlement.commission, dec!(300));
        assert_eq!(settlement.driver_earning, dec!(9700));
    }

    #[test]
    fn settlement_conserves_money() {
        let fares = FareCalculator::default();
        for fare in [dec!(100), dec!(1234.56), dec!(2999.99), dec!(3000.01), dec!(77777.7)] {
            let settlement = fares.settle(fare).unwrap();
            assert_eq!(settlement.commission + settlement.driver_earning, fare);
            assert!(settlement.commission >= dec!(100) && settlement.commission <= dec!(300));
        }
    }

    #[test]
    fn fare_below_minimum_commission_is_rejected() {
        let err = FareCalculator::default().settle(dec!(99.99)).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn out_of_range_fare_is_rejected() {
        let fares = FareCalculator::default();
        assert!(matches!(fares.commission(Decimal::MAX), Err(AppError::Validation(_))));
        assert!(matches!(fares.settle(Decimal::MAX), Err(AppError::Validation(_))));
    }

    #[test]
    fn inverted_commission_bounds_are_rejected() {
        let config = FareConfig {
            min_commission: dec!(400),
            ..FareConfig::default()
        };
        assert!(FareCalculator::new(config).is_err());
    }
}
