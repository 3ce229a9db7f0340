use std::env;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::engine::dispatch::DispatchSettings;
use crate::engine::fare::FareConfig;
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub base_fare: Decimal,
    pub per_km_rate: Decimal,
    pub commission_percent: Decimal,
    pub min_commission: Decimal,
    pub max_commission: Decimal,
    pub nearby_radius_km: f64,
    pub provider_timeout_ms: u64,
    pub booking_code_attempts: u32,
    pub advance_percent: Decimal,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            base_fare: parse_or_default("BASE_FARE", defaults.base_fare)?,
            per_km_rate: parse_or_default("PER_KM_RATE", defaults.per_km_rate)?,
            commission_percent: parse_or_default("COMMISSION_PERCENT", defaults.commission_percent)?,
            min_commission: parse_or_default("MIN_COMMISSION", defaults.min_commission)?,
            max_commission: parse_or_default("MAX_COMMISSION", defaults.max_commission)?,
            nearby_radius_km: parse_or_default("NEARBY_RADIUS_KM", defaults.nearby_radius_km)?,
            provider_timeout_ms: parse_or_default("PROVIDER_TIMEOUT_MS", defaults.provider_timeout_ms)?,
            booking_code_attempts: parse_or_default(
                "BOOKING_CODE_ATTEMPTS",
                defaults.booking_code_attempts,
            )?,
            advance_percent: parse_or_default("ADVANCE_PERCENT", defaults.advance_percent)?,
        };

        if config.event_buffer_size == 0 {
            return Err(AppError::Internal(
                "invalid EVENT_BUFFER_SIZE: must be positive".to_string(),
            ));
        }
        if config.advance_percent <= Decimal::ZERO || config.advance_percent > Decimal::ONE_HUNDRED {
            return Err(AppError::Internal(
                "invalid ADVANCE_PERCENT: must be in (0, 100]".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn fare_config(&self) -> FareConfig {
        FareConfig {
            base_fare: self.base_fare,
            per_km_rate: self.per_km_rate,
            commission_percent: self.commission_percent,
            min_commission: self.min_commission,
            max_commission: self.max_commission,
        }
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            nearby_radius_km: self.nearby_radius_km,
            provider_timeout: self.provider_timeout(),
            code_attempts: self.booking_code_attempts,
        }
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        let fares = FareConfig::default();
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            event_buffer_size: 1024,
            base_fare: fares.base_fare,
            per_km_rate: fares.per_km_rate,
            commission_percent: fares.commission_percent,
            min_commission: fares.min_commission,
            max_commission: fares.max_commission,
            nearby_radius_km: 50.0,
            provider_timeout_ms: 3_000,
            booking_code_attempts: 8,
            advance_percent: Decimal::from(50),
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
