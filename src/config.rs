use std::env;

use crate::error::AppError;
use crate::geo::selector::RadiusBounds;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub session_buffer_size: usize,
    pub default_radius_km: f64,
    pub min_radius_km: f64,
    pub max_radius_km: f64,
    pub area_cell_degrees: f64,
    pub pricing_timeout_ms: u64,
    pub default_quotation: f64,
    pub eta_speed_kmh: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            session_buffer_size: 256,
            default_radius_km: 15.0,
            min_radius_km: 1.0,
            max_radius_km: 50.0,
            area_cell_degrees: 0.1,
            pricing_timeout_ms: 1_500,
            default_quotation: 500.0,
            eta_speed_kmh: 30.0,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            session_buffer_size: parse_or_default(
                "SESSION_BUFFER_SIZE",
                defaults.session_buffer_size,
            )?,
            default_radius_km: parse_or_default("DEFAULT_RADIUS_KM", defaults.default_radius_km)?,
            min_radius_km: parse_or_default("MIN_RADIUS_KM", defaults.min_radius_km)?,
            max_radius_km: parse_or_default("MAX_RADIUS_KM", defaults.max_radius_km)?,
            area_cell_degrees: parse_or_default("AREA_CELL_DEGREES", defaults.area_cell_degrees)?,
            pricing_timeout_ms: parse_or_default("PRICING_TIMEOUT_MS", defaults.pricing_timeout_ms)?,
            default_quotation: parse_or_default("DEFAULT_QUOTATION", defaults.default_quotation)?,
            eta_speed_kmh: parse_or_default("ETA_SPEED_KMH", defaults.eta_speed_kmh)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn radius_bounds(&self) -> RadiusBounds {
        RadiusBounds {
            min_km: self.min_radius_km,
            max_km: self.max_radius_km,
        }
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.min_radius_km <= 0.0 || self.min_radius_km > self.max_radius_km {
            return Err(AppError::Internal(format!(
                "radius bounds must satisfy 0 < MIN_RADIUS_KM <= MAX_RADIUS_KM (got {} / {})",
                self.min_radius_km, self.max_radius_km
            )));
        }
        if !(self.min_radius_km..=self.max_radius_km).contains(&self.default_radius_km) {
            return Err(AppError::Internal(
                "DEFAULT_RADIUS_KM must lie within the radius bounds".to_string(),
            ));
        }
        if self.area_cell_degrees <= 0.0 {
            return Err(AppError::Internal(
                "AREA_CELL_DEGREES must be positive".to_string(),
            ));
        }
        if self.session_buffer_size == 0 {
            return Err(AppError::Internal(
                "SESSION_BUFFER_SIZE must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
