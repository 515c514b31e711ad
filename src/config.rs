use std::env;
use std::time::Duration;

use crate::engine::scoring::RankingWeights;
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub dispatch_queue_size: usize,
    pub event_buffer_size: usize,
    pub dispatch: DispatchSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

/// Tunables the dispatch engine reads on every cycle.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub offer_ttl: Duration,
    pub search_radius_km: f64,
    pub candidate_limit: usize,
    pub max_dispatch_attempts: u32,
    pub retry_base_delay: Duration,
    pub ranking_stale_after: Duration,
    pub sweep_interval: Duration,
    pub weights: RankingWeights,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            offer_ttl: Duration::from_secs(120),
            search_radius_km: 10.0,
            candidate_limit: 20,
            max_dispatch_attempts: 5,
            retry_base_delay: Duration::from_millis(2_000),
            ranking_stale_after: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(5),
            weights: RankingWeights::default(),
        }
    }
}

impl DispatchSettings {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.offer_ttl.is_zero() {
            return Err(AppError::Validation("OFFER_TTL_SECS must be > 0".to_string()));
        }
        if !self.search_radius_km.is_finite() || self.search_radius_km <= 0.0 {
            return Err(AppError::Validation(
                "SEARCH_RADIUS_KM must be > 0".to_string(),
            ));
        }
        if self.candidate_limit == 0 {
            return Err(AppError::Validation("CANDIDATE_LIMIT must be > 0".to_string()));
        }
        if self.max_dispatch_attempts == 0 {
            return Err(AppError::Validation(
                "MAX_DISPATCH_ATTEMPTS must be > 0".to_string(),
            ));
        }
        self.weights.validate()
    }

    /// Exponential backoff before re-dispatching an exhausted task.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.retry_base_delay.saturating_mul(1u32 << exponent)
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        };

        let defaults = DispatchSettings::default();
        let dispatch = DispatchSettings {
            offer_ttl: Duration::from_secs(parse_or_default("OFFER_TTL_SECS", 120)?),
            search_radius_km: parse_or_default("SEARCH_RADIUS_KM", defaults.search_radius_km)?,
            candidate_limit: parse_or_default("CANDIDATE_LIMIT", defaults.candidate_limit)?,
            max_dispatch_attempts: parse_or_default(
                "MAX_DISPATCH_ATTEMPTS",
                defaults.max_dispatch_attempts,
            )?,
            retry_base_delay: Duration::from_millis(parse_or_default(
                "RETRY_BASE_DELAY_MS",
                2_000,
            )?),
            ranking_stale_after: Duration::from_secs(parse_or_default(
                "RANKING_STALE_AFTER_SECS",
                30,
            )?),
            sweep_interval: Duration::from_secs(parse_or_default("SWEEP_INTERVAL_SECS", 5)?),
            weights: RankingWeights {
                distance: parse_or_default("WEIGHT_DISTANCE", defaults.weights.distance)?,
                rating: parse_or_default("WEIGHT_RATING", defaults.weights.rating)?,
                success_rate: parse_or_default("WEIGHT_SUCCESS", defaults.weights.success_rate)?,
            },
        };
        dispatch.validate()?;

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format,
            dispatch_queue_size: parse_or_default("DISPATCH_QUEUE_SIZE", 1024)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            dispatch,
        })
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

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::DispatchSettings;

    #[test]
    fn defaults_are_valid() {
        let settings = DispatchSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.offer_ttl, Duration::from_secs(120));
    }

    #[test]
    fn retry_delay_doubles_per_attempt() {
        let settings = DispatchSettings::default();
        assert_eq!(settings.retry_delay(1), Duration::from_secs(2));
        assert_eq!(settings.retry_delay(2), Duration::from_secs(4));
        assert_eq!(settings.retry_delay(3), Duration::from_secs(8));
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let settings = DispatchSettings {
            offer_ttl: Duration::ZERO,
            ..DispatchSettings::default()
        };
        assert!(settings.validate().is_err());
    }
}
