use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub offer_window_secs: u64,
    pub offer_fanout: usize,
    pub max_search_radius_miles: f64,
    pub location_freshness_secs: i64,
    pub surge_window_mins: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            offer_window_secs: parse_or_default("OFFER_WINDOW_SECS", 15)?,
            offer_fanout: parse_or_default("OFFER_FANOUT", 3)?,
            max_search_radius_miles: parse_or_default("MAX_SEARCH_RADIUS_MILES", 10.0)?,
            location_freshness_secs: parse_or_default("LOCATION_FRESHNESS_SECS", 300)?,
            surge_window_mins: parse_or_default("SURGE_WINDOW_MINS", 30)?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            event_buffer_size: 1024,
            offer_window_secs: 15,
            offer_fanout: 3,
            max_search_radius_miles: 10.0,
            location_freshness_secs: 300,
            surge_window_mins: 30,
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
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
