//! Configuration loader for the `tankflow` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). By consolidating configuration logic here, we
//! avoid scattering `env::var` calls throughout the codebase.
use std::{env, net::SocketAddr, time::Duration};

use anyhow::{anyhow, Result};
use chrono::FixedOffset;

use crate::ingest::MqttSettings;
use crate::models::ExtremeBounds;
use crate::notify::SmsCredentials;

/// Parse an optional environment variable into `$ty` with a default value.
macro_rules! parse_env {
    ($var_name:expr, $ty:ty, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.trim().parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Read an optional string environment variable with a default value.
macro_rules! optional_env {
    ($var_name:expr, $default:expr) => {
        env::var($var_name).unwrap_or_else(|_| $default.to_string())
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

pub const DEFAULT_PUSH_URL: &str = "https://exp.host/--/api/v2/push/send";
pub const DEFAULT_SMS_URL: &str = "https://sms.textsms.co.ke/api/services/sendsms/";

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// Device registry base URL.
    pub registry_url: String,

    /// MQTT broker host.
    pub mqtt_host: String,

    /// MQTT broker port.
    pub mqtt_port: u16,

    /// MQTT keep-alive. Evaluations run off the event loop, so pings are not
    /// delayed by `http_timeout`.
    pub mqtt_keep_alive: Duration,

    /// Wait between connection checks per topic.
    pub reconnect_interval: Duration,

    /// Push relay endpoint.
    pub push_url: String,

    /// SMS gateway endpoint.
    pub sms_url: String,

    /// SMS gateway credentials.
    pub sms: SmsCredentials,

    /// Extreme full/empty bounds in percent.
    pub bounds: ExtremeBounds,

    /// Moving-average window for analytics.
    pub smoothing_window: usize,

    /// Offset used to stamp notification records.
    pub message_offset: FixedOffset,

    /// Timeout for outbound HTTP calls.
    pub http_timeout: Duration,

    /// HTTP bind address.
    pub listen_addr: SocketAddr,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `SMS_API_KEY`, `SMS_PARTNER_ID` – SMS gateway credentials
///
/// Optional:
/// - `REGISTRY_URL` (default: `http://localhost`)
/// - `MQTT_HOST` / `MQTT_PORT` / `MQTT_KEEP_ALIVE_SECS` (default: `localhost` / 1883 / 15)
/// - `RECONNECT_INTERVAL_SECS` (default: 10)
/// - `PUSH_URL`, `SMS_URL`, `SMS_SHORTCODE` (default: `TextSMS`)
/// - `TANK_FULL_PERCENT` / `TANK_EMPTY_PERCENT` (default: 100 / 20)
/// - `SMOOTHING_WINDOW` (default: 2)
/// - `MESSAGE_UTC_OFFSET_HOURS` (default: 3)
/// - `HTTP_TIMEOUT_SECS` (default: 10)
/// - `LISTEN_ADDR` (default: `0.0.0.0:8082`)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let api_key = require_env!("SMS_API_KEY");
    let partner_id = require_env!("SMS_PARTNER_ID");

    let offset_hours = parse_env!("MESSAGE_UTC_OFFSET_HOURS", i32, 3);
    let message_offset = FixedOffset::east_opt(offset_hours * 3600)
        .ok_or_else(|| anyhow!("Invalid MESSAGE_UTC_OFFSET_HOURS: {}", offset_hours))?;

    let smoothing_window = parse_env!("SMOOTHING_WINDOW", usize, 2);
    if smoothing_window == 0 {
        return Err(anyhow!("Invalid SMOOTHING_WINDOW: must be at least 1"));
    }

    let bounds = ExtremeBounds {
        full: parse_env!("TANK_FULL_PERCENT", f64, 100.0),
        empty: parse_env!("TANK_EMPTY_PERCENT", f64, 20.0),
    };
    if bounds.empty >= bounds.full {
        return Err(anyhow!(
            "TANK_EMPTY_PERCENT ({}) must be below TANK_FULL_PERCENT ({})",
            bounds.empty,
            bounds.full
        ));
    }

    Ok(Config {
        registry_url: optional_env!("REGISTRY_URL", "http://localhost"),
        mqtt_host: optional_env!("MQTT_HOST", "localhost"),
        mqtt_port: parse_env!("MQTT_PORT", u16, 1883),
        mqtt_keep_alive: Duration::from_secs(parse_env!("MQTT_KEEP_ALIVE_SECS", u64, 15)),
        reconnect_interval: Duration::from_secs(parse_env!("RECONNECT_INTERVAL_SECS", u64, 10)),
        push_url: optional_env!("PUSH_URL", DEFAULT_PUSH_URL),
        sms_url: optional_env!("SMS_URL", DEFAULT_SMS_URL),
        sms: SmsCredentials {
            api_key,
            partner_id,
            shortcode: optional_env!("SMS_SHORTCODE", "TextSMS"),
        },
        bounds,
        smoothing_window,
        message_offset,
        http_timeout: Duration::from_secs(parse_env!("HTTP_TIMEOUT_SECS", u64, 10)),
        listen_addr: parse_env!("LISTEN_ADDR", SocketAddr, SocketAddr::from(([0, 0, 0, 0], 8082))),
    })
}

impl Config {
    pub fn mqtt_settings(&self) -> MqttSettings {
        MqttSettings {
            host: self.mqtt_host.clone(),
            port: self.mqtt_port,
            keep_alive: self.mqtt_keep_alive,
        }
    }

    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks the SMS API key while showing all other values that were loaded.
    pub fn log_config(&self) {
        // ---
        let masked_key = mask_secret(&self.sms.api_key);

        tracing::info!("Configuration loaded:");
        tracing::info!("  REGISTRY_URL            : {}", self.registry_url);
        tracing::info!("  MQTT                    : {}:{}", self.mqtt_host, self.mqtt_port);
        tracing::info!("  MQTT_KEEP_ALIVE_SECS    : {}", self.mqtt_keep_alive.as_secs());
        tracing::info!("  RECONNECT_INTERVAL_SECS : {}", self.reconnect_interval.as_secs());
        tracing::info!("  PUSH_URL                : {}", self.push_url);
        tracing::info!("  SMS_URL                 : {}", self.sms_url);
        tracing::info!("  SMS_API_KEY             : {}", masked_key);
        tracing::info!("  SMS_PARTNER_ID          : {}", self.sms.partner_id);
        tracing::info!("  SMS_SHORTCODE           : {}", self.sms.shortcode);
        tracing::info!("  TANK_FULL/EMPTY_PERCENT : {}/{}", self.bounds.full, self.bounds.empty);
        tracing::info!("  SMOOTHING_WINDOW        : {}", self.smoothing_window);
        tracing::info!("  MESSAGE_UTC_OFFSET      : {}", self.message_offset);
        tracing::info!("  HTTP_TIMEOUT_SECS       : {}", self.http_timeout.as_secs());
        tracing::info!("  LISTEN_ADDR             : {}", self.listen_addr);
    }
}

/// Keep the last four characters of a secret.
fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_mask_secret() {
        // ---
        assert_eq!(mask_secret("5fb19e73763aa97a"), "****a97a");
        assert_eq!(mask_secret("abc"), "****");
        assert_eq!(mask_secret(""), "****");
    }
}
