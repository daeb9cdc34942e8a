use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub messaging_api_url: String,
    pub messaging_api_key: String,
    pub messaging_timeout_secs: u64,
    pub messaging_max_attempts: u32,
    pub notification_concurrency: usize,
    pub default_country_code: String,
    pub clinic_utc_offset_hours: i32,
    pub working_hours: Vec<u32>,
    pub max_suggested_slots: usize,
    pub confirmation_lookback_hours: i64,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_service_key: String::new(),
            messaging_api_url: String::new(),
            messaging_api_key: String::new(),
            messaging_timeout_secs: 10,
            messaging_max_attempts: 3,
            notification_concurrency: 8,
            default_country_code: "55".to_string(),
            clinic_utc_offset_hours: -3,
            working_hours: vec![9, 10, 11, 14, 15, 16, 17],
            max_suggested_slots: 3,
            confirmation_lookback_hours: 24,
            port: 3000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_service_key: env::var("SUPABASE_SERVICE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_KEY not set, using empty value");
                    String::new()
                }),
            messaging_api_url: env::var("MESSAGING_API_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| {
                    warn!("MESSAGING_API_URL not set, outbound messages disabled");
                    String::new()
                }),
            messaging_api_key: env::var("MESSAGING_API_KEY")
                .unwrap_or_else(|_| {
                    warn!("MESSAGING_API_KEY not set, using empty value");
                    String::new()
                }),
            messaging_timeout_secs: parse_var("MESSAGING_TIMEOUT_SECS", defaults.messaging_timeout_secs),
            messaging_max_attempts: parse_var("MESSAGING_MAX_ATTEMPTS", defaults.messaging_max_attempts).max(1),
            notification_concurrency: parse_var("NOTIFICATION_CONCURRENCY", defaults.notification_concurrency).max(1),
            default_country_code: env::var("DEFAULT_COUNTRY_CODE")
                .unwrap_or(defaults.default_country_code),
            clinic_utc_offset_hours: parse_var("CLINIC_UTC_OFFSET_HOURS", defaults.clinic_utc_offset_hours),
            working_hours: env::var("WORKING_HOURS")
                .ok()
                .and_then(|raw| parse_hours(&raw))
                .unwrap_or(defaults.working_hours),
            max_suggested_slots: parse_var("MAX_SUGGESTED_SLOTS", defaults.max_suggested_slots),
            confirmation_lookback_hours: parse_var("CONFIRMATION_LOOKBACK_HOURS", defaults.confirmation_lookback_hours),
            port: parse_var("PORT", defaults.port),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_service_key.is_empty()
    }

    pub fn is_messaging_configured(&self) -> bool {
        !self.messaging_api_url.is_empty() && !self.messaging_api_key.is_empty()
    }
}

fn parse_var<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has an invalid value '{}', using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

/// Parses a comma-separated list of hours ("9,10,14"). Out-of-range entries
/// invalidate the whole list.
pub fn parse_hours(raw: &str) -> Option<Vec<u32>> {
    let mut hours = raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<u32>().ok().filter(|h| *h < 24))
        .collect::<Option<Vec<u32>>>()?;

    if hours.is_empty() {
        warn!("WORKING_HOURS is empty, using default");
        return None;
    }

    hours.sort_unstable();
    hours.dedup();
    Some(hours)
}
