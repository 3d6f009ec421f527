//! Engine configuration.
//!
//! Values come from `CHECKOUT_*` environment variables (a `.env` file is
//! honoured) or are set in code. Unset variables keep their defaults.

use crate::domain::analytics::AnalyticsLevel;
use crate::error::{CheckoutError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://checkoutshopper-test.adyen.com/checkoutshopper/";
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_POLLING_DURATION: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_ANALYTICS_DISPATCH_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutConfig {
    pub base_url: String,
    pub client_key: String,
    #[serde(with = "millis")]
    pub polling_interval: Duration,
    #[serde(with = "millis")]
    pub max_polling_duration: Duration,
    pub analytics_level: AnalyticsLevel,
    #[serde(with = "millis")]
    pub analytics_dispatch_interval: Duration,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            client_key: String::new(),
            polling_interval: DEFAULT_POLLING_INTERVAL,
            max_polling_duration: DEFAULT_MAX_POLLING_DURATION,
            analytics_level: AnalyticsLevel::default(),
            analytics_dispatch_interval: DEFAULT_ANALYTICS_DISPATCH_INTERVAL,
        }
    }
}

impl CheckoutConfig {
    pub fn base_url(&self) -> Result<Url> {
        Ok(Url::parse(&self.base_url)?)
    }

    /// Loads `.env` if present, then reads the environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(base_url) = lookup("CHECKOUT_BASE_URL") {
            Url::parse(&base_url)?;
            config.base_url = base_url;
        }
        if let Some(client_key) = lookup("CHECKOUT_CLIENT_KEY") {
            config.client_key = client_key;
        }
        if let Some(ms) = lookup("CHECKOUT_POLLING_INTERVAL_MS") {
            config.polling_interval = parse_millis("CHECKOUT_POLLING_INTERVAL_MS", &ms)?;
        }
        if let Some(ms) = lookup("CHECKOUT_MAX_POLLING_DURATION_MS") {
            config.max_polling_duration = parse_millis("CHECKOUT_MAX_POLLING_DURATION_MS", &ms)?;
        }
        if let Some(level) = lookup("CHECKOUT_ANALYTICS_LEVEL") {
            config.analytics_level = level.parse().map_err(CheckoutError::checkout)?;
        }
        if let Some(ms) = lookup("CHECKOUT_ANALYTICS_DISPATCH_INTERVAL_MS") {
            config.analytics_dispatch_interval =
                parse_millis("CHECKOUT_ANALYTICS_DISPATCH_INTERVAL_MS", &ms)?;
        }

        if config.polling_interval.is_zero() {
            return Err(CheckoutError::checkout("Polling interval must be positive"));
        }
        Ok(config)
    }
}

fn parse_millis(key: &str, value: &str) -> Result<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| CheckoutError::checkout_with(format!("Invalid value for {key}: {value}"), e))
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
