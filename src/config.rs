use anyhow::{Result, bail};
use chrono_tz::Tz;
use std::time::Duration;

// -----------------------------------------------
// PROVIDER API ENDPOINTS
// -----------------------------------------------
pub const PROVIDER_BASE_URL: &str = "https://api.tdameritrade.com/v1";

pub fn option_chain_url(base_url: &str, api_key: &str, symbol: &str, to_date: &str) -> String {
    format!(
        "{}/marketdata/chains?apikey={}&symbol={}&contractType=ALL&range=ALL&toDate={}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(api_key),
        urlencoding::encode(symbol),
        urlencoding::encode(to_date)
    )
}

// -----------------------------------------------
// CAPTURE CLOCK
// -----------------------------------------------
pub const MARKET_TZ: Tz = chrono_tz::US::Eastern;
pub const CAPTURE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// -----------------------------------------------
// HTTP CLIENT CONFIG
// -----------------------------------------------
pub const USER_AGENT: &str = concat!("chain-capture/", env!("CARGO_PKG_VERSION"));
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(20);

// -----------------------------------------------
// RETRY CONFIG
// -----------------------------------------------
// Rate-limited responses (429) get the longest waits
pub const RETRY_BASE_DELAY_MS: u64 = 500;
pub const RETRY_FACTOR: u64 = 2;
pub const RETRY_MAX_DELAY_SECS: u64 = 5;
pub const RETRY_MAX_ATTEMPTS: usize = 4;

// -----------------------------------------------
// CONCURRENCY LIMITS
// -----------------------------------------------
pub const DEFAULT_MAX_CONCURRENT: usize = 2;
pub const MAX_CONCURRENT_CEILING: usize = 20;

// -----------------------------------------------
// DEFAULTS
// -----------------------------------------------
pub const DEFAULT_TICKERS: &str = "QQQ";
/// 0 = same-day expirations only
pub const DEFAULT_DAYS_AHEAD: i64 = 0;
pub const ALERT_USERNAME: &str = "OptionsFailure";

// -----------------------------------------------
// RUNTIME CONFIGURATION
// -----------------------------------------------

/// Provider API key, required
pub fn get_api_key() -> Option<String> {
    std::env::var("CHAIN_API_KEY")
        .ok()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
}

pub fn get_base_url() -> String {
    std::env::var("CHAIN_BASE_URL").unwrap_or_else(|_| PROVIDER_BASE_URL.to_string())
}

/// Tickers to capture, from a comma separated list
pub fn get_tickers() -> Vec<String> {
    let raw = std::env::var("CHAIN_TICKERS").unwrap_or_else(|_| DEFAULT_TICKERS.to_string());
    parse_tickers(&raw)
}

pub fn parse_tickers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|t| t.trim().to_uppercase())
        .filter(|t| !t.is_empty())
        .collect()
}

pub fn get_days_ahead() -> i64 {
    std::env::var("CHAIN_DAYS_AHEAD")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .map(|d| d.max(0))
        .unwrap_or(DEFAULT_DAYS_AHEAD)
}

pub fn get_max_concurrent() -> usize {
    std::env::var("CHAIN_MAX_CONCURRENT")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .map(|n| n.clamp(1, MAX_CONCURRENT_CEILING))
        .unwrap_or(DEFAULT_MAX_CONCURRENT)
}

/// Discord-style webhook for failure alerts. Alerts are off when unset.
pub fn get_alert_webhook() -> Option<String> {
    std::env::var("CHAIN_ALERT_WEBHOOK")
        .ok()
        .filter(|u| !u.trim().is_empty())
}

/// Settings for one run of the capture CLI
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub api_key: String,
    pub base_url: String,
    pub tickers: Vec<String>,
    pub days_ahead: i64,
    pub max_concurrent: usize,
    pub alert_webhook: Option<String>,
}

impl CaptureConfig {
    /// Create new configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            api_key: get_api_key().unwrap_or_default(),
            base_url: get_base_url(),
            tickers: get_tickers(),
            days_ahead: get_days_ahead(),
            max_concurrent: get_max_concurrent(),
            alert_webhook: get_alert_webhook(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            bail!("CHAIN_API_KEY is not set");
        }
        if self.tickers.is_empty() {
            bail!("CHAIN_TICKERS contains no symbols");
        }
        Ok(())
    }
}
