//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use domain::PricingPolicy;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL URL; the in-memory store is used when unset
/// - `DB_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `STORAGE_TIMEOUT_SECS`: pool acquire and statement timeout (default: `5`)
/// - `TAX_RATE_BPS`: tax rate in basis points (default: `0`)
/// - `SUGGESTED_TIP_BPS`: suggested tip in basis points (default: `1000`)
/// - `TICKET_SPOOL_DIR`: where kitchen tickets are written (default: `./tickets`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub storage_timeout: Duration,
    pub tax_rate_bps: u32,
    pub suggested_tip_bps: u32,
    pub ticket_spool_dir: PathBuf,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults for
    /// missing or unparsable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        fn parse_key<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            lookup(key).and_then(|v| v.trim().parse().ok())
        }

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_key(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or_default(),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            db_max_connections: parse_key(&lookup, "DB_MAX_CONNECTIONS").unwrap_or(defaults.db_max_connections),
            storage_timeout: parse_key(&lookup, "STORAGE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.storage_timeout),
            tax_rate_bps: parse_key(&lookup, "TAX_RATE_BPS").unwrap_or(defaults.tax_rate_bps),
            suggested_tip_bps: parse_key(&lookup, "SUGGESTED_TIP_BPS").unwrap_or(defaults.suggested_tip_bps),
            ticket_spool_dir: lookup("TICKET_SPOOL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.ticket_spool_dir),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn pricing(&self) -> PricingPolicy {
        PricingPolicy::new(self.tax_rate_bps, self.suggested_tip_bps)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            db_max_connections: 10,
            storage_timeout: Duration::from_secs(5),
            tax_rate_bps: 0,
            suggested_tip_bps: 1000,
            ticket_spool_dir: PathBuf::from("./tickets"),
        }
    }
}
