//! Application configuration loaded from environment variables.

use std::time::Duration;

use checkout::provider::mercadopago::DEFAULT_API_URL;

/// Log output format of the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` bind address (default: `"0.0.0.0"`)
/// - `PORT` listen port (default: `3000`)
/// - `RUST_LOG` tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` `text` or `json` (default: `text`)
/// - `BASE_URL`, falling back to `NEXT_PUBLIC_BASE_URL`: public storefront
///   URL used for back and notification URLs (default: `http://localhost:3000`)
/// - `MERCADO_PAGO_ACCESS_TOKEN` provider credential; unset disables checkout
/// - `MERCADO_PAGO_API_URL` provider endpoint (default: production API)
/// - `PROVIDER_TIMEOUT_MS` provider request timeout (default: `10000`)
/// - `EXTERNAL_REFERENCE_PREFIX` (default: `"impres-loja"`)
/// - `DATABASE_URL` PostgreSQL connection string; unset uses the in-memory store
/// - `FULFILLMENT_MAX_ATTEMPTS` conflict retry bound (default: `5`)
#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub base_url: String,
    pub mercado_pago_access_token: Option<String>,
    pub mercado_pago_api_url: String,
    pub provider_timeout: Duration,
    pub reference_prefix: String,
    pub database_url: Option<String>,
    pub fulfillment_max_attempts: u32,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: var("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match var("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            base_url: var("BASE_URL")
                .or_else(|| var("NEXT_PUBLIC_BASE_URL"))
                .unwrap_or(defaults.base_url),
            mercado_pago_access_token: var("MERCADO_PAGO_ACCESS_TOKEN"),
            mercado_pago_api_url: var("MERCADO_PAGO_API_URL")
                .unwrap_or(defaults.mercado_pago_api_url),
            provider_timeout: var("PROVIDER_TIMEOUT_MS")
                .and_then(|ms| ms.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.provider_timeout),
            reference_prefix: var("EXTERNAL_REFERENCE_PREFIX")
                .unwrap_or(defaults.reference_prefix),
            database_url: var("DATABASE_URL"),
            fulfillment_max_attempts: var("FULFILLMENT_MAX_ATTEMPTS")
                .and_then(|n| n.parse().ok())
                .unwrap_or(defaults.fulfillment_max_attempts),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            base_url: "http://localhost:3000".to_string(),
            mercado_pago_access_token: None,
            mercado_pago_api_url: DEFAULT_API_URL.to_string(),
            provider_timeout: Duration::from_millis(10_000),
            reference_prefix: "impres-loja".to_string(),
            database_url: None,
            fulfillment_max_attempts: 5,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("base_url", &self.base_url)
            .field(
                "mercado_pago_access_token",
                &self.mercado_pago_access_token.as_ref().map(|_| "<redacted>"),
            )
            .field("mercado_pago_api_url", &self.mercado_pago_api_url)
            .field("provider_timeout", &self.provider_timeout)
            .field("reference_prefix", &self.reference_prefix)
            .field("database_url", &self.database_url.as_ref().map(|_| "<redacted>"))
            .field("fulfillment_max_attempts", &self.fulfillment_max_attempts)
            .finish()
    }
}
