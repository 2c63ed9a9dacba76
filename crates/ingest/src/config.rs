use std::env;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Tunables for the fetcher and the fan-out.
#[derive(Clone, Debug)]
pub struct ScrapeConfig {
    pub request_timeout: Duration,
    /// Extra attempts after the first one.
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub diputados_concurrency: usize,
    pub senado_concurrency: usize,
    pub user_agent: String,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            max_retries: 2,
            retry_delay_ms: 500,
            diputados_concurrency: 8,
            senado_concurrency: 5,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ScrapeConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            request_timeout: Duration::from_secs(env_or(
                "SCRAPE_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )),
            max_retries: env_or("SCRAPE_MAX_RETRIES", defaults.max_retries),
            retry_delay_ms: env_or("SCRAPE_RETRY_DELAY_MS", defaults.retry_delay_ms),
            diputados_concurrency: env_or(
                "SCRAPE_CONCURRENCY_DIPUTADOS",
                defaults.diputados_concurrency,
            )
            .max(1),
            senado_concurrency: env_or("SCRAPE_CONCURRENCY_SENADO", defaults.senado_concurrency)
                .max(1),
            user_agent: env::var("SCRAPE_USER_AGENT").unwrap_or(defaults.user_agent),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "invalid value, using default");
            default
        }),
        Err(_) => default,
    }
}
