use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    /// Empty disables coordination: no locks, no rate limiting.
    pub redis_url: String,
    pub redis_connect_timeout: Duration,
    pub lock_ttl: Duration,
    pub rate_limit_requests: u64,
    pub rate_limit_window: Duration,
    /// Share of a date's slots, in percent, after which auto-assignment stops.
    pub capacity_percent: u32,
    pub request_timeout: Duration,
    pub seed_days: u32,
    pub cors_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            database_url: "slotbook.db".to_string(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            redis_connect_timeout: Duration::from_millis(1000),
            lock_ttl: Duration::from_secs(10),
            rate_limit_requests: 5,
            rate_limit_window: Duration::from_secs(60),
            capacity_percent: 80,
            request_timeout: Duration::from_millis(10_000),
            seed_days: 15,
            cors_origins: vec![],
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: parsed("PORT").unwrap_or(defaults.port),
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            redis_url: env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            redis_connect_timeout: parsed("REDIS_CONNECT_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.redis_connect_timeout),
            lock_ttl: parsed("LOCK_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.lock_ttl),
            rate_limit_requests: parsed("RATE_LIMIT_REQUESTS").unwrap_or(defaults.rate_limit_requests),
            rate_limit_window: parsed("RATE_LIMIT_WINDOW_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.rate_limit_window),
            capacity_percent: parsed("CAPACITY_PERCENT")
                .filter(|p| (1..=100).contains(p))
                .unwrap_or(defaults.capacity_percent),
            request_timeout: parsed("REQUEST_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
            seed_days: parsed("SEED_DAYS").unwrap_or(defaults.seed_days),
            cors_origins: env::var("CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or(defaults.cors_origins),
        }
    }
}

fn parsed<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
