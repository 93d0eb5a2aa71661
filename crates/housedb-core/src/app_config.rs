#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    /// Origin of the house-price site, e.g. `https://www.rightmove.co.uk`.
    pub source_base_url: String,
    pub scraper_request_timeout_secs: u64,
    /// Retries after the first attempt; a request is tried at most `n + 1` times.
    pub scraper_retry_attempts: u32,
    pub scraper_retry_backoff_ms: u64,
    pub scraper_max_backoff_ms: u64,
    pub scraper_inter_request_delay_ms: u64,
    pub scraper_user_agent: String,
    pub scraper_accept: String,
    pub scraper_accept_language: String,
    pub scraper_max_properties: usize,
    pub scraper_freshness_days: u32,
    /// Independent scraper sessions (each with its own delay clock) used by
    /// area scrapes.
    pub scraper_sessions: usize,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("source_base_url", &self.source_base_url)
            .field(
                "scraper_request_timeout_secs",
                &self.scraper_request_timeout_secs,
            )
            .field("scraper_retry_attempts", &self.scraper_retry_attempts)
            .field("scraper_retry_backoff_ms", &self.scraper_retry_backoff_ms)
            .field("scraper_max_backoff_ms", &self.scraper_max_backoff_ms)
            .field(
                "scraper_inter_request_delay_ms",
                &self.scraper_inter_request_delay_ms,
            )
            .field("scraper_user_agent", &self.scraper_user_agent)
            .field("scraper_accept", &self.scraper_accept)
            .field("scraper_accept_language", &self.scraper_accept_language)
            .field("scraper_max_properties", &self.scraper_max_properties)
            .field("scraper_freshness_days", &self.scraper_freshness_days)
            .field("scraper_sessions", &self.scraper_sessions)
            .finish()
    }
}
