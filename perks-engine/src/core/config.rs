use std::time::Duration;

/// Engine configuration
///
/// # Environment variables
///
/// All settings can be overridden through the environment:
///
/// | Variable | Default | Purpose |
/// |----------|---------|---------|
/// | PERKS_BACKEND_URL | http://localhost:54321 | Hosted backend base URL |
/// | PERKS_API_KEY | (none) | Anon/publishable API key |
/// | PERKS_REQUEST_TIMEOUT_MS | 30000 | Remote call timeout (ms) |
/// | PERKS_UNDO_WINDOW_MS | 3000 | Undo window after a successful action (ms) |
/// | PERKS_ROSTER_REFRESH_MS | 10000 | Silent roster refresh interval (ms) |
/// | ENVIRONMENT | development | Runtime environment |
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the hosted backend (functions + REST surface)
    pub backend_url: String,
    /// API key sent with every request (the backend enforces row policies)
    pub api_key: Option<String>,
    /// Remote call timeout in milliseconds
    pub request_timeout_ms: u64,
    /// How long the undo affordance stays open after a successful action
    pub undo_window_ms: u64,
    /// Silent roster refresh interval while the store is open
    pub roster_refresh_ms: u64,
    /// Runtime environment: development | staging | production
    pub environment: String,
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        Self {
            backend_url: std::env::var("PERKS_BACKEND_URL")
                .unwrap_or_else(|_| "http://localhost:54321".into()),
            api_key: std::env::var("PERKS_API_KEY").ok(),
            request_timeout_ms: std::env::var("PERKS_REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30_000),
            undo_window_ms: std::env::var("PERKS_UNDO_WINDOW_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3_000),
            roster_refresh_ms: std::env::var("PERKS_ROSTER_REFRESH_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10_000),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
        }
    }

    /// Override the backend endpoint, commonly used in tests.
    pub fn with_backend(backend_url: impl Into<String>) -> Self {
        let mut config = Self::from_env();
        config.backend_url = backend_url.into();
        config
    }

    pub fn undo_window(&self) -> Duration {
        Duration::from_millis(self.undo_window_ms)
    }

    pub fn roster_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.roster_refresh_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
