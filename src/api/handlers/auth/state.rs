use crate::session::{DEFAULT_REAP_INTERVAL, DEFAULT_STALE_WINDOW};
use std::time::Duration;

pub const DEFAULT_FRONTEND_BASE_URL: &str = "http://localhost:8080";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    session_stale_window: Duration,
    token_reap_interval: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new(DEFAULT_FRONTEND_BASE_URL.to_string())
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            session_stale_window: DEFAULT_STALE_WINDOW,
            token_reap_interval: DEFAULT_REAP_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_session_stale_window_seconds(mut self, seconds: u64) -> Self {
        self.session_stale_window = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_token_reap_interval_seconds(mut self, seconds: u64) -> Self {
        self.token_reap_interval = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn session_stale_window(&self) -> Duration {
        self.session_stale_window
    }

    #[must_use]
    pub fn token_reap_interval(&self) -> Duration {
        self.token_reap_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_session_policy() {
        let config = AuthConfig::default();
        assert_eq!(config.frontend_base_url(), DEFAULT_FRONTEND_BASE_URL);
        assert_eq!(config.session_stale_window(), Duration::from_secs(604_800));
        assert_eq!(config.token_reap_interval(), Duration::from_secs(3600));
    }

    #[test]
    fn builders_override_defaults() {
        let config = AuthConfig::new("https://hoaxify.com".to_string())
            .with_session_stale_window_seconds(60)
            .with_token_reap_interval_seconds(5);
        assert_eq!(config.session_stale_window(), Duration::from_secs(60));
        assert_eq!(config.token_reap_interval(), Duration::from_secs(5));
    }
}
