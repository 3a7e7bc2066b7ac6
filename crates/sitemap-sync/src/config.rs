use std::time::Duration;

/// Tunables of the sync engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Timeout of a plain (first or restarted) page fetch.
    pub plain_timeout: Duration,
    /// Timeout of a long-poll request; the server answers well before this.
    pub long_poll_timeout: Duration,
    /// Pause before re-issuing a request after a failure. Zero retries at once.
    pub retry_delay: Duration,
    /// Log every parsed widget.
    pub detailed_logging: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            plain_timeout: Duration::from_millis(10_000),
            long_poll_timeout: Duration::from_millis(300_000),
            retry_delay: Duration::ZERO,
            detailed_logging: false,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let plain_timeout = std::env::var("SITEMAP_SYNC_PLAIN_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.plain_timeout);
        let long_poll_timeout = std::env::var("SITEMAP_SYNC_LONG_POLL_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.long_poll_timeout);
        let retry_delay = std::env::var("SITEMAP_SYNC_RETRY_DELAY_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry_delay);
        let detailed_logging = std::env::var("SITEMAP_SYNC_DETAILED_LOGGING")
            .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes" | "on"))
            .unwrap_or(defaults.detailed_logging);
        Self {
            plain_timeout,
            long_poll_timeout,
            retry_delay,
            detailed_logging,
        }
    }

    pub fn request_timeout(&self, long_polling: bool) -> Duration {
        if long_polling {
            self.long_poll_timeout
        } else {
            self.plain_timeout
        }
    }
}
