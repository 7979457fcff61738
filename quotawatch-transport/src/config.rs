//! Transport configuration.

use std::time::Duration;
use url::Url;

use crate::error::TransportError;

/// Default backend base URL (the usage service runs next to the app).
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3001";

/// Default delay before a reconnect attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Default polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Consecutive polling failures before the data is flagged stale.
pub const DEFAULT_STALE_THRESHOLD: u32 = 3;

// ============================================================================
// Service Endpoints
// ============================================================================

/// Resolved URLs of the usage service.
#[derive(Debug, Clone)]
pub struct ServiceEndpoints {
    /// WebSocket endpoint for the streaming channel.
    pub stream_url: Url,
    /// HTTP endpoint for the polling channel.
    pub realtime_url: Url,
    /// HTTP endpoint for fire-and-forget custom limit pushes.
    pub custom_limits_url: Url,
}

impl ServiceEndpoints {
    /// Derives all endpoints from one HTTP base URL. The stream URL swaps
    /// the scheme to `ws`/`wss`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Unavailable` if the base URL cannot host
    /// the required paths or schemes.
    pub fn from_base(base: &Url) -> Result<Self, TransportError> {
        let join = |path: &str| {
            base.join(path)
                .map_err(|e| TransportError::Unavailable(format!("bad base URL: {e}")))
        };

        let mut stream_url = join("/ws/usage")?;
        let ws_scheme = match base.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        stream_url
            .set_scheme(ws_scheme)
            .map_err(|()| TransportError::Unavailable("base URL scheme not convertible".to_string()))?;

        Ok(Self {
            stream_url,
            realtime_url: join("/api/usage/realtime")?,
            custom_limits_url: join("/api/usage/custom-limits")?,
        })
    }

    /// Endpoints for the default local backend.
    ///
    /// # Panics
    ///
    /// Never panics in practice; the default base URL is a valid constant.
    pub fn local_default() -> Self {
        let base = Url::parse(DEFAULT_BASE_URL).expect("default base URL is valid");
        Self::from_base(&base).expect("default base URL hosts all endpoints")
    }
}

// ============================================================================
// Transport Config
// ============================================================================

/// Tunables for channels and the supervisor.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Where the usage service lives.
    pub endpoints: ServiceEndpoints,
    /// When false the supervisor never attempts streaming.
    pub streaming_enabled: bool,
    /// Fixed delay before reconnecting after a drop. No exponential
    /// backoff; the scheduling is idempotent instead.
    pub reconnect_delay: Duration,
    /// Polling cadence.
    pub poll_interval: Duration,
    /// Consecutive polling failures before emitting a staleness event.
    pub stale_threshold: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoints: ServiceEndpoints::local_default(),
            streaming_enabled: true,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stale_threshold: DEFAULT_STALE_THRESHOLD,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_from_http_base() {
        let base = Url::parse("http://localhost:3001").unwrap();
        let endpoints = ServiceEndpoints::from_base(&base).unwrap();

        assert_eq!(endpoints.stream_url.as_str(), "ws://localhost:3001/ws/usage");
        assert_eq!(
            endpoints.realtime_url.as_str(),
            "http://localhost:3001/api/usage/realtime"
        );
        assert_eq!(
            endpoints.custom_limits_url.as_str(),
            "http://localhost:3001/api/usage/custom-limits"
        );
    }

    #[test]
    fn test_endpoints_from_https_base() {
        let base = Url::parse("https://usage.example.com").unwrap();
        let endpoints = ServiceEndpoints::from_base(&base).unwrap();
        assert_eq!(endpoints.stream_url.scheme(), "wss");
    }

    #[test]
    fn test_default_config() {
        let config = TransportConfig::default();
        assert!(config.streaming_enabled);
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.stale_threshold, 3);
    }
}
