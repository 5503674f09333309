//! API configuration.

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address
    pub bind_addr: String,
    /// Maximum request body size in bytes
    pub max_body_bytes: usize,
    /// Owner attributed to live-triggered jobs when no stream mapping exists
    pub live_default_owner: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            max_body_bytes: 2 * 1024 * 1024,
            live_default_owner: "live-system".to_string(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("API_BIND_ADDR").unwrap_or(defaults.bind_addr),
            max_body_bytes: std::env::var("API_MAX_BODY_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_body_bytes),
            live_default_owner: std::env::var("LIVE_DEFAULT_OWNER")
                .unwrap_or(defaults.live_default_owner),
        }
    }
}
