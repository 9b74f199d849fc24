// Gateway configuration — assembled once from the environment at startup.
// Parsing failures here are fatal: a misconfigured gateway should refuse
// to serve rather than limp along with guessed defaults.

use std::env;
use std::time::Duration;

use tracing::warn;

/// Process-wide default cursor key. Used only when `CURSOR_KEY` is unset.
/// Never use this value in a deployment that cares about cursor secrecy.
pub const DEFAULT_CURSOR_KEY: &[u8; 32] = b"insecure-default-cursor-key-2024";

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    pub bearer_token: Option<String>,
    pub store_uri: Option<String>,
    pub store_user: Option<String>,
    pub store_password: Option<String>,
    pub cursor_key: [u8; 32],
    pub cursor_key_is_default: bool,
    pub slow_query_ms: u64,
    pub request_timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid PORT: {0}")]
    InvalidPort(String),
    #[error("invalid SLOW_QUERY_MS: {0}")]
    InvalidSlowQueryMs(String),
    #[error("invalid REQUEST_TIMEOUT_MS: {0}")]
    InvalidTimeout(String),
    #[error("CURSOR_KEY must be exactly 32 bytes, got {0}")]
    InvalidCursorKeyLength(usize),
}

impl GatewayConfig {
    /// Build configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match env::var("PORT") {
            Ok(v) => v
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(v))?,
            Err(_) => 8081,
        };

        let bearer_token = env::var("KIP_TOKEN").ok();

        let store_uri = env::var("STORE_URI").ok();
        let store_user = env::var("STORE_USER").ok();
        let store_password = env::var("STORE_PASSWORD").ok();

        let (cursor_key, cursor_key_is_default) = match env::var("CURSOR_KEY") {
            Ok(v) => {
                let bytes = v.into_bytes();
                if bytes.len() != 32 {
                    return Err(ConfigError::InvalidCursorKeyLength(bytes.len()));
                }
                let mut key = [0u8; 32];
                key.copy_from_slice(&bytes);
                (key, false)
            }
            Err(_) => {
                warn!(
                    "CURSOR_KEY is not set; using the process-wide default cursor key. \
                     Cursor tokens issued by this process are not safe against anyone \
                     who can read this binary's source."
                );
                (*DEFAULT_CURSOR_KEY, true)
            }
        };

        let slow_query_ms = match env::var("SLOW_QUERY_MS") {
            Ok(v) => v
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidSlowQueryMs(v))?,
            Err(_) => 1000,
        };

        let request_timeout_ms = match env::var("REQUEST_TIMEOUT_MS") {
            Ok(v) => v
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidTimeout(v))?,
            Err(_) => 60_000,
        };

        Ok(Self {
            port,
            bearer_token,
            store_uri,
            store_user,
            store_password,
            cursor_key,
            cursor_key_is_default,
            slow_query_ms,
            request_timeout: Duration::from_millis(request_timeout_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variable mutation races across tests in the same process;
    // serialize access with a lock rather than relying on `--test-threads=1`.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        for var in ["PORT", "KIP_TOKEN", "CURSOR_KEY", "SLOW_QUERY_MS", "REQUEST_TIMEOUT_MS"] {
            env::remove_var(var);
        }
        let cfg = GatewayConfig::from_env().unwrap();
        assert_eq!(cfg.port, 8081);
        assert!(cfg.bearer_token.is_none());
        assert!(cfg.cursor_key_is_default);
        assert_eq!(cfg.slow_query_ms, 1000);
        assert_eq!(cfg.request_timeout, Duration::from_millis(60_000));
    }

    #[test]
    fn rejects_bad_port() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("PORT", "not-a-port");
        let result = GatewayConfig::from_env();
        env::remove_var("PORT");
        assert!(matches!(result, Err(ConfigError::InvalidPort(_))));
    }

    #[test]
    fn rejects_short_cursor_key() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("CURSOR_KEY", "too-short");
        let result = GatewayConfig::from_env();
        env::remove_var("CURSOR_KEY");
        assert!(matches!(result, Err(ConfigError::InvalidCursorKeyLength(_))));
    }
}
