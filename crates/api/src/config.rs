//! Application configuration

use std::env;
use std::time::Duration;

/// Which publish/subscribe fabric carries room broadcasts between instances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastBackend {
    /// Redis pub/sub, shared by every instance pointing at the same server
    Redis,
    /// In-process only; suitable for a single instance and for tests
    Memory,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub cors_allowed_origins: Vec<String>,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Broadcast backbone
    pub broadcast_backend: BroadcastBackend,
    pub redis_url: String,
    pub broadcast_channel_prefix: String,

    // Authentication
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,

    // Feature flags
    pub enable_signup: bool,

    // Real-time gateway
    pub ws_idle_timeout_secs: u64,
    pub max_message_length: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),

            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),

            // Broadcast backbone
            broadcast_backend: match env::var("BROADCAST_BACKEND")
                .unwrap_or_else(|_| "redis".to_string())
                .to_lowercase()
                .as_str()
            {
                "redis" => BroadcastBackend::Redis,
                "memory" => BroadcastBackend::Memory,
                _ => {
                    return Err(ConfigError::Invalid(
                        "BROADCAST_BACKEND must be either 'redis' or 'memory'",
                    ))
                }
            },
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            broadcast_channel_prefix: env::var("BROADCAST_CHANNEL_PREFIX")
                .unwrap_or_else(|_| "tandem:room:".to_string()),

            // Authentication
            jwt_secret: {
                let secret =
                    env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
                if secret.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "JWT_SECRET must be at least 32 characters",
                    ));
                }
                secret
            },
            jwt_expiry_hours: env::var("JWT_EXPIRY_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .unwrap_or(24),

            // Feature flags
            enable_signup: env::var("ENABLE_SIGNUP")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),

            // Real-time gateway
            ws_idle_timeout_secs: env::var("WS_IDLE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .unwrap_or(300),
            max_message_length: {
                let max: usize = env::var("MAX_MESSAGE_LENGTH")
                    .unwrap_or_else(|_| "4000".to_string())
                    .parse()
                    .unwrap_or(4000);
                if max == 0 {
                    return Err(ConfigError::Invalid("MAX_MESSAGE_LENGTH must be positive"));
                }
                max
            },
        })
    }

    /// Idle-disconnect window for WebSocket connections. `None` when disabled.
    pub fn ws_idle_timeout(&self) -> Option<Duration> {
        (self.ws_idle_timeout_secs > 0).then(|| Duration::from_secs(self.ws_idle_timeout_secs))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const OPTIONAL_VARS: &[&str] = &[
        "BIND_ADDRESS",
        "CORS_ALLOWED_ORIGINS",
        "BROADCAST_BACKEND",
        "WS_IDLE_TIMEOUT_SECS",
        "MAX_MESSAGE_LENGTH",
    ];

    /// Helper to set required env vars for testing
    fn setup_minimal_config() {
        env::set_var("DATABASE_URL", "postgres://test");
        env::set_var(
            "JWT_SECRET",
            "test-jwt-secret-must-be-at-least-32-characters-long",
        );
        for var in OPTIONAL_VARS {
            env::remove_var(var);
        }
    }

    /// Helper to clear env vars after tests
    fn cleanup_config() {
        env::remove_var("DATABASE_URL");
        env::remove_var("JWT_SECRET");
        for var in OPTIONAL_VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        setup_minimal_config();

        let config = Config::from_env().unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:8000");
        assert_eq!(config.broadcast_backend, BroadcastBackend::Redis);
        assert_eq!(config.cors_allowed_origins, vec!["*".to_string()]);
        assert_eq!(config.ws_idle_timeout(), Some(Duration::from_secs(300)));
        assert_eq!(config.max_message_length, 4000);

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_missing_and_weak_secrets() {
        setup_minimal_config();

        env::remove_var("JWT_SECRET");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Missing("JWT_SECRET"))
        ));

        env::set_var("JWT_SECRET", "too-short");
        assert!(matches!(Config::from_env(), Err(ConfigError::WeakSecret(_))));

        env::remove_var("DATABASE_URL");
        env::set_var(
            "JWT_SECRET",
            "test-jwt-secret-must-be-at-least-32-characters-long",
        );
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Missing("DATABASE_URL"))
        ));

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_gateway_settings() {
        setup_minimal_config();

        env::set_var("BROADCAST_BACKEND", "memory");
        env::set_var("WS_IDLE_TIMEOUT_SECS", "0");
        env::set_var("CORS_ALLOWED_ORIGINS", "http://localhost:5173, https://chat.example.com");
        let config = Config::from_env().unwrap();
        assert_eq!(config.broadcast_backend, BroadcastBackend::Memory);
        assert_eq!(config.ws_idle_timeout(), None);
        assert_eq!(config.cors_allowed_origins.len(), 2);

        env::set_var("BROADCAST_BACKEND", "kafka");
        assert!(matches!(Config::from_env(), Err(ConfigError::Invalid(_))));

        env::set_var("BROADCAST_BACKEND", "memory");
        env::set_var("MAX_MESSAGE_LENGTH", "0");
        assert!(matches!(Config::from_env(), Err(ConfigError::Invalid(_))));

        cleanup_config();
    }
}
