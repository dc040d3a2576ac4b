//! API server configuration.

use desk_core::auth::jwt::MIN_SECRET_LEN;
use desk_core::auth::sessions::AuthSettings;
use thiserror::Error;

/// Startup configuration errors. The server refuses to start on any of these.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("JWT_SECRET is not set")]
    MissingSecret,

    #[error("JWT_SECRET must be at least 32 bytes (got {0})")]
    WeakSecret(usize),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// JWT signing secret.
    pub jwt_secret: String,
    /// Set the `Secure` flag on auth cookies.
    pub secure_cookies: bool,
    /// Revoke every session of a user when their password changes.
    pub revoke_sessions_on_password_change: bool,
}

fn env_flag(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(ConfigError::Invalid(name, v)),
        },
    }
}

impl ApiConfig {
    /// Reads configuration from environment variables.
    ///
    /// | Variable                             | Default                            |
    /// |--------------------------------------|------------------------------------|
    /// | `BIND_ADDR`                          | `127.0.0.1:3100`                   |
    /// | `DATABASE_URL`                       | `postgres://localhost:5432/desk`   |
    /// | `JWT_SECRET`                         | required, at least 32 bytes        |
    /// | `SECURE_COOKIES`                     | `false`                            |
    /// | `REVOKE_SESSIONS_ON_PASSWORD_CHANGE` | `false`                            |
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3100".into()),
            pg_connection_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/desk".into()),
            jwt_secret: std::env::var("JWT_SECRET").map_err(|_| ConfigError::MissingSecret)?,
            secure_cookies: env_flag("SECURE_COOKIES", false)?,
            revoke_sessions_on_password_change: env_flag(
                "REVOKE_SESSIONS_ON_PASSWORD_CHANGE",
                false,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the signing secret.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        if self.jwt_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakSecret(self.jwt_secret.len()));
        }
        Ok(())
    }

    /// Token lifetimes and password-change policy for the session manager.
    pub fn auth_settings(&self) -> AuthSettings {
        AuthSettings {
            revoke_sessions_on_password_change: self.revoke_sessions_on_password_change,
            ..AuthSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(secret: &str) -> ApiConfig {
        ApiConfig {
            bind_addr: "127.0.0.1:0".into(),
            pg_connection_url: String::new(),
            jwt_secret: secret.into(),
            secure_cookies: false,
            revoke_sessions_on_password_change: false,
        }
    }

    #[test]
    fn rejects_missing_or_short_secret() {
        assert!(matches!(
            config("").validate(),
            Err(ConfigError::MissingSecret)
        ));
        assert!(matches!(
            config("short").validate(),
            Err(ConfigError::WeakSecret(5))
        ));
        assert!(config(&"x".repeat(32)).validate().is_ok());
    }

    #[test]
    fn settings_follow_config() {
        let mut c = config(&"x".repeat(32));
        c.revoke_sessions_on_password_change = true;
        let settings = c.auth_settings();
        assert!(settings.revoke_sessions_on_password_change);
        assert_eq!(settings.access_ttl, chrono::Duration::minutes(15));
    }
}
