use std::env;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set in environment")]
    Missing(&'static str),
    #[error("{0} has an invalid value: {1}")]
    Invalid(&'static str, String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub mailer_url: Option<String>,
    pub notifications: NotificationSettings,
}

/// Addresses used when composing notification e-mails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationSettings {
    pub admin_email: String,
    pub frontend_url: String,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            admin_email: "admin@localhost".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = NotificationSettings::default();

        let port = match var("PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::Invalid("PORT", raw))?,
            None => 8084,
        };

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port,
            database_url: var("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            mailer_url: var("MAILER_URL"),
            notifications: NotificationSettings {
                admin_email: var("ADMIN_EMAIL").unwrap_or(defaults.admin_email),
                frontend_url: var("FRONTEND_URL")
                    .map(|url| url.trim_end_matches('/').to_string())
                    .unwrap_or(defaults.frontend_url),
            },
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
