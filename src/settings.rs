// Copyright (c) 2025 - Cowboy AI, Inc.
//! Downstream Service Settings
//!
//! Settings of the user service deployed by the stack. They are loaded once
//! at process entry and passed by reference; there is no global instance.
//!
//! # Sources
//!
//! ```text
//! defaults  <  .env dotfile  <  process environment
//! ```
//!
//! Keys are case-sensitive. A missing dotfile is not an error.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Default dotfile name
pub const DOTFILE: &str = ".env";

const DEFAULT_JWT_SECRET: &str = "your-super-secret-key-here-change-it-in-production";
const DEFAULT_PASSWORD_SALT: &str = "your-password-salt-change-it-in-production";

/// Every key the settings read
pub const KEYS: [&str; 11] = [
    "API_PREFIX",
    "DEBUG",
    "PROJECT_NAME",
    "PORT",
    "DATABASE_URL",
    "JWT_SECRET_KEY",
    "JWT_ALGORITHM",
    "ACCESS_TOKEN_EXPIRE_MINUTES",
    "REFRESH_TOKEN_EXPIRE_DAYS",
    "SECURITY_PASSWORD_SALT",
    "SECURITY_PASSWORD_HASH",
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Missing required setting: {0}")]
    Missing(String),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error("Failed to read dotfile: {0}")]
    Dotfile(String),
}

/// User service settings
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceSettings {
    pub api_prefix: String,
    pub debug: bool,
    pub project_name: String,
    pub port: u16,
    /// PostgreSQL DSN
    pub database_url: Url,
    pub jwt_secret_key: String,
    pub jwt_algorithm: String,
    pub access_token_expire_minutes: u32,
    pub refresh_token_expire_days: u32,
    pub security_password_salt: String,
    pub security_password_hash: String,
}

impl ServiceSettings {
    /// Load from `.env` in the working directory and the process environment
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::load(Some(Path::new(DOTFILE)))
    }

    /// Load from an optional dotfile overlaid by the process environment
    pub fn load(dotfile: Option<&Path>) -> Result<Self, SettingsError> {
        let mut values = HashMap::new();

        if let Some(path) = dotfile {
            match dotenvy::from_path_iter(path) {
                Ok(entries) => {
                    for entry in entries {
                        let (key, value) =
                            entry.map_err(|e| SettingsError::Dotfile(e.to_string()))?;
                        values.insert(key, value);
                    }
                    debug!("Read settings dotfile {}", path.display());
                }
                Err(e) if e.not_found() => {
                    debug!("No settings dotfile at {}", path.display());
                }
                Err(e) => return Err(SettingsError::Dotfile(e.to_string())),
            }
        }

        for key in KEYS {
            if let Ok(value) = std::env::var(key) {
                values.insert(key.to_string(), value);
            }
        }

        Self::from_pairs(&values)
    }

    /// Build from explicit key/value pairs
    pub fn from_pairs(values: &HashMap<String, String>) -> Result<Self, SettingsError> {
        let get = |key: &str| values.get(key).map(String::as_str);
        let text = |key: &str, default: &str| get(key).unwrap_or(default).to_string();

        let database_url = get("DATABASE_URL")
            .ok_or_else(|| SettingsError::Missing("DATABASE_URL".to_string()))?;

        let settings = Self {
            api_prefix: text("API_PREFIX", "/api/v1"),
            debug: get("DEBUG").map(|v| parse_bool("DEBUG", v)).transpose()?.unwrap_or(false),
            project_name: text("PROJECT_NAME", "User Service"),
            port: parse_number("PORT", get("PORT"), 8003)?,
            database_url: parse_postgres_dsn(database_url)?,
            jwt_secret_key: text("JWT_SECRET_KEY", DEFAULT_JWT_SECRET),
            jwt_algorithm: text("JWT_ALGORITHM", "HS256"),
            access_token_expire_minutes: parse_number(
                "ACCESS_TOKEN_EXPIRE_MINUTES",
                get("ACCESS_TOKEN_EXPIRE_MINUTES"),
                30,
            )?,
            refresh_token_expire_days: parse_number(
                "REFRESH_TOKEN_EXPIRE_DAYS",
                get("REFRESH_TOKEN_EXPIRE_DAYS"),
                7,
            )?,
            security_password_salt: text("SECURITY_PASSWORD_SALT", DEFAULT_PASSWORD_SALT),
            security_password_hash: text("SECURITY_PASSWORD_HASH", "bcrypt"),
        };

        if settings.uses_default_secrets() {
            warn!("Service settings use the default JWT secret or password salt");
        }
        Ok(settings)
    }

    /// Whether either secret still has its shipped default
    pub fn uses_default_secrets(&self) -> bool {
        self.jwt_secret_key == DEFAULT_JWT_SECRET
            || self.security_password_salt == DEFAULT_PASSWORD_SALT
    }
}

/// `url` with its password masked; fully masked if it cannot carry one
fn redacted(url: &Url) -> String {
    if url.password().is_none() {
        return url.to_string();
    }
    let mut masked = url.clone();
    match masked.set_password(Some("***")) {
        Ok(()) => masked.to_string(),
        Err(()) => "***".to_string(),
    }
}

impl fmt::Debug for ServiceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceSettings")
            .field("api_prefix", &self.api_prefix)
            .field("debug", &self.debug)
            .field("project_name", &self.project_name)
            .field("port", &self.port)
            .field("database_url", &redacted(&self.database_url))
            .field("jwt_secret_key", &"***")
            .field("jwt_algorithm", &self.jwt_algorithm)
            .field("access_token_expire_minutes", &self.access_token_expire_minutes)
            .field("refresh_token_expire_days", &self.refresh_token_expire_days)
            .field("security_password_salt", &"***")
            .field("security_password_hash", &self.security_password_hash)
            .finish()
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> SettingsError {
    SettingsError::Invalid {
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, SettingsError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(invalid(key, format!("{:?} is not a boolean", other))),
    }
}

fn parse_number<T: std::str::FromStr>(
    key: &str,
    value: Option<&str>,
    default: T,
) -> Result<T, SettingsError>
where
    T::Err: fmt::Display,
{
    match value {
        None => Ok(default),
        Some(v) => v.trim().parse().map_err(|e: T::Err| invalid(key, e.to_string())),
    }
}

fn parse_postgres_dsn(value: &str) -> Result<Url, SettingsError> {
    let url = Url::parse(value).map_err(|e| invalid("DATABASE_URL", e.to_string()))?;
    if !matches!(url.scheme(), "postgres" | "postgresql") {
        return Err(invalid(
            "DATABASE_URL",
            format!("scheme {} is not postgres or postgresql", url.scheme()),
        ));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("DATABASE_URL", "host is required"));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn pairs(items: &[(&str, &str)]) -> HashMap<String, String> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let settings =
            ServiceSettings::from_pairs(&pairs(&[("DATABASE_URL", "postgresql://u:p@db:5432/users")]))
                .unwrap();
        assert_eq!(settings.api_prefix, "/api/v1");
        assert!(!settings.debug);
        assert_eq!(settings.project_name, "User Service");
        assert_eq!(settings.port, 8003);
        assert_eq!(settings.jwt_algorithm, "HS256");
        assert_eq!(settings.access_token_expire_minutes, 30);
        assert_eq!(settings.refresh_token_expire_days, 7);
        assert_eq!(settings.security_password_hash, "bcrypt");
        assert!(settings.uses_default_secrets());
    }

    #[test]
    fn test_database_url_required() {
        assert_eq!(
            ServiceSettings::from_pairs(&HashMap::new()),
            Err(SettingsError::Missing("DATABASE_URL".into()))
        );
    }

    #[test_case("mysql://db/users" ; "wrong scheme")]
    #[test_case("not a url" ; "unparseable")]
    #[test_case("postgres:///users" ; "no host")]
    fn test_invalid_database_url(url: &str) {
        let err = ServiceSettings::from_pairs(&pairs(&[("DATABASE_URL", url)])).unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { key, .. } if key == "DATABASE_URL"));
    }

    #[test]
    fn test_keys_are_case_sensitive() {
        let settings = ServiceSettings::from_pairs(&pairs(&[
            ("DATABASE_URL", "postgres://db/users"),
            ("port", "9000"),
        ]))
        .unwrap();
        assert_eq!(settings.port, 8003);
    }

    #[test]
    fn test_invalid_numbers_and_booleans() {
        let base = ("DATABASE_URL", "postgres://db/users");
        assert!(ServiceSettings::from_pairs(&pairs(&[base, ("PORT", "eighty")])).is_err());
        assert!(ServiceSettings::from_pairs(&pairs(&[base, ("DEBUG", "maybe")])).is_err());
        assert!(ServiceSettings::from_pairs(&pairs(&[base, ("DEBUG", "True")])).unwrap().debug);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let settings = ServiceSettings::from_pairs(&pairs(&[
            ("DATABASE_URL", "postgres://user:hunter2@db/users"),
            ("JWT_SECRET_KEY", "topsecret"),
        ]))
        .unwrap();
        let rendered = format!("{:?}", settings);
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("topsecret"));
        assert!(rendered.contains("postgres://user:***@db/users"));
    }
}
