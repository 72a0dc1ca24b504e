//! Client configuration parsed from environment variables.

use crate::error::ConfigError;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";
pub const DEFAULT_LANDING_ROUTE: &str = "/";
pub const DEFAULT_LOGIN_ROUTE: &str = "/login";

/// How the credential travels with each request. Resolved once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialMode {
    /// `Authorization: Bearer <token>`, token kept in the credential store.
    #[default]
    Bearer,
    /// Session cookie managed by the client's cookie jar.
    Cookie,
}

impl std::str::FromStr for CredentialMode {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "bearer" => Ok(Self::Bearer),
            "cookie" => Ok(Self::Cookie),
            other => Err(ConfigError::Parse(format!(
                "unknown credential mode '{other}' (expected 'bearer' or 'cookie')"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub credential_mode: CredentialMode,
    pub landing_route: String,
    pub login_route: String,
    pub mirror_identity: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_owned(),
            credential_mode: CredentialMode::default(),
            landing_route: DEFAULT_LANDING_ROUTE.to_owned(),
            login_route: DEFAULT_LOGIN_ROUTE.to_owned(),
            mirror_identity: false,
        }
    }
}

impl ClientConfig {
    /// Config pointing at `base_url` with every other field defaulted.
    #[must_use]
    pub fn with_base_url(base_url: &str) -> Self {
        Self { base_url: normalize_base_url(base_url), ..Self::default() }
    }

    /// Build typed client config from environment variables.
    ///
    /// Optional:
    /// - `POSTBOARD_API_BASE_URL`: default `http://localhost:8080/api`
    /// - `POSTBOARD_CREDENTIAL_MODE`: `bearer` (default) or `cookie`
    /// - `POSTBOARD_LANDING_ROUTE`: default `/`
    /// - `POSTBOARD_LOGIN_ROUTE`: default `/login`
    /// - `POSTBOARD_MIRROR_IDENTITY`: boolean, default false
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = std::env::var("POSTBOARD_API_BASE_URL").unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_owned());
        let credential_mode = match std::env::var("POSTBOARD_CREDENTIAL_MODE") {
            Ok(raw) => raw.parse()?,
            Err(_) => CredentialMode::default(),
        };
        let mirror_identity = match std::env::var("POSTBOARD_MIRROR_IDENTITY") {
            Ok(raw) => parse_bool(&raw)
                .ok_or_else(|| ConfigError::Parse(format!("invalid POSTBOARD_MIRROR_IDENTITY: {raw}")))?,
            Err(_) => false,
        };

        Ok(Self {
            base_url: normalize_base_url(&base_url),
            credential_mode,
            landing_route: std::env::var("POSTBOARD_LANDING_ROUTE").unwrap_or_else(|_| DEFAULT_LANDING_ROUTE.to_owned()),
            login_route: std::env::var("POSTBOARD_LOGIN_ROUTE").unwrap_or_else(|_| DEFAULT_LOGIN_ROUTE.to_owned()),
            mirror_identity,
        })
    }
}

pub(crate) fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_owned()
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
