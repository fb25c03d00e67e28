use std::env;
use std::fmt::Display;
use std::net::IpAddr;
use std::str::FromStr;

use auth::config::JwtConfig;
use axum::http::HeaderValue;
use rand::Rng;
use rand::distr::Alphanumeric;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("Invalid {key} value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("expected `pretty` or `json`, got `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsOrigins {
    Any,
    List(Vec<HeaderValue>),
}

impl FromStr for CorsOrigins {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let origins: Vec<&str> = s
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .collect();
        if origins.is_empty() || origins.contains(&"*") {
            return Ok(CorsOrigins::Any);
        }
        origins
            .into_iter()
            .map(|origin| HeaderValue::from_str(origin).map_err(|e| format!("{origin}: {e}")))
            .collect::<Result<Vec<_>, _>>()
            .map(CorsOrigins::List)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: IpAddr,
    pub port: u16,
    /// Absent only in debug mode, which then runs on the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt: JwtConfig,
    pub cors_allowed_origins: CorsOrigins,
    pub log_format: LogFormat,
    pub debug: bool,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let debug = parse_or(&var, "DEBUG", false)?;
        let database_url = var("DATABASE_URL");
        if database_url.is_none() && !debug {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }
        let secret = match var("JWT_SECRET") {
            Some(secret) => secret,
            None if debug => {
                warn!("JWT_SECRET not set, using a random secret for this debug run");
                rand::rng()
                    .sample_iter(&Alphanumeric)
                    .take(48)
                    .map(char::from)
                    .collect()
            }
            None => return Err(ConfigError::Missing("JWT_SECRET")),
        };
        let ttl_seconds: i64 = parse_or(&var, "JWT_TTL_SECONDS", 86_400)?;
        if ttl_seconds <= 0 {
            return Err(ConfigError::Invalid {
                key: "JWT_TTL_SECONDS",
                value: ttl_seconds.to_string(),
                reason: "must be positive".to_string(),
            });
        }

        Ok(Self {
            bind_addr: parse_or(&var, "BIND_ADDR", IpAddr::from([0, 0, 0, 0]))?,
            port: parse_or(&var, "PORT", 3000)?,
            database_url,
            database_max_connections: parse_or(&var, "DATABASE_MAX_CONNECTIONS", 20)?,
            jwt: JwtConfig {
                secret,
                issuer: var("JWT_ISSUER").map(Into::into),
                audience: var("JWT_AUDIENCE").map(Into::into),
                token_ttl: time::Duration::seconds(ttl_seconds),
                ..JwtConfig::default()
            },
            cors_allowed_origins: parse_or(&var, "CORS_ALLOWED_ORIGINS", CorsOrigins::Any)?,
            log_format: parse_or(&var, "LOG_FORMAT", LogFormat::Pretty)?,
            debug,
        })
    }
}

fn parse_or<T>(
    var: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match var(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}
