use std::time::Duration;

use anyhow::{bail, Context};

pub const DEFAULT_ORIGIN: &str = "http://localhost:5173";
const DEV_TOKEN_SECRET: &str = "chatline-development-secret";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub allowed_origins: Vec<String>,
    pub token_secret: String,
    pub token_ttl: Duration,
    pub log_requests: bool,
    pub environment: String,
}

impl Config {
    /// Reads the process environment, after loading `.env` if present.
    pub fn from_env() -> anyhow::Result<Config> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Config> {
        let environment = get("APP_ENV").unwrap_or_else(|| "development".to_owned());
        let production = environment == "production";

        let port = match get("PORT") {
            Some(port) => port.parse().with_context(|| format!("PORT is not a port number: {port}"))?,
            None => 5000,
        };

        let token_secret = match get("JWT_SECRET") {
            Some(secret) if !secret.is_empty() => secret,
            _ if production => bail!("JWT_SECRET must be set in production"),
            _ => DEV_TOKEN_SECRET.to_owned(),
        };

        let ttl_hours: u64 = match get("TOKEN_TTL_HOURS") {
            Some(hours) => hours.parse().with_context(|| format!("TOKEN_TTL_HOURS is not a number: {hours}"))?,
            None => 24 * 7,
        };

        let ttl_secs = ttl_hours
            .checked_mul(3600)
            .filter(|secs| i64::try_from(*secs).is_ok())
            .with_context(|| format!("TOKEN_TTL_HOURS is too large: {ttl_hours}"))?;

        Ok(Config {
            port,
            database_url: get("DATABASE_URL").unwrap_or_else(|| "sqlite://chatline.db?mode=rwc".to_owned()),
            allowed_origins: parse_origins(get("FRONTEND_URL")),
            token_secret,
            token_ttl: Duration::from_secs(ttl_secs),
            log_requests: get("LOG_REQUESTS").is_none_or(|v| v != "false"),
            environment,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn parse_origins(raw: Option<String>) -> Vec<String> {
    let mut origins: Vec<String> = raw
        .as_deref()
        .unwrap_or(DEFAULT_ORIGIN)
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_owned)
        .collect();

    if !origins.iter().any(|origin| origin == DEFAULT_ORIGIN) {
        origins.push(DEFAULT_ORIGIN.to_owned());
    }
    origins
}
