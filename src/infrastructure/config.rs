use anyhow::{Context, Result, anyhow};
use std::time::Duration;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_TOKEN_TTL_SECS: u64 = 86_400;
const MAX_TOKEN_TTL_SECS: u64 = 365 * 86_400;
const DEFAULT_POINT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_SIGNUP_BONUS_POINTS: i64 = 100;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub token_secret: String,
    pub token_ttl: Duration,
    pub point_url: String,
    pub post_url: String,
    pub point_timeout: Duration,
    pub signup_bonus_points: i64,
}

impl ServiceConfig {
    /// Reads the process environment, after loading `.env` if one exists.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow!("{} must be set", key))
        };

        let token_ttl_secs = parse_or(&lookup, "TOKEN_TTL_SECS", DEFAULT_TOKEN_TTL_SECS)?;
        if token_ttl_secs == 0 || token_ttl_secs > MAX_TOKEN_TTL_SECS {
            return Err(anyhow!(
                "TOKEN_TTL_SECS must be between 1 and {}, got {}",
                MAX_TOKEN_TTL_SECS,
                token_ttl_secs
            ));
        }

        Ok(Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            token_secret: required("TOKEN_SECRET")?,
            token_ttl: Duration::from_secs(token_ttl_secs),
            point_url: trim_base_url(required("POINT_URL")?),
            post_url: trim_base_url(required("POST_URL")?),
            point_timeout: Duration::from_secs(parse_or(
                &lookup,
                "POINT_TIMEOUT_SECS",
                DEFAULT_POINT_TIMEOUT_SECS,
            )?),
            signup_bonus_points: parse_or(
                &lookup,
                "SIGNUP_BONUS_POINTS",
                DEFAULT_SIGNUP_BONUS_POINTS,
            )?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(default),
    }
}

fn trim_base_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
