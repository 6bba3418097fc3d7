use std::{fmt::Display, str::FromStr};

use anyhow::{anyhow, Context};
use tracing::info;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,

    pub site_url: String,
    pub cors_origin: String,

    /// Base URL of the hosted identity provider (GoTrue-compatible REST API).
    pub auth_url: String,
    pub auth_api_key: String,

    pub gemini_base_url: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Longest silence tolerated from a streaming reply, in milliseconds.
    pub idle_timeout_ms: u64,

    pub session_inactivity_days: i64,
    pub secure_cookies: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let site_url: String = try_load("SITE_URL", "http://localhost:8080")?;

        Ok(Self {
            database_url: try_load("DATABASE_URL", "sqlite://phrasechat.db?mode=rwc")?,
            bind_addr: try_load("BIND_ADDR", "0.0.0.0:8080")?,

            cors_origin: try_load("CORS_ORIGIN", &site_url)?,
            site_url,

            auth_url: require("AUTH_URL")?,
            auth_api_key: require("AUTH_API_KEY")?,

            gemini_base_url: try_load("GEMINI_BASE_URL", "https://generativelanguage.googleapis.com")?,
            gemini_api_key: require("GEMINI_API_KEY")?,
            gemini_model: try_load("GEMINI_MODEL", "gemini-1.5-flash")?,
            temperature: try_load("LLM_TEMPERATURE", "0.7")?,
            max_tokens: try_load("LLM_MAX_TOKENS", "1000")?,
            idle_timeout_ms: try_load("LLM_IDLE_TIMEOUT_MS", "30000")?,

            session_inactivity_days: try_load("SESSION_INACTIVITY_DAYS", "7")?,
            secure_cookies: try_load("SECURE_COOKIES", "false")?,
        })
    }
}

fn require(key: &str) -> anyhow::Result<String> {
    dotenv::var(key).with_context(|| format!("{key} must be set"))
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let raw = dotenv::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_owned()
    });

    raw.parse()
        .map_err(|e| anyhow!("invalid {key} value {raw:?}: {e}"))
}
