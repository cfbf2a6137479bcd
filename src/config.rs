use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    /// Shared secret for admin-privileged calls.
    pub admin_token: String,
    /// CORS allow-list for browser-origin callers.
    pub allowed_origins: Vec<String>,
    /// Base URL of the AI completion service. Unset disables the AI path
    /// and the sentence generator is template-only.
    pub ai_api_url: Option<String>,
    pub ai_api_key: Option<String>,
    pub ai_model: String,
    pub detect_timeout_ms: u64,
    pub external_timeout_ms: u64,
    /// Wait before the post-update verification fetch, letting upstream
    /// caches settle.
    pub verification_delay_ms: u64,
    /// Courtesy delay between consecutive third-party targets in a batch.
    pub domain_fetch_delay_ms: u64,
    pub recent_posts_count: u32,
    pub max_live_instructions_per_target: i64,
    pub max_sentence_chars: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = parse_number(&env_map, "PORT", 8080u16)?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let admin_token = env_map
            .get("ADMIN_TOKEN")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("ADMIN_TOKEN".to_string()))?;

        let allowed_origins = env_map
            .get("ALLOWED_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let ai_api_url = env_map.get("AI_API_URL").cloned().filter(|s| !s.is_empty());
        if let Some(url) = &ai_api_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidValue(
                    "AI_API_URL".to_string(),
                    "must be an http(s) URL".to_string(),
                ));
            }
        }
        let ai_api_key = env_map.get("AI_API_KEY").cloned().filter(|s| !s.is_empty());
        let ai_model = env_map
            .get("AI_MODEL")
            .cloned()
            .unwrap_or_else(|| "gpt-4o-mini".to_string());

        Ok(Config {
            port,
            database_path,
            admin_token,
            allowed_origins,
            ai_api_url,
            ai_api_key,
            ai_model,
            detect_timeout_ms: parse_number(&env_map, "DETECT_TIMEOUT_MS", 5_000u64)?,
            external_timeout_ms: parse_number(&env_map, "EXTERNAL_TIMEOUT_MS", 10_000u64)?,
            verification_delay_ms: parse_number(&env_map, "VERIFICATION_DELAY_MS", 2_000u64)?,
            domain_fetch_delay_ms: parse_number(&env_map, "DOMAIN_FETCH_DELAY_MS", 500u64)?,
            recent_posts_count: parse_number(&env_map, "RECENT_POSTS_COUNT", 10u32)?,
            max_live_instructions_per_target: parse_number(
                &env_map,
                "MAX_LIVE_INSTRUCTIONS_PER_TARGET",
                3i64,
            )?,
            max_sentence_chars: parse_number(&env_map, "MAX_SENTENCE_CHARS", 300usize)?,
        })
    }
}

fn parse_number<T: std::str::FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match env_map.get(key) {
        Some(raw) => raw.parse::<T>().map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), format!("cannot parse {:?}", raw))
        }),
        None => Ok(default),
    }
}
