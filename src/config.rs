use crate::utils::constants::*;
use crate::utils::get_env::{env_var_to_vec, get_env_parsed, get_env_var, get_env_var_or};
use crate::utils::urls::to_origin;
use anyhow::Error;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub environment: String,
    pub frontend_url: String,
    pub additional_origins: Vec<String>,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub cleanup_interval: Duration,
    pub max_file_age: Duration,
    pub request_timeout: Duration,
    // 0 disables rate limiting
    pub rate_limit_burst: u32,
    pub landmark: LandmarkServiceConfig,
    pub claude: ClaudeConfig,
}

#[derive(Debug, Clone)]
pub struct LandmarkServiceConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

#[derive(Debug, Clone)]
pub struct ClaudeConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, Error> {
        Ok(Self {
            port: get_env_parsed("PORT", DEFAULT_PORT)?,
            environment: get_env_var_or("ENVIRONMENT", "development"),
            frontend_url: get_env_var_or("FRONTEND_URL", DEFAULT_FRONTEND_URL),
            additional_origins: env_var_to_vec("ADDITIONAL_ORIGINS"),
            upload_dir: PathBuf::from(get_env_var_or("UPLOAD_DIR", DEFAULT_UPLOAD_DIR)),
            max_upload_bytes: get_env_parsed("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            cleanup_interval: Duration::from_secs(get_env_parsed(
                "CLEANUP_INTERVAL_SECS",
                DEFAULT_CLEANUP_INTERVAL_SECS,
            )?),
            max_file_age: Duration::from_secs(get_env_parsed(
                "MAX_FILE_AGE_SECS",
                DEFAULT_MAX_FILE_AGE_SECS,
            )?),
            request_timeout: Duration::from_secs(get_env_parsed(
                "REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?),
            rate_limit_burst: get_env_parsed("RATE_LIMIT_BURST", DEFAULT_RATE_LIMIT_BURST)?,
            landmark: LandmarkServiceConfig {
                base_url: get_env_var_or("LANDMARK_SERVICE_URL", DEFAULT_LANDMARK_SERVICE_URL),
                timeout: Duration::from_secs(get_env_parsed(
                    "LANDMARK_SERVICE_TIMEOUT_SECS",
                    DEFAULT_LANDMARK_TIMEOUT_SECS,
                )?),
                max_retries: get_env_parsed("LANDMARK_SERVICE_RETRIES", DEFAULT_LANDMARK_RETRIES)?,
            },
            claude: ClaudeConfig {
                api_key: get_env_var("ANTHROPIC_API_KEY")
                    .ok()
                    .filter(|k| !k.trim().is_empty()),
                base_url: get_env_var_or("ANTHROPIC_BASE_URL", DEFAULT_ANTHROPIC_BASE_URL),
                model: get_env_var_or("CLAUDE_MODEL", DEFAULT_CLAUDE_MODEL),
                max_tokens: get_env_parsed("CLAUDE_MAX_TOKENS", DEFAULT_CLAUDE_MAX_TOKENS)?,
                timeout: Duration::from_secs(DEFAULT_RECOMMENDER_TIMEOUT_SECS),
            },
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Origins the browser app may call from: the configured frontend, any
    /// extra origins, and the local dev servers outside production.
    pub fn allowed_origins(&self) -> Vec<String> {
        let mut origins: Vec<String> = std::iter::once(self.frontend_url.as_str())
            .chain(self.additional_origins.iter().map(String::as_str))
            .filter_map(to_origin)
            .collect();

        if !self.is_production() {
            origins.extend(DEV_ORIGINS.iter().filter_map(|o| to_origin(o)));
        }

        origins.sort();
        origins.dedup();
        origins
    }

    // the request body limit wraps the file limit plus multipart framing
    pub fn request_body_limit(&self) -> usize {
        self.max_upload_bytes + MULTIPART_OVERHEAD_BYTES
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            environment: "development".to_string(),
            frontend_url: DEFAULT_FRONTEND_URL.to_string(),
            additional_origins: Vec::new(),
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
            max_file_age: Duration::from_secs(DEFAULT_MAX_FILE_AGE_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            rate_limit_burst: DEFAULT_RATE_LIMIT_BURST,
            landmark: LandmarkServiceConfig {
                base_url: DEFAULT_LANDMARK_SERVICE_URL.to_string(),
                timeout: Duration::from_secs(DEFAULT_LANDMARK_TIMEOUT_SECS),
                max_retries: DEFAULT_LANDMARK_RETRIES,
            },
            claude: ClaudeConfig {
                api_key: None,
                base_url: DEFAULT_ANTHROPIC_BASE_URL.to_string(),
                model: DEFAULT_CLAUDE_MODEL.to_string(),
                max_tokens: DEFAULT_CLAUDE_MAX_TOKENS,
                timeout: Duration::from_secs(DEFAULT_RECOMMENDER_TIMEOUT_SECS),
            },
        }
    }
}
