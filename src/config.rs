//! Configuration for the Whatsify gateway and file locations
//!
//! Everything is driven by environment variables; a `.env` file is loaded
//! first via dotenvy.

use std::env;
use std::fs;
use std::path::PathBuf;

use crate::{Error, Result};

/// Default file locations, relative to the working directory.
pub const DEFAULT_NUMBERS_FILE: &str = "data/numbers.txt";
pub const DEFAULT_MEDIA_FILE: &str = "data/video.mp4";
pub const DEFAULT_SENT_LOG: &str = "logs/sent.log";
pub const DEFAULT_FAILED_LOG: &str = "logs/failed_numbers.log";

/// Default pacing bounds in seconds (1-2 minutes between sends).
pub const DEFAULT_MIN_DELAY_SECS: u64 = 60;
pub const DEFAULT_MAX_DELAY_SECS: u64 = 120;

/// Default HTTP timeout for provider calls.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Caption used when no caption file is configured.
pub const DEFAULT_CAPTION: &str =
    "Special new year offer! Watch the video till the end and reply with a \
     screenshot of the product you like.";

/// Main configuration struct.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub api_secret: String,
    pub account_id: String,
    pub numbers_file: PathBuf,
    pub media_file: PathBuf,
    pub sent_log: PathBuf,
    pub failed_log: PathBuf,
    pub caption: String,
    pub min_delay_secs: u64,
    pub max_delay_secs: u64,
    pub timeout_secs: u64,
    pub validate_before_send: bool,
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// `WHATSIFY_BASE_URL`, `WHATSIFY_API_SECRET` and `WHATSIFY_ACCOUNT_ID`
    /// are required; everything else has a default.
    pub fn from_env() -> Result<Self> {
        Self::load_dotenv();

        let base_url = Self::require("WHATSIFY_BASE_URL")?;
        let api_secret = Self::require("WHATSIFY_API_SECRET")?;
        let account_id = Self::require("WHATSIFY_ACCOUNT_ID")?;

        let caption = match env::var("CAPTION_FILE") {
            Ok(path) => fs::read_to_string(&path)
                .map_err(|e| Error::Config(format!("Failed to read caption file {}: {}", path, e)))?
                .trim_end()
                .to_string(),
            Err(_) => env::var("MESSAGE_CAPTION").unwrap_or_else(|_| DEFAULT_CAPTION.to_string()),
        };

        let min_delay_secs = Self::parse_u64("MIN_DELAY_SECS", DEFAULT_MIN_DELAY_SECS);
        let max_delay_secs = Self::parse_u64("MAX_DELAY_SECS", DEFAULT_MAX_DELAY_SECS);
        if min_delay_secs > max_delay_secs {
            return Err(Error::Config(format!(
                "MIN_DELAY_SECS ({}) must not exceed MAX_DELAY_SECS ({})",
                min_delay_secs, max_delay_secs
            )));
        }

        Ok(Self {
            base_url,
            api_secret,
            account_id,
            numbers_file: Self::path("NUMBERS_FILE", DEFAULT_NUMBERS_FILE),
            media_file: Self::path("MEDIA_FILE", DEFAULT_MEDIA_FILE),
            sent_log: Self::path("SENT_LOG", DEFAULT_SENT_LOG),
            failed_log: Self::path("FAILED_LOG", DEFAULT_FAILED_LOG),
            caption,
            min_delay_secs,
            max_delay_secs,
            timeout_secs: Self::parse_u64("HTTP_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS),
            validate_before_send: Self::parse_bool("VALIDATE_BEFORE_SEND", false),
        })
    }

    fn require(key: &str) -> Result<String> {
        match env::var(key) {
            Ok(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(Error::Config(format!("{} not set", key))),
        }
    }

    fn path(key: &str, default: &str) -> PathBuf {
        env::var(key).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(default))
    }

    fn parse_u64(key: &str, default: u64) -> u64 {
        env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
    }

    fn parse_bool(key: &str, default: bool) -> bool {
        env::var(key)
            .ok()
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(default)
    }

    /// Load .env file into environment variables using dotenvy.
    fn load_dotenv() {
        // Try to load from current directory first, then parent
        if dotenvy::dotenv().is_err() {
            let _ = dotenvy::from_filename("../.env");
        }
    }
}
