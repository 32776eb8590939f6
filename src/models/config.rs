//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Bot credentials and destination chats
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Listing site and search pages
    #[serde(default)]
    pub source: SourceConfig,

    /// HTTP client behavior
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Startup filter values
    #[serde(default)]
    pub filter: FilterConfig,

    /// Commute lookup credentials
    #[serde(default)]
    pub commute: CommuteConfig,

    /// Loop intervals
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Seen-set persistence
    #[serde(default)]
    pub storage: StorageConfig,

    /// Health endpoint
    #[serde(default)]
    pub server: ServerConfig,

    /// Notification text
    #[serde(default)]
    pub message: MessageConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Overlay settings from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    /// Overlay settings from an arbitrary variable lookup.
    pub fn apply_vars<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(token) = var("BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Some(ids) = var("CHAT_ID") {
            self.telegram.chat_ids = ids
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(pattern) = var("STATION_PATTERN") {
            self.filter.station_pattern = Some(pattern);
        }
        if let Some(key) = var("COMMUTE_API_KEY") {
            self.commute.api_key = Some(key);
        }
        if let Some(destination) = var("COMMUTE_DESTINATION") {
            self.commute.destination = destination;
        }
        if let Some(path) = var("SEEN_FILE") {
            self.storage.seen_file = PathBuf::from(path);
        }

        parse_var(&var, "MAX_PRICE", &mut self.filter.max_price);
        parse_var(&var, "CHECK_INTERVAL", &mut self.schedule.check_interval_secs);
        parse_var(&var, "CMD_POLL_SEC", &mut self.schedule.command_poll_secs);
        parse_var(&var, "PORT", &mut self.server.port);

        let mut min_commute = 0u32;
        if parse_var(&var, "MIN_COMMUTE", &mut min_commute) {
            self.filter.min_commute = Some(min_commute);
        }
        let mut max_commute = 0u32;
        if parse_var(&var, "MAX_COMMUTE", &mut max_commute) {
            self.filter.max_commute = Some(max_commute);
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(AppError::validation("telegram.bot_token is empty"));
        }
        if self.telegram.chat_ids.is_empty() {
            return Err(AppError::validation("No telegram.chat_ids defined"));
        }
        if self.source.search_urls.is_empty() {
            return Err(AppError::validation("No source.search_urls defined"));
        }
        for url in self.source.search_urls.iter().chain([&self.source.base_url]) {
            url::Url::parse(url)?;
        }
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.schedule.check_interval_secs == 0 {
            return Err(AppError::validation(
                "schedule.check_interval_secs must be > 0",
            ));
        }
        if self.schedule.command_poll_secs == 0 {
            return Err(AppError::validation(
                "schedule.command_poll_secs must be > 0",
            ));
        }
        if let Some(pattern) = &self.filter.station_pattern {
            RegexBuilder::new(pattern).case_insensitive(true).build()?;
        }
        if let (Some(min), Some(max)) = (self.filter.min_commute, self.filter.max_commute) {
            if min > max {
                return Err(AppError::validation(
                    "filter.min_commute must not exceed filter.max_commute",
                ));
            }
        }
        if self.filter.commute_range_enabled() && self.commute.api_key.is_none() {
            return Err(AppError::validation(
                "Commute bounds are set but commute.api_key is missing",
            ));
        }
        Ok(())
    }
}

/// Parse an environment value into `slot`, returning whether it was applied.
fn parse_var<T, F>(var: &F, key: &str, slot: &mut T) -> bool
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = var(key) else {
        return false;
    };
    match raw.parse::<T>() {
        Ok(value) => {
            *slot = value;
            true
        }
        Err(_) => {
            log::warn!("Ignoring {}={:?}: not a valid number", key, raw);
            false
        }
    }
}

/// Telegram Bot API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token issued by BotFather
    #[serde(default)]
    pub bot_token: String,

    /// Chats that receive notifications and may issue commands
    #[serde(default)]
    pub chat_ids: Vec<String>,

    /// Bot API base URL
    #[serde(default = "defaults::telegram_api_base")]
    pub api_base: String,

    /// Long-poll timeout passed to getUpdates
    #[serde(default = "defaults::long_poll")]
    pub long_poll_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_ids: Vec::new(),
            api_base: defaults::telegram_api_base(),
            long_poll_secs: defaults::long_poll(),
        }
    }
}

/// Listing site settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Site root, used for cookie priming and resolving relative links
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Search result pages, fetched in order
    #[serde(default = "defaults::search_urls")]
    pub search_urls: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            search_urls: defaults::search_urls(),
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Accept-Language header for listing pages
    #[serde(default = "defaults::accept_language")]
    pub accept_language: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Delay between search page requests in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            accept_language: defaults::accept_language(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
        }
    }
}

/// Filter values used at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Price ceiling in whole euros
    #[serde(default = "defaults::max_price")]
    pub max_price: u32,

    /// Case-insensitive pattern matched against title and URL
    #[serde(default)]
    pub station_pattern: Option<String>,

    /// Lower commute bound in minutes
    #[serde(default)]
    pub min_commute: Option<u32>,

    /// Upper commute bound in minutes
    #[serde(default)]
    pub max_commute: Option<u32>,
}

impl FilterConfig {
    /// Whether any commute bound is configured.
    pub fn commute_range_enabled(&self) -> bool {
        self.min_commute.is_some() || self.max_commute.is_some()
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_price: defaults::max_price(),
            station_pattern: None,
            min_commute: None,
            max_commute: None,
        }
    }
}

/// Commute lookup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommuteConfig {
    /// Distance Matrix API key
    #[serde(default)]
    pub api_key: Option<String>,

    /// Commute destination address
    #[serde(default = "defaults::commute_destination")]
    pub destination: String,

    /// Travel mode passed to the API
    #[serde(default = "defaults::commute_mode")]
    pub mode: String,

    /// Distance Matrix endpoint
    #[serde(default = "defaults::commute_api_url")]
    pub api_url: String,
}

impl Default for CommuteConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            destination: defaults::commute_destination(),
            mode: defaults::commute_mode(),
            api_url: defaults::commute_api_url(),
        }
    }
}

/// Loop intervals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Seconds between fetch cycles
    #[serde(default = "defaults::check_interval")]
    pub check_interval_secs: u64,

    /// Seconds between command polls
    #[serde(default = "defaults::command_poll")]
    pub command_poll_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: defaults::check_interval(),
            command_poll_secs: defaults::command_poll(),
        }
    }
}

/// Seen-set persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON file holding delivered listing ids
    #[serde(default = "defaults::seen_file")]
    pub seen_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            seen_file: defaults::seen_file(),
        }
    }
}

/// Health endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Serve the health endpoint
    #[serde(default = "defaults::server_enabled")]
    pub enabled: bool,

    /// Bind host
    #[serde(default = "defaults::host")]
    pub host: String,

    /// Bind port
    #[serde(default = "defaults::port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::server_enabled(),
            host: defaults::host(),
            port: defaults::port(),
        }
    }
}

/// Notification text settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageConfig {
    /// Template with `{title}`, `{price}`, `{url}`, `{address}`, `{commute}`, `{published}`
    #[serde(default = "defaults::template")]
    pub template: String,

    /// Titles longer than this many characters are cut
    #[serde(default = "defaults::max_title_length")]
    pub max_title_length: usize,

    /// Attach an inline "Open listing" button
    #[serde(default = "defaults::inline_button")]
    pub inline_button: bool,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            template: defaults::template(),
            max_title_length: defaults::max_title_length(),
            inline_button: defaults::inline_button(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Telegram defaults
    pub fn telegram_api_base() -> String {
        "https://api.telegram.org".into()
    }
    pub fn long_poll() -> u64 {
        10
    }

    // Source defaults
    pub fn base_url() -> String {
        "https://www.wg-gesucht.de/".into()
    }
    pub fn search_urls() -> Vec<String> {
        vec![
            "https://www.wg-gesucht.de/1-zimmer-wohnungen-in-Muenchen.90.1.1.0.html".into(),
            "https://www.wg-gesucht.de/wg-zimmer-in-Muenchen.90.0.1.0.html".into(),
        ]
    }

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".into()
    }
    pub fn accept_language() -> String {
        "de,en;q=0.9".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn request_delay() -> u64 {
        500
    }

    // Filter defaults
    pub fn max_price() -> u32 {
        800
    }

    // Commute defaults
    pub fn commute_destination() -> String {
        "Marienplatz, München".into()
    }
    pub fn commute_mode() -> String {
        "transit".into()
    }
    pub fn commute_api_url() -> String {
        "https://maps.googleapis.com/maps/api/distancematrix/json".into()
    }

    // Schedule defaults
    pub fn check_interval() -> u64 {
        300
    }
    pub fn command_poll() -> u64 {
        3
    }

    // Storage defaults
    pub fn seen_file() -> PathBuf {
        PathBuf::from("data/seen.json")
    }

    // Server defaults
    pub fn server_enabled() -> bool {
        true
    }
    pub fn host() -> String {
        "0.0.0.0".into()
    }
    pub fn port() -> u16 {
        8080
    }

    // Message defaults
    pub fn template() -> String {
        "🏠 <b>{title}</b>\n💰 {price} €\n🔗 {url}".into()
    }
    pub fn max_title_length() -> usize {
        200
    }
    pub fn inline_button() -> bool {
        true
    }
}
