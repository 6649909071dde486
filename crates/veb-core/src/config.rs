use std::{env, fs, path::Path, time::Duration};

use crate::{errors::Error, scraper::ScrapeConfig, Result};

/// Typed configuration for the bot.
///
/// Everything is sourced from the environment (optionally seeded from a local
/// `.env` file), with defaults matching the production community setup.
#[derive(Clone, Debug)]
pub struct Config {
    // VK API
    pub access_token: String,
    pub group_id: i64,
    pub api_base: String,
    pub api_version: String,

    // Long poll
    pub poll_wait: Duration,

    // Messaging
    pub message_limit: usize,
    pub fallback_name: String,

    // Command routing
    pub start_keyword: String,
    pub search_prefix: String,
    pub question_prefixes: Vec<String>,
    pub blocked_words: Vec<String>,

    // Search worker pool
    pub search_workers: usize,

    // Catalog scraping
    pub webdriver_url: String,
    pub scrape: ScrapeConfig,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        // Required env vars
        let access_token = env_str("VK_ACCESS_TOKEN").unwrap_or_default();
        if access_token.trim().is_empty() {
            return Err(Error::Config(
                "VK_ACCESS_TOKEN environment variable is required".to_string(),
            ));
        }
        let group_id = env_i64("VK_GROUP_ID").ok_or_else(|| {
            Error::Config("VK_GROUP_ID environment variable is required (numeric)".to_string())
        })?;

        // API endpoints
        let api_base = env_str("VK_API_BASE").unwrap_or("https://api.vk.com/method".to_string());
        let api_version = env_str("VK_API_VERSION").unwrap_or("5.199".to_string());

        // Long poll hold time; VK recommends 25s
        let poll_wait = Duration::from_secs(env_u64("LONG_POLL_WAIT_SECS").unwrap_or(25));

        // Messaging
        let message_limit = env_usize("MESSAGE_LIMIT").unwrap_or(4096);
        let fallback_name = env_str("FALLBACK_NAME")
            .and_then(non_empty)
            .unwrap_or("Друг".to_string());

        // Command routing keywords
        let start_keyword = env_str("START_KEYWORD")
            .and_then(non_empty)
            .unwrap_or("начать".to_string());
        let search_prefix = env_str("SEARCH_PREFIX")
            .and_then(non_empty)
            .unwrap_or("найди".to_string());
        let question_prefixes = parse_csv_lower(
            env_str("QUESTION_PREFIXES").or_else(|| Some("можно ли,возможно ли,есть ли".to_string())),
        );
        let blocked_words = parse_csv_lower(env_str("BLOCKED_WORDS"));

        // Search worker pool
        let search_workers = env_usize("SEARCH_WORKERS").unwrap_or(3).max(1);

        // Catalog scraping
        let webdriver_url =
            env_str("WEBDRIVER_URL").unwrap_or("http://localhost:9515".to_string());
        let mut scrape = ScrapeConfig::default();
        if let Some(v) = env_str("LISTING_URL").and_then(non_empty) {
            scrape.listing_url = v;
        }
        if let Some(v) = env_u32("SCRAPE_MAX_PAGES") {
            scrape.max_pages = v;
        }
        if let Some(v) = env_u32("SCRAPE_MAX_RETRIES") {
            scrape.max_retries = v;
        }
        if let Some(v) = env_str("LISTING_FRAME_SELECTOR").and_then(non_empty) {
            scrape.frame_selector = v;
        }
        if let Some(v) = env_str("CARD_MARKER_SELECTOR").and_then(non_empty) {
            scrape.card_marker_selector = v;
        }
        if let Some(v) = env_str("CARD_SELECTOR").and_then(non_empty) {
            scrape.card_selector = v;
        }
        if let Some(v) = env_str("CARD_LINK_SELECTOR").and_then(non_empty) {
            scrape.link_selector = v;
        }
        if let Some(v) = env_str("CARD_TITLE_SELECTOR").and_then(non_empty) {
            scrape.title_selector = v;
        }
        if let Some(v) = env_str("CARD_DESCR_SELECTOR").and_then(non_empty) {
            scrape.descr_selector = v;
        }
        if let Some(v) = env_str("PAGE_BUTTON_SELECTOR").and_then(non_empty) {
            scrape.page_button_selector = v;
        }
        if let Some(v) = env_str("NEXT_BUTTON_SELECTOR").and_then(non_empty) {
            scrape.next_button_selector = v;
        }
        if let Some(v) = env_str("PAGINATION_SELECTOR").and_then(non_empty) {
            scrape.pagination_selector = v;
        }

        Ok(Self {
            access_token,
            group_id,
            api_base,
            api_version,
            poll_wait,
            message_limit,
            fallback_name,
            start_keyword,
            search_prefix,
            question_prefixes,
            blocked_words,
            search_workers,
            webdriver_url,
            scrape,
        })
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_i64(key: &str) -> Option<i64> {
    env_str(key).and_then(|s| s.trim().parse::<i64>().ok())
}

fn parse_csv_lower(v: Option<String>) -> Vec<String> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
