use std::{
    env, fs,
    path::Path,
    time::Duration,
};

use crate::{errors::Error, Result};

/// Typed configuration for the bot, loaded from environment variables
/// (with `.env` support for local runs).
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub bot_token: String,
    pub moderation_chat_id: i64,
    pub audit_log_chat_id: Option<i64>,
    pub moderator_ids: Vec<i64>,

    // Publishing
    pub publish_chat_ids: Vec<i64>,
    pub backup_chat_ids: Vec<i64>,
    pub default_post_interval_min: u64,
    pub autopost_poll_interval: Duration,

    // Submission flow
    pub categories: Vec<String>,
    pub districts: Vec<String>,
    pub bad_words: Vec<String>,
    pub max_photos_per_listing: usize,
    pub photos_done_word: String,
    pub default_reject_reason: String,

    // Rate limiting
    pub rate_limit_enabled: bool,
    pub rate_limit_requests: u32,
    pub rate_limit_window: Duration,

    // Misc surfaces
    pub faq_items: Vec<(String, String)>,
    pub group_guard_chat_ids: Vec<i64>,
}

const DEFAULT_CATEGORIES: &str = "Give away a pet,Sell a pet,Found pet,Lost pet,Help needed";
const DEFAULT_DISTRICTS: &str = "Central,Eastern,Western";

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        // Required env vars
        let bot_token = env_str("BOT_TOKEN").unwrap_or_default();
        if bot_token.trim().is_empty() {
            return Err(Error::Config(
                "BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let moderation_chat_id = env_i64("MODERATION_CHAT_ID").unwrap_or(0);
        if moderation_chat_id == 0 {
            return Err(Error::Config(
                "MODERATION_CHAT_ID environment variable is required".to_string(),
            ));
        }

        let audit_log_chat_id = env_i64("AUDIT_LOG_CHAT_ID").filter(|id| *id != 0);
        let moderator_ids = parse_csv_i64(env_str("MODERATOR_IDS"));

        // Publishing targets. An empty list is allowed (intake-only deployment);
        // the autoposter just has nothing to schedule.
        let publish_chat_ids = parse_csv_i64(env_str("PUBLISH_CHAT_IDS"));
        let backup_chat_ids = parse_csv_i64(env_str("BACKUP_CHAT_IDS"));
        let default_post_interval_min = env_u64("DEFAULT_POST_INTERVAL_MIN").unwrap_or(10).max(1);
        let autopost_poll_interval =
            Duration::from_secs(env_u64("AUTOPOST_POLL_INTERVAL_SECS").unwrap_or(30).max(1));

        // Submission flow enumerations
        let categories = parse_csv(env_str("CATEGORIES").or(Some(DEFAULT_CATEGORIES.to_string())));
        let districts = parse_csv(env_str("DISTRICTS").or(Some(DEFAULT_DISTRICTS.to_string())));
        if categories.is_empty() || districts.is_empty() {
            return Err(Error::Config(
                "CATEGORIES and DISTRICTS must each contain at least one entry".to_string(),
            ));
        }

        let bad_words = parse_csv_lower(env_str("BAD_WORDS"));
        let max_photos_per_listing = env_usize("MAX_PHOTOS_PER_LISTING").unwrap_or(20).max(1);
        let photos_done_word = env_str("PHOTOS_DONE_WORD")
            .and_then(non_empty)
            .unwrap_or_else(|| "done".to_string());
        let default_reject_reason = env_str("DEFAULT_REJECT_REASON")
            .and_then(non_empty)
            .unwrap_or_else(|| "Rule violation or malformed listing.".to_string());

        // Rate limiting
        let rate_limit_enabled = env_bool("RATE_LIMIT_ENABLED").unwrap_or(true);
        let rate_limit_requests = env_u32("RATE_LIMIT_REQUESTS").unwrap_or(20);
        let rate_limit_window = Duration::from_secs(env_u64("RATE_LIMIT_WINDOW").unwrap_or(60));

        // FAQ: "question|answer;question|answer"
        let faq_items = parse_faq(env_str("FAQ").unwrap_or_default());
        let group_guard_chat_ids = parse_csv_i64(env_str("GROUP_GUARD_CHAT_IDS"));

        Ok(Self {
            bot_token,
            moderation_chat_id,
            audit_log_chat_id,
            moderator_ids,
            publish_chat_ids,
            backup_chat_ids,
            default_post_interval_min,
            autopost_poll_interval,
            categories,
            districts,
            bad_words,
            max_photos_per_listing,
            photos_done_word,
            default_reject_reason,
            rate_limit_enabled,
            rate_limit_requests,
            rate_limit_window,
            faq_items,
            group_guard_chat_ids,
        })
    }

    pub fn is_moderator(&self, user_id: i64) -> bool {
        self.moderator_ids.contains(&user_id)
    }
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

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_i64(key: &str) -> Option<i64> {
    env_str(key).and_then(|s| s.trim().parse::<i64>().ok())
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

fn parse_csv(v: Option<String>) -> Vec<String> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_csv_lower(v: Option<String>) -> Vec<String> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn parse_faq(raw: String) -> Vec<(String, String)> {
    raw.split(';')
        .filter_map(|item| {
            let (q, a) = item.split_once('|')?;
            let q = q.trim();
            let a = a.trim();
            if q.is_empty() || a.is_empty() {
                return None;
            }
            Some((q.to_string(), a.to_string()))
        })
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
