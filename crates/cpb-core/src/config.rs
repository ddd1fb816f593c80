use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

/// Typed configuration, read from the environment (and `.env` if present).
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,

    // Access gate
    pub required_channel: Option<String>,
    pub join_channel_url: Option<String>,

    // Channel registry
    pub channels_file: PathBuf,

    // Composition
    pub channel_page_size: usize,
    pub default_self_destruct: Duration,

    // Linking
    pub link_probe_delay: Duration,
}

impl Config {
    /// Defaults for everything except the token.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            telegram_bot_token: token.into(),
            required_channel: None,
            join_channel_url: None,
            channels_file: PathBuf::from("channels.json"),
            channel_page_size: 5,
            default_self_destruct: Duration::from_secs(60 * 60),
            link_probe_delay: Duration::from_millis(2000),
        }
    }

    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        // Required env vars
        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN")
            .or_else(|| env_str("BOT_TOKEN"))
            .unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let mut cfg = Self::with_token(telegram_bot_token);

        // Access gate: unset means everybody may use the bot.
        cfg.required_channel = env_str("REQUIRED_CHANNEL")
            .and_then(non_empty)
            .map(|c| normalize_channel_handle(&c));
        cfg.join_channel_url = env_str("JOIN_CHANNEL_URL")
            .and_then(non_empty)
            .or_else(|| cfg.required_channel.as_deref().and_then(default_join_url));

        if let Some(path) = env_path("CHANNELS_FILE") {
            cfg.channels_file = path;
        }

        if let Some(size) = env_usize("CHANNEL_PAGE_SIZE") {
            if size == 0 {
                return Err(Error::Config(
                    "CHANNEL_PAGE_SIZE must be at least 1".to_string(),
                ));
            }
            cfg.channel_page_size = size;
        }

        if let Some(mins) = env_u64("DEFAULT_SELF_DESTRUCT_MINUTES") {
            cfg.default_self_destruct = self_destruct_minutes(mins)?;
        }

        if let Some(ms) = env_u64("LINK_PROBE_DELAY_MS") {
            cfg.link_probe_delay = Duration::from_millis(ms);
        }

        Ok(cfg)
    }
}

/// `FxLuv` and `https://t.me/FxLuv` both become `@FxLuv`; numeric ids pass through.
fn normalize_channel_handle(raw: &str) -> String {
    let raw = raw.trim();
    if raw.parse::<i64>().is_ok() {
        return raw.to_string();
    }
    let name = raw
        .trim_start_matches("https://")
        .trim_start_matches("t.me/")
        .trim_start_matches('@');
    format!("@{name}")
}

fn self_destruct_minutes(mins: u64) -> Result<Duration> {
    mins.checked_mul(60).map(Duration::from_secs).ok_or_else(|| {
        Error::Config(format!("DEFAULT_SELF_DESTRUCT_MINUTES is too large: {mins}"))
    })
}

fn default_join_url(handle: &str) -> Option<String> {
    handle
        .strip_prefix('@')
        .map(|name| format!("https://t.me/{name}"))
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

        env::set_var(key, strip_quotes(v.trim()));
    }
}

fn strip_quotes(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return &val[1..val.len() - 1];
    }
    val
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_handles_are_normalized() {
        assert_eq!(normalize_channel_handle("FxLuv"), "@FxLuv");
        assert_eq!(normalize_channel_handle("@FxLuv"), "@FxLuv");
        assert_eq!(normalize_channel_handle("https://t.me/FxLuv"), "@FxLuv");
        assert_eq!(normalize_channel_handle("-1001234"), "-1001234");
    }

    #[test]
    fn join_url_defaults_from_handle() {
        assert_eq!(
            default_join_url("@FxLuv").as_deref(),
            Some("https://t.me/FxLuv")
        );
        assert_eq!(default_join_url("-1001234"), None);
    }

    #[test]
    fn quotes_are_stripped_from_dotenv_values() {
        assert_eq!(strip_quotes("\"abc\""), "abc");
        assert_eq!(strip_quotes("'abc'"), "abc");
        assert_eq!(strip_quotes("abc"), "abc");
        assert_eq!(strip_quotes("\""), "\"");
    }

    #[test]
    fn self_destruct_minutes_reject_overflow() {
        assert_eq!(self_destruct_minutes(90).unwrap(), Duration::from_secs(5400));
        assert!(matches!(self_destruct_minutes(u64::MAX), Err(Error::Config(_))));
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::with_token("t");
        assert_eq!(cfg.channel_page_size, 5);
        assert_eq!(cfg.default_self_destruct, Duration::from_secs(3600));
        assert!(cfg.required_channel.is_none());
    }
}
