use crate::error::{BotError, BotResult};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:topic_tally.db";
pub const DEFAULT_MAX_CONCURRENT_HANDLERS: usize = crate::dispatch::runner::DEFAULT_CAPACITY;
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CALL_DEBOUNCE_SECS: u64 = 5;
pub const DEFAULT_VOICE_EVERY: u32 = 150;

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    /// Owner of the bot. Creating topics and counting events is reserved to this user.
    pub god_id: i64,
    pub database_url: String,
    pub max_concurrent_handlers: usize,
    pub poll_timeout_secs: u64,
    pub call_debounce: Duration,
    pub voice_every: u32,
}

impl Config {
    pub fn from_env() -> BotResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> BotResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bot_token = lookup("BOT_TOKEN")
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| BotError::Config("BOT_TOKEN must be set".to_string()))?;

        let max_concurrent_handlers: usize = parse_or(&lookup, "MAX_CONCURRENT_HANDLERS", DEFAULT_MAX_CONCURRENT_HANDLERS)?;
        if max_concurrent_handlers == 0 {
            return Err(BotError::Config("MAX_CONCURRENT_HANDLERS must be at least 1".to_string()));
        }

        Ok(Self {
            bot_token,
            god_id: parse_or(&lookup, "GOD_ID", 0)?,
            database_url: lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            max_concurrent_handlers,
            poll_timeout_secs: parse_or(&lookup, "POLL_TIMEOUT_SECS", DEFAULT_POLL_TIMEOUT_SECS)?,
            call_debounce: Duration::from_secs(parse_or(&lookup, "CALL_DEBOUNCE_SECS", DEFAULT_CALL_DEBOUNCE_SECS)?),
            voice_every: parse_or(&lookup, "VOICE_EVERY", DEFAULT_VOICE_EVERY)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> BotResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| BotError::Config(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_token_is_set() {
        let config = Config::from_lookup(lookup_from(&[("BOT_TOKEN", "123:abc")])).unwrap();
        assert_eq!(config.bot_token, "123:abc");
        assert_eq!(config.god_id, 0);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.max_concurrent_handlers, 10);
        assert_eq!(config.call_debounce, Duration::from_secs(5));
        assert_eq!(config.voice_every, 150);
    }

    #[test]
    fn missing_token_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[("GOD_ID", "42")])).unwrap_err();
        assert!(matches!(err, BotError::Config(_)));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup_from(&[
            ("BOT_TOKEN", "t"),
            ("GOD_ID", "42"),
            ("MAX_CONCURRENT_HANDLERS", "3"),
            ("CALL_DEBOUNCE_SECS", "1"),
        ]))
        .unwrap();
        assert_eq!(config.god_id, 42);
        assert_eq!(config.max_concurrent_handlers, 3);
        assert_eq!(config.call_debounce, Duration::from_secs(1));
    }

    #[test]
    fn garbage_numbers_are_reported() {
        let err = Config::from_lookup(lookup_from(&[("BOT_TOKEN", "t"), ("GOD_ID", "me")])).unwrap_err();
        assert!(err.to_string().contains("GOD_ID"));

        let err = Config::from_lookup(lookup_from(&[("BOT_TOKEN", "t"), ("MAX_CONCURRENT_HANDLERS", "0")])).unwrap_err();
        assert!(matches!(err, BotError::Config(_)));
    }
}
